//! Job payloads and results exchanged with the invoking runtime.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::Dispatch;

use super::error::ValidationError;

/// Payload field carrying the encoded model source.
pub const MODEL_SOURCE_FIELD: &str = "model_source_base64";

/// Status code of the success envelope.
pub const SUCCESS_STATUS: u16 = 200;

/// Invocation payload: the model source plus any resources it references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_source_base64: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub resources: Vec<ResourceEntry>,
}

impl RenderRequest {
    /// Build a request from raw model source bytes.
    pub fn from_source(source: impl AsRef<[u8]>) -> Self {
        Self {
            model_source_base64: Some(STANDARD.encode(source)),
            resources: Vec::new(),
        }
    }

    /// Attach a resource, encoding its content.
    pub fn with_resource(mut self, path: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        self.resources.push(ResourceEntry {
            path: Some(path.into()),
            content_base64: Some(STANDARD.encode(content)),
        });
        self
    }

    /// Encoded model source. An empty source is accepted; a missing one is not.
    pub fn model_source(&self) -> Result<&str, ValidationError> {
        self.model_source_base64
            .as_deref()
            .ok_or_else(|| ValidationError::new(MODEL_SOURCE_FIELD, "field is required"))
    }
}

/// One resource entry as received; either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_base64: Option<String>,
}

impl ResourceEntry {
    /// Require both a non-empty path and non-empty content.
    pub fn validate(&self, index: usize) -> Result<Resource<'_>, ValidationError> {
        let path = self.path.as_deref().filter(|value| !value.is_empty());
        let content = self
            .content_base64
            .as_deref()
            .filter(|value| !value.is_empty());

        match (path, content) {
            (Some(path), Some(content_base64)) => Ok(Resource {
                path,
                content_base64,
            }),
            (path, content) => {
                let reason = match (path.is_none(), content.is_none()) {
                    (true, true) => "missing `path` and `content_base64`",
                    (true, false) => "missing `path`",
                    _ => "missing `content_base64`",
                };
                Err(ValidationError::new(resource_label(index, path), reason))
            }
        }
    }
}

/// A resource entry that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource<'a> {
    pub path: &'a str,
    pub content_base64: &'a str,
}

/// Label used to name a resource entry in errors and logs.
pub fn resource_label(index: usize, path: Option<&str>) -> String {
    match path {
        Some(path) => format!("resources[{index}] ({path})"),
        None => format!("resources[{index}]"),
    }
}

/// Per-call data supplied by the invoking runtime.
///
/// `diagnostics` is the sink every log record of the invocation is sent to.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    job_id: String,
    diagnostics: Dispatch,
}

impl InvocationContext {
    /// Context logging to the dispatcher that is current at construction time.
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            diagnostics: Dispatch::default(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Dispatch) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn diagnostics(&self) -> &Dispatch {
        &self.diagnostics
    }
}

/// Rendered artifact of a successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub job_id: String,
    pub artifact: Vec<u8>,
    pub name: String,
}

impl RenderResult {
    /// Wrap the result in the success envelope returned to the runtime.
    pub fn into_response(self) -> Result<InvocationResponse, serde_json::Error> {
        let body = RenderResponseBody {
            job_id: self.job_id,
            rendered_model_base64: STANDARD.encode(&self.artifact),
            name: self.name,
        };

        Ok(InvocationResponse {
            status_code: SUCCESS_STATUS,
            body: serde_json::to_string(&body)?,
        })
    }
}

/// JSON document carried as a string in [`InvocationResponse::body`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResponseBody {
    pub job_id: String,
    pub rendered_model_base64: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl InvocationResponse {
    pub fn parse_body(&self) -> Result<RenderResponseBody, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ResourceEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ResourceEntry>>::deserialize(deserializer)?.unwrap_or_default())
}
