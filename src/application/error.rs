use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{
    application::workspace::PathError, domain::error::ValidationError, infra::error::InfraError,
};

/// Step of the job pipeline an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Allocate,
    Validate,
    Extract,
    Render,
    Package,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Allocate => "allocate",
            JobStage::Validate => "validate",
            JobStage::Extract => "extract",
            JobStage::Render => "render",
            JobStage::Package => "package",
        }
    }
}

/// Terminal failure of a render job. Nothing is retried.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to extract `{resource}`: {source}")]
    Extraction {
        resource: String,
        #[source]
        source: ExtractionFailure,
    },
    #[error("failed to create job directory `{}`: {source}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    RenderTool(#[from] RenderToolError),
    #[error("failed to read rendered artifact `{}`: {source}", path.display())]
    ArtifactRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

impl JobError {
    pub fn extraction(resource: impl Into<String>, source: impl Into<ExtractionFailure>) -> Self {
        Self::Extraction {
            resource: resource.into(),
            source: source.into(),
        }
    }

    pub fn stage(&self) -> JobStage {
        match self {
            JobError::Validation(_) => JobStage::Validate,
            JobError::Extraction { .. } => JobStage::Extract,
            JobError::DirectoryCreation { .. } => JobStage::Allocate,
            JobError::RenderTool(_) => JobStage::Render,
            JobError::ArtifactRead { .. } | JobError::Encode(_) => JobStage::Package,
        }
    }

    /// Captured render tool output, when the failure carries any.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            JobError::RenderTool(err) => err.output(),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractionFailure {
    #[error("invalid base64 content: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum RenderToolError {
    #[error("render tool `{}` could not be started: {source}", executable.display())]
    Spawn {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("render tool failed (exit {exit_code:?}): {output}")]
    Failed {
        exit_code: Option<i32>,
        output: String,
    },
    #[error("render tool reported success but did not produce `{}`: {output}", path.display())]
    MissingOutput { path: PathBuf, output: String },
    #[error("render tool produced an empty `{}`: {output}", path.display())]
    EmptyOutput { path: PathBuf, output: String },
}

impl RenderToolError {
    pub fn output(&self) -> Option<&str> {
        match self {
            RenderToolError::Spawn { .. } => None,
            RenderToolError::Failed { output, .. }
            | RenderToolError::MissingOutput { output, .. }
            | RenderToolError::EmptyOutput { output, .. } => Some(output),
        }
    }
}

/// Top-level failure of the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_follow_the_pipeline() {
        let validation = JobError::from(ValidationError::new("resources[0]", "missing `path`"));
        assert_eq!(validation.stage(), JobStage::Validate);

        let extraction = JobError::extraction("model.scad", PathError::Traversal);
        assert_eq!(extraction.stage(), JobStage::Extract);
        assert_eq!(extraction.stage().as_str(), "extract");

        let tool = JobError::from(RenderToolError::Failed {
            exit_code: Some(1),
            output: "ERROR: Parser error".to_string(),
        });
        assert_eq!(tool.stage(), JobStage::Render);
        assert_eq!(tool.tool_output(), Some("ERROR: Parser error"));
    }

    #[test]
    fn messages_carry_the_offending_resource() {
        let err = JobError::extraction("parts/a.stl", PathError::Absolute);
        assert_eq!(
            err.to_string(),
            "failed to extract `parts/a.stl`: absolute paths are not allowed"
        );
    }
}
