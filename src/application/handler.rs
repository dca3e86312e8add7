//! Render job handler: one invocation, one job directory, one tool run.

use std::{
    future::Future,
    io::ErrorKind,
    num::NonZeroU64,
    path::PathBuf,
    time::Instant,
};

use tokio::fs;
use tracing::{Instrument, error, info, info_span, instrument::WithSubscriber};

use crate::{
    application::{
        error::{JobError, RenderToolError},
        workspace::{JobLayout, JobWorkspace, decode_content},
    },
    config::{LimitSettings, Settings},
    domain::{
        error::ValidationError,
        job::{InvocationContext, InvocationResponse, RenderRequest, RenderResult, resource_label},
    },
    infra::render_tool::{OpenScadCli, RenderTool},
};

/// Entry point invoked once per job by the hosting runtime.
#[derive(Debug)]
pub struct RenderJobHandler<T = OpenScadCli> {
    temp_root: PathBuf,
    layout: JobLayout,
    limits: LimitSettings,
    tool: T,
}

impl RenderJobHandler<OpenScadCli> {
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.render.temp_root.clone(),
            JobLayout::new(
                &settings.render.source_extension,
                &settings.render.output_extension,
            ),
            settings.limits.clone(),
            OpenScadCli::new(settings.render.tool_path.clone()),
        )
    }
}

impl<T: RenderTool> RenderJobHandler<T> {
    pub fn new(temp_root: PathBuf, layout: JobLayout, limits: LimitSettings, tool: T) -> Self {
        Self {
            temp_root,
            layout,
            limits,
            tool,
        }
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    /// Run a job for an already decoded request.
    pub async fn handle(
        &self,
        request: &RenderRequest,
        context: &InvocationContext,
    ) -> Result<RenderResult, JobError> {
        self.observed(context, self.run(request, context.job_id()))
            .await
    }

    /// Run a job for a raw JSON payload and wrap the result in the success envelope.
    pub async fn handle_event(
        &self,
        payload: &[u8],
        context: &InvocationContext,
    ) -> Result<InvocationResponse, JobError> {
        let job = async {
            let request: RenderRequest = serde_json::from_slice(payload).map_err(|err| {
                ValidationError::new("request", format!("malformed payload: {err}"))
            })?;
            let result = self.run(&request, context.job_id()).await?;
            result.into_response().map_err(JobError::Encode)
        };

        self.observed(context, job).await
    }

    /// Run `job` against the invocation's diagnostics sink, logging its outcome.
    async fn observed<F, R>(&self, context: &InvocationContext, job: F) -> Result<R, JobError>
    where
        F: Future<Output = Result<R, JobError>>,
    {
        let job_id = context.job_id();

        async move {
            let started_at = Instant::now();
            let span = info_span!("render_job", job_id);
            let outcome = job.instrument(span).await;

            match &outcome {
                Ok(_) => info!(
                    target = "application::handler",
                    job_id,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Render job completed"
                ),
                Err(err) => error!(
                    target = "application::handler",
                    job_id,
                    stage = err.stage().as_str(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    tool_output = err.tool_output().unwrap_or_default(),
                    "Render job failed"
                ),
            }

            outcome
        }
        .with_subscriber(context.diagnostics().clone())
        .await
    }

    async fn run(&self, request: &RenderRequest, job_id: &str) -> Result<RenderResult, JobError> {
        let model_source = request.model_source()?;
        if let Some(max) = self.limits.max_resources {
            let count = request.resources.len();
            if count > max.get() as usize {
                return Err(ValidationError::new(
                    "resources",
                    format!("{count} entries exceed the limit of {max}"),
                )
                .into());
            }
        }

        let workspace = JobWorkspace::create(&self.temp_root, job_id, &self.layout).await?;
        let mut budget = DecodedBudget::new(self.limits.max_decoded_bytes);

        let model = decode_content(&self.layout.model_file, model_source)?;
        budget.charge(&self.layout.model_file, model.len())?;
        workspace
            .write(&self.layout.model_file, workspace.model_path(), &model)
            .await?;

        for (index, entry) in request.resources.iter().enumerate() {
            let resource = entry.validate(index)?;
            let target = workspace
                .resolve(resource.path)
                .map_err(|err| JobError::extraction(resource.path, err))?;
            if workspace.is_reserved(&target) {
                return Err(ValidationError::new(
                    resource_label(index, Some(resource.path)),
                    "path is reserved for the model source or the rendered output",
                )
                .into());
            }

            let bytes = decode_content(resource.path, resource.content_base64)?;
            budget.charge(resource.path, bytes.len())?;
            workspace.write(resource.path, &target, &bytes).await?;
        }

        let run = self
            .tool
            .render(workspace.model_path(), workspace.output_path())
            .await?;
        if !run.succeeded() {
            return Err(RenderToolError::Failed {
                exit_code: run.exit_code,
                output: run.output,
            }
            .into());
        }

        info!(
            target = "application::handler",
            tool_output = %run.output,
            "Render tool output"
        );

        let output_path = workspace.output_path().to_path_buf();
        let produced = match fs::metadata(&output_path).await {
            Ok(metadata) => metadata.is_file(),
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(source) => {
                return Err(JobError::ArtifactRead {
                    path: output_path,
                    source,
                });
            }
        };
        if !produced {
            return Err(RenderToolError::MissingOutput {
                path: output_path,
                output: run.output,
            }
            .into());
        }

        let artifact = fs::read(&output_path)
            .await
            .map_err(|source| JobError::ArtifactRead {
                path: output_path.clone(),
                source,
            })?;

        if artifact.is_empty() {
            return Err(RenderToolError::EmptyOutput {
                path: output_path,
                output: run.output,
            }
            .into());
        }

        info!(
            target = "application::handler",
            artifact = %output_path.display(),
            artifact_bytes = artifact.len(),
            "Rendered model"
        );

        Ok(RenderResult {
            job_id: job_id.to_string(),
            artifact,
            name: self.layout.output_file.clone(),
        })
    }
}

/// Running total of decoded input bytes for one job.
struct DecodedBudget {
    limit: Option<NonZeroU64>,
    used: u64,
}

impl DecodedBudget {
    fn new(limit: Option<NonZeroU64>) -> Self {
        Self { limit, used: 0 }
    }

    fn charge(&mut self, resource: &str, bytes: usize) -> Result<(), ValidationError> {
        self.used = self.used.saturating_add(bytes as u64);
        match self.limit {
            Some(limit) if self.used > limit.get() => Err(ValidationError::new(
                resource,
                format!("decoded inputs exceed the limit of {limit} bytes"),
            )),
            _ => Ok(()),
        }
    }
}
