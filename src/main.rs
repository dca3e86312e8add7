use std::{path::Path, process};

use scad_render::{
    application::{error::AppError, handler::RenderJobHandler},
    config,
    domain::job::InvocationContext,
    infra::{error::InfraError, telemetry},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        // Job failures were already reported by the handler.
        if !matches!(error, AppError::Job(_)) {
            error!(error = %error, "application error");
        }
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    let diagnostics = telemetry::init(&settings.logging)?;

    match cli_args.command {
        config::Command::Invoke(args) => run_invoke(&settings, *args, diagnostics).await,
    }
}

async fn run_invoke(
    settings: &config::Settings,
    args: config::InvokeArgs,
    diagnostics: Dispatch,
) -> Result<(), AppError> {
    let payload = read_event(args.event.as_deref()).await?;
    let job_id = args.job_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let context = InvocationContext::new(job_id).with_diagnostics(diagnostics);

    let handler = RenderJobHandler::from_settings(settings);

    info!(
        target = "scad_render::invoke",
        job_id = context.job_id(),
        tool = %handler.tool().executable().display(),
        temp_root = %settings.render.temp_root.display(),
        payload_bytes = payload.len(),
        "Handling render job"
    );

    let response = handler.handle_event(&payload, &context).await?;

    let mut encoded = serde_json::to_vec(&response)
        .map_err(|err| AppError::unexpected(format!("failed to encode response: {err}")))?;
    encoded.push(b'\n');

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&encoded).await.map_err(InfraError::from)?;
    stdout.flush().await.map_err(InfraError::from)?;
    Ok(())
}

async fn read_event(path: Option<&Path>) -> Result<Vec<u8>, AppError> {
    match path {
        Some(path) if path != Path::new("-") => tokio::fs::read(path)
            .await
            .map_err(|err| AppError::from(InfraError::Io(err))),
        _ => {
            let mut payload = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut payload)
                .await
                .map_err(InfraError::from)?;
            Ok(payload)
        }
    }
}
