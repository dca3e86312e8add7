use std::io;

use tracing::{Dispatch, dispatcher};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

/// Build the diagnostics sink described by the logging settings.
///
/// Records are written to stderr; stdout is reserved for the invocation response.
pub fn dispatch(logging: &LoggingSettings) -> Dispatch {
    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer);

    Dispatch::new(subscriber)
}

/// Install the diagnostics sink globally and hand it back for explicit threading.
pub fn init(logging: &LoggingSettings) -> Result<Dispatch, InfraError> {
    let dispatch = dispatch(logging);
    dispatcher::set_global_default(dispatch.clone()).map_err(|err| {
        InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
    })?;
    Ok(dispatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn builds_both_formats() {
        for format in [LogFormat::Json, LogFormat::Compact] {
            let logging = LoggingSettings {
                level: LevelFilter::DEBUG,
                format,
            };
            let dispatch = dispatch(&logging);
            dispatcher::with_default(&dispatch, || {
                tracing::info!(target = "infra::telemetry", "telemetry smoke test");
            });
        }
    }
}
