//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{CliArgs, Command, InvokeArgs, InvokeOverrides, RenderOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scad-render";
const ENV_PREFIX: &str = "SCAD_RENDER";
pub(crate) const DEFAULT_TOOL_PATH: &str = "/usr/local/bin/openscad";
pub(crate) const DEFAULT_TEMP_ROOT: &str = "/tmp";
pub(crate) const DEFAULT_SOURCE_EXTENSION: &str = "scad";
pub(crate) const DEFAULT_OUTPUT_EXTENSION: &str = "stl";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub limits: LimitSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub tool_path: PathBuf,
    pub temp_root: PathBuf,
    pub source_extension: String,
    pub output_extension: String,
}

/// Optional input caps. Unset means unlimited.
#[derive(Debug, Clone, Default)]
pub struct LimitSettings {
    pub max_resources: Option<NonZeroU32>,
    pub max_decoded_bytes: Option<NonZeroU64>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match &cli.command {
        Command::Invoke(args) => raw.apply_invoke_overrides(&args.overrides),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    limits: RawLimitSettings,
}

impl RawSettings {
    fn apply_invoke_overrides(&mut self, overrides: &InvokeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.limits_max_resources {
            self.limits.max_resources = Some(max.into());
        }
        if let Some(max) = overrides.limits_max_decoded_bytes {
            self.limits.max_decoded_bytes = Some(max);
        }

        self.apply_render_overrides(&overrides.render);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(path) = overrides.tool_path.as_ref() {
            self.render.tool_path = Some(path.clone());
        }
        if let Some(dir) = overrides.temp_root.as_ref() {
            self.render.temp_root = Some(dir.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            render,
            limits,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            render: build_render_settings(render)?,
            limits: build_limit_settings(limits)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let tool_path = render
        .tool_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TOOL_PATH));
    if tool_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.tool_path",
            "path must not be empty",
        ));
    }

    let temp_root = render
        .temp_root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_ROOT));
    if temp_root.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.temp_root",
            "path must not be empty",
        ));
    }

    let source_extension = file_extension(
        render.source_extension,
        DEFAULT_SOURCE_EXTENSION,
        "render.source_extension",
    )?;
    let output_extension = file_extension(
        render.output_extension,
        DEFAULT_OUTPUT_EXTENSION,
        "render.output_extension",
    )?;

    Ok(RenderSettings {
        tool_path,
        temp_root,
        source_extension,
        output_extension,
    })
}

fn build_limit_settings(limits: RawLimitSettings) -> Result<LimitSettings, LoadError> {
    let max_resources = limits
        .max_resources
        .map(|value| non_zero_u32(value, "limits.max_resources"))
        .transpose()?;
    let max_decoded_bytes = limits
        .max_decoded_bytes
        .map(|value| {
            NonZeroU64::new(value).ok_or_else(|| {
                LoadError::invalid("limits.max_decoded_bytes", "must be greater than zero")
            })
        })
        .transpose()?;

    Ok(LimitSettings {
        max_resources,
        max_decoded_bytes,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    tool_path: Option<PathBuf>,
    temp_root: Option<PathBuf>,
    source_extension: Option<String>,
    output_extension: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLimitSettings {
    max_resources: Option<u64>,
    max_decoded_bytes: Option<u64>,
}

fn file_extension(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let extension = value
        .map(|value| value.trim().trim_start_matches('.').to_ascii_lowercase())
        .unwrap_or_else(|| default.to_string());
    if extension.is_empty() {
        return Err(LoadError::invalid(key, "extension must not be empty"));
    }
    if !extension.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(LoadError::invalid(
            key,
            format!("extension `{extension}` must be ASCII alphanumeric"),
        ));
    }
    Ok(extension)
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
