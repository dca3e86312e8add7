use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the scad-render binary.
#[derive(Debug, Parser)]
#[command(name = "scad-render", version, about = "OpenSCAD render job handler")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SCAD_RENDER_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Handle a single render job invocation and print the response envelope.
    Invoke(Box<InvokeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct InvokeArgs {
    /// Invocation payload (JSON). Reads standard input when absent or `-`.
    #[arg(long = "event", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub event: Option<PathBuf>,

    /// Job identifier supplied by the invoking runtime; a random one is used when absent.
    #[arg(long = "job-id", env = "SCAD_RENDER_JOB_ID", value_name = "ID")]
    pub job_id: Option<String>,

    #[command(flatten)]
    pub overrides: InvokeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the render tool executable.
    #[arg(long = "render-tool-path", value_name = "PATH")]
    pub tool_path: Option<PathBuf>,

    /// Override the directory job directories are created in.
    #[arg(long = "render-temp-root", value_name = "PATH")]
    pub temp_root: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct InvokeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Reject requests carrying more resources than this.
    #[arg(long = "limits-max-resources", value_name = "COUNT")]
    pub limits_max_resources: Option<u32>,

    /// Reject requests whose decoded inputs exceed this many bytes.
    #[arg(long = "limits-max-decoded-bytes", value_name = "BYTES")]
    pub limits_max_decoded_bytes: Option<u64>,
}
