//! External render tool invocation.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Instant,
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::application::error::RenderToolError;

/// Outcome of one render tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRun {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Standard output followed by standard error.
    pub output: String,
}

impl ToolRun {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Renders a model file into a mesh file.
///
/// Implementations report how the tool exited; deciding whether the run
/// produced a usable artifact is left to the caller.
#[async_trait]
pub trait RenderTool: Send + Sync {
    async fn render(&self, input: &Path, output: &Path) -> Result<ToolRun, RenderToolError>;
}

/// OpenSCAD invoked as `<executable> -o <output> <input>`.
#[derive(Debug, Clone)]
pub struct OpenScadCli {
    executable: PathBuf,
}

impl OpenScadCli {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

#[async_trait]
impl RenderTool for OpenScadCli {
    async fn render(&self, input: &Path, output: &Path) -> Result<ToolRun, RenderToolError> {
        let started_at = Instant::now();
        let result = Command::new(&self.executable)
            .arg("-o")
            .arg(output)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let process_output = result.map_err(|source| {
            warn!(
                target = "infra::render_tool",
                op = "openscad::render",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                executable = %self.executable.display(),
                error_code = "spawn_cli",
                error = %source,
                "Failed to spawn render tool"
            );
            RenderToolError::Spawn {
                executable: self.executable.clone(),
                source,
            }
        })?;

        let run = ToolRun {
            exit_code: process_output.status.code(),
            output: combine_streams(&process_output.stdout, &process_output.stderr),
        };

        info!(
            target = "infra::render_tool",
            op = "openscad::render",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            exit_code = run.exit_code.map(i64::from).unwrap_or(-1),
            output_bytes = run.output.len(),
            "Render tool exited"
        );

        Ok(run)
    }
}

fn combine_streams(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(stderr));
    combined
}
