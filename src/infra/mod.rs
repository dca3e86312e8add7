//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod render_tool;
pub mod telemetry;
