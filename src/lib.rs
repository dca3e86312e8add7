//! Render job handler: materializes an OpenSCAD model and its resources in a
//! per-job directory, runs the render tool and returns the encoded mesh.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
