//! Application services layer.

pub mod error;
pub mod handler;
pub mod workspace;
