//! Runner error types

use std::path::PathBuf;
use thiserror::Error;

use kubegate_core::CoreError;
use kubegate_sources::SourceError;

#[derive(Error, Debug)]
pub enum RunnerError {
    /// The validator rejected a resource; no further files are processed
    #[error("validation failed for {}", path.display())]
    ValidationFailed { path: PathBuf, message: String },

    #[error("failed to run {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("run timed out after {}", humanize(.0))]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn humanize(duration: &std::time::Duration) -> String {
    format!("{}s", duration.as_secs())
}

pub type Result<T> = std::result::Result<T, RunnerError>;
