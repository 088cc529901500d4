//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid environment variable '{entry}', must be in the form <key>:<value>")]
    InvalidEnvVar { entry: String },

    #[error("invalid {tool} version '{version}': {message}")]
    InvalidVersion {
        tool: String,
        version: String,
        message: String,
    },

    #[error("invalid exclusion pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("invalid schema file name format '{format}': {message}")]
    InvalidFilenameFormat { format: String, message: String },

    #[error("manifests directory not found: {path}")]
    ManifestsNotFound { path: String },

    #[error("failed to walk {path}: {message}")]
    Walk { path: String, message: String },

    #[error("failed to parse config: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("failed to serialize JSON schema: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
