//! CLI error types with exit code handling
//!
//! Every library error is folded into [`CliError`], which knows the exit
//! code the process ends with.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use kubegate_core::CoreError;
use kubegate_runner::RunnerError;
use kubegate_sources::{ErrorKind, SourceError};

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// A manifest failed validation
    #[error("Validation failed for {}", path.display())]
    #[diagnostic(code(kubegate::cli::validation))]
    Validation { path: PathBuf, message: String },

    /// Invalid flags, config file or source URL
    #[error("Configuration error: {message}")]
    #[diagnostic(code(kubegate::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A CRD source or tool release could not be fetched or used
    #[error("Source error: {message}")]
    #[diagnostic(code(kubegate::cli::source))]
    Source {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// An external tool could not be run
    #[error("Tool error: {message}")]
    #[diagnostic(
        code(kubegate::cli::tool),
        help("pass an explicit path with --kubeconform-bin, --kustomize-bin or --flux-bin")
    )]
    Tool { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(kubegate::cli::io))]
    Io { message: String },

    #[error("Interrupted: {message}")]
    #[diagnostic(code(kubegate::cli::interrupted))]
    Interrupted { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(kubegate::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Config { .. } => exit_codes::USAGE_ERROR,
            CliError::Source { .. } => exit_codes::UNAVAILABLE,
            CliError::Tool { .. } => exit_codes::UNAVAILABLE,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Interrupted { .. } => exit_codes::ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e.into(),
            CoreError::InvalidEnvVar { .. } => CliError::Config {
                message: err.to_string(),
                help: Some("pass substitution variables as --env key:value".to_string()),
            },
            CoreError::ManifestsNotFound { .. } => CliError::Io {
                message: err.to_string(),
            },
            other => CliError::config(other.to_string()),
        }
    }
}

impl From<SourceError> for CliError {
    fn from(err: SourceError) -> Self {
        match err.kind() {
            ErrorKind::Parse => CliError::Config {
                message: err.to_string(),
                help: Some(
                    "repository sources look like https://github.com/<owner>/<repo>/tree/<branch>[/<path>]"
                        .to_string(),
                ),
            },
            ErrorKind::Io => CliError::Io {
                message: err.to_string(),
            },
            _ => CliError::Source {
                message: err.to_string(),
                help: None,
            },
        }
    }
}

impl From<RunnerError> for CliError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::ValidationFailed { path, message } => CliError::Validation { path, message },
            RunnerError::Tool { .. } => CliError::Tool {
                message: err.to_string(),
            },
            RunnerError::Cancelled | RunnerError::Timeout(_) => CliError::Interrupted {
                message: err.to_string(),
            },
            RunnerError::Core(e) => e.into(),
            RunnerError::Source(e) => e.into(),
            RunnerError::Io(e) => e.into(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
