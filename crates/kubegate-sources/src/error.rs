//! Error types for CRD source handling

use thiserror::Error;

/// Broad category of a [`SourceError`], used for exit codes and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed source URL
    Parse,
    /// Network failure
    Transport,
    /// Archive identification or extraction failure
    Format,
    /// Clone failure or bad repository layout
    Git,
    /// Local filesystem failure
    Io,
    /// Release download could not be trusted or used
    Toolchain,
}

/// CRD source errors
#[derive(Debug, Error)]
pub enum SourceError {
    // ============ Parse Errors ============
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(
        "invalid URL format: {url} (expected https://<host>/<owner>/<repo>/tree/<branch>[/<path>])"
    )]
    InvalidRepositoryUrl { url: String },

    // ============ Network Errors ============
    #[error("received non-200 status {status} from {url}")]
    HttpError { url: String, status: u16 },

    #[error("network error: {message}")]
    NetworkError { message: String },

    #[error("request timed out: {message}")]
    Timeout { message: String },

    // ============ Format Errors ============
    #[error("failed to identify archive format of {url}: {message}")]
    Identification { url: String, message: String },

    #[error("unsupported archive format '{format}' at {url}")]
    UnsupportedArchive { url: String, format: String },

    #[error("failed to extract archive from {url}: {message}")]
    Extraction { url: String, message: String },

    // ============ Git Errors ============
    #[error("failed to clone {url} at branch {branch}: {message}")]
    CloneFailed {
        url: String,
        branch: String,
        message: String,
    },

    #[error("directory '{subdir}' not found in {url}")]
    SubdirNotFound { url: String, subdir: String },

    // ============ Toolchain Errors ============
    #[error("no {tool} release for platform {os}/{arch}")]
    UnsupportedPlatform {
        tool: String,
        os: String,
        arch: String,
    },

    #[error("checksum for {file} not listed in {checksums}")]
    ChecksumMissing { file: String, checksums: String },

    #[error("integrity check failed for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("binary {binary} not found in {archive}")]
    BinaryNotFound { binary: String, archive: String },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::InvalidUrl { .. } | SourceError::InvalidRepositoryUrl { .. } => {
                ErrorKind::Parse
            }
            SourceError::HttpError { .. }
            | SourceError::NetworkError { .. }
            | SourceError::Timeout { .. } => ErrorKind::Transport,
            SourceError::Identification { .. }
            | SourceError::UnsupportedArchive { .. }
            | SourceError::Extraction { .. } => ErrorKind::Format,
            SourceError::CloneFailed { .. } | SourceError::SubdirNotFound { .. } => ErrorKind::Git,
            SourceError::UnsupportedPlatform { .. }
            | SourceError::ChecksumMissing { .. }
            | SourceError::ChecksumMismatch { .. }
            | SourceError::BinaryNotFound { .. } => ErrorKind::Toolchain,
            SourceError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Result type for source operations
pub type Result<T> = std::result::Result<T, SourceError>;

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout {
                message: e.to_string(),
            }
        } else if let Some(status) = e.status() {
            SourceError::HttpError {
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            }
        } else if e.is_connect() {
            SourceError::NetworkError {
                message: format!("connection failed: {}", e),
            }
        } else {
            SourceError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for SourceError {
    fn from(e: url::ParseError) -> Self {
        SourceError::InvalidUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}
