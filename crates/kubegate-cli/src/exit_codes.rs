//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - every file validated
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure, cancellation or timeout
pub const ERROR: i32 = 1;

/// Validation error - a manifest failed validation
pub const VALIDATION_ERROR: i32 = 2;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments, config or source URLs (sysexits.h EX_USAGE)
pub const USAGE_ERROR: i32 = 64;

/// Unavailable - a CRD source, release download or external tool could not be used (EX_UNAVAILABLE)
pub const UNAVAILABLE: i32 = 69;
