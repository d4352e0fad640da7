//! Error types for teamwork
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (unknown id, invalid input, bad config)
//! - 3: Blocked by policy (permission denied)
//! - 4: Operation failed (io, lock, aggregation state)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the tw CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const POLICY_BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for teamwork operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not initialized: {0}")]
    NotInitialized(PathBuf),

    // Policy blocks (exit code 3)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // Operation failures (exit code 4)
    #[error("Inconsistent state: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Error::PermissionDenied(reason.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Error::Validation(reason.into())
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::NotFound { .. }
            | Error::Validation(_)
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::NotInitialized(_) => exit_codes::USER_ERROR,

            // Policy blocks
            Error::PermissionDenied(_) => exit_codes::POLICY_BLOCKED,

            // Operation failures
            Error::State(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Short machine-readable category used in JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Validation(_) | Error::InvalidArgument(_) => "validation",
            Error::InvalidConfig(_) | Error::NotInitialized(_) => "user_error",
            Error::PermissionDenied(_) => "permission_denied",
            Error::State(_) => "state",
            _ => "operation_failed",
        }
    }
}

/// Result type alias for teamwork operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        let details = match err {
            Error::NotFound { kind, id } => Some(serde_json::json!({ "kind": kind, "id": id })),
            _ => None,
        };
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            kind: err.kind(),
            details,
        }
    }
}
