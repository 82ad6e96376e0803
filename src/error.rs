//! Error taxonomy for store, lock, and query operations.

use crate::lock::LockInfo;
use crate::schema::FieldError;
use serde_json::{Map, Value, json};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable, machine-readable tag attached to every [`Error`].
///
/// Callers map these to process exit codes; the strings returned by
/// [`ErrorCode::as_str`] never change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    NotFound,
    AlreadyExists,
    LockFailed,
    MalformedData,
    InvalidFilter,
    InvalidInput,
    SchemaValidation,
    OperationFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotInitialized => "NOT_INITIALIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::LockFailed => "LOCK_FAILED",
            ErrorCode::MalformedData => "MALFORMED_DATA",
            ErrorCode::InvalidFilter => "INVALID_FILTER",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::SchemaValidation => "SCHEMA_VALIDATION_FAILED",
            ErrorCode::OperationFailed => "OPERATION_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All failures surfaced by the record store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("database not initialized: {} has no schema.json", folder.display())]
    NotInitialized { folder: PathBuf },

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("database already exists at {}", folder.display())]
    AlreadyExists { folder: PathBuf },

    #[error("failed to acquire lock {}: {reason}", path.display())]
    LockFailed {
        path: PathBuf,
        reason: String,
        holder: Option<LockInfo>,
    },

    #[error("malformed data in {} at line {line}: {message} (near `{snippet}`)", path.display())]
    MalformedData {
        path: PathBuf,
        line: usize,
        message: String,
        snippet: String,
    },

    #[error("invalid filter near `{fragment}`: {message}")]
    InvalidFilter { fragment: String, message: String },

    #[error("invalid {what}: {message}")]
    InvalidInput { what: &'static str, message: String },

    #[error("schema validation failed: {}", join_field_errors(errors))]
    SchemaValidation {
        id: Option<String>,
        errors: Vec<FieldError>,
    },

    #[error("{operation} failed for {}: {source}", path.display())]
    OperationFailed {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub(crate) fn invalid_input(what: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidInput {
            what,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_filter(fragment: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidFilter {
            fragment: fragment.into(),
            message: message.into(),
        }
    }

    pub(crate) fn record_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "record",
            key: id.into(),
        }
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::OperationFailed {
            operation,
            path: path.into(),
            source,
        }
    }

    /// The taxonomy tag for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::NotInitialized { .. } => ErrorCode::NotInitialized,
            Error::NotFound { .. } => ErrorCode::NotFound,
            Error::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            Error::LockFailed { .. } => ErrorCode::LockFailed,
            Error::MalformedData { .. } => ErrorCode::MalformedData,
            Error::InvalidFilter { .. } => ErrorCode::InvalidFilter,
            Error::InvalidInput { .. } => ErrorCode::InvalidInput,
            Error::SchemaValidation { .. } => ErrorCode::SchemaValidation,
            Error::OperationFailed { .. } => ErrorCode::OperationFailed,
        }
    }

    /// Machine-readable context for this failure, suitable for JSON output.
    pub fn context(&self) -> Map<String, Value> {
        let value = match self {
            Error::NotInitialized { folder } => json!({ "folder": folder.display().to_string() }),
            Error::NotFound { kind, key } => json!({ "kind": kind, "key": key }),
            Error::AlreadyExists { folder } => json!({ "folder": folder.display().to_string() }),
            Error::LockFailed {
                path,
                reason,
                holder,
            } => json!({
                "path": path.display().to_string(),
                "reason": reason,
                "holder": holder,
            }),
            Error::MalformedData {
                path,
                line,
                message,
                snippet,
            } => json!({
                "path": path.display().to_string(),
                "line": line,
                "message": message,
                "snippet": snippet,
            }),
            Error::InvalidFilter { fragment, message } => {
                json!({ "fragment": fragment, "message": message })
            }
            Error::InvalidInput { what, message } => json!({ "input": what, "message": message }),
            Error::SchemaValidation { id, errors } => json!({ "id": id, "errors": errors }),
            Error::OperationFailed {
                operation,
                path,
                source,
            } => json!({
                "operation": operation,
                "path": path.display().to_string(),
                "cause": source.to_string(),
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}
