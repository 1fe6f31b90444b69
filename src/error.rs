use thiserror::Error;

#[derive(Error, Debug)]
pub enum BalancerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error in query '{query}': {message}")]
    Parse { query: String, message: String },

    #[error("Read-only violation: only single SELECT statements may be executed")]
    ReadOnly,

    #[error("Storage error during {operation} on '{table}': {message}")]
    Storage {
        operation: &'static str,
        table: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of an error, used by the transport to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller sent something malformed or undeclared
    BadRequest,
    /// The query parsed but is not a standalone SELECT
    Forbidden,
    /// The database or the process failed
    Internal,
}

impl BalancerError {
    pub fn storage(operation: &'static str, table: impl Into<String>, err: impl std::fmt::Display) -> Self {
        BalancerError::Storage {
            operation,
            table: table.into(),
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BalancerError::Validation(_) | BalancerError::Parse { .. } | BalancerError::Json(_) => {
                ErrorKind::BadRequest
            }
            BalancerError::ReadOnly => ErrorKind::Forbidden,
            BalancerError::Storage { .. } | BalancerError::Config(_) | BalancerError::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, BalancerError::ReadOnly)
    }
}

pub type Result<T> = std::result::Result<T, BalancerError>;
