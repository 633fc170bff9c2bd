//! Core error types for sluice.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Invalid asset key
    #[error("invalid asset key: {reason}")]
    InvalidAssetKey {
        /// Why the key was rejected
        reason: String,
    },

    /// Invalid partition key
    #[error("invalid partition key `{key}`: {reason}")]
    InvalidPartitionKey {
        /// The offending key
        key: String,
        /// Why the key was rejected
        reason: String,
    },

    /// Invalid timestamp
    #[error("invalid timestamp: {reason}")]
    InvalidTimestamp {
        /// Why the timestamp was rejected
        reason: String,
    },

    /// Parse error
    #[error("parse error: {message}")]
    ParseError {
        /// Parser message
        message: String,
    },

    /// Validation error
    #[error("validation failed for {field}: {reason}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Failure reason
        reason: String,
    },

    /// Not found
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of entity
        kind: String,
        /// Entity identifier
        id: String,
    },

    /// Internal error (for unexpected errors)
    #[error("internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}
