//! Error types and result handling for webhook operations.
//!
//! Defines the error taxonomy shared across the webhook subsystem:
//! validation failures are rejected synchronously with no state change,
//! storage failures propagate unchanged to the boundary, and absence is
//! modelled as `Option`/`bool` rather than an error where the contract
//! calls for it.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for registry and storage operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed validation; nothing was persisted.
    #[error("validation error: {0}")]
    Validation(String),

    /// Entity not found where the operation requires it to exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence layer failure. Not retried at this layer; the caller
    /// decides whether to retry the whole request.
    #[error("storage error: {0}")]
    Storage(String),

    /// Payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Creates a validation error from a message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a storage error from a message.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates a not-found error from a message.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            _ => Self::Storage(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
