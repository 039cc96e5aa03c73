//! Error types for webhook delivery operations.
//!
//! Categorizes delivery failures for retry decisions: every failure to
//! obtain a 2xx response is retryable up to the attempt budget, while
//! configuration and storage problems surface separately.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error types for webhook delivery operations.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Seconds before the request timed out.
        timeout_seconds: u64,
    },

    /// Endpoint responded with a non-2xx status.
    #[error("endpoint rejected delivery: HTTP {status_code}")]
    EndpointRejected {
        /// HTTP status code outside the 2xx range.
        status_code: u16,
        /// Truncated response body.
        body: String,
    },

    /// Storage operation failed during delivery processing.
    #[error("storage error: {message}")]
    Storage {
        /// Storage error message.
        message: String,
    },

    /// Invalid delivery engine or client configuration.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Configuration error message.
        message: String,
    },

    /// Worker shutdown requested.
    #[error("worker shutdown requested")]
    ShutdownRequested,

    /// A worker task panicked.
    #[error("worker {worker_id} panicked: {error}")]
    WorkerPanic {
        /// Identifier of the panicked worker.
        worker_id: usize,
        /// Panic message.
        error: String,
    },

    /// Graceful shutdown exceeded its deadline.
    #[error("shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Deadline that was exceeded.
        timeout: Duration,
    },

    /// Unexpected internal error.
    #[error("internal delivery error: {message}")]
    Internal {
        /// Internal error message.
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates an endpoint rejection from an HTTP response.
    pub fn endpoint_rejected(status_code: u16, body: impl Into<String>) -> Self {
        Self::EndpointRejected { status_code, body: body.into() }
    }

    /// Creates a storage error from a message.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    /// Creates a configuration error from a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates an internal error from a message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Returns true if this failure should consume a retry attempt.
    ///
    /// Any failure to get a 2xx out of the endpoint is retryable,
    /// including 4xx responses: a misconfigured subscriber may fix its
    /// handler between attempts. Local configuration and storage
    /// problems are not the endpoint's fault and are not retried here.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::EndpointRejected { .. }
        )
    }

    /// HTTP status carried by this error, when a response arrived.
    pub const fn response_status(&self) -> Option<u16> {
        match self {
            Self::EndpointRejected { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Truncated response body carried by this error, if any.
    pub fn response_body(&self) -> Option<String> {
        match self {
            Self::EndpointRejected { body, .. } => Some(body.clone()),
            _ => None,
        }
    }
}

impl From<phase_core::CoreError> for DeliveryError {
    fn from(err: phase_core::CoreError) -> Self {
        Self::Storage { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_rejections_are_retryable_regardless_of_class() {
        assert!(DeliveryError::endpoint_rejected(404, "not found").is_retryable());
        assert!(DeliveryError::endpoint_rejected(500, "oops").is_retryable());
        assert!(DeliveryError::timeout(30).is_retryable());
        assert!(DeliveryError::network("refused").is_retryable());
    }

    #[test]
    fn local_failures_are_not_retryable() {
        assert!(!DeliveryError::storage("pool closed").is_retryable());
        assert!(!DeliveryError::configuration("bad url").is_retryable());
        assert!(!DeliveryError::ShutdownRequested.is_retryable());
    }

    #[test]
    fn response_status_only_for_rejections() {
        assert_eq!(DeliveryError::endpoint_rejected(503, "").response_status(), Some(503));
        assert_eq!(DeliveryError::timeout(30).response_status(), None);
    }
}
