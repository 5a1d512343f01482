//! Error types for webhook dispatch.
//!
//! Transport failures of a delivery never reach the code that triggered
//! the event; they end up in the delivery record. The errors here surface
//! from ping, redelivery, lookups, queue handling and worker lifecycle.

use std::time::Duration;

use consentry_core::CoreError;
use thiserror::Error;

/// Result type alias for webhook operations.
pub type Result<T> = std::result::Result<T, WebhookError>;

/// Errors raised by the webhook dispatcher.
#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    Network {
        /// Error message describing the network failure.
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Number of seconds before the request timed out.
        timeout_seconds: u64,
    },

    /// Invalid client or webhook configuration.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Configuration error message.
        message: String,
    },

    /// A queued envelope could not be decoded.
    #[error("invalid event envelope: {message}")]
    InvalidEnvelope {
        /// Decoding error message.
        message: String,
    },

    /// A signature header is malformed or does not match the body.
    #[error("webhook signature rejected: {reason}")]
    SignatureRejected {
        /// Why the header was rejected.
        reason: String,
    },

    /// No record matched the query.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON or form encoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Workers did not stop within the shutdown timeout.
    #[error("worker shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// A worker task panicked.
    #[error("worker {worker_id} panicked: {error}")]
    WorkerPanic {
        /// Worker that panicked.
        worker_id: usize,
        /// Panic description.
        error: String,
    },
}

impl WebhookError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates an invalid envelope error.
    pub fn invalid_envelope(message: impl Into<String>) -> Self {
        Self::InvalidEnvelope { message: message.into() }
    }

    /// Creates a signature rejection.
    pub fn signature_rejected(reason: impl Into<String>) -> Self {
        Self::SignatureRejected { reason: reason.into() }
    }

    /// Check if this error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Configuration { .. }
            | Self::InvalidEnvelope { .. }
            | Self::SignatureRejected { .. } => true,

            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::NotFound(_)
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::ShutdownTimeout { .. }
            | Self::WorkerPanic { .. } => false,
        }
    }

    /// Check if a queued job that failed with this error can never succeed.
    ///
    /// Such jobs are marked done instead of being left for another claim.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::InvalidEnvelope { .. } | Self::Configuration { .. })
    }

    /// Returns true if the error means nothing matched the query.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<CoreError> for WebhookError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => Self::NotFound(msg),
            CoreError::Serialization(msg) => Self::Serialization(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for WebhookError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_urlencoded::ser::Error> for WebhookError {
    fn from(err: serde_urlencoded::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_errors_are_split() {
        assert!(WebhookError::signature_rejected("bad").is_client_error());
        assert!(WebhookError::invalid_envelope("eof").is_client_error());
        assert!(!WebhookError::network("refused").is_client_error());
        assert!(!WebhookError::Storage("down".into()).is_client_error());
    }

    #[test]
    fn only_undecodable_jobs_are_permanent() {
        assert!(WebhookError::invalid_envelope("eof").is_permanent());
        assert!(!WebhookError::Storage("down".into()).is_permanent());
        assert!(!WebhookError::timeout(10).is_permanent());
    }

    #[test]
    fn core_not_found_is_preserved() {
        assert!(WebhookError::from(CoreError::NotFound("d".into())).is_not_found());
        assert_eq!(WebhookError::timeout(10).to_string(), "request timeout after 10s");
    }
}
