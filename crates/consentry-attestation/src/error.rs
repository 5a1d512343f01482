//! Error types for signature operations.
//!
//! Key, token and verification problems are client errors: the caller sent
//! something unusable. Storage and serialization failures are server
//! errors. A missing signature is neither and is reported as `NotFound`.

use consentry_core::{CoreError, SignatureId};
use thiserror::Error;

/// Result type alias for attestation operations.
pub type Result<T> = std::result::Result<T, AttestationError>;

/// Errors raised by the JWK/JWS primitives and the signature service.
#[derive(Debug, Error)]
pub enum AttestationError {
    /// The JWK could not be turned into a P-256 public key.
    #[error("invalid key: {message}")]
    InvalidKey {
        /// What was wrong with the key.
        message: String,
    },

    /// The compact JWS is not well formed.
    #[error("malformed jws: {message}")]
    MalformedJws {
        /// What was wrong with the token.
        message: String,
    },

    /// The JWS header names an algorithm other than ES256.
    #[error("unsupported jws algorithm: {alg}")]
    UnsupportedAlgorithm {
        /// Algorithm named in the header.
        alg: String,
    },

    /// The signature does not match the signing input and key.
    #[error("signature verification failed")]
    VerificationFailed,

    /// Supplied signature material is unusable.
    #[error("invalid signature material: {message}")]
    InvalidMaterial {
        /// What was wrong with the material.
        message: String,
    },

    /// The signature has already been filled in.
    #[error("signature {id} is already signed")]
    AlreadySigned {
        /// Signature that was updated twice.
        id: SignatureId,
    },

    /// No signature matched the query.
    #[error("signature not found: {0}")]
    NotFound(String),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AttestationError {
    /// Create an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey { message: message.into() }
    }

    /// Create a malformed JWS error.
    pub fn malformed_jws(message: impl Into<String>) -> Self {
        Self::MalformedJws { message: message.into() }
    }

    /// Create an invalid material error.
    pub fn invalid_material(message: impl Into<String>) -> Self {
        Self::InvalidMaterial { message: message.into() }
    }

    /// Check if this error was caused by the caller's input.
    ///
    /// `NotFound` is reported separately through [`Self::is_not_found`].
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidKey { .. }
            | Self::MalformedJws { .. }
            | Self::UnsupportedAlgorithm { .. }
            | Self::VerificationFailed
            | Self::InvalidMaterial { .. }
            | Self::AlreadySigned { .. } => true,

            Self::NotFound(_) | Self::Storage(_) | Self::Serialization(_) => false,
        }
    }

    /// Returns true if the error means nothing matched the query.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<CoreError> for AttestationError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => Self::NotFound(msg),
            CoreError::Serialization(msg) => Self::Serialization(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AttestationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
