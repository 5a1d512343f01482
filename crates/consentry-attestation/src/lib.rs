//! Signed attestations over revision snapshots.
//!
//! [`jwk`] and [`jws`] implement the EC P-256 key format and ES256 compact
//! JWS. [`SignatureService`] binds signatures to revision snapshots, fills
//! them in exactly once and verifies them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod jwk;
pub mod jws;
pub mod service;
pub mod storage;

pub use error::{AttestationError, Result};
pub use jwk::Jwk;
pub use jws::{sign_compact, verify_compact, JwsHeader, VerifiedJws};
pub use service::{verify, SignatureService, REVISION_OBJECT_TYPE};
pub use storage::{PostgresSignatureStore, SignatureStore};
