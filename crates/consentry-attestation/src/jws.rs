//! Compact JWS signing and verification with ES256.
//!
//! A compact JWS is `base64url(header) "." base64url(payload) "."
//! base64url(signature)`. The signature is ECDSA P-256 over SHA-256 of the
//! ASCII signing input `header.payload`, encoded as the 64-byte `r || s`
//! concatenation.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use serde::{Deserialize, Serialize};

use crate::error::{AttestationError, Result};

/// The only algorithm accepted.
pub const ALGORITHM: &str = "ES256";

const SIGNATURE_LEN: usize = 64;

/// Protected JWS header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    /// Signature algorithm.
    pub alg: String,
    /// Media type of the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Key identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl JwsHeader {
    /// ES256 header with an optional key id.
    pub fn es256(kid: Option<String>) -> Self {
        Self { alg: ALGORITHM.to_string(), typ: Some("JWT".to_string()), kid }
    }
}

/// A JWS whose signature has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedJws {
    /// Decoded protected header.
    pub header: JwsHeader,
    /// Decoded payload bytes.
    pub payload: Vec<u8>,
}

impl VerifiedJws {
    /// Payload as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::MalformedJws` if the payload is not UTF-8.
    pub fn payload_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|_| AttestationError::malformed_jws("payload is not utf-8"))
    }
}

/// Signs `payload` and returns the compact serialization.
///
/// # Errors
///
/// Returns `AttestationError::Serialization` if the header cannot be
/// encoded.
pub fn sign_compact(key: &SigningKey, header: &JwsHeader, payload: &[u8]) -> Result<String> {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header)?);
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
    let signing_input = format!("{header_b64}.{payload_b64}");

    let signature: Signature = key.sign(signing_input.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Verifies a compact JWS against a public key.
///
/// # Errors
///
/// Returns `MalformedJws` if the token does not have three valid segments,
/// `UnsupportedAlgorithm` if the header is not ES256, and
/// `VerificationFailed` if the signature does not verify.
pub fn verify_compact(token: &str, key: &VerifyingKey) -> Result<VerifiedJws> {
    let mut segments = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(AttestationError::malformed_jws("expected three segments"));
    };

    let header_bytes = decode_segment("header", header_b64)?;
    let header: JwsHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| AttestationError::malformed_jws(format!("header: {e}")))?;
    if header.alg != ALGORITHM {
        return Err(AttestationError::UnsupportedAlgorithm { alg: header.alg });
    }

    let payload = decode_segment("payload", payload_b64)?;
    let signature_bytes = decode_segment("signature", signature_b64)?;
    if signature_bytes.len() != SIGNATURE_LEN {
        return Err(AttestationError::malformed_jws(format!(
            "signature is {} bytes, expected {SIGNATURE_LEN}",
            signature_bytes.len()
        )));
    }
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| AttestationError::VerificationFailed)?;

    let signing_input_len = header_b64.len() + 1 + payload_b64.len();
    let signing_input = &token.as_bytes()[..signing_input_len];
    key.verify(signing_input, &signature).map_err(|_| AttestationError::VerificationFailed)?;

    Ok(VerifiedJws { header, payload })
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AttestationError::malformed_jws(format!("{name}: {e}")))
}
