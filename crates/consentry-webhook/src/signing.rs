//! HMAC-SHA256 signatures for outbound webhook bodies.
//!
//! The signed message is `<unix timestamp> "." <json body>` and the header
//! value is `t=<unix timestamp>,sig=<lowercase hex>`. Receivers recompute
//! the HMAC with their copy of the secret to authenticate a delivery.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, WebhookError};

type HmacSha256 = Hmac<Sha256>;

/// Default name of the signature header.
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Consentry-Signature";

/// Computes the hex HMAC-SHA256 of `timestamp.body`.
///
/// # Errors
///
/// Returns `WebhookError::Configuration` if the secret is unusable as a key.
pub fn sign(secret: &str, timestamp: i64, body: &str) -> Result<String> {
    Ok(hex::encode(mac(secret, timestamp, body)?.finalize().into_bytes()))
}

/// Builds the signature header value for a body.
///
/// # Errors
///
/// See [`sign`].
pub fn signature_header(secret: &str, timestamp: i64, body: &str) -> Result<String> {
    Ok(format!("t={timestamp},sig={}", sign(secret, timestamp, body)?))
}

/// Parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp the body was signed at.
    pub timestamp: i64,
    /// Hex HMAC.
    pub signature: String,
}

impl SignatureHeader {
    /// Parses `t=<unix>,sig=<hex>`.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::SignatureRejected` if either part is missing
    /// or malformed.
    pub fn parse(value: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut signature = None;

        for part in value.split(',') {
            match part.trim().split_once('=') {
                Some(("t", ts)) => {
                    timestamp = Some(ts.parse::<i64>().map_err(|_| {
                        WebhookError::signature_rejected(format!("bad timestamp {ts:?}"))
                    })?);
                },
                Some(("sig", sig)) => signature = Some(sig.to_string()),
                _ => {},
            }
        }

        match (timestamp, signature) {
            (Some(timestamp), Some(signature)) => Ok(Self { timestamp, signature }),
            _ => Err(WebhookError::signature_rejected("expected t=<unix>,sig=<hex>")),
        }
    }
}

/// Verifies a signature header against a received body.
///
/// The comparison is constant time.
///
/// # Errors
///
/// Returns `WebhookError::SignatureRejected` if the header is malformed or
/// the HMAC does not match.
pub fn verify_signature_header(header: &str, body: &str, secret: &str) -> Result<SignatureHeader> {
    let parsed = SignatureHeader::parse(header)?;
    let expected = hex::decode(&parsed.signature)
        .map_err(|_| WebhookError::signature_rejected("signature is not hex"))?;

    mac(secret, parsed.timestamp, body)?
        .verify_slice(&expected)
        .map_err(|_| WebhookError::signature_rejected("signature mismatch"))?;

    Ok(parsed)
}

fn mac(secret: &str, timestamp: i64, body: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::configuration(format!("invalid hmac key: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    Ok(mac)
}
