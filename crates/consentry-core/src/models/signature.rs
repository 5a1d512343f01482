//! Signature attestation model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::SignatureId;

/// An attestation over a revision snapshot or consent artifact.
///
/// Created blank and bound to a snapshot and its hash. The cryptographic
/// fields are filled in exactly once afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// Signature identifier.
    pub id: SignatureId,
    /// Signed payload, usually a compact JWS.
    pub payload: String,
    /// Raw signature value.
    pub signature: String,
    /// How the signature is to be verified, e.g. `jws`.
    pub verification_method: String,
    /// Content that was hashed for signing.
    pub verification_payload: String,
    /// Hash of `verification_payload`.
    pub verification_payload_hash: String,
    /// Supporting artifact such as a certificate or public key.
    pub verification_artifact: String,
    /// Identity that produced the signature.
    pub verification_signed_by: String,
    /// Role under which the signature was produced.
    pub verification_signed_as: String,
    /// Protected JWS header, when a JWS was used.
    pub verification_jws_header: String,
    /// When the signature was applied. Empty while unsigned.
    pub timestamp: Option<DateTime<Utc>>,
    /// Whether the object reference is excluded from what was signed.
    pub signed_without_object_reference: bool,
    /// Kind of object being attested, e.g. `revision`.
    pub object_type: String,
    /// Identifier of the attested object.
    pub object_reference: String,
}

impl Signature {
    /// Returns true once the signature material has been filled in.
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }
}

/// Final signature fields supplied by the signer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureMaterial {
    /// Signed payload, usually a compact JWS.
    pub payload: String,
    /// Raw signature value. Must not be empty.
    pub signature: String,
    /// How the signature is to be verified.
    pub verification_method: String,
    /// Supporting artifact such as a certificate or public key.
    pub verification_artifact: String,
    /// Identity that produced the signature.
    pub verification_signed_by: String,
    /// Role under which the signature was produced.
    pub verification_signed_as: String,
    /// Protected JWS header.
    pub verification_jws_header: String,
}

impl SignatureMaterial {
    /// Copies the material onto a signature and stamps the time.
    pub fn apply_to(&self, signature: &mut Signature, signed_at: DateTime<Utc>) {
        signature.payload = self.payload.clone();
        signature.signature = self.signature.clone();
        signature.verification_method = self.verification_method.clone();
        signature.verification_artifact = self.verification_artifact.clone();
        signature.verification_signed_by = self.verification_signed_by.clone();
        signature.verification_signed_as = self.verification_signed_as.clone();
        signature.verification_jws_header = self.verification_jws_header.clone();
        signature.timestamp = Some(signed_at);
    }
}
