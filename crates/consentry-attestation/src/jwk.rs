//! JSON Web Keys for EC P-256 public keys.
//!
//! Only `kty = "EC"` with `crv = "P-256"` is accepted. Coordinates are
//! unpadded base64url and must be exactly 32 bytes each. Anything else is
//! rejected with `InvalidKey`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use p256::{ecdsa::VerifyingKey, EncodedPoint, FieldBytes};
use serde::{Deserialize, Serialize};

use crate::error::{AttestationError, Result};

const KEY_TYPE: &str = "EC";
const CURVE: &str = "P-256";
const COORDINATE_LEN: usize = 32;

/// Public key in JWK form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type. Always `EC`.
    pub kty: String,
    /// Curve name. Always `P-256`.
    pub crv: String,
    /// Base64url x coordinate.
    pub x: String,
    /// Base64url y coordinate.
    pub y: String,
}

impl Jwk {
    /// Parses a JWK from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::InvalidKey` if the text is not a JWK.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| AttestationError::invalid_key(e.to_string()))
    }

    /// Encodes a P-256 verifying key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let encode = |coordinate: Option<&FieldBytes>| {
            coordinate.map(|bytes| URL_SAFE_NO_PAD.encode(bytes)).unwrap_or_default()
        };

        Self {
            kty: KEY_TYPE.to_string(),
            crv: CURVE.to_string(),
            x: encode(point.x()),
            y: encode(point.y()),
        }
    }

    /// Decodes the JWK into a P-256 verifying key.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::InvalidKey` for a wrong key type or curve,
    /// bad coordinate encoding or length, or a point not on the curve.
    pub fn to_verifying_key(&self) -> Result<VerifyingKey> {
        if self.kty != KEY_TYPE {
            return Err(AttestationError::invalid_key(format!("unsupported key type {:?}", self.kty)));
        }
        if self.crv != CURVE {
            return Err(AttestationError::invalid_key(format!("unsupported curve {:?}", self.crv)));
        }

        let x = decode_coordinate("x", &self.x)?;
        let y = decode_coordinate("y", &self.y)?;
        let point = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&x),
            FieldBytes::from_slice(&y),
            false,
        );

        VerifyingKey::from_encoded_point(&point)
            .map_err(|_| AttestationError::invalid_key("point is not on the P-256 curve"))
    }
}

fn decode_coordinate(name: &str, encoded: &str) -> Result<Vec<u8>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| AttestationError::invalid_key(format!("coordinate {name}: {e}")))?;

    if bytes.len() != COORDINATE_LEN {
        return Err(AttestationError::invalid_key(format!(
            "coordinate {name} is {} bytes, expected {COORDINATE_LEN}",
            bytes.len()
        )));
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    use super::*;

    fn sample() -> (VerifyingKey, Jwk) {
        let key = *SigningKey::random(&mut OsRng).verifying_key();
        (key, Jwk::from_verifying_key(&key))
    }

    #[test]
    fn encodes_and_decodes_public_key() {
        let (key, jwk) = sample();

        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv, "P-256");
        assert!(!jwk.x.contains('='));
        assert_eq!(jwk.to_verifying_key().unwrap(), key);
    }

    #[test]
    fn parses_json_with_extra_members() {
        let (key, jwk) = sample();
        let json = format!(
            r#"{{"kty":"EC","crv":"P-256","x":"{}","y":"{}","kid":"k1","use":"sig"}}"#,
            jwk.x, jwk.y
        );

        assert_eq!(Jwk::parse(&json).unwrap().to_verifying_key().unwrap(), key);
    }

    #[test]
    fn rejects_other_curves() {
        let (_, mut jwk) = sample();
        jwk.crv = "P-384".to_string();

        assert!(matches!(jwk.to_verifying_key(), Err(AttestationError::InvalidKey { .. })));
    }

    #[test]
    fn rejects_non_ec_keys() {
        let (_, mut jwk) = sample();
        jwk.kty = "RSA".to_string();

        assert!(matches!(jwk.to_verifying_key(), Err(AttestationError::InvalidKey { .. })));
    }

    #[test]
    fn rejects_short_coordinates() {
        let (_, mut jwk) = sample();
        jwk.x = URL_SAFE_NO_PAD.encode([1u8; 31]);

        assert!(matches!(jwk.to_verifying_key(), Err(AttestationError::InvalidKey { .. })));
    }

    #[test]
    fn rejects_points_off_the_curve() {
        let (_, mut jwk) = sample();
        jwk.y = URL_SAFE_NO_PAD.encode([7u8; 32]);

        assert!(matches!(jwk.to_verifying_key(), Err(AttestationError::InvalidKey { .. })));
    }

    #[test]
    fn rejects_garbage_json() {
        assert!(matches!(Jwk::parse("not json"), Err(AttestationError::InvalidKey { .. })));
        assert!(matches!(Jwk::parse(r#"{"kty":"EC"}"#), Err(AttestationError::InvalidKey { .. })));
    }
}
