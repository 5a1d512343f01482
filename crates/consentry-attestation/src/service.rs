//! Signature service.
//!
//! A signature starts as a blank placeholder bound to a revision snapshot
//! and its hash. The signer later fills in the cryptographic material
//! exactly once. Verification is stateless and works on a compact JWS and
//! the signer's public JWK.

use std::sync::Arc;

use consentry_core::{
    models::revision::sha1_hex, Clock, Revision, Signature, SignatureId, SignatureMaterial,
};
use tracing::{debug, info, warn};

use crate::{
    error::{AttestationError, Result},
    jwk::Jwk,
    jws::{self, VerifiedJws},
    storage::SignatureStore,
};

/// Object type recorded for signatures over revisions.
pub const REVISION_OBJECT_TYPE: &str = "revision";

/// Creates, completes and verifies signatures.
#[derive(Clone)]
pub struct SignatureService {
    store: Arc<dyn SignatureStore>,
    clock: Arc<dyn Clock>,
}

impl SignatureService {
    /// Creates a signature service over the given store.
    pub fn new(store: Arc<dyn SignatureStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates and stores an unsigned placeholder bound to a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::Storage` if the signature cannot be stored.
    pub async fn create_blank(
        &self,
        object_type: &str,
        object_reference: &str,
        signed_without_object_reference: bool,
        snapshot: &str,
        hash: &str,
    ) -> Result<Signature> {
        let signature =
            blank(object_type, object_reference, signed_without_object_reference, snapshot, hash);
        self.store.insert(signature.clone()).await?;

        debug!(
            signature_id = %signature.id,
            object_type,
            object_reference,
            "blank signature created"
        );
        Ok(signature)
    }

    /// Creates a blank signature for a stored revision.
    ///
    /// # Errors
    ///
    /// See [`SignatureService::create_blank`].
    pub async fn create_for_revision(&self, revision: &Revision) -> Result<Signature> {
        self.create_blank(
            REVISION_OBJECT_TYPE,
            &revision.id.to_string(),
            revision.signed_without_object_id,
            &revision.serialized_snapshot,
            &revision.serialized_hash,
        )
        .await
    }

    /// Creates a signature bound to a snapshot, optionally with material
    /// collected up front.
    ///
    /// With `supplied` set the signature is stored already signed, as for
    /// consent collected offline. Without it the result is a blank
    /// placeholder. The snapshot hash is computed here.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::InvalidMaterial` if supplied material has
    /// no signature value, or `AttestationError::Storage` on store failure.
    pub async fn create_for_object(
        &self,
        object_type: &str,
        object_reference: &str,
        signed_without_object_reference: bool,
        snapshot: &str,
        supplied: Option<&SignatureMaterial>,
    ) -> Result<Signature> {
        let hash = sha1_hex(snapshot.as_bytes());
        let mut signature =
            blank(object_type, object_reference, signed_without_object_reference, snapshot, &hash);

        if let Some(material) = supplied {
            validate_material(material)?;
            material.apply_to(&mut signature, self.clock.now_utc());
        }

        self.store.insert(signature.clone()).await?;

        info!(
            signature_id = %signature.id,
            object_type,
            object_reference,
            signed = signature.is_signed(),
            "signature created for object"
        );
        Ok(signature)
    }

    /// Fills in the final signature fields.
    ///
    /// The bound payload and hash never change. A signature can be filled
    /// only once.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::NotFound` if the signature does not exist,
    /// `AttestationError::AlreadySigned` if it was filled before, or
    /// `AttestationError::InvalidMaterial` if the material has no signature.
    pub async fn update(&self, id: SignatureId, material: &SignatureMaterial) -> Result<Signature> {
        validate_material(material)?;

        let mut signature = self.get(id).await?;
        if signature.is_signed() {
            return Err(AttestationError::AlreadySigned { id });
        }

        material.apply_to(&mut signature, self.clock.now_utc());

        if !self.store.complete(signature.clone()).await? {
            warn!(signature_id = %id, "signature was completed concurrently");
            return Err(AttestationError::AlreadySigned { id });
        }

        info!(
            signature_id = %id,
            object_type = %signature.object_type,
            object_reference = %signature.object_reference,
            "signature completed"
        );
        Ok(signature)
    }

    /// Returns a signature by id.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::NotFound` if no signature has this id.
    pub async fn get(&self, id: SignatureId) -> Result<Signature> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AttestationError::NotFound(format!("signature {id}")))
    }

    /// Verifies a compact JWS against a public JWK and returns its payload.
    ///
    /// # Errors
    ///
    /// Fails closed: any key, token, algorithm or signature problem is an
    /// error, never a silent pass.
    pub fn verify(&self, compact_jws: &str, jwk: &Jwk) -> Result<VerifiedJws> {
        verify(compact_jws, jwk)
    }

    /// Verifies a stored signature's JWS and checks it covers the bound
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError::VerificationFailed` if the signature is
    /// unsigned or its payload differs from the bound snapshot, plus any
    /// error of [`SignatureService::verify`].
    pub async fn verify_stored(&self, id: SignatureId, jwk: &Jwk) -> Result<VerifiedJws> {
        let signature = self.get(id).await?;
        if !signature.is_signed() {
            return Err(AttestationError::VerificationFailed);
        }

        let verified = verify(&signature.payload, jwk)?;
        if verified.payload != signature.verification_payload.as_bytes() {
            warn!(signature_id = %id, "signed payload does not match bound snapshot");
            return Err(AttestationError::VerificationFailed);
        }

        Ok(verified)
    }
}

/// Verifies a compact JWS against a public JWK and returns its payload.
///
/// # Errors
///
/// See [`SignatureService::verify`].
pub fn verify(compact_jws: &str, jwk: &Jwk) -> Result<VerifiedJws> {
    let key = jwk.to_verifying_key()?;
    jws::verify_compact(compact_jws, &key)
}

fn blank(
    object_type: &str,
    object_reference: &str,
    signed_without_object_reference: bool,
    snapshot: &str,
    hash: &str,
) -> Signature {
    Signature {
        id: SignatureId::new(),
        payload: String::new(),
        signature: String::new(),
        verification_method: String::new(),
        verification_payload: snapshot.to_string(),
        verification_payload_hash: hash.to_string(),
        verification_artifact: String::new(),
        verification_signed_by: String::new(),
        verification_signed_as: String::new(),
        verification_jws_header: String::new(),
        timestamp: None,
        signed_without_object_reference,
        object_type: object_type.to_string(),
        object_reference: object_reference.to_string(),
    }
}

fn validate_material(material: &SignatureMaterial) -> Result<()> {
    if material.signature.is_empty() {
        return Err(AttestationError::invalid_material("signature value is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use consentry_core::{CoreError, TestClock};

    use super::*;
    use crate::storage::mock::MockSignatureStore;

    fn service(store: &MockSignatureStore) -> SignatureService {
        SignatureService::new(Arc::new(store.clone()), Arc::new(TestClock::new()))
    }

    fn material() -> SignatureMaterial {
        SignatureMaterial {
            payload: "h.p.s".to_string(),
            signature: "s".to_string(),
            verification_method: "jws".to_string(),
            verification_signed_by: "individual-1".to_string(),
            verification_signed_as: "individual".to_string(),
            ..SignatureMaterial::default()
        }
    }

    #[tokio::test]
    async fn blank_signature_is_bound_to_snapshot() {
        let store = MockSignatureStore::new();
        let svc = service(&store);

        let sig = svc.create_blank("revision", "rev-1", false, "{\"a\":1}", "abc").await.unwrap();

        assert!(!sig.is_signed());
        assert!(sig.timestamp.is_none());
        assert_eq!(sig.verification_payload, "{\"a\":1}");
        assert_eq!(sig.verification_payload_hash, "abc");
        assert_eq!(svc.get(sig.id).await.unwrap(), sig);
    }

    #[tokio::test]
    async fn update_fills_once() {
        let store = MockSignatureStore::new();
        let svc = service(&store);
        let sig = svc.create_blank("revision", "rev-1", false, "snap", "hash").await.unwrap();

        let signed = svc.update(sig.id, &material()).await.unwrap();
        assert!(signed.is_signed());
        assert!(signed.timestamp.is_some());
        assert_eq!(signed.verification_payload, "snap");

        let err = svc.update(sig.id, &material()).await.unwrap_err();
        assert!(matches!(err, AttestationError::AlreadySigned { .. }));
        assert_eq!(svc.get(sig.id).await.unwrap(), signed);
    }

    #[tokio::test]
    async fn update_of_missing_signature_is_not_found() {
        let store = MockSignatureStore::new();
        let err = service(&store).update(SignatureId::new(), &material()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn empty_material_is_rejected() {
        let store = MockSignatureStore::new();
        let svc = service(&store);
        let sig = svc.create_blank("revision", "rev-1", false, "snap", "hash").await.unwrap();

        let err = svc.update(sig.id, &SignatureMaterial::default()).await.unwrap_err();
        assert!(matches!(err, AttestationError::InvalidMaterial { .. }));
        assert!(!svc.get(sig.id).await.unwrap().is_signed());
    }

    #[tokio::test]
    async fn supplied_material_is_bound_at_creation() {
        let store = MockSignatureStore::new();
        let svc = service(&store);

        let sig = svc
            .create_for_object("consentRecord", "cr-1", true, "snap", Some(&material()))
            .await
            .unwrap();

        assert!(sig.is_signed());
        assert!(sig.signed_without_object_reference);
        assert_eq!(sig.verification_payload_hash, sha1_hex(b"snap"));

        let unsigned = svc.create_for_object("consentRecord", "cr-2", false, "snap", None).await.unwrap();
        assert!(!unsigned.is_signed());
    }

    #[tokio::test]
    async fn storage_failures_are_server_errors() {
        let store = MockSignatureStore::new();
        store.inject_error(CoreError::Database("down".into())).await;

        let err = service(&store).create_blank("revision", "r", false, "s", "h").await.unwrap_err();
        assert!(matches!(err, AttestationError::Storage(_)));
        assert!(!err.is_client_error());
    }
}
