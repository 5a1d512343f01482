//! Signature soundness and the sign-a-revision flow.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use consentry_attestation::{
    sign_compact, storage::mock::MockSignatureStore, verify, AttestationError, Jwk, JwsHeader,
    SignatureService,
};
use consentry_core::{Actor, Revision, SchemaName, SignatureMaterial, TestClock};
use p256::ecdsa::SigningKey;
use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use rand::rngs::OsRng;

fn proptest_config() -> ProptestConfig {
    ProptestConfig { cases: 32, failure_persistence: None, ..ProptestConfig::default() }
}

fn resign(parts: &[Vec<u8>; 3]) -> String {
    parts.iter().map(|p| URL_SAFE_NO_PAD.encode(p)).collect::<Vec<_>>().join(".")
}

fn decode(token: &str) -> [Vec<u8>; 3] {
    let parts: Vec<Vec<u8>> = token.split('.').map(|p| URL_SAFE_NO_PAD.decode(p).unwrap()).collect();
    [parts[0].clone(), parts[1].clone(), parts[2].clone()]
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn verify_accepts_only_untouched_tokens(
        payload in prop::collection::vec(any::<u8>(), 1..256),
        flip_payload in any::<prop::sample::Index>(),
        flip_signature in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let key = SigningKey::random(&mut OsRng);
        let jwk = Jwk::from_verifying_key(key.verifying_key());
        let token = sign_compact(&key, &JwsHeader::es256(None), &payload).unwrap();

        let verified = verify(&token, &jwk).unwrap();
        prop_assert_eq!(&verified.payload, &payload);

        let mut parts = decode(&token);
        let i = flip_payload.index(parts[1].len());
        parts[1][i] ^= mask;
        prop_assert!(verify(&resign(&parts), &jwk).is_err());

        let mut parts = decode(&token);
        let i = flip_signature.index(parts[2].len());
        parts[2][i] ^= mask;
        prop_assert!(verify(&resign(&parts), &jwk).is_err());

        let stranger = Jwk::from_verifying_key(SigningKey::random(&mut OsRng).verifying_key());
        prop_assert!(matches!(verify(&token, &stranger), Err(AttestationError::VerificationFailed)));
    }
}

#[tokio::test]
async fn revision_signed_by_individual_verifies_against_bound_snapshot() {
    let store = MockSignatureStore::new();
    let service = SignatureService::new(Arc::new(store.clone()), Arc::new(TestClock::new()));

    let mut revision =
        Revision::init("cr-1", &Actor::Individual("ind-1".into()), SchemaName::ConsentRecord);
    revision.create_revision(&serde_json::json!({"optIn": true})).unwrap();

    let blank = service.create_for_revision(&revision).await.unwrap();
    assert_eq!(blank.object_reference, revision.id.to_string());
    assert_eq!(blank.verification_payload_hash, revision.serialized_hash);

    let key = SigningKey::random(&mut OsRng);
    let jwk = Jwk::from_verifying_key(key.verifying_key());
    let header = JwsHeader::es256(Some("ind-1".into()));
    let token = sign_compact(&key, &header, revision.serialized_snapshot.as_bytes()).unwrap();

    let material = SignatureMaterial {
        payload: token.clone(),
        signature: token.rsplit('.').next().unwrap().to_string(),
        verification_method: "jws".to_string(),
        verification_artifact: serde_json::to_string(&jwk).unwrap(),
        verification_signed_by: "ind-1".to_string(),
        verification_signed_as: "individual".to_string(),
        verification_jws_header: serde_json::to_string(&header).unwrap(),
    };
    service.update(blank.id, &material).await.unwrap();

    let verified = service.verify_stored(blank.id, &jwk).await.unwrap();
    assert_eq!(verified.payload_str().unwrap(), revision.serialized_snapshot);

    let other = Jwk::from_verifying_key(SigningKey::random(&mut OsRng).verifying_key());
    assert!(service.verify_stored(blank.id, &other).await.is_err());
}

#[tokio::test]
async fn token_over_other_content_does_not_verify_as_stored() {
    let store = MockSignatureStore::new();
    let service = SignatureService::new(Arc::new(store.clone()), Arc::new(TestClock::new()));
    let key = SigningKey::random(&mut OsRng);
    let jwk = Jwk::from_verifying_key(key.verifying_key());

    let blank = service.create_blank("revision", "r-1", false, "snapshot", "hash").await.unwrap();
    let token = sign_compact(&key, &JwsHeader::es256(None), b"something else").unwrap();
    let material = SignatureMaterial {
        payload: token.clone(),
        signature: "sig".to_string(),
        ..SignatureMaterial::default()
    };
    service.update(blank.id, &material).await.unwrap();

    assert!(service.verify(&token, &jwk).is_ok());
    assert!(matches!(
        service.verify_stored(blank.id, &jwk).await,
        Err(AttestationError::VerificationFailed)
    ));
}
