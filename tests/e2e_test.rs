//! End-to-end consent workflow across the revision chain, signature service
//! and webhook dispatcher.

use anyhow::Result;
use consentry_attestation::{sign_compact, Jwk, JwsHeader};
use consentry_core::{
    Actor, ConsentRecord, DataAgreement, DeliveryStatus, SchemaName, SignatureMaterial,
    WebhookEventType,
};
use consentry_testing::{fixtures, MockServer, TestEnv, WebhookBuilder};
use consentry_webhook::{WebhookEnvelope, DEFAULT_SIGNATURE_HEADER};
use hmac::{Hmac, Mac};
use p256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use sha2::Sha256;

fn expected_hmac(secret: &str, header: &str, body: &str) -> Result<bool> {
    let (ts_part, sig_part) =
        header.split_once(',').ok_or_else(|| anyhow::anyhow!("malformed header {header}"))?;
    let ts = ts_part.trim_start_matches("t=");
    let sig = sig_part.trim_start_matches("sig=");

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid hmac key: {e}"))?;
    mac.update(format!("{ts}.{body}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()) == sig)
}

/// Opting in to a data agreement fires one signed `consent.allowed` POST
/// and leaves one successful delivery record.
#[tokio::test]
async fn opt_in_notifies_subscribed_webhook() -> Result<()> {
    let env = TestEnv::new()?;
    let server = MockServer::start().await;
    server.respond("/hooks/consent", 200).await;

    let org = env
        .create_organisation([WebhookEventType::ConsentAllowed, WebhookEventType::ConsentDisallowed])
        .await;
    let individual = env.create_individual("Alice").await;

    let webhook = env
        .add_webhook(
            WebhookBuilder::new(org, server.endpoint("/hooks/consent"))
                .events([WebhookEventType::ConsentAllowed, WebhookEventType::ConsentDisallowed])
                .secret("s3cr3t")
                .build(),
        )
        .await;

    let admin = Actor::Other("admin-1".to_string());
    let agreement = fixtures::data_agreement("da-1", org);
    let agreement_revision = env.chain.record(&agreement, &admin).await?;

    let record = fixtures::consent_record("cr-1", &agreement_revision, individual, org, true);
    env.chain.record(&record, &Actor::Individual(individual.to_string())).await?;

    let jobs = env
        .dispatcher
        .trigger_consent_event(&record, org, WebhookEventType::for_opt_in(record.opt_in))
        .await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(env.drain_queue().await?, 1);

    let requests = server.received_requests().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let envelope = WebhookEnvelope::parse(&request.body)?;
    assert_eq!(envelope.event_type, WebhookEventType::ConsentAllowed);
    assert_eq!(envelope.webhook_id, webhook.id);
    assert_eq!(envelope.data["consentRecordId"], "cr-1");
    assert_eq!(envelope.data["dataAgreementRevisionHash"], agreement_revision.serialized_hash.as_str());

    let header = request
        .header(&DEFAULT_SIGNATURE_HEADER.to_lowercase())
        .ok_or_else(|| anyhow::anyhow!("signature header missing"))?;
    assert!(expected_hmac("s3cr3t", header, &request.body)?);
    assert!(!expected_hmac("wrong", header, &request.body)?);

    let deliveries = env.webhooks.deliveries().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].id, envelope.delivery_id);
    assert_eq!(deliveries[0].status, DeliveryStatus::Completed);
    assert_eq!(deliveries[0].response_status_code, Some(200));
    assert!(deliveries[0].is_successful());
    Ok(())
}

/// A signed consent record keeps a verifiable chain and an attestation
/// bound to the exact snapshot that was signed.
#[tokio::test]
async fn signed_consent_record_is_attested_and_chained() -> Result<()> {
    let env = TestEnv::new()?;
    let org = env.create_organisation([]).await;
    let individual = env.create_individual("Bob").await;
    let actor = Actor::Individual(individual.to_string());

    let agreement_revision =
        env.chain.record(&fixtures::data_agreement("da-2", org), &Actor::Other("admin".into())).await?;
    let mut record = fixtures::consent_record("cr-2", &agreement_revision, individual, org, false);
    let unsigned = env.chain.record(&record, &actor).await?;

    let blank = env.signatures.create_for_revision(&unsigned).await?;

    let key = SigningKey::random(&mut OsRng);
    let jwk = Jwk::from_verifying_key(key.verifying_key());
    let header = JwsHeader::es256(Some(individual.to_string()));
    let token = sign_compact(&key, &header, unsigned.serialized_snapshot.as_bytes())?;
    let material = SignatureMaterial {
        payload: token.clone(),
        signature: token.rsplit('.').next().unwrap_or_default().to_string(),
        verification_method: "jws".to_string(),
        verification_artifact: serde_json::to_string(&jwk)?,
        verification_signed_by: individual.to_string(),
        verification_signed_as: "individual".to_string(),
        verification_jws_header: serde_json::to_string(&header)?,
    };
    let signed = env.signatures.update(blank.id, &material).await?;
    assert!(signed.is_signed());

    record.mark_signed(signed.id);
    let latest = env.chain.record(&record, &actor).await?;

    let chain = env.chain.verify("cr-2", SchemaName::ConsentRecord).await?;
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].successor_id, Some(latest.id));
    assert_eq!(latest.predecessor_hash, unsigned.serialized_hash);

    let verified = env.signatures.verify_stored(signed.id, &jwk).await?;
    assert_eq!(verified.payload_str()?, unsigned.serialized_snapshot);

    let restored: ConsentRecord = env.chain.recreate(latest.id).await?;
    assert_eq!(restored, record);
    let agreement: DataAgreement = env.chain.recreate(agreement_revision.id).await?;
    assert_eq!(agreement.id, "da-2");
    Ok(())
}

/// Events the organisation has not enabled never reach webhooks.
#[tokio::test]
async fn disabled_event_type_sends_nothing() -> Result<()> {
    let env = TestEnv::new()?;
    let server = MockServer::start().await;
    server.respond("/hook", 200).await;

    let org = env.create_organisation([WebhookEventType::ConsentAllowed]).await;
    env.add_webhook(
        WebhookBuilder::new(org, server.endpoint("/hook"))
            .events([WebhookEventType::ConsentDisallowed])
            .build(),
    )
    .await;

    let record = fixtures::detached_consent_record(org, false);
    let jobs = env
        .dispatcher
        .trigger_consent_event(&record, org, WebhookEventType::ConsentDisallowed)
        .await?;

    assert!(jobs.is_empty());
    assert_eq!(env.drain_queue().await?, 0);
    server.assert_request_count(0).await;
    assert!(env.webhooks.deliveries().await.is_empty());
    Ok(())
}
