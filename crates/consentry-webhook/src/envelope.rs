//! Event envelope delivered to subscribers.

use chrono::{DateTime, Utc};
use consentry_core::{
    time::utc_seconds, ConsentRecord, DeliveryId, WebhookEventType, WebhookId,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WebhookError};

/// JSON document POSTed to a webhook.
///
/// Key names are part of the receiver contract, including the upper-case
/// `ID` suffixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Delivery this envelope was sent with.
    #[serde(rename = "deliveryID")]
    pub delivery_id: DeliveryId,
    /// Target webhook.
    #[serde(rename = "webhookID")]
    pub webhook_id: WebhookId,
    /// When the event was raised.
    #[serde(with = "utc_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: WebhookEventType,
    /// Event payload.
    pub data: serde_json::Value,
}

impl WebhookEnvelope {
    /// Creates an envelope with a fresh delivery id.
    pub fn new(
        webhook_id: WebhookId,
        event_type: WebhookEventType,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self { delivery_id: DeliveryId::new(), webhook_id, timestamp, event_type, data }
    }

    /// Decodes a queued envelope.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::InvalidEnvelope` if the text is not an
    /// envelope.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| WebhookError::invalid_envelope(e.to_string()))
    }

    /// Encodes the envelope as the JSON request body.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Payload of `consent.*` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentEventData {
    /// Consent record that changed.
    pub consent_record_id: String,
    /// Data agreement the record belongs to.
    pub data_agreement_id: String,
    /// Data agreement revision the individual consented to.
    pub data_agreement_revision_id: String,
    /// Hash of that revision.
    pub data_agreement_revision_hash: String,
    /// Individual who owns the record.
    pub individual_id: String,
    /// Whether the individual opted in.
    pub opt_in: bool,
    /// Signing state of the record.
    pub state: String,
    /// Signature over the record, or empty.
    pub signature_id: String,
    /// Owning organisation.
    pub organisation_id: String,
}

impl From<&ConsentRecord> for ConsentEventData {
    fn from(record: &ConsentRecord) -> Self {
        Self {
            consent_record_id: record.id.clone(),
            data_agreement_id: record.data_agreement_id.clone(),
            data_agreement_revision_id: record.data_agreement_revision_id.to_string(),
            data_agreement_revision_hash: record.data_agreement_revision_hash.clone(),
            individual_id: record.individual_id.to_string(),
            opt_in: record.opt_in,
            state: record.state.as_str().to_string(),
            signature_id: record.signature_id.map(|id| id.to_string()).unwrap_or_default(),
            organisation_id: record.organisation_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use consentry_core::{ConsentState, IndividualId, OrganisationId, RevisionId, SignatureId};

    use super::*;

    fn record() -> ConsentRecord {
        ConsentRecord {
            id: "cr-9".to_string(),
            data_agreement_id: "da-9".to_string(),
            data_agreement_revision_id: RevisionId::new(),
            data_agreement_revision_hash: "f00d".to_string(),
            individual_id: IndividualId::new(),
            opt_in: true,
            state: ConsentState::Signed,
            signature_id: Some(SignatureId::new()),
            organisation_id: OrganisationId::new(),
        }
    }

    #[test]
    fn envelope_uses_receiver_key_names() {
        let data = serde_json::to_value(ConsentEventData::from(&record())).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 4, 5, 6, 7, 8).unwrap();
        let envelope =
            WebhookEnvelope::new(WebhookId::new(), WebhookEventType::ConsentAllowed, data, ts);

        let json: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(json["deliveryID"], envelope.delivery_id.to_string());
        assert_eq!(json["webhookID"], envelope.webhook_id.to_string());
        assert_eq!(json["timestamp"], "2024-04-05T06:07:08Z");
        assert_eq!(json["type"], "consent.allowed");
        assert_eq!(json["data"]["consentRecordId"], "cr-9");
        assert_eq!(json["data"]["optIn"], true);
        assert_eq!(json["data"]["state"], "signed");
        assert_eq!(json["data"]["dataAgreementRevisionHash"], "f00d");
    }

    #[test]
    fn unsigned_record_has_empty_signature_id() {
        let mut record = record();
        record.signature_id = None;

        assert_eq!(ConsentEventData::from(&record).signature_id, "");
    }

    #[test]
    fn parse_rejects_unknown_event_types() {
        let raw = r#"{"deliveryID":"00000000-0000-0000-0000-000000000000","webhookID":"00000000-0000-0000-0000-000000000000","timestamp":"2024-01-01T00:00:00Z","type":"consent.maybe","data":{}}"#;
        assert!(matches!(WebhookEnvelope::parse(raw), Err(WebhookError::InvalidEnvelope { .. })));
    }
}
