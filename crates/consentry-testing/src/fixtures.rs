//! Test data builders with sensible defaults.

use chrono::Utc;
use consentry_core::{
    ConsentRecord, ConsentState, DataAgreement, DataAttribute, IndividualId, LawfulBasis,
    Lifecycle, OrganisationId, Policy, Revision, RevisionId, Webhook, WebhookContentType,
    WebhookEventType, WebhookId,
};

/// A complete policy.
pub fn policy(id: &str) -> Policy {
    Policy {
        id: id.to_string(),
        name: "Default".to_string(),
        version: "1".to_string(),
        url: "https://example.org/privacy".to_string(),
        jurisdiction: "EU".to_string(),
        industry_sector: "Retail".to_string(),
        data_retention_period_days: 365,
        geographic_restriction: "EEA".to_string(),
        storage_location: "Frankfurt".to_string(),
        third_party_data_sharing: false,
    }
}

/// A published data agreement owned by `organisation_id`.
pub fn data_agreement(id: &str, organisation_id: OrganisationId) -> DataAgreement {
    DataAgreement {
        id: id.to_string(),
        version: "1.0.0".to_string(),
        controller_id: organisation_id.to_string(),
        controller_name: "Example Org".to_string(),
        controller_url: "https://example.org".to_string(),
        policy: policy(&format!("{id}-policy")),
        purpose: "Newsletter".to_string(),
        purpose_description: "Monthly product news".to_string(),
        lawful_basis: LawfulBasis::Consent,
        method_of_use: "null".to_string(),
        dpia_date: "2024-01-01".to_string(),
        dpia_summary_url: String::new(),
        active: true,
        forgettable: false,
        compatible_with_version_id: String::new(),
        lifecycle: Lifecycle::Complete,
        data_attributes: vec![DataAttribute {
            id: format!("{id}-email"),
            name: "email".to_string(),
            description: "Contact address".to_string(),
            sensitivity: false,
            category: "contact".to_string(),
        }],
        organisation_id,
    }
}

/// An unsigned consent record for the data agreement captured in `revision`.
pub fn consent_record(
    id: &str,
    revision: &Revision,
    individual_id: IndividualId,
    organisation_id: OrganisationId,
    opt_in: bool,
) -> ConsentRecord {
    ConsentRecord {
        id: id.to_string(),
        data_agreement_id: revision.object_id.clone(),
        data_agreement_revision_id: revision.id,
        data_agreement_revision_hash: revision.serialized_hash.clone(),
        individual_id,
        opt_in,
        state: ConsentState::Unsigned,
        signature_id: None,
        organisation_id,
    }
}

/// An unsigned consent record not tied to a stored revision.
pub fn detached_consent_record(organisation_id: OrganisationId, opt_in: bool) -> ConsentRecord {
    ConsentRecord {
        id: format!("cr-{}", WebhookId::new()),
        data_agreement_id: "da-detached".to_string(),
        data_agreement_revision_id: RevisionId::new(),
        data_agreement_revision_hash: "0000000000000000000000000000000000000000".to_string(),
        individual_id: IndividualId::new(),
        opt_in,
        state: ConsentState::Unsigned,
        signature_id: None,
        organisation_id,
    }
}

/// Builder for webhook subscriptions.
#[derive(Debug, Clone)]
pub struct WebhookBuilder {
    webhook: Webhook,
}

impl WebhookBuilder {
    /// Starts an enabled JSON webhook with no secret and no subscriptions.
    pub fn new(organisation_id: OrganisationId, payload_url: impl Into<String>) -> Self {
        Self {
            webhook: Webhook {
                id: WebhookId::new(),
                organisation_id,
                payload_url: payload_url.into(),
                content_type: WebhookContentType::Json,
                subscribed_events: Vec::new(),
                disabled: false,
                secret_key: String::new(),
                skip_ssl_verification: false,
                timestamp: Utc::now(),
                is_deleted: false,
            },
        }
    }

    /// Subscribes to the given event types.
    #[must_use]
    pub fn events(mut self, events: impl IntoIterator<Item = WebhookEventType>) -> Self {
        self.webhook.subscribed_events.extend(events);
        self
    }

    /// Sets the HMAC secret.
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook.secret_key = secret.into();
        self
    }

    /// Sends form-encoded bodies.
    #[must_use]
    pub fn form(mut self) -> Self {
        self.webhook.content_type = WebhookContentType::Form;
        self
    }

    /// Disables the webhook.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.webhook.disabled = true;
        self
    }

    /// Builds the webhook.
    pub fn build(self) -> Webhook {
        self.webhook
    }
}
