//! Versioned domain entities.
//!
//! These are the payloads captured in revision snapshots. Their JSON
//! encoding is part of the hash input, so field names are fixed in
//! camelCase and every field round-trips exactly.

use serde::{Deserialize, Serialize};

use super::ids::{IndividualId, OrganisationId, RevisionId, SignatureId};

/// Governing policy of a data agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Policy identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Policy version label.
    pub version: String,
    /// Where the full policy text is published.
    pub url: String,
    /// Legal jurisdiction the policy falls under.
    pub jurisdiction: String,
    /// Industry sector of the controller.
    pub industry_sector: String,
    /// Retention period in days.
    pub data_retention_period_days: u32,
    /// Region processing is restricted to.
    pub geographic_restriction: String,
    /// Where the data is stored.
    pub storage_location: String,
    /// Whether data is shared with third parties.
    pub third_party_data_sharing: bool,
}

/// One personal data attribute covered by a data agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataAttribute {
    /// Attribute identifier.
    pub id: String,
    /// Attribute name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Whether the attribute is sensitive data.
    pub sensitivity: bool,
    /// Attribute category.
    pub category: String,
}

/// Lawful basis for processing under a data agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LawfulBasis {
    /// Freely given consent of the individual.
    Consent,
    /// Performance of a contract.
    Contract,
    /// Compliance with a legal obligation.
    LegalObligation,
    /// Protection of vital interests.
    VitalInterest,
    /// Task carried out in the public interest.
    PublicTask,
    /// Legitimate interest of the controller.
    LegitimateInterest,
}

/// Publication state of a data agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Being edited, not yet published.
    Draft,
    /// Published and available to individuals.
    Complete,
}

/// Agreement between an organisation and individuals on how data is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataAgreement {
    /// Agreement identifier.
    pub id: String,
    /// Agreement version label.
    pub version: String,
    /// Data controller identifier.
    pub controller_id: String,
    /// Data controller display name.
    pub controller_name: String,
    /// Data controller homepage.
    pub controller_url: String,
    /// Policy governing the agreement.
    pub policy: Policy,
    /// Short purpose statement.
    pub purpose: String,
    /// Long purpose description.
    pub purpose_description: String,
    /// Lawful basis of processing.
    pub lawful_basis: LawfulBasis,
    /// How the data is used.
    pub method_of_use: String,
    /// Date of the data protection impact assessment.
    pub dpia_date: String,
    /// Link to the DPIA summary.
    pub dpia_summary_url: String,
    /// Whether individuals can currently consent to it.
    pub active: bool,
    /// Whether the agreement may be forgotten on request.
    pub forgettable: bool,
    /// Earlier version this one stays compatible with.
    pub compatible_with_version_id: String,
    /// Publication state.
    pub lifecycle: Lifecycle,
    /// Data attributes covered by the agreement.
    pub data_attributes: Vec<DataAttribute>,
    /// Owning organisation.
    pub organisation_id: OrganisationId,
}

/// Signing state of a consent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentState {
    /// No signature has been attached yet.
    Unsigned,
    /// The bound signature has been filled in.
    Signed,
}

impl ConsentState {
    /// Wire representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unsigned => "unsigned",
            Self::Signed => "signed",
        }
    }
}

/// An individual's opt-in or opt-out for one data agreement revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRecord {
    /// Record identifier.
    pub id: String,
    /// Agreement the consent refers to.
    pub data_agreement_id: String,
    /// Revision of the agreement that was shown.
    pub data_agreement_revision_id: RevisionId,
    /// Hash of that revision's snapshot.
    pub data_agreement_revision_hash: String,
    /// Individual giving or withdrawing consent.
    pub individual_id: IndividualId,
    /// True for opt-in, false for opt-out.
    pub opt_in: bool,
    /// Signing state.
    pub state: ConsentState,
    /// Signature bound to the record, once created.
    pub signature_id: Option<SignatureId>,
    /// Owning organisation.
    pub organisation_id: OrganisationId,
}

impl ConsentRecord {
    /// Marks the record as signed by the given signature.
    pub fn mark_signed(&mut self, signature_id: SignatureId) {
        self.signature_id = Some(signature_id);
        self.state = ConsentState::Signed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_record_uses_camel_case() {
        let record = ConsentRecord {
            id: "cr-1".to_string(),
            data_agreement_id: "da-1".to_string(),
            data_agreement_revision_id: RevisionId::nil(),
            data_agreement_revision_hash: String::new(),
            individual_id: IndividualId::nil(),
            opt_in: true,
            state: ConsentState::Unsigned,
            signature_id: None,
            organisation_id: OrganisationId::nil(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["optIn"], true);
        assert_eq!(json["state"], "unsigned");
        assert!(json.get("dataAgreementRevisionHash").is_some());
    }

    #[test]
    fn mark_signed_sets_state_and_signature() {
        let mut record = ConsentRecord {
            id: "cr-2".to_string(),
            data_agreement_id: "da-1".to_string(),
            data_agreement_revision_id: RevisionId::nil(),
            data_agreement_revision_hash: String::new(),
            individual_id: IndividualId::nil(),
            opt_in: false,
            state: ConsentState::Unsigned,
            signature_id: None,
            organisation_id: OrganisationId::nil(),
        };
        let signature_id = SignatureId::new();

        record.mark_signed(signature_id);

        assert_eq!(record.state, ConsentState::Signed);
        assert_eq!(record.signature_id, Some(signature_id));
    }
}
