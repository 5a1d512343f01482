//! Revision model and hash-chain construction.
//!
//! A revision is an immutable snapshot of one entity. The snapshot JSON is
//! the SHA-1 hash input and its layout is fixed:
//!
//! ```text
//! {"schemaName","objectId","signedWithoutObjectId","timestamp",
//!  "authorizedByIndividualId","authorizedByOtherId","predecessorHash",
//!  "predecessorSignature","objectData"}
//! ```
//!
//! `objectData` is itself the entity's JSON, embedded as a string.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use super::{
    entities::{ConsentRecord, DataAgreement, Policy},
    ids::RevisionId,
};
use crate::{
    error::{CoreError, Result},
    time::{truncate_to_seconds, utc_seconds},
};

/// Kind of entity a revision chain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaName {
    /// Governing policy.
    Policy,
    /// Data agreement.
    DataAgreement,
    /// Consent record for a data agreement.
    ConsentRecord,
}

impl SchemaName {
    /// Wire and storage representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::DataAgreement => "dataAgreement",
            Self::ConsentRecord => "consentRecord",
        }
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "policy" => Ok(Self::Policy),
            "dataAgreement" => Ok(Self::DataAgreement),
            "consentRecord" => Ok(Self::ConsentRecord),
            other => Err(CoreError::InvalidInput(format!("unknown schema name: {other}"))),
        }
    }
}

text_enum_sqlx!(SchemaName);

/// Who caused a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// An individual (data subject) acting on their own records.
    Individual(String),
    /// Any other principal, such as an organisation administrator.
    Other(String),
}

impl Actor {
    /// Identifier of the actor regardless of kind.
    pub fn id(&self) -> &str {
        match self {
            Self::Individual(id) | Self::Other(id) => id,
        }
    }
}

/// An entity type whose history is kept as a revision chain.
pub trait Versioned: Serialize {
    /// Schema the entity's revisions are filed under.
    const SCHEMA: SchemaName;

    /// Identifier the revision chain is keyed on.
    fn object_id(&self) -> String;
}

impl Versioned for Policy {
    const SCHEMA: SchemaName = SchemaName::Policy;

    fn object_id(&self) -> String {
        self.id.clone()
    }
}

impl Versioned for DataAgreement {
    const SCHEMA: SchemaName = SchemaName::DataAgreement;

    fn object_id(&self) -> String {
        self.id.clone()
    }
}

impl Versioned for ConsentRecord {
    const SCHEMA: SchemaName = SchemaName::ConsentRecord;

    fn object_id(&self) -> String {
        self.id.clone()
    }
}

/// The hashed portion of a revision.
///
/// Field order is significant: it is the order keys appear in the hashed
/// JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSnapshot {
    /// Kind of entity.
    pub schema_name: SchemaName,
    /// Entity identifier.
    pub object_id: String,
    /// Whether signatures over this revision omit the object id.
    pub signed_without_object_id: bool,
    /// Creation time at second precision.
    #[serde(with = "utc_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Individual who made the change, if any.
    pub authorized_by_individual_id: String,
    /// Non-individual principal who made the change, if any.
    pub authorized_by_other_id: String,
    /// Hash of the previous revision's snapshot, empty for the first.
    pub predecessor_hash: String,
    /// Reserved for signature chaining. Always empty.
    pub predecessor_signature: String,
    /// Entity JSON at this version.
    pub object_data: String,
}

impl RevisionSnapshot {
    /// Parses a serialized snapshot.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Serialization` if the input is not a snapshot.
    pub fn parse(serialized: &str) -> Result<Self> {
        Ok(serde_json::from_str(serialized)?)
    }
}

/// One immutable snapshot in an entity's revision chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    /// Revision identifier. Nil for drafts.
    pub id: RevisionId,
    /// Kind of entity.
    pub schema_name: SchemaName,
    /// Entity identifier.
    pub object_id: String,
    /// Whether signatures over this revision omit the object id.
    pub signed_without_object_id: bool,
    /// Creation time at second precision.
    pub timestamp: DateTime<Utc>,
    /// Individual who made the change, if any.
    pub authorized_by_individual_id: String,
    /// Non-individual principal who made the change, if any.
    pub authorized_by_other_id: String,
    /// Hash of the previous revision's snapshot, empty for the first.
    pub predecessor_hash: String,
    /// Reserved for signature chaining. Always empty.
    pub predecessor_signature: String,
    /// Entity JSON at this version.
    pub object_data: String,
    /// Revision that superseded this one. Set at most once.
    pub successor_id: Option<RevisionId>,
    /// Snapshot JSON the hash is computed over.
    pub serialized_snapshot: String,
    /// Lowercase hex SHA-1 of `serialized_snapshot`.
    pub serialized_hash: String,
}

impl Revision {
    /// Starts a new revision with a fresh id and the current time.
    ///
    /// No I/O happens here; the revision is empty until
    /// [`Revision::create_revision`] or [`Revision::update_revision`] fills
    /// it.
    pub fn init(object_id: impl Into<String>, actor: &Actor, schema_name: SchemaName) -> Self {
        Self::init_at(object_id, actor, schema_name, Utc::now())
    }

    /// Starts a new revision stamped with the given time.
    pub fn init_at(
        object_id: impl Into<String>,
        actor: &Actor,
        schema_name: SchemaName,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let (individual, other) = match actor {
            Actor::Individual(id) => (id.clone(), String::new()),
            Actor::Other(id) => (String::new(), id.clone()),
        };

        Self {
            id: RevisionId::new(),
            schema_name,
            object_id: object_id.into(),
            signed_without_object_id: false,
            timestamp: truncate_to_seconds(timestamp),
            authorized_by_individual_id: individual,
            authorized_by_other_id: other,
            predecessor_hash: String::new(),
            predecessor_signature: String::new(),
            object_data: String::new(),
            successor_id: None,
            serialized_snapshot: String::new(),
            serialized_hash: String::new(),
        }
    }

    /// Starts a revision-shaped view of an entity that was never published.
    ///
    /// Drafts carry the nil id and must not be persisted.
    pub fn init_draft(object_id: impl Into<String>, actor: &Actor, schema_name: SchemaName) -> Self {
        Self { id: RevisionId::nil(), ..Self::init(object_id, actor, schema_name) }
    }

    /// Returns true for revisions built with [`Revision::init_draft`].
    pub fn is_draft(&self) -> bool {
        self.id.is_nil()
    }

    /// Returns true when no later revision supersedes this one.
    pub fn is_head(&self) -> bool {
        self.successor_id.is_none()
    }

    /// Captures `object_data` and computes the snapshot and its hash.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Serialization` if the entity cannot be encoded.
    pub fn create_revision<T: Serialize + ?Sized>(&mut self, object_data: &T) -> Result<()> {
        self.object_data = serde_json::to_string(object_data)?;
        self.serialized_snapshot = serde_json::to_string(&self.snapshot())?;
        self.serialized_hash = sha1_hex(self.serialized_snapshot.as_bytes());
        Ok(())
    }

    /// Links this revision after `previous`, then captures `object_data`.
    ///
    /// `previous` gets its successor set to this revision. Both values must
    /// then be persisted together; see the chain service for the atomic
    /// write.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Conflict` if `previous` was already superseded,
    /// or `CoreError::Serialization` if the entity cannot be encoded.
    pub fn update_revision<T: Serialize + ?Sized>(
        &mut self,
        previous: Option<&mut Revision>,
        object_data: &T,
    ) -> Result<()> {
        if let Some(previous) = previous {
            if let Some(existing) = previous.successor_id {
                return Err(CoreError::Conflict(format!(
                    "revision {} already superseded by {existing}",
                    previous.id
                )));
            }
            previous.successor_id = Some(self.id);
            self.predecessor_hash = previous.serialized_hash.clone();
            self.predecessor_signature = String::new();
        }

        self.create_revision(object_data)
    }

    /// Marks signatures over this revision as not covering the object id.
    pub fn with_signed_without_object_id(mut self, signed_without_object_id: bool) -> Self {
        self.signed_without_object_id = signed_without_object_id;
        self
    }

    /// The hashed portion of this revision.
    pub fn snapshot(&self) -> RevisionSnapshot {
        RevisionSnapshot {
            schema_name: self.schema_name,
            object_id: self.object_id.clone(),
            signed_without_object_id: self.signed_without_object_id,
            timestamp: self.timestamp,
            authorized_by_individual_id: self.authorized_by_individual_id.clone(),
            authorized_by_other_id: self.authorized_by_other_id.clone(),
            predecessor_hash: self.predecessor_hash.clone(),
            predecessor_signature: self.predecessor_signature.clone(),
            object_data: self.object_data.clone(),
        }
    }

    /// Recomputes the hash of the stored snapshot.
    pub fn recompute_hash(&self) -> String {
        sha1_hex(self.serialized_snapshot.as_bytes())
    }
}

/// Lowercase hex SHA-1 digest.
pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[derive(Serialize)]
    struct Sample {
        name: &'static str,
    }

    #[test]
    fn snapshot_has_fixed_key_order() {
        let actor = Actor::Other("admin-1".to_string());
        let mut revision = Revision::init_at("obj-1", &actor, SchemaName::Policy, fixed_time());

        revision.create_revision(&Sample { name: "p" }).unwrap();

        assert_eq!(
            revision.serialized_snapshot,
            r#"{"schemaName":"policy","objectId":"obj-1","signedWithoutObjectId":false,"timestamp":"2024-01-02T03:04:05Z","authorizedByIndividualId":"","authorizedByOtherId":"admin-1","predecessorHash":"","predecessorSignature":"","objectData":"{\"name\":\"p\"}"}"#
        );
        assert_eq!(revision.serialized_hash, sha1_hex(revision.serialized_snapshot.as_bytes()));
        assert_eq!(revision.serialized_hash.len(), 40);
    }

    #[test]
    fn init_truncates_to_seconds() {
        let ts = fixed_time() + chrono::Duration::milliseconds(900);
        let revision =
            Revision::init_at("o", &Actor::Individual("i".into()), SchemaName::ConsentRecord, ts);

        assert_eq!(revision.timestamp, fixed_time());
        assert_eq!(revision.authorized_by_individual_id, "i");
        assert!(revision.authorized_by_other_id.is_empty());
    }

    #[test]
    fn update_links_predecessor() {
        let actor = Actor::Other("a".to_string());
        let mut first = Revision::init_at("o", &actor, SchemaName::Policy, fixed_time());
        first.create_revision(&Sample { name: "v1" }).unwrap();

        let mut second = Revision::init_at("o", &actor, SchemaName::Policy, fixed_time());
        second.update_revision(Some(&mut first), &Sample { name: "v2" }).unwrap();

        assert_eq!(first.successor_id, Some(second.id));
        assert_eq!(second.predecessor_hash, first.serialized_hash);
        assert!(second.predecessor_signature.is_empty());
        assert!(second.is_head());
        assert!(!first.is_head());
    }

    #[test]
    fn update_rejects_superseded_predecessor() {
        let actor = Actor::Other("a".to_string());
        let mut first = Revision::init_at("o", &actor, SchemaName::Policy, fixed_time());
        first.create_revision(&Sample { name: "v1" }).unwrap();
        let mut second = Revision::init_at("o", &actor, SchemaName::Policy, fixed_time());
        second.update_revision(Some(&mut first), &Sample { name: "v2" }).unwrap();

        let mut fork = Revision::init_at("o", &actor, SchemaName::Policy, fixed_time());
        let err = fork.update_revision(Some(&mut first), &Sample { name: "v3" }).unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(first.successor_id, Some(second.id));
    }

    #[test]
    fn draft_has_nil_id() {
        let draft = Revision::init_draft("o", &Actor::Other("a".into()), SchemaName::DataAgreement);
        assert!(draft.is_draft());
    }

    #[test]
    fn snapshot_parses_back() {
        let mut revision =
            Revision::init_at("o", &Actor::Other("a".into()), SchemaName::Policy, fixed_time());
        revision.create_revision(&Sample { name: "x" }).unwrap();

        let parsed = RevisionSnapshot::parse(&revision.serialized_snapshot).unwrap();
        assert_eq!(parsed, revision.snapshot());
    }

    #[test]
    fn schema_names_parse() {
        for schema in [SchemaName::Policy, SchemaName::DataAgreement, SchemaName::ConsentRecord] {
            assert_eq!(schema.as_str().parse::<SchemaName>().unwrap(), schema);
        }
        assert!("unknown".parse::<SchemaName>().is_err());
    }
}
