//! Presentation shapes for revisions.

use consentry_core::{time::format_timestamp, Revision};
use serde::Serialize;

/// Revision as returned to API callers.
///
/// Identifiers are plain strings and an unset successor is an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionView {
    /// Revision identifier.
    pub id: String,
    /// Kind of entity.
    pub schema_name: String,
    /// Entity identifier.
    pub object_id: String,
    /// Whether signatures over this revision omit the object id.
    pub signed_without_object_id: bool,
    /// Creation time, `YYYY-MM-DDTHH:MM:SSZ`.
    pub timestamp: String,
    /// Individual who made the change, if any.
    pub authorized_by_individual_id: String,
    /// Non-individual principal who made the change, if any.
    pub authorized_by_other_id: String,
    /// Revision that superseded this one, or empty.
    pub successor_id: String,
    /// Hash of the previous revision's snapshot.
    pub predecessor_hash: String,
    /// Always empty.
    pub predecessor_signature: String,
    /// Entity JSON at this version.
    pub object_data: String,
    /// Snapshot JSON the hash is computed over.
    pub serialized_snapshot: String,
    /// SHA-1 of the snapshot.
    pub serialized_hash: String,
}

impl From<&Revision> for RevisionView {
    fn from(revision: &Revision) -> Self {
        Self {
            id: revision.id.to_string(),
            schema_name: revision.schema_name.to_string(),
            object_id: revision.object_id.clone(),
            signed_without_object_id: revision.signed_without_object_id,
            timestamp: format_timestamp(&revision.timestamp),
            authorized_by_individual_id: revision.authorized_by_individual_id.clone(),
            authorized_by_other_id: revision.authorized_by_other_id.clone(),
            successor_id: revision.successor_id.map(|id| id.to_string()).unwrap_or_default(),
            predecessor_hash: revision.predecessor_hash.clone(),
            predecessor_signature: revision.predecessor_signature.clone(),
            object_data: revision.object_data.clone(),
            serialized_snapshot: revision.serialized_snapshot.clone(),
            serialized_hash: revision.serialized_hash.clone(),
        }
    }
}

impl From<Revision> for RevisionView {
    fn from(revision: Revision) -> Self {
        Self::from(&revision)
    }
}

/// An entity paired with the revision that describes its current state.
#[derive(Debug, Clone, Serialize)]
pub struct EntityView<T> {
    /// The entity.
    pub data: T,
    /// Its newest revision, or a draft.
    pub revision: RevisionView,
}

impl<T> EntityView<T> {
    /// Pairs an entity with a revision.
    pub fn new(data: T, revision: &Revision) -> Self {
        Self { data, revision: RevisionView::from(revision) }
    }
}
