//! Rebuilding entities from stored revisions.

use consentry_core::{Revision, RevisionSnapshot, Versioned};
use serde::de::DeserializeOwned;

use crate::error::{Result, RevisionError};

/// Recreates the entity captured by a revision.
///
/// Parses the serialized snapshot, then the entity JSON embedded in it.
/// This is the exact inverse of [`Revision::create_revision`].
///
/// # Errors
///
/// Returns `RevisionError::SchemaMismatch` if the revision belongs to a
/// different entity type, or `RevisionError::Serialization` if either JSON
/// layer cannot be decoded.
pub fn recreate_entity<T>(revision: &Revision) -> Result<T>
where
    T: Versioned + DeserializeOwned,
{
    let snapshot = RevisionSnapshot::parse(&revision.serialized_snapshot)?;

    if snapshot.schema_name != T::SCHEMA {
        return Err(RevisionError::SchemaMismatch {
            id: revision.id,
            expected: T::SCHEMA,
            actual: snapshot.schema_name,
        });
    }

    Ok(serde_json::from_str(&snapshot.object_data)?)
}
