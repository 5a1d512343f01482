//! Error types for revision chain operations.
//!
//! Serialization and storage failures propagate unchanged. A missing
//! revision is reported as `NotFound`, never as a storage failure.

use consentry_core::{CoreError, RevisionId, SchemaName};
use thiserror::Error;

/// Result type alias for revision operations.
pub type Result<T> = std::result::Result<T, RevisionError>;

/// Errors raised while building, storing or reading revision chains.
#[derive(Debug, Error)]
pub enum RevisionError {
    /// No revision matched the query.
    #[error("revision not found: {0}")]
    NotFound(String),

    /// An entity or snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Concurrent writers kept winning the race to extend the chain.
    #[error("revision chain for {schema} {object_id} still contended after {attempts} attempts")]
    ChainConflict {
        /// Entity whose chain was contended.
        object_id: String,
        /// Schema of the chain.
        schema: SchemaName,
        /// Number of append attempts made.
        attempts: u32,
    },

    /// A revision belongs to a different schema than requested.
    #[error("revision {id} is a {actual} revision, not {expected}")]
    SchemaMismatch {
        /// Revision that was read.
        id: RevisionId,
        /// Schema the caller asked for.
        expected: SchemaName,
        /// Schema stored in the revision.
        actual: SchemaName,
    },

    /// A stored chain no longer satisfies its linkage rules.
    #[error("chain integrity violated: {0}")]
    Integrity(#[from] ChainFault),
}

/// A specific break in a revision chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainFault {
    /// A stored hash does not match its snapshot.
    #[error("revision {id} hash does not match its snapshot")]
    HashMismatch {
        /// Offending revision.
        id: RevisionId,
    },

    /// A revision's columns disagree with the snapshot that was hashed.
    #[error("revision {id} fields do not match its snapshot")]
    SnapshotMismatch {
        /// Offending revision.
        id: RevisionId,
    },

    /// A revision does not point at the hash of the revision before it.
    #[error("revision {id} expected predecessor hash {expected:?}, found {found:?}")]
    PredecessorMismatch {
        /// Offending revision.
        id: RevisionId,
        /// Hash of the previous revision.
        expected: String,
        /// Hash recorded in the revision.
        found: String,
    },

    /// A revision's successor pointer does not name the next revision.
    #[error("revision {id} successor {found:?} does not match next revision {expected:?}")]
    SuccessorMismatch {
        /// Offending revision.
        id: RevisionId,
        /// Next revision in the chain, if any.
        expected: Option<RevisionId>,
        /// Successor recorded in the revision.
        found: Option<RevisionId>,
    },

    /// The chain does not start with exactly one root revision.
    #[error("expected exactly one root revision, found {count}")]
    RootCount {
        /// Number of revisions without a predecessor hash.
        count: usize,
    },

    /// Some revisions are not reachable from the root.
    #[error("{count} revisions are not linked into the chain")]
    Unlinked {
        /// Number of unreachable revisions.
        count: usize,
    },
}

impl From<CoreError> for RevisionError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => Self::NotFound(msg),
            CoreError::Serialization(msg) => Self::Serialization(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RevisionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl RevisionError {
    /// Returns true if the error means nothing matched the query.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_not_found_stays_distinct_from_storage() {
        let err = RevisionError::from(CoreError::NotFound("x".into()));
        assert!(err.is_not_found());

        let err = RevisionError::from(CoreError::Database("down".into()));
        assert!(matches!(err, RevisionError::Storage(_)));
    }

    #[test]
    fn core_serialization_maps_to_serialization() {
        let err = RevisionError::from(CoreError::Serialization("bad".into()));
        assert!(matches!(err, RevisionError::Serialization(_)));
    }
}
