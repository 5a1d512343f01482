//! Chain ordering and integrity verification.
//!
//! Timestamps only have second precision, so two revisions written in the
//! same second cannot be ordered by time alone. The links are
//! authoritative: a chain is ordered by walking from its root through
//! each `successor_id`.

use std::collections::HashMap;

use consentry_core::{Revision, RevisionId, RevisionSnapshot};

use crate::error::ChainFault;

/// Orders revisions oldest first by following chain links.
///
/// # Errors
///
/// Returns the first fault that prevents a single linear walk over every
/// revision.
pub fn order_by_links(revisions: Vec<Revision>) -> Result<Vec<Revision>, ChainFault> {
    if revisions.is_empty() {
        return Ok(revisions);
    }

    let roots = revisions.iter().filter(|r| r.predecessor_hash.is_empty()).count();
    if roots != 1 {
        return Err(ChainFault::RootCount { count: roots });
    }

    let total = revisions.len();
    let mut by_id: HashMap<RevisionId, Revision> =
        revisions.into_iter().map(|r| (r.id, r)).collect();

    let root_id = by_id
        .values()
        .find(|r| r.predecessor_hash.is_empty())
        .map(|r| r.id)
        .ok_or(ChainFault::RootCount { count: 0 })?;

    let mut ordered = Vec::with_capacity(total);
    let mut cursor = Some(root_id);
    while let Some(id) = cursor {
        let Some(revision) = by_id.remove(&id) else {
            break;
        };
        cursor = revision.successor_id;
        ordered.push(revision);
    }

    if !by_id.is_empty() {
        return Err(ChainFault::Unlinked { count: by_id.len() });
    }

    Ok(ordered)
}

/// Orders revisions newest first.
///
/// Uses chain links when they are intact and falls back to timestamps
/// otherwise, so a damaged chain can still be listed.
pub fn newest_first(revisions: Vec<Revision>) -> Vec<Revision> {
    let mut fallback = revisions.clone();
    match order_by_links(revisions) {
        Ok(mut ordered) => {
            ordered.reverse();
            ordered
        },
        Err(fault) => {
            tracing::warn!(error = %fault, "revision chain links unusable, ordering by timestamp");
            fallback.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            fallback
        },
    }
}

/// Verifies an oldest-first chain.
///
/// Checks that every stored hash matches its snapshot, that the stored
/// fields match the snapshot they were hashed as, that the first
/// revision has no predecessor hash, that each later revision carries its
/// predecessor's hash, and that successor pointers name the next revision
/// with the last one unset.
///
/// # Errors
///
/// Returns the first fault found.
pub fn verify_chain(chain: &[Revision]) -> Result<(), ChainFault> {
    let mut expected_predecessor = String::new();

    for (index, revision) in chain.iter().enumerate() {
        if revision.recompute_hash() != revision.serialized_hash {
            return Err(ChainFault::HashMismatch { id: revision.id });
        }

        match RevisionSnapshot::parse(&revision.serialized_snapshot) {
            Ok(snapshot) if snapshot == revision.snapshot() => {},
            _ => return Err(ChainFault::SnapshotMismatch { id: revision.id }),
        }

        if revision.predecessor_hash != expected_predecessor {
            return Err(ChainFault::PredecessorMismatch {
                id: revision.id,
                expected: expected_predecessor,
                found: revision.predecessor_hash.clone(),
            });
        }

        let next_id = chain.get(index + 1).map(|next| next.id);
        if revision.successor_id != next_id {
            return Err(ChainFault::SuccessorMismatch {
                id: revision.id,
                expected: next_id,
                found: revision.successor_id,
            });
        }

        expected_predecessor = revision.serialized_hash.clone();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use consentry_core::{Actor, SchemaName};

    use super::*;

    fn build_chain(len: usize) -> Vec<Revision> {
        let actor = Actor::Other("admin".to_string());
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut chain: Vec<Revision> = Vec::new();
        for version in 0..len {
            let mut next = Revision::init_at("obj", &actor, SchemaName::Policy, ts);
            next.update_revision(chain.last_mut(), &version).unwrap();
            chain.push(next);
        }
        chain
    }

    #[test]
    fn valid_chain_verifies() {
        assert_eq!(verify_chain(&build_chain(4)), Ok(()));
        assert_eq!(verify_chain(&[]), Ok(()));
    }

    #[test]
    fn ordering_uses_links_when_timestamps_tie() {
        let chain = build_chain(5);
        let expected: Vec<RevisionId> = chain.iter().map(|r| r.id).collect();

        let mut shuffled = chain;
        shuffled.reverse();
        shuffled.swap(0, 2);

        let ordered = order_by_links(shuffled).unwrap();
        assert_eq!(ordered.iter().map(|r| r.id).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn tampered_data_is_detected() {
        let mut chain = build_chain(3);
        chain[1].object_data = "\"forged\"".to_string();
        chain[1].serialized_snapshot = chain[1].serialized_snapshot.replace("1", "9");

        assert_eq!(verify_chain(&chain), Err(ChainFault::HashMismatch { id: chain[1].id }));
    }

    #[test]
    fn tampered_columns_are_detected() {
        let mut chain = build_chain(2);
        chain[0].object_data = "{\"v\":999}".to_string();
        chain[0].authorized_by_other_id = "mallory".to_string();

        assert_eq!(verify_chain(&chain), Err(ChainFault::SnapshotMismatch { id: chain[0].id }));
    }

    #[test]
    fn unparseable_snapshot_is_detected() {
        let mut chain = build_chain(1);
        chain[0].serialized_snapshot = "not a snapshot".to_string();
        chain[0].serialized_hash = chain[0].recompute_hash();

        assert_eq!(verify_chain(&chain), Err(ChainFault::SnapshotMismatch { id: chain[0].id }));
    }

    #[test]
    fn broken_successor_is_detected() {
        let mut chain = build_chain(3);
        chain[2].successor_id = Some(RevisionId::new());

        assert!(matches!(verify_chain(&chain), Err(ChainFault::SuccessorMismatch { .. })));
    }

    #[test]
    fn two_roots_are_rejected() {
        let mut chain = build_chain(2);
        chain.extend(build_chain(1));

        assert_eq!(order_by_links(chain).unwrap_err(), ChainFault::RootCount { count: 2 });
    }

    #[test]
    fn newest_first_reverses_link_order() {
        let chain = build_chain(3);
        let head = chain[2].id;

        let listed = newest_first(chain);
        assert_eq!(listed[0].id, head);
        assert!(listed[2].predecessor_hash.is_empty());
    }
}
