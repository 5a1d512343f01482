//! Revision chain service.
//!
//! Records a new revision every time an entity changes and answers
//! history queries. Appends go through [`RevisionStore::append`], which
//! either links the new revision after the current head or fails with a
//! conflict. A conflict means another writer extended the chain first; the
//! service re-reads the head and tries again a bounded number of times.

use std::sync::Arc;

use consentry_core::{
    Actor, Clock, CoreError, Revision, RevisionId, SchemaName, Versioned,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, RevisionError},
    integrity,
    recreate::recreate_entity,
    storage::RevisionStore,
};

/// Configuration for the revision chain service.
#[derive(Debug, Clone)]
pub struct RevisionChainConfig {
    /// Extra append attempts after losing a race to a concurrent writer.
    pub max_conflict_retries: u32,
}

impl Default for RevisionChainConfig {
    fn default() -> Self {
        Self { max_conflict_retries: 5 }
    }
}

/// Builds, stores and reads hash-linked revision chains.
#[derive(Clone)]
pub struct RevisionChain {
    store: Arc<dyn RevisionStore>,
    clock: Arc<dyn Clock>,
    config: RevisionChainConfig,
}

impl RevisionChain {
    /// Creates a chain service over the given store.
    pub fn new(
        store: Arc<dyn RevisionStore>,
        clock: Arc<dyn Clock>,
        config: RevisionChainConfig,
    ) -> Self {
        Self { store, clock, config }
    }

    /// Records the current state of `entity` as the newest revision.
    ///
    /// # Errors
    ///
    /// Returns `RevisionError::Serialization` if the entity cannot be
    /// encoded, `RevisionError::ChainConflict` if every attempt lost to a
    /// concurrent writer, or `RevisionError::Storage` on store failure.
    pub async fn record<T: Versioned>(&self, entity: &T, actor: &Actor) -> Result<Revision> {
        self.record_with(entity, actor, false).await
    }

    /// Records a revision, marking whether signatures over it omit the
    /// object id.
    ///
    /// # Errors
    ///
    /// See [`RevisionChain::record`].
    pub async fn record_with<T: Versioned>(
        &self,
        entity: &T,
        actor: &Actor,
        signed_without_object_id: bool,
    ) -> Result<Revision> {
        let object_id = entity.object_id();
        let attempts = self.config.max_conflict_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let mut previous = self.store.find_head(object_id.clone(), T::SCHEMA).await?;

            let mut next =
                Revision::init_at(object_id.clone(), actor, T::SCHEMA, self.clock.now_utc())
                    .with_signed_without_object_id(signed_without_object_id);
            next.update_revision(previous.as_mut(), entity)?;

            match self.store.append(previous, next.clone()).await {
                Ok(()) => {
                    info!(
                        object_id = %object_id,
                        schema = %T::SCHEMA,
                        revision_id = %next.id,
                        hash = %next.serialized_hash,
                        "revision recorded"
                    );
                    return Ok(next);
                },
                Err(CoreError::Conflict(reason)) => {
                    debug!(
                        object_id = %object_id,
                        schema = %T::SCHEMA,
                        attempt,
                        reason = %reason,
                        "revision append lost a race, retrying"
                    );
                },
                Err(e) => return Err(e.into()),
            }
        }

        warn!(object_id = %object_id, schema = %T::SCHEMA, attempts, "revision chain contended");
        Err(RevisionError::ChainConflict { object_id, schema: T::SCHEMA, attempts })
    }

    /// Returns the newest revision of an object.
    ///
    /// # Errors
    ///
    /// Returns `RevisionError::NotFound` if the object has no revisions.
    pub async fn latest(&self, object_id: &str, schema_name: SchemaName) -> Result<Revision> {
        self.store
            .find_head(object_id.to_string(), schema_name)
            .await?
            .ok_or_else(|| RevisionError::NotFound(format!("no {schema_name} revision for {object_id}")))
    }

    /// Returns the newest revision, or a draft view when none exists.
    ///
    /// Drafts let read paths present a revision for entities that were
    /// never published. The draft is built from `entity` and never stored.
    ///
    /// # Errors
    ///
    /// Returns `RevisionError::Storage` on store failure or
    /// `RevisionError::Serialization` if the draft cannot be built.
    pub async fn latest_or_draft<T: Versioned>(&self, entity: &T, actor: &Actor) -> Result<Revision> {
        match self.store.find_head(entity.object_id(), T::SCHEMA).await? {
            Some(head) => Ok(head),
            None => {
                let mut draft = Revision::init_draft(entity.object_id(), actor, T::SCHEMA);
                draft.create_revision(entity)?;
                Ok(draft)
            },
        }
    }

    /// Lists every revision of an object, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RevisionError::Storage` on store failure.
    pub async fn list_all(&self, object_id: &str, schema_name: SchemaName) -> Result<Vec<Revision>> {
        let revisions = self.store.find_by_object(object_id.to_string(), schema_name).await?;
        Ok(integrity::newest_first(revisions))
    }

    /// Returns a revision by id.
    ///
    /// # Errors
    ///
    /// Returns `RevisionError::NotFound` if no revision has this id.
    pub async fn get(&self, id: RevisionId) -> Result<Revision> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| RevisionError::NotFound(format!("revision {id}")))
    }

    /// Returns a revision by id, restricted to one schema.
    ///
    /// # Errors
    ///
    /// Returns `RevisionError::NotFound` if no revision of that schema has
    /// this id.
    pub async fn get_by_id_and_schema(
        &self,
        id: RevisionId,
        schema_name: SchemaName,
    ) -> Result<Revision> {
        self.store
            .find_by_id_and_schema(id, schema_name)
            .await?
            .ok_or_else(|| RevisionError::NotFound(format!("{schema_name} revision {id}")))
    }

    /// Loads a revision and recreates the entity it captured.
    ///
    /// # Errors
    ///
    /// Returns `RevisionError::NotFound` if the revision does not exist, or
    /// any error of [`recreate_entity`].
    pub async fn recreate<T>(&self, id: RevisionId) -> Result<T>
    where
        T: Versioned + DeserializeOwned,
    {
        let revision = self.get_by_id_and_schema(id, T::SCHEMA).await?;
        recreate_entity(&revision)
    }

    /// Verifies the stored chain of an object end to end.
    ///
    /// Returns the chain oldest first when it is intact.
    ///
    /// # Errors
    ///
    /// Returns `RevisionError::Integrity` naming the first broken link.
    pub async fn verify(&self, object_id: &str, schema_name: SchemaName) -> Result<Vec<Revision>> {
        let revisions = self.store.find_by_object(object_id.to_string(), schema_name).await?;
        let chain = integrity::order_by_links(revisions)?;
        integrity::verify_chain(&chain)?;
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use consentry_core::{Policy, TestClock};

    use super::*;
    use crate::storage::mock::MockRevisionStore;

    fn policy(version: &str) -> Policy {
        Policy {
            id: "pol-1".to_string(),
            name: "Default".to_string(),
            version: version.to_string(),
            url: "https://example.org/policy".to_string(),
            jurisdiction: "EU".to_string(),
            industry_sector: "Retail".to_string(),
            data_retention_period_days: 30,
            geographic_restriction: "EEA".to_string(),
            storage_location: "Sweden".to_string(),
            third_party_data_sharing: false,
        }
    }

    fn chain_with(store: &MockRevisionStore) -> (RevisionChain, TestClock) {
        let clock = TestClock::with_start_time(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        let chain = RevisionChain::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            RevisionChainConfig { max_conflict_retries: 2 },
        );
        (chain, clock)
    }

    #[tokio::test]
    async fn first_revision_has_empty_predecessor() {
        let store = MockRevisionStore::new();
        let (chain, _) = chain_with(&store);

        let revision = chain.record(&policy("1"), &Actor::Other("admin".into())).await.unwrap();

        assert!(revision.predecessor_hash.is_empty());
        assert!(revision.is_head());
        assert_eq!(chain.latest("pol-1", SchemaName::Policy).await.unwrap().id, revision.id);
    }

    #[tokio::test]
    async fn updates_link_to_previous_head() {
        let store = MockRevisionStore::new();
        let (chain, clock) = chain_with(&store);
        let actor = Actor::Other("admin".into());

        let first = chain.record(&policy("1"), &actor).await.unwrap();
        clock.advance(Duration::from_secs(1));
        let second = chain.record(&policy("2"), &actor).await.unwrap();

        assert_eq!(second.predecessor_hash, first.serialized_hash);
        let stored_first = chain.get(first.id).await.unwrap();
        assert_eq!(stored_first.successor_id, Some(second.id));

        let listed = chain.list_all("pol-1", SchemaName::Policy).await.unwrap();
        assert_eq!(listed.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn retries_after_conflict() {
        let store = MockRevisionStore::new();
        let (chain, _) = chain_with(&store);
        store.inject_append_error(CoreError::Conflict("raced".into())).await;

        let revision = chain.record(&policy("1"), &Actor::Other("admin".into())).await.unwrap();

        assert_eq!(store.append_calls().await, 2);
        assert_eq!(chain.get(revision.id).await.unwrap(), revision);
    }

    #[tokio::test]
    async fn storage_errors_are_not_retried() {
        let store = MockRevisionStore::new();
        let (chain, _) = chain_with(&store);
        store.inject_append_error(CoreError::Database("connection reset".into())).await;

        let err = chain.record(&policy("1"), &Actor::Other("admin".into())).await.unwrap_err();

        assert!(matches!(err, RevisionError::Storage(_)));
        assert_eq!(store.append_calls().await, 1);
    }

    #[tokio::test]
    async fn missing_revision_is_not_found() {
        let store = MockRevisionStore::new();
        let (chain, _) = chain_with(&store);

        assert!(chain.get(RevisionId::new()).await.unwrap_err().is_not_found());
        assert!(chain.latest("nope", SchemaName::Policy).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn draft_is_returned_until_first_revision() {
        let store = MockRevisionStore::new();
        let (chain, _) = chain_with(&store);
        let actor = Actor::Other("admin".into());

        let draft = chain.latest_or_draft(&policy("draft"), &actor).await.unwrap();
        assert!(draft.is_draft());
        assert!(store.all().await.is_empty());

        let recorded = chain.record(&policy("1"), &actor).await.unwrap();
        let latest = chain.latest_or_draft(&policy("ignored"), &actor).await.unwrap();
        assert_eq!(latest.id, recorded.id);
    }

    #[tokio::test]
    async fn recreate_loads_typed_entity() {
        let store = MockRevisionStore::new();
        let (chain, _) = chain_with(&store);

        let revision = chain.record(&policy("7"), &Actor::Other("admin".into())).await.unwrap();

        let recreated: Policy = chain.recreate(revision.id).await.unwrap();
        assert_eq!(recreated, policy("7"));
    }

    #[tokio::test]
    async fn verify_detects_tampering() {
        let store = MockRevisionStore::new();
        let (chain, _) = chain_with(&store);
        let actor = Actor::Other("admin".into());

        chain.record(&policy("1"), &actor).await.unwrap();
        let second = chain.record(&policy("2"), &actor).await.unwrap();
        assert_eq!(chain.verify("pol-1", SchemaName::Policy).await.unwrap().len(), 2);

        let mut forged = second.clone();
        forged.object_data = "{}".to_string();
        forged.serialized_snapshot = forged.serialized_snapshot.replace("Default", "Forged");
        store.tamper(forged).await;

        let err = chain.verify("pol-1", SchemaName::Policy).await.unwrap_err();
        assert!(matches!(err, RevisionError::Integrity(_)));
    }
}
