//! Storage abstraction for revision chains.
//!
//! The chain service only needs a handful of reads and one atomic append.
//! Production wraps the Postgres repositories; tests use the in-memory
//! store in [`mock`].

use std::{future::Future, pin::Pin, sync::Arc};

use consentry_core::{
    error::Result,
    models::{Revision, RevisionId, SchemaName},
    storage::Storage,
};

/// Storage operations required by the revision chain.
pub trait RevisionStore: Send + Sync + 'static {
    /// Appends `next` after `previous` as one atomic operation.
    ///
    /// With `Some(previous)`, the predecessor's successor must still be
    /// unset and is set to `next.id`. With `None`, `next` must be the first
    /// revision of its chain. A lost race yields `CoreError::Conflict`.
    fn append(
        &self,
        previous: Option<Revision>,
        next: Revision,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Finds the revision of an object that has no successor.
    fn find_head(
        &self,
        object_id: String,
        schema_name: SchemaName,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Revision>>> + Send + '_>>;

    /// Finds a revision by id.
    fn find_by_id(
        &self,
        id: RevisionId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Revision>>> + Send + '_>>;

    /// Finds a revision by id within one schema.
    fn find_by_id_and_schema(
        &self,
        id: RevisionId,
        schema_name: SchemaName,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Revision>>> + Send + '_>>;

    /// Finds every revision of an object, newest first by timestamp.
    fn find_by_object(
        &self,
        object_id: String,
        schema_name: SchemaName,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Revision>>> + Send + '_>>;
}

/// Production store backed by the Postgres repositories.
pub struct PostgresRevisionStore {
    storage: Arc<Storage>,
}

impl PostgresRevisionStore {
    /// Creates a new PostgreSQL store adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl RevisionStore for PostgresRevisionStore {
    fn append(
        &self,
        previous: Option<Revision>,
        next: Revision,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.storage.revisions.append(previous.as_ref(), &next).await })
    }

    fn find_head(
        &self,
        object_id: String,
        schema_name: SchemaName,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Revision>>> + Send + '_>> {
        Box::pin(async move { self.storage.revisions.find_head(&object_id, schema_name).await })
    }

    fn find_by_id(
        &self,
        id: RevisionId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Revision>>> + Send + '_>> {
        Box::pin(async move { self.storage.revisions.find_by_id(id).await })
    }

    fn find_by_id_and_schema(
        &self,
        id: RevisionId,
        schema_name: SchemaName,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Revision>>> + Send + '_>> {
        Box::pin(async move { self.storage.revisions.find_by_id_and_schema(id, schema_name).await })
    }

    fn find_by_object(
        &self,
        object_id: String,
        schema_name: SchemaName,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Revision>>> + Send + '_>> {
        Box::pin(async move { self.storage.revisions.find_by_object(&object_id, schema_name).await })
    }
}

pub mod mock {
    //! In-memory revision store for tests.
    //!
    //! A single lock is held across the check and the write of `append`, so
    //! it gives the same no-fork guarantee as the Postgres transaction.

    use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

    use consentry_core::{
        error::{CoreError, Result},
        models::{Revision, RevisionId, SchemaName},
    };
    use tokio::sync::RwLock;

    use super::RevisionStore;

    /// Mock revision store with failure injection.
    #[derive(Clone, Default)]
    pub struct MockRevisionStore {
        revisions: Arc<RwLock<HashMap<RevisionId, Revision>>>,
        append_error: Arc<RwLock<Option<CoreError>>>,
        append_calls: Arc<RwLock<usize>>,
    }

    impl MockRevisionStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next `append` fail with the given error.
        pub async fn inject_append_error(&self, error: CoreError) {
            *self.append_error.write().await = Some(error);
        }

        /// Overwrites a stored revision, bypassing every check.
        pub async fn tamper(&self, revision: Revision) {
            self.revisions.write().await.insert(revision.id, revision);
        }

        /// Returns every stored revision in no particular order.
        pub async fn all(&self) -> Vec<Revision> {
            self.revisions.read().await.values().cloned().collect()
        }

        /// Number of `append` calls made, including failed ones.
        pub async fn append_calls(&self) -> usize {
            *self.append_calls.read().await
        }
    }

    impl RevisionStore for MockRevisionStore {
        fn append(
            &self,
            previous: Option<Revision>,
            next: Revision,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                *self.append_calls.write().await += 1;
                if let Some(error) = self.append_error.write().await.take() {
                    return Err(error);
                }

                let mut revisions = self.revisions.write().await;

                let forked = revisions.values().any(|existing| {
                    existing.object_id == next.object_id
                        && existing.schema_name == next.schema_name
                        && existing.predecessor_hash == next.predecessor_hash
                });
                if forked {
                    return Err(CoreError::Conflict(format!(
                        "{} {} already has a revision after {:?}",
                        next.schema_name, next.object_id, next.predecessor_hash
                    )));
                }

                if let Some(previous) = previous {
                    let stored = revisions.get_mut(&previous.id).ok_or_else(|| {
                        CoreError::NotFound(format!("revision {} not found", previous.id))
                    })?;
                    if stored.successor_id.is_some() {
                        return Err(CoreError::Conflict(format!(
                            "revision {} was superseded concurrently",
                            previous.id
                        )));
                    }
                    stored.successor_id = Some(next.id);
                }

                revisions.insert(next.id, next);
                Ok(())
            })
        }

        fn find_head(
            &self,
            object_id: String,
            schema_name: SchemaName,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Revision>>> + Send + '_>> {
            Box::pin(async move {
                Ok(self
                    .revisions
                    .read()
                    .await
                    .values()
                    .filter(|r| {
                        r.object_id == object_id && r.schema_name == schema_name && r.is_head()
                    })
                    .max_by_key(|r| r.timestamp)
                    .cloned())
            })
        }

        fn find_by_id(
            &self,
            id: RevisionId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Revision>>> + Send + '_>> {
            Box::pin(async move { Ok(self.revisions.read().await.get(&id).cloned()) })
        }

        fn find_by_id_and_schema(
            &self,
            id: RevisionId,
            schema_name: SchemaName,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Revision>>> + Send + '_>> {
            Box::pin(async move {
                Ok(self
                    .revisions
                    .read()
                    .await
                    .get(&id)
                    .filter(|r| r.schema_name == schema_name)
                    .cloned())
            })
        }

        fn find_by_object(
            &self,
            object_id: String,
            schema_name: SchemaName,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Revision>>> + Send + '_>> {
            Box::pin(async move {
                let mut found: Vec<Revision> = self
                    .revisions
                    .read()
                    .await
                    .values()
                    .filter(|r| r.object_id == object_id && r.schema_name == schema_name)
                    .cloned()
                    .collect();
                found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                Ok(found)
            })
        }
    }
}
