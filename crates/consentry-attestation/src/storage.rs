//! Storage abstraction for signatures.

use std::{future::Future, pin::Pin, sync::Arc};

use consentry_core::{
    error::Result,
    models::{Signature, SignatureId},
    storage::Storage,
};

/// Storage operations required by the signature service.
pub trait SignatureStore: Send + Sync + 'static {
    /// Persists a new signature.
    fn insert(&self, signature: Signature) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Finds a signature by id.
    fn find_by_id(
        &self,
        id: SignatureId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Signature>>> + Send + '_>>;

    /// Writes the final fields of a still-unsigned signature.
    ///
    /// Returns false when the signature is missing or already signed.
    fn complete(&self, signature: Signature) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;
}

/// Production store backed by the Postgres repositories.
pub struct PostgresSignatureStore {
    storage: Arc<Storage>,
}

impl PostgresSignatureStore {
    /// Creates a new PostgreSQL store adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl SignatureStore for PostgresSignatureStore {
    fn insert(&self, signature: Signature) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.storage.signatures.insert(&signature).await })
    }

    fn find_by_id(
        &self,
        id: SignatureId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Signature>>> + Send + '_>> {
        Box::pin(async move { self.storage.signatures.find_by_id(id).await })
    }

    fn complete(&self, signature: Signature) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async move { self.storage.signatures.complete(&signature).await })
    }
}

pub mod mock {
    //! In-memory signature store for tests.

    use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

    use consentry_core::{
        error::{CoreError, Result},
        models::{Signature, SignatureId},
    };
    use tokio::sync::RwLock;

    use super::SignatureStore;

    /// Mock signature store with failure injection.
    #[derive(Clone, Default)]
    pub struct MockSignatureStore {
        signatures: Arc<RwLock<HashMap<SignatureId, Signature>>>,
        fail_next: Arc<RwLock<Option<CoreError>>>,
    }

    impl MockSignatureStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next write fail with the given error.
        pub async fn inject_error(&self, error: CoreError) {
            *self.fail_next.write().await = Some(error);
        }

        /// Returns every stored signature.
        pub async fn all(&self) -> Vec<Signature> {
            self.signatures.read().await.values().cloned().collect()
        }

        async fn take_error(&self) -> Result<()> {
            match self.fail_next.write().await.take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
    }

    impl SignatureStore for MockSignatureStore {
        fn insert(
            &self,
            signature: Signature,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.take_error().await?;
                let mut signatures = self.signatures.write().await;
                if signatures.contains_key(&signature.id) {
                    return Err(CoreError::ConstraintViolation(format!(
                        "signature {} already exists",
                        signature.id
                    )));
                }
                signatures.insert(signature.id, signature);
                Ok(())
            })
        }

        fn find_by_id(
            &self,
            id: SignatureId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Signature>>> + Send + '_>> {
            Box::pin(async move { Ok(self.signatures.read().await.get(&id).cloned()) })
        }

        fn complete(
            &self,
            signature: Signature,
        ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
            Box::pin(async move {
                self.take_error().await?;
                let mut signatures = self.signatures.write().await;
                match signatures.get_mut(&signature.id) {
                    Some(stored) if !stored.is_signed() => {
                        *stored = signature;
                        Ok(true)
                    },
                    _ => Ok(false),
                }
            })
        }
    }
}
