//! Test infrastructure for the consentry crates.
//!
//! [`TestEnv`] wires the revision chain, signature service and webhook
//! dispatcher over in-memory stores and one deterministic clock, so tests
//! run without a database. [`TestDatabase`] provides an isolated Postgres
//! database for exercising the repositories themselves.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use consentry_attestation::{storage::mock::MockSignatureStore, SignatureService};
use consentry_core::{
    Clock, Individual, IndividualId, Organisation, OrganisationId, Webhook, WebhookEventType,
};
use consentry_revision::{storage::mock::MockRevisionStore, RevisionChain, RevisionChainConfig};
use consentry_webhook::{storage::mock::MockWebhookStorage, ClientConfig, Dispatcher, DispatcherConfig};

pub mod database;
pub mod directory;
pub mod fixtures;
pub mod http;

pub use consentry_core::TestClock;
pub use database::TestDatabase;
pub use directory::StaticDirectory;
pub use fixtures::WebhookBuilder;
pub use http::{MockServer, RecordedRequest};

/// All services wired over in-memory stores.
pub struct TestEnv {
    /// Deterministic clock shared by every service.
    pub clock: TestClock,
    /// Revision store behind [`TestEnv::chain`].
    pub revisions: MockRevisionStore,
    /// Signature store behind [`TestEnv::signatures`].
    pub signature_store: MockSignatureStore,
    /// Webhook store and dispatch queue behind [`TestEnv::dispatcher`].
    pub webhooks: MockWebhookStorage,
    /// Organisation and individual directory.
    pub directory: StaticDirectory,
    /// Revision chain service.
    pub chain: RevisionChain,
    /// Signature service.
    pub signatures: SignatureService,
    /// Webhook dispatcher.
    pub dispatcher: Arc<Dispatcher>,
}

impl TestEnv {
    /// Creates an environment with default settings and a short HTTP
    /// timeout.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let config = DispatcherConfig {
            poll_interval: Duration::from_millis(20),
            client_config: ClientConfig {
                timeout: Duration::from_secs(2),
                ..ClientConfig::default()
            },
            ..DispatcherConfig::default()
        };
        Self::with_dispatcher_config(config)
    }

    /// Creates an environment with a custom dispatcher configuration.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn with_dispatcher_config(config: DispatcherConfig) -> Result<Self> {
        let clock = TestClock::new();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

        let revisions = MockRevisionStore::new();
        let signature_store = MockSignatureStore::new();
        let webhooks = MockWebhookStorage::new();
        let directory = StaticDirectory::new();

        let chain = RevisionChain::new(
            Arc::new(revisions.clone()),
            shared_clock.clone(),
            RevisionChainConfig::default(),
        );
        let signatures = SignatureService::new(Arc::new(signature_store.clone()), shared_clock.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(webhooks.clone()),
            Arc::new(directory.clone()),
            Arc::new(directory.clone()),
            shared_clock,
            config,
        )?);

        Ok(Self { clock, revisions, signature_store, webhooks, directory, chain, signatures, dispatcher })
    }

    /// Registers an organisation that allows the given event types.
    pub async fn create_organisation(
        &self,
        enabled_webhook_events: impl IntoIterator<Item = WebhookEventType>,
    ) -> OrganisationId {
        let id = OrganisationId::new();
        self.directory
            .put_organisation(Organisation {
                id,
                name: format!("org-{id}"),
                email: "admin@example.org".to_string(),
                enabled_webhook_events: enabled_webhook_events.into_iter().collect(),
            })
            .await;
        id
    }

    /// Registers an individual.
    pub async fn create_individual(&self, name: &str) -> IndividualId {
        let id = IndividualId::new();
        self.directory
            .put_individual(Individual {
                id,
                name: name.to_string(),
                email: format!("{}@example.org", name.to_lowercase()),
            })
            .await;
        id
    }

    /// Stores a webhook and returns it.
    pub async fn add_webhook(&self, webhook: Webhook) -> Webhook {
        self.webhooks.put_webhook(webhook.clone()).await;
        webhook
    }

    /// Processes queued jobs until the queue is empty.
    ///
    /// Returns the number of jobs processed.
    ///
    /// # Errors
    ///
    /// Fails if claiming a batch fails.
    pub async fn drain_queue(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let claimed = self.dispatcher.process_pending().await?;
            if claimed == 0 {
                return Ok(total);
            }
            total += claimed;
        }
    }
}
