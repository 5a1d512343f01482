//! Storage abstraction for the webhook dispatcher.
//!
//! Covers webhook lookups, the delivery audit log and the persisted
//! dispatch queue. Production wraps the Postgres repositories; tests use
//! the in-memory store in [`mock`].

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use consentry_core::{
    error::Result,
    models::{
        DeliveryId, DispatchJob, DispatchJobId, OrganisationId, Webhook, WebhookDelivery,
        WebhookId,
    },
    storage::Storage,
};

/// Storage operations required by the dispatcher.
pub trait WebhookStorage: Send + Sync + 'static {
    /// Finds the non-deleted, non-disabled webhooks of an organisation.
    fn find_active_webhooks(
        &self,
        organisation_id: OrganisationId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Webhook>>> + Send + '_>>;

    /// Finds a non-deleted webhook within an organisation, disabled or not.
    fn find_webhook(
        &self,
        id: WebhookId,
        organisation_id: OrganisationId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Webhook>>> + Send + '_>>;

    /// Finds a non-deleted webhook by id alone.
    fn find_webhook_by_id(
        &self,
        id: WebhookId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Webhook>>> + Send + '_>>;

    /// Adds jobs to the dispatch queue in one write.
    fn enqueue_jobs(
        &self,
        jobs: Vec<DispatchJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Claims pending jobs and jobs whose claim is older than
    /// `claim_timeout` as of `now`.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` in production so concurrent workers
    /// never claim the same job.
    fn claim_jobs(
        &self,
        batch_size: usize,
        claim_timeout: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DispatchJob>>> + Send + '_>>;

    /// Marks a job as processed.
    fn mark_job_done(
        &self,
        id: DispatchJobId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Appends a delivery to the audit log.
    fn record_delivery(
        &self,
        delivery: WebhookDelivery,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Finds a delivery by id.
    fn find_delivery(
        &self,
        id: DeliveryId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<WebhookDelivery>>> + Send + '_>>;

    /// Finds the newest deliveries of a webhook, newest first.
    fn find_deliveries(
        &self,
        webhook_id: WebhookId,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<WebhookDelivery>>> + Send + '_>>;
}

/// Production storage backed by the Postgres repositories.
pub struct PostgresWebhookStorage {
    storage: Arc<Storage>,
}

impl PostgresWebhookStorage {
    /// Creates a new PostgreSQL storage adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl WebhookStorage for PostgresWebhookStorage {
    fn find_active_webhooks(
        &self,
        organisation_id: OrganisationId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Webhook>>> + Send + '_>> {
        Box::pin(async move { self.storage.webhooks.find_active_by_organisation(organisation_id).await })
    }

    fn find_webhook(
        &self,
        id: WebhookId,
        organisation_id: OrganisationId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Webhook>>> + Send + '_>> {
        Box::pin(async move {
            self.storage.webhooks.find_by_id_and_organisation(id, organisation_id).await
        })
    }

    fn find_webhook_by_id(
        &self,
        id: WebhookId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Webhook>>> + Send + '_>> {
        Box::pin(async move { self.storage.webhooks.find_by_id(id).await })
    }

    fn enqueue_jobs(
        &self,
        jobs: Vec<DispatchJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.storage.dispatch_jobs.enqueue(&jobs).await })
    }

    fn claim_jobs(
        &self,
        batch_size: usize,
        claim_timeout: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DispatchJob>>> + Send + '_>> {
        Box::pin(async move {
            self.storage.dispatch_jobs.claim_pending(batch_size, claim_timeout, now).await
        })
    }

    fn mark_job_done(
        &self,
        id: DispatchJobId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.storage.dispatch_jobs.mark_done(id).await })
    }

    fn record_delivery(
        &self,
        delivery: WebhookDelivery,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.storage.webhook_deliveries.insert(&delivery).await })
    }

    fn find_delivery(
        &self,
        id: DeliveryId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<WebhookDelivery>>> + Send + '_>> {
        Box::pin(async move { self.storage.webhook_deliveries.find_by_id(id).await })
    }

    fn find_deliveries(
        &self,
        webhook_id: WebhookId,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<WebhookDelivery>>> + Send + '_>> {
        Box::pin(async move { self.storage.webhook_deliveries.find_by_webhook(webhook_id, limit).await })
    }
}

pub mod mock {
    //! In-memory webhook storage for tests.

    use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc, time::Duration};

    use chrono::{DateTime, Utc};
    use consentry_core::{
        error::{CoreError, Result},
        models::{
            DeliveryId, DispatchJob, DispatchJobId, DispatchStatus, OrganisationId, Webhook,
            WebhookDelivery, WebhookId,
        },
    };
    use tokio::sync::RwLock;

    use super::WebhookStorage;

    /// Mock webhook storage with failure injection.
    #[derive(Clone, Default)]
    pub struct MockWebhookStorage {
        webhooks: Arc<RwLock<HashMap<WebhookId, Webhook>>>,
        jobs: Arc<RwLock<Vec<DispatchJob>>>,
        deliveries: Arc<RwLock<Vec<WebhookDelivery>>>,
        record_error: Arc<RwLock<Option<CoreError>>>,
    }

    impl MockWebhookStorage {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Adds or replaces a webhook.
        pub async fn put_webhook(&self, webhook: Webhook) {
            self.webhooks.write().await.insert(webhook.id, webhook);
        }

        /// Makes the next `record_delivery` fail with the given error.
        pub async fn inject_record_error(&self, error: CoreError) {
            *self.record_error.write().await = Some(error);
        }

        /// Every job ever enqueued, in enqueue order.
        pub async fn jobs(&self) -> Vec<DispatchJob> {
            self.jobs.read().await.clone()
        }

        /// Number of jobs still pending.
        pub async fn pending_count(&self) -> usize {
            self.jobs.read().await.iter().filter(|j| j.status == DispatchStatus::Pending).count()
        }

        /// Every recorded delivery, in record order.
        pub async fn deliveries(&self) -> Vec<WebhookDelivery> {
            self.deliveries.read().await.clone()
        }
    }

    impl WebhookStorage for MockWebhookStorage {
        fn find_active_webhooks(
            &self,
            organisation_id: OrganisationId,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Webhook>>> + Send + '_>> {
            Box::pin(async move {
                let mut found: Vec<Webhook> = self
                    .webhooks
                    .read()
                    .await
                    .values()
                    .filter(|w| w.organisation_id == organisation_id && w.is_active())
                    .cloned()
                    .collect();
                found.sort_by_key(|w| w.timestamp);
                Ok(found)
            })
        }

        fn find_webhook(
            &self,
            id: WebhookId,
            organisation_id: OrganisationId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Webhook>>> + Send + '_>> {
            Box::pin(async move {
                Ok(self
                    .webhooks
                    .read()
                    .await
                    .get(&id)
                    .filter(|w| w.organisation_id == organisation_id && !w.is_deleted)
                    .cloned())
            })
        }

        fn find_webhook_by_id(
            &self,
            id: WebhookId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Webhook>>> + Send + '_>> {
            Box::pin(async move {
                Ok(self.webhooks.read().await.get(&id).filter(|w| !w.is_deleted).cloned())
            })
        }

        fn enqueue_jobs(
            &self,
            jobs: Vec<DispatchJob>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.jobs.write().await.extend(jobs);
                Ok(())
            })
        }

        fn claim_jobs(
            &self,
            batch_size: usize,
            claim_timeout: Duration,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<DispatchJob>>> + Send + '_>> {
            Box::pin(async move {
                let stale_before = now
                    - chrono::Duration::from_std(claim_timeout)
                        .unwrap_or_else(|_| chrono::Duration::zero());

                let mut jobs = self.jobs.write().await;
                let mut claimed = Vec::new();
                for job in jobs.iter_mut() {
                    if claimed.len() >= batch_size {
                        break;
                    }
                    let claimable = match job.status {
                        DispatchStatus::Pending => true,
                        DispatchStatus::Claimed => job.claimed_at.is_some_and(|at| at < stale_before),
                        DispatchStatus::Done => false,
                    };
                    if claimable {
                        job.status = DispatchStatus::Claimed;
                        job.claimed_at = Some(now);
                        claimed.push(job.clone());
                    }
                }
                Ok(claimed)
            })
        }

        fn mark_job_done(
            &self,
            id: DispatchJobId,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                if let Some(job) = self.jobs.write().await.iter_mut().find(|j| j.id == id) {
                    job.status = DispatchStatus::Done;
                }
                Ok(())
            })
        }

        fn record_delivery(
            &self,
            delivery: WebhookDelivery,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                if let Some(error) = self.record_error.write().await.take() {
                    return Err(error);
                }
                self.deliveries.write().await.push(delivery);
                Ok(())
            })
        }

        fn find_delivery(
            &self,
            id: DeliveryId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<WebhookDelivery>>> + Send + '_>> {
            Box::pin(async move {
                Ok(self.deliveries.read().await.iter().find(|d| d.id == id).cloned())
            })
        }

        fn find_deliveries(
            &self,
            webhook_id: WebhookId,
            limit: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<WebhookDelivery>>> + Send + '_>> {
            Box::pin(async move {
                let mut found: Vec<WebhookDelivery> = self
                    .deliveries
                    .read()
                    .await
                    .iter()
                    .filter(|d| d.webhook_id == webhook_id)
                    .cloned()
                    .collect();
                // Record order breaks ties between equal start timestamps.
                found.reverse();
                found.sort_by(|a, b| b.execution_start_timestamp.cmp(&a.execution_start_timestamp));
                found.truncate(limit);
                Ok(found)
            })
        }
    }
}
