//! Webhook dispatcher.
//!
//! Triggering an event only enqueues one dispatch job per subscribed
//! webhook and returns. Workers later claim jobs, POST the signed envelope
//! and append a delivery record whatever the outcome. A failed POST is
//! recorded and not retried.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use consentry_core::{
    ConsentRecord, Clock, DeliveryId, DeliveryStatus, DispatchJob, DispatchJobId, IndividualDirectory,
    IndividualId, Organisation, OrganisationDirectory, OrganisationId, Webhook, WebhookContentType,
    WebhookDelivery, WebhookEventType, WebhookId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    client::{ClientConfig, OutboundRequest, WebhookClient},
    envelope::{ConsentEventData, WebhookEnvelope},
    error::{Result, WebhookError},
    signing,
    storage::WebhookStorage,
};

/// Configuration for the dispatcher and its workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Number of concurrent dispatch workers.
    pub worker_count: usize,
    /// Maximum jobs to claim per batch.
    pub batch_size: usize,
    /// How often idle workers poll for new jobs.
    pub poll_interval: Duration,
    /// How long a claimed job may stay unfinished before it can be claimed
    /// again.
    pub claim_timeout: Duration,
    /// Maximum time to wait for workers to stop.
    pub shutdown_timeout: Duration,
    /// HTTP client configuration.
    pub client_config: ClientConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: crate::DEFAULT_WORKER_COUNT,
            batch_size: crate::DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(1),
            claim_timeout: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(30),
            client_config: ClientConfig::default(),
        }
    }
}

/// Outcome of a ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResult {
    /// HTTP status code.
    pub status_code: u16,
    /// Status line, e.g. `200 OK`.
    pub status_str: String,
    /// Round-trip time.
    pub duration: Duration,
}

/// Fans out events to webhooks and records every delivery.
#[derive(Clone)]
pub struct Dispatcher {
    storage: Arc<dyn WebhookStorage>,
    organisations: Arc<dyn OrganisationDirectory>,
    individuals: Arc<dyn IndividualDirectory>,
    client: Arc<WebhookClient>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Creates a dispatcher.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(
        storage: Arc<dyn WebhookStorage>,
        organisations: Arc<dyn OrganisationDirectory>,
        individuals: Arc<dyn IndividualDirectory>,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Result<Self> {
        let client = Arc::new(WebhookClient::new(config.client_config.clone())?);
        Ok(Self { storage, organisations, individuals, client, clock, config })
    }

    /// Dispatcher configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Raises a consent event if the organisation has it enabled.
    ///
    /// Returns the ids of the enqueued jobs, empty when the organisation
    /// does not allow the event type or no webhook subscribes to it.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::NotFound` if the organisation does not exist,
    /// or a storage error if enqueueing fails. Delivery outcomes are never
    /// reported here.
    pub async fn trigger_consent_event(
        &self,
        record: &ConsentRecord,
        organisation_id: OrganisationId,
        event_type: WebhookEventType,
    ) -> Result<Vec<DispatchJobId>> {
        let organisation = self.organisation(organisation_id).await?;

        if !organisation.allows(event_type) {
            debug!(
                organisation_id = %organisation_id,
                event_type = %event_type,
                "event type not enabled for organisation"
            );
            return Ok(Vec::new());
        }

        let data = serde_json::to_value(ConsentEventData::from(record))?;
        self.enqueue_for(&organisation, data, event_type, &record.individual_id.to_string())
            .await
    }

    /// Enqueues an event for every active webhook subscribed to it.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::NotFound` if the organisation does not exist,
    /// or a storage error if enqueueing fails.
    pub async fn trigger_webhooks(
        &self,
        organisation_id: OrganisationId,
        data: serde_json::Value,
        event_type: WebhookEventType,
        actor_id: &str,
    ) -> Result<Vec<DispatchJobId>> {
        let organisation = self.organisation(organisation_id).await?;
        self.enqueue_for(&organisation, data, event_type, actor_id).await
    }

    async fn enqueue_for(
        &self,
        organisation: &Organisation,
        data: serde_json::Value,
        event_type: WebhookEventType,
        actor_id: &str,
    ) -> Result<Vec<DispatchJobId>> {
        let actor = self.actor_label(actor_id).await;
        info!(
            organisation_id = %organisation.id,
            organisation = %organisation.name,
            actor = %actor,
            event_type = %event_type,
            "webhook event triggered"
        );

        let now = self.clock.now_utc();
        let webhooks = self.storage.find_active_webhooks(organisation.id).await?;

        let mut jobs = Vec::new();
        for webhook in webhooks.iter().filter(|w| w.is_subscribed(event_type)) {
            let envelope = WebhookEnvelope::new(webhook.id, event_type, data.clone(), now);
            jobs.push(DispatchJob::new(
                organisation.id,
                webhook.id,
                actor_id,
                event_type,
                envelope.to_json()?,
                now,
            ));
        }

        let ids: Vec<DispatchJobId> = jobs.iter().map(|job| job.id).collect();
        if !jobs.is_empty() {
            self.storage.enqueue_jobs(jobs).await?;
        }

        debug!(
            organisation_id = %organisation.id,
            event_type = %event_type,
            active_webhooks = webhooks.len(),
            enqueued = ids.len(),
            "webhook jobs enqueued"
        );
        Ok(ids)
    }

    /// Delivers one queued job and records the delivery.
    ///
    /// Returns `None` without recording anything when the webhook no longer
    /// exists or is disabled.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::InvalidEnvelope` for an undecodable job or a
    /// storage error if the lookup or the delivery record write fails.
    /// Transport failures are recorded, not returned.
    pub async fn process_job(&self, job: &DispatchJob) -> Result<Option<WebhookDelivery>> {
        let mut envelope = WebhookEnvelope::parse(&job.envelope)?;

        let Some(webhook) = self.storage.find_webhook(job.webhook_id, job.organisation_id).await?
        else {
            warn!(
                webhook_id = %job.webhook_id,
                organisation_id = %job.organisation_id,
                job_id = %job.id,
                "webhook no longer exists, dropping event"
            );
            return Ok(None);
        };

        if webhook.disabled {
            warn!(
                webhook_id = %webhook.id,
                job_id = %job.id,
                "webhook is disabled, dropping event"
            );
            return Ok(None);
        }

        envelope.delivery_id = DeliveryId::new();
        let delivery = self.deliver(&webhook, &envelope, &job.user_id).await?;
        Ok(Some(delivery))
    }

    async fn deliver(
        &self,
        webhook: &Webhook,
        envelope: &WebhookEnvelope,
        user_id: &str,
    ) -> Result<WebhookDelivery> {
        let span = info_span!(
            "webhook_delivery",
            webhook_id = %webhook.id,
            delivery_id = %envelope.delivery_id,
            event_type = %envelope.event_type,
        );

        self.send_and_record(webhook, envelope, user_id).instrument(span).await
    }

    async fn send_and_record(
        &self,
        webhook: &Webhook,
        envelope: &WebhookEnvelope,
        user_id: &str,
    ) -> Result<WebhookDelivery> {
        let json_body = envelope.to_json()?;
        let signed_at = self.clock.now_utc().timestamp();
        let headers = self.request_headers(webhook, signed_at, &json_body)?;
        let body = match webhook.content_type {
            WebhookContentType::Json => json_body.clone(),
            WebhookContentType::Form => serde_urlencoded::to_string(&[("payload", json_body.as_str())])?,
        };

        let request = OutboundRequest {
            url: webhook.payload_url.clone(),
            headers: headers.clone(),
            body,
            skip_ssl_verification: webhook.skip_ssl_verification,
        };

        let started = self.wall_clock();
        let result = self.client.post(&request).await;
        let finished = self.wall_clock();

        let mut delivery = WebhookDelivery {
            id: envelope.delivery_id,
            webhook_id: webhook.id,
            user_id: user_id.to_string(),
            webhook_event_type: envelope.event_type,
            request_headers: headers,
            request_payload: json_body,
            response_headers: HashMap::new(),
            response_body: String::new(),
            response_status_code: None,
            response_status_str: String::new(),
            execution_start_timestamp: started,
            execution_end_timestamp: finished,
            status: DeliveryStatus::Completed,
            status_description: String::new(),
        };

        match result {
            Ok(response) => {
                delivery.response_status_code = Some(response.status_code);
                delivery.response_status_str = response.status_str;
                delivery.response_headers = response.headers;
                delivery.response_body = response.body;
                if delivery.is_successful() {
                    info!(status = response.status_code, "webhook delivered");
                } else {
                    warn!(status = response.status_code, "webhook endpoint answered with non-success status");
                }
            },
            Err(e) => {
                warn!(error = %e, "webhook delivery failed");
                delivery.status = DeliveryStatus::Failed;
                delivery.status_description = e.to_string();
            },
        }

        self.storage.record_delivery(delivery.clone()).await?;
        Ok(delivery)
    }

    fn request_headers(
        &self,
        webhook: &Webhook,
        signed_at: i64,
        json_body: &str,
    ) -> Result<HashMap<String, String>> {
        let client_config = self.client.config();
        let mut headers = HashMap::from([
            ("Content-Type".to_string(), webhook.content_type.mime().to_string()),
            ("User-Agent".to_string(), client_config.user_agent.clone()),
            ("Accept".to_string(), "*/*".to_string()),
        ]);

        if webhook.has_secret() {
            headers.insert(
                client_config.signature_header.clone(),
                signing::signature_header(&webhook.secret_key, signed_at, json_body)?,
            );
        }

        Ok(headers)
    }

    /// Claims one batch of jobs and processes it.
    ///
    /// Returns the number of jobs claimed. Each job is marked done once
    /// processed, including when its POST failed or its webhook was gone.
    /// Jobs that hit a storage error stay claimed and become claimable again
    /// after the claim timeout.
    ///
    /// # Errors
    ///
    /// Returns a storage error if claiming fails.
    pub async fn process_pending(&self) -> Result<usize> {
        let jobs = self
            .storage
            .claim_jobs(self.config.batch_size, self.config.claim_timeout, self.wall_clock())
            .await?;
        let claimed = jobs.len();

        for job in jobs {
            match self.process_job(&job).await {
                Ok(_) => self.storage.mark_job_done(job.id).await?,
                Err(e) if e.is_permanent() => {
                    error!(job_id = %job.id, error = %e, "discarding undeliverable job");
                    self.storage.mark_job_done(job.id).await?;
                },
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "job processing failed, leaving it for reclaim");
                },
            }
        }

        Ok(claimed)
    }

    /// Sends an earlier delivery's envelope again.
    ///
    /// The job goes through the normal queue, so the new delivery gets its
    /// own id and record.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::NotFound` if the delivery or its webhook does
    /// not exist.
    pub async fn redeliver(&self, delivery_id: DeliveryId) -> Result<DispatchJobId> {
        let delivery = self.delivery(delivery_id).await?;
        let webhook = self
            .storage
            .find_webhook_by_id(delivery.webhook_id)
            .await?
            .ok_or_else(|| WebhookError::NotFound(format!("webhook {}", delivery.webhook_id)))?;

        // The stored payload keeps the original delivery id; a fresh one is
        // assigned when the job is processed.
        WebhookEnvelope::parse(&delivery.request_payload)?;

        let job = DispatchJob::new(
            webhook.organisation_id,
            webhook.id,
            delivery.user_id.clone(),
            delivery.webhook_event_type,
            delivery.request_payload.clone(),
            self.clock.now_utc(),
        );
        let job_id = job.id;
        self.storage.enqueue_jobs(vec![job]).await?;

        info!(
            delivery_id = %delivery_id,
            webhook_id = %webhook.id,
            job_id = %job_id,
            "webhook redelivery enqueued"
        );
        Ok(job_id)
    }

    /// POSTs an empty body to a webhook and reports the response.
    ///
    /// Nothing is recorded.
    ///
    /// # Errors
    ///
    /// Returns the transport error directly.
    pub async fn ping(&self, webhook: &Webhook) -> Result<PingResult> {
        let request = OutboundRequest {
            url: webhook.payload_url.clone(),
            headers: HashMap::from([
                ("Content-Type".to_string(), webhook.content_type.mime().to_string()),
                ("Accept".to_string(), "*/*".to_string()),
            ]),
            body: String::new(),
            skip_ssl_verification: webhook.skip_ssl_verification,
        };

        let response = self.client.post(&request).await?;
        debug!(webhook_id = %webhook.id, status = response.status_code, "webhook pinged");

        Ok(PingResult {
            status_code: response.status_code,
            status_str: response.status_str,
            duration: response.duration,
        })
    }

    /// Returns a delivery by id.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::NotFound` if no delivery has this id.
    pub async fn delivery(&self, id: DeliveryId) -> Result<WebhookDelivery> {
        self.storage
            .find_delivery(id)
            .await?
            .ok_or_else(|| WebhookError::NotFound(format!("delivery {id}")))
    }

    /// Returns the newest deliveries of a webhook, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn deliveries_for_webhook(
        &self,
        webhook_id: WebhookId,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>> {
        Ok(self.storage.find_deliveries(webhook_id, limit).await?)
    }

    /// Returns the newest delivery of a webhook, if any.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn last_delivery(&self, webhook_id: WebhookId) -> Result<Option<WebhookDelivery>> {
        Ok(self.storage.find_deliveries(webhook_id, 1).await?.into_iter().next())
    }

    async fn organisation(&self, id: OrganisationId) -> Result<Organisation> {
        self.organisations
            .organisation(id)
            .await?
            .ok_or_else(|| WebhookError::NotFound(format!("organisation {id}")))
    }

    async fn actor_label(&self, actor_id: &str) -> String {
        let Ok(individual_id) = actor_id.parse::<IndividualId>() else {
            return actor_id.to_string();
        };

        match self.individuals.individual(individual_id).await {
            Ok(Some(individual)) => format!("{} <{}>", individual.name, individual.email),
            Ok(None) => actor_id.to_string(),
            Err(e) => {
                debug!(actor_id, error = %e, "actor lookup failed");
                actor_id.to_string()
            },
        }
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.now_system())
    }
}
