//! HMAC-signed, audit-logged webhook dispatch.
//!
//! Organisations subscribe webhooks to domain events such as
//! `consent.allowed`. When an event is raised the [`Dispatcher`] enqueues
//! one job per subscribed, enabled webhook and returns immediately. Workers
//! claim jobs from PostgreSQL using `FOR UPDATE SKIP LOCKED`, POST the
//! envelope and append an immutable [`WebhookDelivery`] record whether the
//! request succeeded or not.
//!
//! # Delivery contract
//!
//! - **Envelope** - JSON with `deliveryID`, `webhookID`, `timestamp`, `type`
//!   and `data`. Form webhooks receive it as `payload=<json>`.
//! - **Signature** - when the webhook has a secret, the signature header
//!   carries `t=<unix seconds>,sig=<hex HMAC-SHA256 of "t.body">`.
//! - **No retries** - a failed POST is recorded as failed. Callers may
//!   [`Dispatcher::redeliver`] it later.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use consentry_core::{ConsentRecord, OrganisationId, WebhookEventType};
//! use consentry_webhook::{Dispatcher, WebhookError};
//!
//! # async fn example(dispatcher: Arc<Dispatcher>, record: ConsentRecord) -> Result<(), WebhookError> {
//! let event = WebhookEventType::for_opt_in(record.opt_in);
//! let jobs = dispatcher
//!     .trigger_consent_event(&record, record.organisation_id, event)
//!     .await?;
//! println!("queued {} deliveries", jobs.len());
//! # Ok(())
//! # }
//! ```
//!
//! [`WebhookDelivery`]: consentry_core::WebhookDelivery

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod signing;
pub mod storage;
pub mod view;
pub mod worker_pool;

pub use client::{ClientConfig, OutboundRequest, OutboundResponse, WebhookClient};
pub use dispatcher::{Dispatcher, DispatcherConfig, PingResult};
pub use envelope::{ConsentEventData, WebhookEnvelope};
pub use error::{Result, WebhookError};
pub use signing::{verify_signature_header, SignatureHeader, DEFAULT_SIGNATURE_HEADER};
pub use storage::{PostgresWebhookStorage, WebhookStorage};
pub use view::{DeliveryView, WebhookView};
pub use worker_pool::{DispatchStats, WorkerPool};

/// Default number of concurrent dispatch workers.
pub const DEFAULT_WORKER_COUNT: usize = 3;

/// Default batch size for claiming jobs from the queue.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
