//! Core domain models, storage and shared primitives for the consentry
//! audit core.
//!
//! Provides the versioned entities, revision and signature models, webhook
//! subscription and delivery types, strongly-typed identifiers, the error
//! taxonomy and the Postgres repositories. The revision, attestation and
//! webhook crates build on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod directory;
pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use directory::{Individual, IndividualDirectory, Organisation, OrganisationDirectory};
pub use error::{CoreError, Result};
pub use models::{
    Actor, ConsentRecord, ConsentState, DataAgreement, DataAttribute, DeliveryId, DeliveryStatus,
    DispatchJob, DispatchJobId, DispatchStatus, IndividualId, LawfulBasis, Lifecycle,
    OrganisationId, Policy, Revision, RevisionId, RevisionSnapshot, SchemaName, Signature,
    SignatureId, SignatureMaterial, Versioned, Webhook, WebhookContentType, WebhookDelivery,
    WebhookEventType, WebhookId,
};
pub use time::{Clock, RealClock, TestClock};
