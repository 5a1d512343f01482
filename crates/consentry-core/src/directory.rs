//! Lookups of organisations and individuals owned by other services.
//!
//! The audit core only needs display details for audit log lines and the
//! organisation's webhook event allow-list. Everything else about these
//! records lives elsewhere.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    models::{IndividualId, OrganisationId, WebhookEventType},
};

/// Organisation details relevant to the audit core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organisation {
    /// Organisation identifier.
    pub id: OrganisationId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Event types the organisation allows webhooks to be fired for.
    pub enabled_webhook_events: Vec<WebhookEventType>,
}

impl Organisation {
    /// Returns true if the organisation allows the event type.
    pub fn allows(&self, event_type: WebhookEventType) -> bool {
        self.enabled_webhook_events.contains(&event_type)
    }
}

/// Individual details relevant to the audit core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Individual {
    /// Individual identifier.
    pub id: IndividualId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
}

/// Source of organisation details.
#[async_trait]
pub trait OrganisationDirectory: Send + Sync {
    /// Looks up an organisation. Returns `None` if it does not exist.
    async fn organisation(&self, id: OrganisationId) -> Result<Option<Organisation>>;
}

/// Source of individual details.
#[async_trait]
pub trait IndividualDirectory: Send + Sync {
    /// Looks up an individual. Returns `None` if they do not exist.
    async fn individual(&self, id: IndividualId) -> Result<Option<Individual>>;
}
