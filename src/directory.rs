//! Organisation and individual lookups against tables owned by the
//! organisation and identity services.

use std::sync::Arc;

use async_trait::async_trait;
use consentry_core::{
    error::Result, Individual, IndividualDirectory, IndividualId, Organisation,
    OrganisationDirectory, OrganisationId, WebhookEventType,
};
use sqlx::PgPool;
use tracing::warn;

/// Reads the `organisations` and `individuals` tables.
#[derive(Clone)]
pub struct PostgresDirectory {
    pool: Arc<PgPool>,
}

impl PostgresDirectory {
    /// Creates a directory over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl OrganisationDirectory for PostgresDirectory {
    async fn organisation(&self, id: OrganisationId) -> Result<Option<Organisation>> {
        let row: Option<(String, String, Vec<String>)> = sqlx::query_as(
            "SELECT name, email, enabled_webhook_events FROM organisations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|(name, email, events)| Organisation {
            id,
            name,
            email,
            enabled_webhook_events: events
                .iter()
                .filter_map(|event| match event.parse::<WebhookEventType>() {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!(organisation_id = %id, error = %e, "ignoring unknown webhook event type");
                        None
                    },
                })
                .collect(),
        }))
    }
}

#[async_trait]
impl IndividualDirectory for PostgresDirectory {
    async fn individual(&self, id: IndividualId) -> Result<Option<Individual>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT name, email FROM individuals WHERE id = $1")
                .bind(id)
                .fetch_optional(&*self.pool)
                .await?;

        Ok(row.map(|(name, email)| Individual { id, name, email }))
    }
}
