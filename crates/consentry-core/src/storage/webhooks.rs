//! Repository for webhook subscriptions.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{OrganisationId, Webhook, WebhookId},
};

/// Repository for webhook database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

fn event_strings(webhook: &Webhook) -> Vec<String> {
    webhook.subscribed_events.iter().map(|event| event.as_str().to_string()).collect()
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Stores a new webhook.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails.
    pub async fn insert(&self, webhook: &Webhook) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO webhooks (
                id, organisation_id, payload_url, content_type, subscribed_events,
                disabled, secret_key, skip_ssl_verification, timestamp, is_deleted
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(webhook.id)
        .bind(webhook.organisation_id)
        .bind(&webhook.payload_url)
        .bind(webhook.content_type)
        .bind(event_strings(webhook))
        .bind(webhook.disabled)
        .bind(&webhook.secret_key)
        .bind(webhook.skip_ssl_verification)
        .bind(webhook.timestamp)
        .bind(webhook.is_deleted)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Replaces the mutable configuration of a webhook.
    ///
    /// Returns `false` if the webhook does not exist or was deleted.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn update(&self, webhook: &Webhook) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE webhooks
            SET payload_url = $2,
                content_type = $3,
                subscribed_events = $4,
                disabled = $5,
                secret_key = $6,
                skip_ssl_verification = $7
            WHERE id = $1 AND is_deleted = FALSE
            ",
        )
        .bind(webhook.id)
        .bind(&webhook.payload_url)
        .bind(webhook.content_type)
        .bind(event_strings(webhook))
        .bind(webhook.disabled)
        .bind(&webhook.secret_key)
        .bind(webhook.skip_ssl_verification)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Soft-deletes a webhook.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn soft_delete(&self, id: WebhookId) -> Result<bool> {
        let result = sqlx::query("UPDATE webhooks SET is_deleted = TRUE WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Finds a non-deleted webhook by id.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, id: WebhookId) -> Result<Option<Webhook>> {
        let webhook = sqlx::query_as::<_, Webhook>(
            r"
            SELECT id, organisation_id, payload_url, content_type, subscribed_events,
                   disabled, secret_key, skip_ssl_verification, timestamp, is_deleted
            FROM webhooks
            WHERE id = $1 AND is_deleted = FALSE
            ",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(webhook)
    }

    /// Finds a non-deleted webhook by id within an organisation.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id_and_organisation(
        &self,
        id: WebhookId,
        organisation_id: OrganisationId,
    ) -> Result<Option<Webhook>> {
        let webhook = sqlx::query_as::<_, Webhook>(
            r"
            SELECT id, organisation_id, payload_url, content_type, subscribed_events,
                   disabled, secret_key, skip_ssl_verification, timestamp, is_deleted
            FROM webhooks
            WHERE id = $1 AND organisation_id = $2 AND is_deleted = FALSE
            ",
        )
        .bind(id)
        .bind(organisation_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(webhook)
    }

    /// Finds every webhook of an organisation that is neither deleted nor
    /// disabled.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_active_by_organisation(
        &self,
        organisation_id: OrganisationId,
    ) -> Result<Vec<Webhook>> {
        let webhooks = sqlx::query_as::<_, Webhook>(
            r"
            SELECT id, organisation_id, payload_url, content_type, subscribed_events,
                   disabled, secret_key, skip_ssl_verification, timestamp, is_deleted
            FROM webhooks
            WHERE organisation_id = $1 AND is_deleted = FALSE AND disabled = FALSE
            ORDER BY timestamp ASC
            ",
        )
        .bind(organisation_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(webhooks)
    }
}
