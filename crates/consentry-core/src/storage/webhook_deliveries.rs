//! Repository for the webhook delivery audit log.
//!
//! Deliveries are append-only: there is no update or delete.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{DeliveryId, WebhookDelivery, WebhookId},
};

const DELIVERY_COLUMNS: &str = r"
    id, webhook_id, user_id, webhook_event_type,
    request_headers, request_payload,
    response_headers, response_body, response_status_code, response_status_str,
    execution_start_timestamp, execution_end_timestamp,
    status, status_description
";

/// Repository for delivery record operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Records a delivery.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails.
    pub async fn insert(&self, delivery: &WebhookDelivery) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO webhook_deliveries (
                id, webhook_id, user_id, webhook_event_type,
                request_headers, request_payload,
                response_headers, response_body, response_status_code, response_status_str,
                execution_start_timestamp, execution_end_timestamp,
                status, status_description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(delivery.id)
        .bind(delivery.webhook_id)
        .bind(&delivery.user_id)
        .bind(delivery.webhook_event_type)
        .bind(sqlx::types::Json(&delivery.request_headers))
        .bind(&delivery.request_payload)
        .bind(sqlx::types::Json(&delivery.response_headers))
        .bind(&delivery.response_body)
        .bind(delivery.response_status_code.map(i32::from))
        .bind(&delivery.response_status_str)
        .bind(delivery.execution_start_timestamp)
        .bind(delivery.execution_end_timestamp)
        .bind(delivery.status)
        .bind(&delivery.status_description)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds a delivery by id.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, id: DeliveryId) -> Result<Option<WebhookDelivery>> {
        let query = format!("SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries WHERE id = $1");
        let delivery = sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(delivery)
    }

    /// Finds the most recent deliveries of a webhook, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_webhook(
        &self,
        webhook_id: WebhookId,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>> {
        let query = format!(
            r"
            SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries
            WHERE webhook_id = $1
            ORDER BY execution_start_timestamp DESC
            LIMIT $2
            "
        );
        let deliveries = sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(webhook_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&*self.pool)
            .await?;

        Ok(deliveries)
    }
}
