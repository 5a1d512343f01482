//! Database access layer for the audit core.
//!
//! The repositories translate between domain models and Postgres rows.
//! All SQL lives in this module.

use std::sync::Arc;

use sqlx::PgPool;

pub mod dispatch_jobs;
pub mod revisions;
pub mod signatures;
pub mod webhook_deliveries;
pub mod webhooks;

use crate::error::Result;

/// Container for all repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Revision chains.
    pub revisions: Arc<revisions::Repository>,

    /// Signature attestations.
    pub signatures: Arc<signatures::Repository>,

    /// Webhook subscriptions.
    pub webhooks: Arc<webhooks::Repository>,

    /// Webhook delivery audit log.
    pub webhook_deliveries: Arc<webhook_deliveries::Repository>,

    /// Persisted dispatch queue.
    pub dispatch_jobs: Arc<dispatch_jobs::Repository>,

    pool: Arc<PgPool>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            revisions: Arc::new(revisions::Repository::new(pool.clone())),
            signatures: Arc::new(signatures::Repository::new(pool.clone())),
            webhooks: Arc::new(webhooks::Repository::new(pool.clone())),
            webhook_deliveries: Arc::new(webhook_deliveries::Repository::new(pool.clone())),
            dispatch_jobs: Arc::new(dispatch_jobs::Repository::new(pool.clone())),
            pool,
        }
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.pool).await?;
        Ok(())
    }
}

const SCHEMA: &[(&str, &str)] = &[
    (
        "revisions",
        r"
        CREATE TABLE IF NOT EXISTS revisions (
            id UUID PRIMARY KEY,
            schema_name TEXT NOT NULL,
            object_id TEXT NOT NULL,
            signed_without_object_id BOOLEAN NOT NULL DEFAULT FALSE,
            timestamp TIMESTAMPTZ NOT NULL,
            authorized_by_individual_id TEXT NOT NULL DEFAULT '',
            authorized_by_other_id TEXT NOT NULL DEFAULT '',
            predecessor_hash TEXT NOT NULL DEFAULT '',
            predecessor_signature TEXT NOT NULL DEFAULT '',
            object_data TEXT NOT NULL,
            successor_id UUID REFERENCES revisions(id),
            serialized_snapshot TEXT NOT NULL,
            serialized_hash TEXT NOT NULL,
            UNIQUE (object_id, schema_name, predecessor_hash),
            UNIQUE (successor_id)
        )
        ",
    ),
    (
        "revisions object index",
        r"
        CREATE INDEX IF NOT EXISTS idx_revisions_object
        ON revisions(object_id, schema_name, timestamp DESC)
        ",
    ),
    (
        "signatures",
        r"
        CREATE TABLE IF NOT EXISTS signatures (
            id UUID PRIMARY KEY,
            payload TEXT NOT NULL DEFAULT '',
            signature TEXT NOT NULL DEFAULT '',
            verification_method TEXT NOT NULL DEFAULT '',
            verification_payload TEXT NOT NULL DEFAULT '',
            verification_payload_hash TEXT NOT NULL DEFAULT '',
            verification_artifact TEXT NOT NULL DEFAULT '',
            verification_signed_by TEXT NOT NULL DEFAULT '',
            verification_signed_as TEXT NOT NULL DEFAULT '',
            verification_jws_header TEXT NOT NULL DEFAULT '',
            timestamp TIMESTAMPTZ,
            signed_without_object_reference BOOLEAN NOT NULL DEFAULT FALSE,
            object_type TEXT NOT NULL,
            object_reference TEXT NOT NULL
        )
        ",
    ),
    (
        "webhooks",
        r"
        CREATE TABLE IF NOT EXISTS webhooks (
            id UUID PRIMARY KEY,
            organisation_id UUID NOT NULL,
            payload_url TEXT NOT NULL,
            content_type TEXT NOT NULL,
            subscribed_events TEXT[] NOT NULL DEFAULT '{}',
            disabled BOOLEAN NOT NULL DEFAULT FALSE,
            secret_key TEXT NOT NULL DEFAULT '',
            skip_ssl_verification BOOLEAN NOT NULL DEFAULT FALSE,
            timestamp TIMESTAMPTZ NOT NULL,
            is_deleted BOOLEAN NOT NULL DEFAULT FALSE
        )
        ",
    ),
    (
        "webhooks organisation index",
        r"
        CREATE INDEX IF NOT EXISTS idx_webhooks_organisation
        ON webhooks(organisation_id)
        WHERE is_deleted = FALSE
        ",
    ),
    (
        "webhook_deliveries",
        r"
        CREATE TABLE IF NOT EXISTS webhook_deliveries (
            id UUID PRIMARY KEY,
            webhook_id UUID NOT NULL REFERENCES webhooks(id),
            user_id TEXT NOT NULL,
            webhook_event_type TEXT NOT NULL,
            request_headers JSONB NOT NULL,
            request_payload TEXT NOT NULL,
            response_headers JSONB NOT NULL,
            response_body TEXT NOT NULL,
            response_status_code INTEGER,
            response_status_str TEXT NOT NULL,
            execution_start_timestamp TIMESTAMPTZ NOT NULL,
            execution_end_timestamp TIMESTAMPTZ NOT NULL,
            status TEXT NOT NULL,
            status_description TEXT NOT NULL
        )
        ",
    ),
    (
        "webhook_deliveries webhook index",
        r"
        CREATE INDEX IF NOT EXISTS idx_webhook_deliveries_webhook
        ON webhook_deliveries(webhook_id, execution_start_timestamp DESC)
        ",
    ),
    (
        "webhook_dispatch_jobs",
        r"
        CREATE TABLE IF NOT EXISTS webhook_dispatch_jobs (
            id UUID PRIMARY KEY,
            organisation_id UUID NOT NULL,
            webhook_id UUID NOT NULL,
            user_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            envelope TEXT NOT NULL,
            status TEXT NOT NULL,
            enqueued_at TIMESTAMPTZ NOT NULL,
            claimed_at TIMESTAMPTZ
        )
        ",
    ),
    (
        "webhook_dispatch_jobs status index",
        r"
        CREATE INDEX IF NOT EXISTS idx_webhook_dispatch_jobs_status
        ON webhook_dispatch_jobs(status, enqueued_at)
        WHERE status IN ('pending', 'claimed')
        ",
    ),
];

/// Creates every table and index the audit core needs.
///
/// Statements are idempotent so this can run on every start.
///
/// # Errors
///
/// Returns `CoreError::Database` naming the statement that failed.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    for (name, statement) in SCHEMA {
        sqlx::query(statement).execute(pool).await.map_err(|e| {
            crate::error::CoreError::Database(format!("failed to create {name}: {e}"))
        })?;
        tracing::debug!(object = name, "schema object ensured");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_can_be_created() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = Storage::new(pool);
    }

    #[test]
    fn schema_statements_are_idempotent() {
        for (name, statement) in SCHEMA {
            assert!(statement.contains("IF NOT EXISTS"), "{name} must be idempotent");
        }
    }
}
