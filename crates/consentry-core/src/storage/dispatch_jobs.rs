//! Repository for the persisted webhook dispatch queue.
//!
//! Jobs are enqueued in the same call that decides which webhooks match an
//! event, so a crash after enqueue still leads to delivery. Workers claim
//! jobs with `FOR UPDATE SKIP LOCKED`; a claim that is not marked done
//! within the claim timeout becomes claimable again.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{DispatchJob, DispatchJobId},
};

/// Repository for dispatch job operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Enqueues jobs atomically: either all of them are stored or none.
    ///
    /// # Errors
    ///
    /// Returns error if any insert fails.
    pub async fn enqueue(&self, jobs: &[DispatchJob]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for job in jobs {
            sqlx::query(
                r"
                INSERT INTO webhook_dispatch_jobs (
                    id, organisation_id, webhook_id, user_id, event_type,
                    envelope, status, enqueued_at, claimed_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(job.id)
            .bind(job.organisation_id)
            .bind(job.webhook_id)
            .bind(&job.user_id)
            .bind(job.event_type)
            .bind(&job.envelope)
            .bind(job.status)
            .bind(job.enqueued_at)
            .bind(job.claimed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Claims up to `batch_size` jobs that are pending or whose claim expired.
    ///
    /// `now` stamps `claimed_at` and is the reference point for expiry.
    ///
    /// # Errors
    ///
    /// Returns error if database transaction fails.
    pub async fn claim_pending(
        &self,
        batch_size: usize,
        claim_timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<DispatchJob>> {
        let stale_before = now
            - chrono::Duration::from_std(claim_timeout).unwrap_or_else(|_| chrono::Duration::zero());

        let mut tx = self.pool.begin().await?;

        let ids: Vec<DispatchJobId> = sqlx::query_scalar(
            r"
            SELECT id FROM webhook_dispatch_jobs
            WHERE status = 'pending'
               OR (status = 'claimed' AND claimed_at < $1)
            ORDER BY enqueued_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            ",
        )
        .bind(stale_before)
        .bind(i64::try_from(batch_size).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let mut jobs = sqlx::query_as::<_, DispatchJob>(
            r"
            UPDATE webhook_dispatch_jobs
            SET status = 'claimed', claimed_at = $2
            WHERE id = ANY($1)
            RETURNING id, organisation_id, webhook_id, user_id, event_type,
                      envelope, status, enqueued_at, claimed_at
            ",
        )
        .bind(&ids)
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        jobs.sort_by_key(|job| job.enqueued_at);
        Ok(jobs)
    }

    /// Marks a job as processed.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn mark_done(&self, id: DispatchJobId) -> Result<()> {
        sqlx::query("UPDATE webhook_dispatch_jobs SET status = 'done' WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    /// Finds a job by id.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, id: DispatchJobId) -> Result<Option<DispatchJob>> {
        let job = sqlx::query_as::<_, DispatchJob>(
            r"
            SELECT id, organisation_id, webhook_id, user_id, event_type,
                   envelope, status, enqueued_at, claimed_at
            FROM webhook_dispatch_jobs
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(job)
    }

    /// Counts jobs still waiting for a worker.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn count_pending(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM webhook_dispatch_jobs WHERE status = 'pending'",
        )
        .fetch_one(&*self.pool)
        .await?;

        Ok(count.0)
    }
}
