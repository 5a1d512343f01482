//! Repository for revision chain persistence.
//!
//! Revisions are never deleted and only `successor_id` is ever updated.
//! Appending a revision inserts the successor and then links the
//! predecessor to it in one transaction. The predecessor update is
//! conditional on `successor_id IS NULL`, and
//! `(object_id, schema_name, predecessor_hash)` is unique. Together these keep every chain a single linked list under
//! concurrent writers.

use std::sync::Arc;

use sqlx::{Executor, PgPool, Postgres, Transaction};

use crate::{
    error::{CoreError, Result},
    models::{Revision, RevisionId, SchemaName},
};

const REVISION_COLUMNS: &str = r"
    id, schema_name, object_id, signed_without_object_id, timestamp,
    authorized_by_individual_id, authorized_by_other_id,
    predecessor_hash, predecessor_signature, object_data,
    successor_id, serialized_snapshot, serialized_hash
";

/// Repository for revision database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Inserts a revision without touching any predecessor.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConstraintViolation` if another revision already
    /// claims the same predecessor.
    pub async fn insert(&self, revision: &Revision) -> Result<()> {
        self.insert_impl(&*self.pool, revision).await
    }

    /// Inserts a revision within a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails.
    pub async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        revision: &Revision,
    ) -> Result<()> {
        self.insert_impl(&mut **tx, revision).await
    }

    async fn insert_impl<'e, E>(&self, executor: E, revision: &Revision) -> Result<()>
    where
        E: Executor<'e, Database = Postgres>,
    {
        if revision.is_draft() {
            return Err(CoreError::InvalidInput("draft revisions cannot be stored".to_string()));
        }

        sqlx::query(
            r"
            INSERT INTO revisions (
                id, schema_name, object_id, signed_without_object_id, timestamp,
                authorized_by_individual_id, authorized_by_other_id,
                predecessor_hash, predecessor_signature, object_data,
                successor_id, serialized_snapshot, serialized_hash
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ",
        )
        .bind(revision.id)
        .bind(revision.schema_name)
        .bind(&revision.object_id)
        .bind(revision.signed_without_object_id)
        .bind(revision.timestamp)
        .bind(&revision.authorized_by_individual_id)
        .bind(&revision.authorized_by_other_id)
        .bind(&revision.predecessor_hash)
        .bind(&revision.predecessor_signature)
        .bind(&revision.object_data)
        .bind(revision.successor_id)
        .bind(&revision.serialized_snapshot)
        .bind(&revision.serialized_hash)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Appends `next` to a chain in a single transaction.
    ///
    /// `next` is inserted first so the foreign key on `successor_id` holds.
    /// When `previous` is given its `successor_id` is then set to `next.id`,
    /// but only if it is still unset. When `previous` is `None`, `next` must
    /// be the first revision of its chain.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Conflict` if a concurrent writer appended first.
    pub async fn append(&self, previous: Option<&Revision>, next: &Revision) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        match self.insert_in_tx(&mut tx, next).await {
            Ok(()) => {},
            Err(CoreError::ConstraintViolation(msg)) => {
                tx.rollback().await?;
                return Err(CoreError::Conflict(msg));
            },
            Err(e) => return Err(e),
        }

        if let Some(previous) = previous {
            let updated = sqlx::query(
                r"
                UPDATE revisions
                SET successor_id = $2
                WHERE id = $1 AND successor_id IS NULL
                ",
            )
            .bind(previous.id)
            .bind(next.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated == 0 {
                tx.rollback().await?;
                return Err(CoreError::Conflict(format!(
                    "revision {} was superseded concurrently",
                    previous.id
                )));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Finds a revision by id.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, id: RevisionId) -> Result<Option<Revision>> {
        let query = format!("SELECT {REVISION_COLUMNS} FROM revisions WHERE id = $1");
        let revision =
            sqlx::query_as::<_, Revision>(&query).bind(id).fetch_optional(&*self.pool).await?;

        Ok(revision)
    }

    /// Finds a revision by id, restricted to one schema.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id_and_schema(
        &self,
        id: RevisionId,
        schema_name: SchemaName,
    ) -> Result<Option<Revision>> {
        let query = format!(
            "SELECT {REVISION_COLUMNS} FROM revisions WHERE id = $1 AND schema_name = $2"
        );
        let revision = sqlx::query_as::<_, Revision>(&query)
            .bind(id)
            .bind(schema_name)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(revision)
    }

    /// Finds every revision of an object, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_object(
        &self,
        object_id: &str,
        schema_name: SchemaName,
    ) -> Result<Vec<Revision>> {
        let query = format!(
            r"
            SELECT {REVISION_COLUMNS} FROM revisions
            WHERE object_id = $1 AND schema_name = $2
            ORDER BY timestamp DESC
            "
        );
        let revisions = sqlx::query_as::<_, Revision>(&query)
            .bind(object_id)
            .bind(schema_name)
            .fetch_all(&*self.pool)
            .await?;

        Ok(revisions)
    }

    /// Finds the head of an object's chain: the revision with no successor.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_head(
        &self,
        object_id: &str,
        schema_name: SchemaName,
    ) -> Result<Option<Revision>> {
        let query = format!(
            r"
            SELECT {REVISION_COLUMNS} FROM revisions
            WHERE object_id = $1 AND schema_name = $2 AND successor_id IS NULL
            ORDER BY timestamp DESC
            LIMIT 1
            "
        );
        let revision = sqlx::query_as::<_, Revision>(&query)
            .bind(object_id)
            .bind(schema_name)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(revision)
    }
}
