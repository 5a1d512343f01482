//! Isolated PostgreSQL databases for repository tests.
//!
//! Each [`TestDatabase`] is a fresh database created through the server in
//! `DATABASE_URL` and migrated with [`consentry_core::storage::migrate`].
//! Call [`TestDatabase::cleanup`] at the end of a test to drop it.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use consentry_core::storage::{self, Storage};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// A migrated database that exists for the duration of one test.
#[derive(Debug)]
pub struct TestDatabase {
    pool: PgPool,
    admin_pool: PgPool,
    database_name: String,
}

impl TestDatabase {
    /// Creates and migrates a new database.
    ///
    /// Returns `Ok(None)` when `DATABASE_URL` is not set so that suites
    /// without a database server still run the in-memory tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable or migration fails.
    pub async fn isolated() -> Result<Option<Self>> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            warn!("DATABASE_URL not set, skipping postgres test");
            return Ok(None);
        };

        let base = database_url.parse::<PgConnectOptions>().context("failed to parse DATABASE_URL")?;

        let admin_pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(base.clone().database("postgres"))
            .await
            .context("failed to connect to admin database")?;

        let database_name = format!("consentry_test_{}", Uuid::new_v4().simple());
        sqlx::query(&format!("CREATE DATABASE \"{database_name}\""))
            .execute(&admin_pool)
            .await
            .with_context(|| format!("failed to create database {database_name}"))?;

        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(base.database(&database_name))
            .await
            .with_context(|| format!("failed to connect to {database_name}"))?;

        storage::migrate(&pool).await.context("failed to migrate test database")?;
        debug!(database = %database_name, "created isolated test database");

        Ok(Some(Self { pool, admin_pool, database_name }))
    }

    /// Pool connected to the test database.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Repositories over the test database.
    pub fn storage(&self) -> Arc<Storage> {
        Arc::new(Storage::new(self.pool.clone()))
    }

    /// Name of the test database.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Closes every connection and drops the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be dropped.
    pub async fn cleanup(self) -> Result<()> {
        self.pool.close().await;

        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", self.database_name))
            .execute(&self.admin_pool)
            .await
            .with_context(|| format!("failed to drop database {}", self.database_name))?;

        self.admin_pool.close().await;
        Ok(())
    }
}
