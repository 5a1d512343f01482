//! Consentry audit-integrity service.
//!
//! Connects to PostgreSQL, creates the audit tables and runs the webhook
//! dispatch workers until a shutdown signal arrives.

mod config;
mod directory;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use consentry_core::{storage::Storage, Clock, RealClock};
use consentry_webhook::{Dispatcher, PostgresWebhookStorage, WorkerPool};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{config::Config, directory::PostgresDirectory};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    info!("starting consentry audit service");
    info!(
        database_url = %config.database_url_masked(),
        max_connections = config.database_max_connections,
        worker_count = config.worker_count,
        revision_conflict_retries = config.to_revision_chain_config().max_conflict_retries,
        "configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("database connection pool established");

    consentry_core::storage::migrate(&db_pool).await.context("failed to run migrations")?;
    info!("database migrations completed");

    let storage = Arc::new(Storage::new(db_pool.clone()));
    let directory = Arc::new(PostgresDirectory::new(db_pool.clone()));
    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
    let dispatcher_config = config.to_dispatcher_config();
    let shutdown_timeout = dispatcher_config.shutdown_timeout;

    let dispatcher = Arc::new(
        Dispatcher::new(
            Arc::new(PostgresWebhookStorage::new(storage)),
            directory.clone(),
            directory,
            clock.clone(),
            dispatcher_config,
        )
        .context("failed to create webhook dispatcher")?,
    );

    let mut pool = WorkerPool::new(dispatcher, clock, CancellationToken::new());
    pool.spawn_workers().await;
    info!("consentry is dispatching webhooks");

    shutdown_signal().await;
    info!("shutdown signal received, starting graceful shutdown");

    if let Err(e) = pool.shutdown_graceful(shutdown_timeout).await {
        error!(error = %e, "dispatch workers did not stop cleanly");
    }

    db_pool.close().await;
    info!("database connections closed");

    info!("consentry shutdown complete");
    Ok(())
}

/// Installs the fmt subscriber, preferring `RUST_LOG` from the environment.
fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

/// Creates the database connection pool, retrying while the database starts.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);
    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .idle_timeout(Duration::from_secs(config.database_idle_timeout))
            .max_lifetime(Duration::from_secs(config.database_max_lifetime))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .execute(&pool)
                    .await
                    .context("failed to verify database connection")?;
                return Ok(pool);
            },
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool after retries");
            },
        }
    }
}

/// Waits for CTRL+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received CTRL+C signal"),
        _ = terminate => info!("received SIGTERM signal"),
    }
}
