//! Configuration for the consentry service.

use std::time::Duration;

use anyhow::{Context, Result};
use consentry_revision::RevisionChainConfig;
use consentry_webhook::{ClientConfig, DispatcherConfig, DEFAULT_SIGNATURE_HEADER};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "consentry.toml";
const ENV_PREFIX: &str = "CONSENTRY_";

/// Service configuration with defaults, file, and environment overrides.
///
/// Sources in priority order:
/// 1. Environment variables: `DATABASE_URL`, `RUST_LOG` and every field as
///    `CONSENTRY_<FIELD>`, e.g. `CONSENTRY_WORKER_COUNT`
/// 2. Configuration file (`consentry.toml`)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Database
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Maximum number of pooled connections.
    pub database_max_connections: u32,
    /// Minimum number of pooled connections.
    pub database_min_connections: u32,
    /// Connection acquire timeout in seconds.
    pub database_connection_timeout: u64,
    /// Idle connection timeout in seconds.
    pub database_idle_timeout: u64,
    /// Maximum connection lifetime in seconds.
    pub database_max_lifetime: u64,

    // Dispatch
    /// Number of dispatch workers.
    pub worker_count: usize,
    /// Jobs claimed per batch.
    pub batch_size: usize,
    /// Idle poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Seconds after which an unfinished claimed job may be claimed again.
    pub claim_timeout_seconds: u64,
    /// Seconds to wait for workers on shutdown.
    pub shutdown_timeout_seconds: u64,

    // Client
    /// Outbound webhook request timeout in seconds.
    pub delivery_timeout_seconds: u64,
    /// User agent sent with webhook requests.
    pub user_agent: String,
    /// Name of the HMAC signature header.
    pub signature_header: String,

    // Revisions
    /// Attempts to re-append after losing a race on a chain head.
    pub revision_conflict_retries: u32,

    // Logging
    /// Log filter directives.
    pub rust_log: String,
}

impl Config {
    /// Loads configuration from defaults, `consentry.toml` and the
    /// environment, then validates it.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().only(&["DATABASE_URL", "RUST_LOG"]))
            .merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Dispatcher settings.
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            worker_count: self.worker_count,
            batch_size: self.batch_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            claim_timeout: Duration::from_secs(self.claim_timeout_seconds),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_seconds),
            client_config: self.to_client_config(),
        }
    }

    /// Webhook HTTP client settings.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.delivery_timeout_seconds),
            user_agent: self.user_agent.clone(),
            signature_header: self.signature_header.clone(),
        }
    }

    /// Revision chain settings.
    pub fn to_revision_chain_config(&self) -> RevisionChainConfig {
        RevisionChainConfig { max_conflict_retries: self.revision_conflict_retries }
    }

    /// Database URL with the password masked for logging.
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                // "postgresql://host@..." has no password, only the scheme colon
                if !self.database_url[colon_pos..].starts_with("://") {
                    let mut masked = self.database_url.clone();
                    masked.replace_range(colon_pos + 1..at_pos, "***");
                    return masked;
                }
            }
        }
        self.database_url.clone()
    }

    /// Rejects settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://"))
        {
            anyhow::bail!("database_url must be a postgres:// or postgresql:// URL");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("database_max_connections must be greater than 0");
        }

        if self.database_min_connections > self.database_max_connections {
            anyhow::bail!("database_min_connections cannot exceed database_max_connections");
        }

        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be greater than 0");
        }

        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }

        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than 0");
        }

        if self.delivery_timeout_seconds == 0 {
            anyhow::bail!("delivery_timeout_seconds must be greater than 0");
        }

        if self.claim_timeout_seconds <= self.delivery_timeout_seconds {
            anyhow::bail!("claim_timeout_seconds must exceed delivery_timeout_seconds");
        }

        if self.shutdown_timeout_seconds == 0 {
            anyhow::bail!("shutdown_timeout_seconds must be greater than 0");
        }

        if self.signature_header.trim().is_empty() {
            anyhow::bail!("signature_header must not be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/consentry".to_string(),
            database_max_connections: 10,
            database_min_connections: 2,
            database_connection_timeout: 10,
            database_idle_timeout: 600,
            database_max_lifetime: 1800,
            worker_count: consentry_webhook::DEFAULT_WORKER_COUNT,
            batch_size: consentry_webhook::DEFAULT_BATCH_SIZE,
            poll_interval_ms: 1000,
            claim_timeout_seconds: 300,
            shutdown_timeout_seconds: 30,
            delivery_timeout_seconds: consentry_webhook::DEFAULT_TIMEOUT_SECONDS,
            user_agent: "Consentry-Webhooks/1.0".to_string(),
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            revision_conflict_retries: RevisionChainConfig::default().max_conflict_retries,
            rust_log: "info,consentry=debug".to_string(),
        }
    }
}
