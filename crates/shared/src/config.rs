//! Application configuration management.

use std::time::Duration;

use serde::Deserialize;

use crate::types::Currency;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Ledger behavior.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Outbound audit/notification channel.
    #[serde(default)]
    pub events: EventConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Currency used for allocations and freeze placeholders.
    ///
    /// One value per process, shared by every tenant. Tenants settling in
    /// another currency need a separately configured deployment.
    #[serde(default = "default_base_currency")]
    pub base_currency: Currency,
    /// How many times a concurrency conflict is retried before surfacing.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
    /// Base backoff between conflict retries, multiplied by the attempt number.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Upper bound for one attempt of a ledger operation.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Largest page a list query may request.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    /// Largest number of items accepted by a batch deposit.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_base_currency() -> Currency {
    Currency::Cny
}

fn default_max_conflict_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    10
}

fn default_operation_timeout_ms() -> u64 {
    5_000
}

fn default_max_page_size() -> u32 {
    100
}

fn default_max_batch_size() -> usize {
    500
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            max_conflict_retries: default_max_conflict_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            max_page_size: default_max_page_size(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl LedgerConfig {
    /// Timeout applied to each attempt of a ledger operation.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Backoff before the given retry attempt (1-based).
    #[must_use]
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Event channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    /// Capacity of the bounded channel feeding the event worker.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("RIGHTS").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
