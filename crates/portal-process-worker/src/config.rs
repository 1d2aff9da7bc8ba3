//! Configuration for the process worker
//!
//! Loaded from environment variables; invalid values are logged and the
//! default is kept.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

use portal_process_core::{ExecutorConfig, ProcessError};
use portal_process_postgres::PostgresConfig;

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// PostgreSQL connection string; the in-memory store is used when absent
    #[serde(default)]
    pub database_url: Option<String>,

    /// Maximum pool size for PostgreSQL
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    /// Executor tuning
    #[serde(default)]
    pub executor: ExecutorConfig,
}

fn default_max_connections() -> u32 {
    PostgresConfig::default().max_connections
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: default_max_connections(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ProcessError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProcessError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL").filter(|url| !url.is_empty()) {
            config.database_url = Some(url);
        }

        parse_into(&lookup, "DATABASE_MAX_CONNECTIONS", &mut config.database_max_connections);
        parse_into(&lookup, "PROCESS_LOCK_LEASE_SECS", &mut config.executor.lock_lease_secs);
        parse_into(&lookup, "PROCESS_POLL_INTERVAL_MS", &mut config.executor.poll_interval_ms);
        parse_into(&lookup, "PROCESS_CLAIM_BATCH_SIZE", &mut config.executor.claim_batch_size);
        parse_into(&lookup, "PROCESS_WORKER_COUNT", &mut config.executor.worker_count);

        config.executor.validate()?;
        Ok(config)
    }

    /// PostgreSQL settings, if a database is configured
    pub fn postgres(&self) -> Option<PostgresConfig> {
        self.database_url.as_ref().map(|url| PostgresConfig {
            connection_string: url.clone(),
            max_connections: self.database_max_connections,
            ..PostgresConfig::default()
        })
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key) {
        match value.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!("Invalid {} value: {}", key, value),
        }
    }
}
