//! Logging and metrics setup for the process worker.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::{info, warn};

pub mod logging;
pub mod exporter;

pub use logging::{init_logging, LogExt};
pub use exporter::{describe_metrics, init_metrics_exporter};

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Service name attached to startup logs
    pub service_name: String,
    /// Log level filter (e.g., "info,portal_process_core=debug"); `RUST_LOG` wins if set
    pub log_filter: String,
    /// Emit JSON lines instead of pretty output
    pub enable_json_logging: bool,
    /// Serve Prometheus metrics on this address
    pub metrics_listen_address: Option<SocketAddr>,
    /// Settings that failed to parse, reported once logging is up
    #[serde(skip)]
    pub rejected_settings: Vec<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "portal-process-worker".to_string(),
            log_filter: "info".to_string(),
            enable_json_logging: false,
            metrics_listen_address: None,
            rejected_settings: Vec::new(),
        }
    }
}

impl MonitoringConfig {
    /// Load from `LOG_FILTER`, `LOG_JSON` and `METRICS_LISTEN_ADDRESS`
    pub fn load(service_name: &str) -> Self {
        Self::from_lookup(service_name, |key| env::var(key).ok())
    }

    /// Load from any key/value source; invalid values keep the default
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            service_name: service_name.to_string(),
            ..Self::default()
        };

        if let Some(filter) = lookup("LOG_FILTER").filter(|filter| !filter.is_empty()) {
            config.log_filter = filter;
        }

        if let Some(value) = lookup("LOG_JSON") {
            match parse_flag(&value) {
                Some(flag) => config.enable_json_logging = flag,
                None => config.reject("LOG_JSON", &value),
            }
        }

        if let Some(value) = lookup("METRICS_LISTEN_ADDRESS").filter(|value| !value.is_empty()) {
            match SocketAddr::from_str(&value) {
                Ok(address) => config.metrics_listen_address = Some(address),
                Err(_) => config.reject("METRICS_LISTEN_ADDRESS", &value),
            }
        }

        config
    }

    fn reject(&mut self, key: &str, value: &str) {
        self.rejected_settings.push(format!("{key}={value}"));
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Initialize logging, then the metrics exporter if an address is configured
pub fn init(config: &MonitoringConfig) -> anyhow::Result<()> {
    init_logging(config)?;
    for setting in &config.rejected_settings {
        warn!("Invalid monitoring setting ignored: {}", setting);
    }

    if let Some(address) = config.metrics_listen_address {
        init_metrics_exporter(address)?;
    }
    describe_metrics();

    info!(service_name = %config.service_name, "Monitoring initialized");
    Ok(())
}
