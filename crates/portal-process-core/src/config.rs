//! Executor configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ProcessError;

/// Settings of the step executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// How long a claim holds the process lock
    #[serde(default = "default_lock_lease_secs")]
    pub lock_lease_secs: u64,

    /// Sleep between polls when nothing was claimable
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Candidates fetched per claim attempt
    #[serde(default = "default_claim_batch_size")]
    pub claim_batch_size: usize,

    /// Executors run concurrently by the worker
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

fn default_lock_lease_secs() -> u64 {
    300 // 5 minutes
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_claim_batch_size() -> usize {
    20
}

fn default_worker_count() -> usize {
    4
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            lock_lease_secs: default_lock_lease_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            claim_batch_size: default_claim_batch_size(),
            worker_count: default_worker_count(),
        }
    }
}

impl ExecutorConfig {
    /// Lock lease as a chrono duration
    pub fn lock_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lock_lease_secs as i64)
    }

    /// Poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject settings the executor cannot run with
    pub fn validate(&self) -> Result<(), ProcessError> {
        if self.lock_lease_secs == 0 {
            return Err(ProcessError::ConfigurationError(
                "lock_lease_secs must be greater than 0".to_string(),
            ));
        }
        if self.lock_lease_secs > i64::MAX as u64 / 1000 {
            return Err(ProcessError::ConfigurationError(format!(
                "lock_lease_secs is too large: {}",
                self.lock_lease_secs
            )));
        }
        if self.claim_batch_size == 0 {
            return Err(ProcessError::ConfigurationError(
                "claim_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(ProcessError::ConfigurationError(
                "worker_count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
