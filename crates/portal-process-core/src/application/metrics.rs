use metrics::{histogram, increment_counter};
use std::time::Duration;

use crate::domain::process_step::ProcessStepStatus;
use crate::domain::step_type::ProcessStepType;

/// Metric names emitted by the step executor
pub mod names {
    /// Processes claimed
    pub const PROCESS_CLAIMS: &str = "process_claims_total";
    /// Claims lost to another executor
    pub const PROCESS_CLAIM_CONFLICTS: &str = "process_claim_conflicts_total";
    /// Steps executed, by type and resulting status
    pub const PROCESS_STEPS_EXECUTED: &str = "process_steps_executed_total";
    /// Step results discarded because the lease was lost
    pub const PROCESS_COMMIT_CONFLICTS: &str = "process_commit_conflicts_total";
    /// Handler run time
    pub const PROCESS_STEP_DURATION: &str = "process_step_duration_seconds";
}

/// Executor metrics, recorded through the global `metrics` recorder
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorMetrics;

impl ExecutorMetrics {
    /// A claim succeeded
    pub fn record_claim(&self, step_type: ProcessStepType) {
        increment_counter!(names::PROCESS_CLAIMS, "step_type" => step_type.as_str());
    }

    /// A claim lost the version race
    pub fn record_claim_conflict(&self) {
        increment_counter!(names::PROCESS_CLAIM_CONFLICTS);
    }

    /// A step result was committed
    pub fn record_step(&self, step_type: ProcessStepType, status: ProcessStepStatus, elapsed: Duration) {
        increment_counter!(
            names::PROCESS_STEPS_EXECUTED,
            "step_type" => step_type.as_str(),
            "status" => status.as_str()
        );
        histogram!(
            names::PROCESS_STEP_DURATION,
            elapsed.as_secs_f64(),
            "step_type" => step_type.as_str()
        );
    }

    /// A step result was discarded
    pub fn record_commit_conflict(&self, step_type: ProcessStepType) {
        increment_counter!(names::PROCESS_COMMIT_CONFLICTS, "step_type" => step_type.as_str());
    }
}
