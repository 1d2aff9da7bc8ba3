use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::process::ProcessId;
use super::step_type::ProcessStepType;
use crate::ProcessError;

/// Value object: Process step ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessStepId(pub Uuid);

impl ProcessStepId {
    /// Generate a new random step ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessStepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessStepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

coded_enum! {
    /// Status of a single step. `Todo` is initial, every other status is terminal.
    pub enum ProcessStepStatus {
        /// Waiting to be executed
        Todo => "TODO",
        /// Executed successfully
        Done => "DONE",
        /// Not applicable given current data
        Skipped => "SKIPPED",
        /// Execution failed
        Failed => "FAILED",
        /// Made redundant by an equivalent step of the same process
        Duplicate => "DUPLICATE",
        /// Owning process was cancelled or failed before execution
        Aborted => "ABORTED",
    }
}

impl ProcessStepStatus {
    /// Whether the status can never change again
    #[inline]
    pub fn is_terminal(&self) -> bool {
        *self != ProcessStepStatus::Todo
    }
}

/// Entity: one unit of work within a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStep {
    /// Unique identifier
    pub id: ProcessStepId,

    /// Owning process
    pub process_id: ProcessId,

    /// What the step does
    pub step_type: ProcessStepType,

    /// Current status
    pub status: ProcessStepStatus,

    /// Free-text diagnostic or result detail
    pub message: Option<String>,

    /// Creation timestamp
    pub date_created: DateTime<Utc>,

    /// Last status change
    pub date_last_changed: DateTime<Utc>,
}

impl ProcessStep {
    /// Create a new TODO step
    pub fn new(process_id: ProcessId, step_type: ProcessStepType, now: DateTime<Utc>) -> Self {
        Self {
            id: ProcessStepId::new(),
            process_id,
            step_type,
            status: ProcessStepStatus::Todo,
            message: None,
            date_created: now,
            date_last_changed: now,
        }
    }

    /// Whether the step is still waiting to be executed
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status == ProcessStepStatus::Todo
    }

    /// Move the step from TODO into a terminal status
    pub fn transition(
        &mut self,
        status: ProcessStepStatus,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ProcessError> {
        if self.status.is_terminal() {
            return Err(ProcessError::InvalidStepTransition(format!(
                "step {} ({}) is already {} and cannot become {}",
                self.id, self.step_type, self.status, status
            )));
        }
        if !status.is_terminal() {
            return Err(ProcessError::InvalidStepTransition(format!(
                "step {} ({}) can only leave TODO for a terminal status",
                self.id, self.step_type
            )));
        }

        self.status = status;
        self.message = message;
        self.date_last_changed = now;
        Ok(())
    }

    /// Copy of this step moved into a terminal status
    pub fn transitioned(
        &self,
        status: ProcessStepStatus,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, ProcessError> {
        let mut step = self.clone();
        step.transition(status, message, now)?;
        Ok(step)
    }
}
