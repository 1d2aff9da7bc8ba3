//!
//! Portal Process Core - persistent process engine for the onboarding portal
//!
//! This crate defines the process and step model, the application
//! checklist derived from it, and the executor that claims processes and
//! runs their steps. Storage backends implement [`ProcessStore`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - processes, steps, checklist, audit and the store interface
#[macro_use]
pub mod domain;

/// Application services - executor, projection and process operations
pub mod application;

/// Time source
pub mod clock;

/// Executor configuration
pub mod config;

/// Error types
pub mod error;

// Re-export key types
pub use error::ProcessError;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ExecutorConfig;

pub use domain::audit::{AuditOperation, AuditRecord, AuditSnapshot, AuditedEntity};
pub use domain::checklist::{
    derive_entry_state, ChecklistEntry, ChecklistEntryStatus, ChecklistEntryType, DerivedEntryState,
};
pub use domain::process::{
    ApplicationId, EditorId, Process, ProcessId, ProcessStatus, ProcessType, ProcessVersion,
};
pub use domain::process_step::{ProcessStep, ProcessStepId, ProcessStepStatus};
pub use domain::repository::{ChangeSet, ClaimCandidate, ClaimQuery, Mutation, ProcessStore};
pub use domain::step_type::ProcessStepType;

pub use application::auditing_store::AuditingProcessStore;
pub use application::checklist_projection::ChecklistProjection;
pub use application::claim_policy::{ClaimPolicy, FifoByCreation};
pub use application::handler::{HandlerRegistry, ProcessStepHandler, StepContext, StepOutcome};
pub use application::metrics::ExecutorMetrics;
pub use application::process_service::{NewProcess, ProcessService};
pub use application::step_executor::{ClaimedProcess, ExecutionReport, StepExecutor};
