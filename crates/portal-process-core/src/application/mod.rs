/// Step handlers and their registry
pub mod handler;

/// Claim ordering
pub mod claim_policy;

/// Change sets that record step outcomes
pub mod step_commit;

/// Claiming and executing steps
pub mod step_executor;

/// Checklist derivation and storage
pub mod checklist_projection;

/// Process lifecycle operations
pub mod process_service;

/// Audit trail decorator
pub mod auditing_store;

/// Executor metrics
pub mod metrics;
