//! Store interface for processes, steps and checklist rows
//!
//! All writes go through [`ProcessStore::apply`], which applies a
//! [`ChangeSet`] atomically. Process updates and deletes are guarded by
//! the version the writer last read; a mismatch rejects the whole change
//! set with [`ProcessError::ConcurrencyConflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::audit::{AuditRecord, AuditedEntity};
use super::checklist::ChecklistEntry;
use super::process::{ApplicationId, EditorId, Process, ProcessId, ProcessVersion};
use super::process_step::ProcessStep;
use super::step_type::ProcessStepType;
use crate::ProcessError;

/// One write within a change set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert a new process
    InsertProcess(Process),

    /// Replace a process if its stored version is still `expected_version`
    UpdateProcess {
        /// Version the writer read
        expected_version: ProcessVersion,
        /// New state, carrying a fresh version
        process: Process,
    },

    /// Delete a process and its steps if its stored version is still `expected_version`
    DeleteProcess {
        /// Version the writer read
        expected_version: ProcessVersion,
        /// State being deleted
        process: Process,
    },

    /// Insert a new step
    InsertStep(ProcessStep),

    /// Replace a step; the stored step must still be TODO
    UpdateStep(ProcessStep),

    /// Delete a step
    DeleteStep(ProcessStep),

    /// Insert a checklist row; fails if the row exists
    InsertChecklistEntry(ChecklistEntry),

    /// Replace a checklist row
    UpdateChecklistEntry(ChecklistEntry),
}

impl Mutation {
    /// Process the mutation touches, if any
    pub fn process_id(&self) -> Option<ProcessId> {
        match self {
            Mutation::InsertProcess(process)
            | Mutation::UpdateProcess { process, .. }
            | Mutation::DeleteProcess { process, .. } => Some(process.id),
            Mutation::InsertStep(step) | Mutation::UpdateStep(step) | Mutation::DeleteStep(step) => {
                Some(step.process_id)
            }
            Mutation::InsertChecklistEntry(_) | Mutation::UpdateChecklistEntry(_) => None,
        }
    }
}

/// Writes applied together or not at all
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Writes, applied in order
    pub mutations: Vec<Mutation>,

    /// Audit records written in the same transaction
    pub audit_records: Vec<AuditRecord>,

    /// Who is making the change
    pub editor_id: Option<EditorId>,
}

impl ChangeSet {
    /// Empty change set made by the engine itself
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty change set made on behalf of `editor_id`
    pub fn by_editor(editor_id: Option<EditorId>) -> Self {
        Self {
            editor_id,
            ..Self::default()
        }
    }

    /// Append a mutation
    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    /// Builder form of [`ChangeSet::push`]
    pub fn with(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    /// Whether nothing would be written
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Parameters for finding claimable processes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimQuery {
    /// Step types the caller can execute
    pub step_types: Vec<ProcessStepType>,

    /// Leases expiring at or before this instant are free
    pub now: DateTime<Utc>,

    /// Maximum number of candidates
    pub limit: usize,
}

/// A process that could be claimed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimCandidate {
    /// The process as currently stored
    pub process: Process,

    /// Creation time of its oldest TODO step
    pub oldest_pending: DateTime<Utc>,
}

/// Persistence for processes, steps, checklist rows and their audit trail
#[async_trait]
pub trait ProcessStore: Send + Sync {
    /// Find a process by ID
    async fn find_process(&self, id: &ProcessId) -> Result<Option<Process>, ProcessError>;

    /// All processes driving an application
    async fn find_processes_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Process>, ProcessError>;

    /// Steps of a process, oldest first
    async fn find_steps(&self, process_id: &ProcessId) -> Result<Vec<ProcessStep>, ProcessError>;

    /// Unlocked processes with work for the caller, oldest pending step first.
    ///
    /// Active processes qualify with a TODO step of one of the requested
    /// types; cancelled or failed processes qualify with any TODO step so
    /// that their leftovers get aborted.
    async fn find_claim_candidates(
        &self,
        query: &ClaimQuery,
    ) -> Result<Vec<ClaimCandidate>, ProcessError>;

    /// Checklist rows of an application
    async fn find_checklist(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ChecklistEntry>, ProcessError>;

    /// Audit trail of an entity, oldest first
    async fn find_audit_records(
        &self,
        entity: AuditedEntity,
        entity_id: &str,
    ) -> Result<Vec<AuditRecord>, ProcessError>;

    /// Apply a change set atomically
    async fn apply(&self, changes: ChangeSet) -> Result<(), ProcessError>;
}

#[async_trait]
impl<T: ProcessStore + ?Sized> ProcessStore for Arc<T> {
    async fn find_process(&self, id: &ProcessId) -> Result<Option<Process>, ProcessError> {
        (**self).find_process(id).await
    }

    async fn find_processes_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Process>, ProcessError> {
        (**self).find_processes_for_application(application_id).await
    }

    async fn find_steps(&self, process_id: &ProcessId) -> Result<Vec<ProcessStep>, ProcessError> {
        (**self).find_steps(process_id).await
    }

    async fn find_claim_candidates(
        &self,
        query: &ClaimQuery,
    ) -> Result<Vec<ClaimCandidate>, ProcessError> {
        (**self).find_claim_candidates(query).await
    }

    async fn find_checklist(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ChecklistEntry>, ProcessError> {
        (**self).find_checklist(application_id).await
    }

    async fn find_audit_records(
        &self,
        entity: AuditedEntity,
        entity_id: &str,
    ) -> Result<Vec<AuditRecord>, ProcessError> {
        (**self).find_audit_records(entity, entity_id).await
    }

    async fn apply(&self, changes: ChangeSet) -> Result<(), ProcessError> {
        (**self).apply(changes).await
    }
}
