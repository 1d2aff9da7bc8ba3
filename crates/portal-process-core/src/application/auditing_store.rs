//! Store decorator that writes audit records with every change set

use async_trait::async_trait;
use std::sync::Arc;

use crate::clock::Clock;
use crate::domain::audit::{AuditOperation, AuditRecord, AuditSnapshot, AuditedEntity};
use crate::domain::checklist::ChecklistEntry;
use crate::domain::process::{ApplicationId, Process, ProcessId};
use crate::domain::process_step::ProcessStep;
use crate::domain::repository::{ChangeSet, ClaimCandidate, ClaimQuery, Mutation, ProcessStore};
use crate::ProcessError;

/// Wraps a store so that every mutation carries an audit record.
///
/// Records travel in the same change set as the mutation, so the store
/// persists both or neither.
pub struct AuditingProcessStore<S> {
    inner: S,
    clock: Arc<dyn Clock>,
}

impl<S: ProcessStore> AuditingProcessStore<S> {
    /// Wrap `inner`
    pub fn new(inner: S, clock: Arc<dyn Clock>) -> Self {
        Self { inner, clock }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

/// Audit record describing `mutation`
pub fn audit_record_for(mutation: &Mutation, changes: &ChangeSet, now: chrono::DateTime<chrono::Utc>) -> AuditRecord {
    let (operation, snapshot) = match mutation {
        Mutation::InsertProcess(process) => (AuditOperation::Insert, AuditSnapshot::Process(process.clone())),
        Mutation::UpdateProcess { process, .. } => {
            (AuditOperation::Update, AuditSnapshot::Process(process.clone()))
        }
        Mutation::DeleteProcess { process, .. } => {
            (AuditOperation::Delete, AuditSnapshot::Process(process.clone()))
        }
        Mutation::InsertStep(step) => (AuditOperation::Insert, AuditSnapshot::ProcessStep(step.clone())),
        Mutation::UpdateStep(step) => (AuditOperation::Update, AuditSnapshot::ProcessStep(step.clone())),
        Mutation::DeleteStep(step) => (AuditOperation::Delete, AuditSnapshot::ProcessStep(step.clone())),
        Mutation::InsertChecklistEntry(entry) => {
            (AuditOperation::Insert, AuditSnapshot::ChecklistEntry(entry.clone()))
        }
        Mutation::UpdateChecklistEntry(entry) => {
            (AuditOperation::Update, AuditSnapshot::ChecklistEntry(entry.clone()))
        }
    };
    AuditRecord::new(operation, snapshot, now, changes.editor_id)
}

#[async_trait]
impl<S: ProcessStore> ProcessStore for AuditingProcessStore<S> {
    async fn find_process(&self, id: &ProcessId) -> Result<Option<Process>, ProcessError> {
        self.inner.find_process(id).await
    }

    async fn find_processes_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Process>, ProcessError> {
        self.inner.find_processes_for_application(application_id).await
    }

    async fn find_steps(&self, process_id: &ProcessId) -> Result<Vec<ProcessStep>, ProcessError> {
        self.inner.find_steps(process_id).await
    }

    async fn find_claim_candidates(
        &self,
        query: &ClaimQuery,
    ) -> Result<Vec<ClaimCandidate>, ProcessError> {
        self.inner.find_claim_candidates(query).await
    }

    async fn find_checklist(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ChecklistEntry>, ProcessError> {
        self.inner.find_checklist(application_id).await
    }

    async fn find_audit_records(
        &self,
        entity: AuditedEntity,
        entity_id: &str,
    ) -> Result<Vec<AuditRecord>, ProcessError> {
        self.inner.find_audit_records(entity, entity_id).await
    }

    async fn apply(&self, mut changes: ChangeSet) -> Result<(), ProcessError> {
        let now = self.clock.now();
        let records: Vec<AuditRecord> = changes
            .mutations
            .iter()
            .map(|mutation| audit_record_for(mutation, &changes, now))
            .collect();
        changes.audit_records.extend(records);
        self.inner.apply(changes).await
    }
}
