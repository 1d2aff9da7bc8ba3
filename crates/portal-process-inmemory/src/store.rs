use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

use portal_process_core::{
    domain::audit::AuditedEntity,
    ApplicationId, AuditRecord, ChangeSet, ChecklistEntry, ChecklistEntryType, ClaimCandidate,
    ClaimQuery, Mutation, Process, ProcessError, ProcessId, ProcessStep, ProcessStore,
};

/// Everything the store holds; replaced wholesale on every successful apply
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    processes: HashMap<ProcessId, Process>,
    steps: HashMap<ProcessId, Vec<ProcessStep>>,
    checklist: HashMap<(ApplicationId, ChecklistEntryType), ChecklistEntry>,
    audit: Vec<AuditRecord>,
}

impl StoreState {
    fn apply_mutation(&mut self, mutation: Mutation) -> Result<(), ProcessError> {
        match mutation {
            Mutation::InsertProcess(process) => {
                if self.processes.contains_key(&process.id) {
                    return Err(ProcessError::ConcurrencyConflict(format!(
                        "process {} already exists",
                        process.id
                    )));
                }
                self.steps.entry(process.id).or_default();
                self.processes.insert(process.id, process);
            }
            Mutation::UpdateProcess {
                expected_version,
                process,
            } => {
                self.check_version(&process.id, expected_version)?;
                self.processes.insert(process.id, process);
            }
            Mutation::DeleteProcess {
                expected_version,
                process,
            } => {
                self.check_version(&process.id, expected_version)?;
                self.processes.remove(&process.id);
                self.steps.remove(&process.id);
            }
            Mutation::InsertStep(step) => {
                if !self.processes.contains_key(&step.process_id) {
                    return Err(ProcessError::ProcessNotFound(step.process_id.to_string()));
                }
                let steps = self.steps.entry(step.process_id).or_default();
                if steps.iter().any(|existing| existing.id == step.id) {
                    return Err(ProcessError::ConcurrencyConflict(format!(
                        "step {} already exists",
                        step.id
                    )));
                }
                steps.push(step);
            }
            Mutation::UpdateStep(step) => {
                let stored = self.stored_step_mut(&step)?;
                if stored.status.is_terminal() {
                    return Err(ProcessError::InvalidStepTransition(format!(
                        "step {} is already {}",
                        stored.id, stored.status
                    )));
                }
                *stored = step;
            }
            Mutation::DeleteStep(step) => {
                self.stored_step_mut(&step)?;
                if let Some(steps) = self.steps.get_mut(&step.process_id) {
                    steps.retain(|existing| existing.id != step.id);
                }
            }
            Mutation::InsertChecklistEntry(entry) => {
                let key = (entry.application_id, entry.entry_type);
                if self.checklist.contains_key(&key) {
                    return Err(ProcessError::ConcurrencyConflict(format!(
                        "checklist entry {} of application {} already exists",
                        entry.entry_type, entry.application_id
                    )));
                }
                self.checklist.insert(key, entry);
            }
            Mutation::UpdateChecklistEntry(entry) => {
                let key = (entry.application_id, entry.entry_type);
                match self.checklist.get_mut(&key) {
                    Some(stored) => *stored = entry,
                    None => {
                        return Err(ProcessError::StateStoreError(format!(
                            "checklist entry {} of application {} not found",
                            entry.entry_type, entry.application_id
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn check_version(
        &self,
        process_id: &ProcessId,
        expected: portal_process_core::ProcessVersion,
    ) -> Result<(), ProcessError> {
        let stored = self
            .processes
            .get(process_id)
            .ok_or_else(|| ProcessError::ProcessNotFound(process_id.to_string()))?;
        if stored.version != expected {
            return Err(ProcessError::ConcurrencyConflict(format!(
                "process {} has version {}, expected {}",
                process_id, stored.version, expected
            )));
        }
        Ok(())
    }

    fn stored_step_mut(&mut self, step: &ProcessStep) -> Result<&mut ProcessStep, ProcessError> {
        self.steps
            .get_mut(&step.process_id)
            .and_then(|steps| steps.iter_mut().find(|existing| existing.id == step.id))
            .ok_or_else(|| ProcessError::StepNotFound(step.id.to_string()))
    }
}

/// In-memory implementation of the ProcessStore
///
/// Change sets are applied to a copy of the state under the write lock and
/// swapped in only when every mutation succeeded.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProcessStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryProcessStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Every audit record, in write order
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.state.read().await.audit.clone()
    }

    /// Number of stored processes
    pub async fn process_count(&self) -> usize {
        self.state.read().await.processes.len()
    }
}

#[async_trait]
impl ProcessStore for InMemoryProcessStore {
    async fn find_process(&self, id: &ProcessId) -> Result<Option<Process>, ProcessError> {
        let state = self.state.read().await;
        Ok(state.processes.get(id).cloned())
    }

    async fn find_processes_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Process>, ProcessError> {
        let state = self.state.read().await;
        let mut processes: Vec<Process> = state
            .processes
            .values()
            .filter(|process| process.application_id.as_ref() == Some(application_id))
            .cloned()
            .collect();
        processes.sort_by(|a, b| a.date_created.cmp(&b.date_created).then_with(|| a.id.cmp(&b.id)));
        Ok(processes)
    }

    async fn find_steps(&self, process_id: &ProcessId) -> Result<Vec<ProcessStep>, ProcessError> {
        let state = self.state.read().await;
        Ok(state.steps.get(process_id).cloned().unwrap_or_default())
    }

    async fn find_claim_candidates(
        &self,
        query: &ClaimQuery,
    ) -> Result<Vec<ClaimCandidate>, ProcessError> {
        let state = self.state.read().await;

        let mut candidates: Vec<ClaimCandidate> = state
            .processes
            .values()
            .filter(|process| !process.is_locked(query.now))
            .filter_map(|process| {
                let steps = state.steps.get(&process.id)?;
                let oldest_pending = steps
                    .iter()
                    .filter(|step| step.is_pending())
                    .filter(|step| !process.is_active() || query.step_types.contains(&step.step_type))
                    .map(|step| step.date_created)
                    .min()?;
                Some(ClaimCandidate {
                    process: process.clone(),
                    oldest_pending,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.oldest_pending
                .cmp(&b.oldest_pending)
                .then_with(|| a.process.id.cmp(&b.process.id))
        });
        candidates.truncate(query.limit);
        Ok(candidates)
    }

    async fn find_checklist(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ChecklistEntry>, ProcessError> {
        let state = self.state.read().await;
        let mut entries: Vec<ChecklistEntry> = state
            .checklist
            .values()
            .filter(|entry| entry.application_id == *application_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.entry_type);
        Ok(entries)
    }

    async fn find_audit_records(
        &self,
        entity: AuditedEntity,
        entity_id: &str,
    ) -> Result<Vec<AuditRecord>, ProcessError> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .filter(|record| record.snapshot.entity() == entity && record.snapshot.entity_id() == entity_id)
            .cloned()
            .collect())
    }

    async fn apply(&self, changes: ChangeSet) -> Result<(), ProcessError> {
        let mut state = self.state.write().await;

        let mut next = state.clone();
        let count = changes.mutations.len();
        for mutation in changes.mutations {
            next.apply_mutation(mutation)?;
        }
        next.audit.extend(changes.audit_records);

        *state = next;
        trace!(mutations = count, "Change set applied");
        Ok(())
    }
}
