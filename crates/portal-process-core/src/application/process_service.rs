//! Operator and API facing operations on processes

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use super::checklist_projection::ChecklistProjection;
use super::handler::StepOutcome;
use super::step_commit::plan_step_commit;
use crate::clock::Clock;
use crate::domain::checklist::{ChecklistEntry, ChecklistEntryType};
use crate::domain::process::{ApplicationId, EditorId, Process, ProcessId, ProcessStatus, ProcessType};
use crate::domain::process_step::{ProcessStep, ProcessStepStatus};
use crate::domain::repository::{ChangeSet, Mutation, ProcessStore};
use crate::domain::step_type::ProcessStepType;
use crate::ProcessError;

/// Request to start a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProcess {
    /// Workflow kind
    pub process_type: ProcessType,
    /// Application driven by the process
    pub application_id: Option<ApplicationId>,
    /// Steps created with the process
    pub initial_steps: Vec<ProcessStepType>,
    /// Who starts it
    pub editor_id: Option<EditorId>,
}

impl NewProcess {
    /// Request for `process_type` starting with `initial_steps`
    pub fn new(process_type: ProcessType, initial_steps: impl IntoIterator<Item = ProcessStepType>) -> Self {
        Self {
            process_type,
            application_id: None,
            initial_steps: initial_steps.into_iter().collect(),
            editor_id: None,
        }
    }

    /// Attach the application
    pub fn for_application(mut self, application_id: ApplicationId) -> Self {
        self.application_id = Some(application_id);
        self
    }

    /// Record who starts the process
    pub fn by_editor(mut self, editor_id: EditorId) -> Self {
        self.editor_id = Some(editor_id);
        self
    }
}

/// Creates, cancels, retriggers and inspects processes
#[derive(Clone)]
pub struct ProcessService {
    store: Arc<dyn ProcessStore>,
    projection: ChecklistProjection,
    clock: Arc<dyn Clock>,
}

impl ProcessService {
    /// Create a service over `store`
    pub fn new(store: Arc<dyn ProcessStore>, clock: Arc<dyn Clock>) -> Self {
        let projection = ChecklistProjection::new(store.clone(), clock.clone());
        Self {
            store,
            projection,
            clock,
        }
    }

    /// Checklist projection over the same store
    pub fn projection(&self) -> &ChecklistProjection {
        &self.projection
    }

    /// Create a process with its initial steps.
    ///
    /// An application checklist also gets its `TO_DO` checklist rows, written
    /// in the same change set.
    pub async fn create_process(&self, request: NewProcess) -> Result<Process, ProcessError> {
        if request.initial_steps.is_empty() {
            return Err(ProcessError::InvalidStepType(format!(
                "a {} process needs at least one initial step",
                request.process_type
            )));
        }
        for step_type in &request.initial_steps {
            ensure_step_belongs(*step_type, request.process_type)?;
        }

        let now = self.clock.now();
        let process = Process::new(request.process_type, request.application_id, now);
        let mut changes = ChangeSet::by_editor(request.editor_id)
            .with(Mutation::InsertProcess(process.clone()));

        let mut seen = BTreeSet::new();
        let mut affected = BTreeSet::new();
        for step_type in request.initial_steps {
            if !seen.insert(step_type) {
                continue;
            }
            if let Some(entry_type) = step_type.checklist_entry_type() {
                affected.insert(entry_type);
            }
            changes.push(Mutation::InsertStep(ProcessStep::new(process.id, step_type, now)));
        }

        let checklist_application = request
            .application_id
            .filter(|_| request.process_type == ProcessType::ApplicationChecklist);
        if let Some(application_id) = checklist_application {
            let existing: BTreeSet<ChecklistEntryType> = self
                .store
                .find_checklist(&application_id)
                .await?
                .into_iter()
                .map(|entry| entry.entry_type)
                .collect();
            for entry in ChecklistProjection::initial_entries(application_id, now) {
                if !existing.contains(&entry.entry_type) {
                    changes.push(Mutation::InsertChecklistEntry(entry));
                }
            }
        }

        self.store.apply(changes).await?;
        info!(
            process_id = %process.id,
            process_type = %process.process_type,
            "Process created"
        );

        self.projection.recompute_for_process(&process.id, affected).await;
        Ok(process)
    }

    /// Mark an active, unlocked process as cancelled.
    ///
    /// Its TODO steps are aborted by the next executor that claims it.
    pub async fn cancel_process(
        &self,
        process_id: &ProcessId,
        editor_id: Option<EditorId>,
    ) -> Result<Process, ProcessError> {
        let process = self.get_process(process_id).await?;
        self.ensure_modifiable(&process)?;

        let cancelled = process.with_status(ProcessStatus::Cancelled);
        self.store
            .apply(ChangeSet::by_editor(editor_id).with(Mutation::UpdateProcess {
                expected_version: process.version,
                process: cancelled.clone(),
            }))
            .await?;

        info!(process_id = %process_id, "Process cancelled");
        Ok(cancelled)
    }

    /// Enqueue the retrigger step of a failed `step_type`.
    ///
    /// Requires the most recent step of that type to have failed and no
    /// retry to be pending already.
    pub async fn retrigger(
        &self,
        process_id: &ProcessId,
        step_type: ProcessStepType,
        editor_id: Option<EditorId>,
    ) -> Result<ProcessStep, ProcessError> {
        let retrigger_type = step_type.retrigger_step().ok_or_else(|| {
            ProcessError::InvalidStepType(format!("{step_type} cannot be retriggered"))
        })?;

        let process = self.get_process(process_id).await?;
        ensure_step_belongs(step_type, process.process_type)?;
        self.ensure_modifiable(&process)?;

        let steps = self.store.find_steps(process_id).await?;
        if steps
            .iter()
            .any(|step| step.is_pending() && (step.step_type == step_type || step.step_type == retrigger_type))
        {
            return Err(ProcessError::InvalidProcessState(format!(
                "{step_type} is already pending for process {process_id}"
            )));
        }
        let latest = steps
            .iter()
            .filter(|step| step.step_type == step_type && step.status != ProcessStepStatus::Duplicate)
            .max_by_key(|step| step.date_last_changed);
        if !matches!(latest, Some(step) if step.status == ProcessStepStatus::Failed) {
            return Err(ProcessError::InvalidProcessState(format!(
                "{step_type} has not failed for process {process_id}"
            )));
        }

        let now = self.clock.now();
        let retrigger_step = ProcessStep::new(process.id, retrigger_type, now);
        let mut touched = process.clone();
        touched.bump_version();
        self.store
            .apply(
                ChangeSet::by_editor(editor_id)
                    .with(Mutation::UpdateProcess {
                        expected_version: process.version,
                        process: touched,
                    })
                    .with(Mutation::InsertStep(retrigger_step.clone())),
            )
            .await?;

        info!(process_id = %process_id, step_type = %retrigger_type, "Retrigger enqueued");
        self.projection
            .recompute_for_process(process_id, retrigger_type.checklist_entry_type())
            .await;
        Ok(retrigger_step)
    }

    /// Complete a pending step from outside the executor, such as a callback
    /// answering an `AWAIT_*` step or an operator verifying a registration.
    pub async fn resolve_awaited_step(
        &self,
        process_id: &ProcessId,
        step_type: ProcessStepType,
        outcome: StepOutcome,
        editor_id: Option<EditorId>,
    ) -> Result<ProcessStep, ProcessError> {
        let process = self.get_process(process_id).await?;
        self.ensure_modifiable(&process)?;

        let pending: Vec<ProcessStep> = self
            .store
            .find_steps(process_id)
            .await?
            .into_iter()
            .filter(ProcessStep::is_pending)
            .collect();
        let step = pending
            .iter()
            .find(|step| step.step_type == step_type)
            .cloned()
            .ok_or_else(|| {
                ProcessError::StepNotFound(format!(
                    "no pending {step_type} step in process {process_id}"
                ))
            })?;

        let commit = plan_step_commit(&process, &step, &pending, outcome, self.clock.now(), editor_id)?;
        self.store.apply(commit.changes.clone()).await?;

        info!(
            process_id = %process_id,
            step_type = %step_type,
            status = %commit.step.status,
            "Step resolved externally"
        );
        self.projection
            .recompute_for_process(process_id, commit.affected_entry_types.iter().copied())
            .await;
        Ok(commit.step)
    }

    /// Delete a finished process and its steps
    pub async fn delete_process(
        &self,
        process_id: &ProcessId,
        editor_id: Option<EditorId>,
    ) -> Result<(), ProcessError> {
        let process = self.get_process(process_id).await?;
        if process.is_locked(self.clock.now()) {
            return Err(ProcessError::ProcessLocked(process_id.to_string()));
        }

        let steps = self.store.find_steps(process_id).await?;
        if steps.iter().any(ProcessStep::is_pending) {
            return Err(ProcessError::InvalidProcessState(format!(
                "process {process_id} still has pending steps"
            )));
        }

        let mut changes = ChangeSet::by_editor(editor_id);
        for step in steps {
            changes.push(Mutation::DeleteStep(step));
        }
        changes.push(Mutation::DeleteProcess {
            expected_version: process.version,
            process,
        });
        self.store.apply(changes).await?;

        info!(process_id = %process_id, "Process deleted");
        Ok(())
    }

    /// Load a process
    pub async fn get_process(&self, process_id: &ProcessId) -> Result<Process, ProcessError> {
        self.store
            .find_process(process_id)
            .await?
            .ok_or_else(|| ProcessError::ProcessNotFound(process_id.to_string()))
    }

    /// Steps of a process, oldest first
    pub async fn get_steps(&self, process_id: &ProcessId) -> Result<Vec<ProcessStep>, ProcessError> {
        self.get_process(process_id).await?;
        self.store.find_steps(process_id).await
    }

    /// Checklist of an application
    pub async fn checklist(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ChecklistEntry>, ProcessError> {
        self.projection.checklist(application_id).await
    }

    fn ensure_modifiable(&self, process: &Process) -> Result<(), ProcessError> {
        if !process.is_active() {
            return Err(ProcessError::InvalidProcessState(format!(
                "process {} is {}",
                process.id, process.status
            )));
        }
        if process.is_locked(self.clock.now()) {
            return Err(ProcessError::ProcessLocked(process.id.to_string()));
        }
        Ok(())
    }
}

fn ensure_step_belongs(step_type: ProcessStepType, process_type: ProcessType) -> Result<(), ProcessError> {
    if step_type.process_type() != process_type {
        return Err(ProcessError::InvalidStepType(format!(
            "{step_type} is not a step of process type {process_type}"
        )));
    }
    Ok(())
}
