//! Turns a step outcome into the change set that records it

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use super::handler::StepOutcome;
use crate::domain::checklist::ChecklistEntryType;
use crate::domain::process::{EditorId, Process, ProcessStatus};
use crate::domain::process_step::{ProcessStep, ProcessStepStatus};
use crate::domain::repository::{ChangeSet, Mutation};
use crate::domain::step_type::ProcessStepType;
use crate::ProcessError;

/// Writes needed to record one executed step
#[derive(Debug, Clone)]
pub struct StepCommit {
    /// Change set to apply
    pub changes: ChangeSet,
    /// The executed step in its terminal state
    pub step: ProcessStep,
    /// The process as it will be stored
    pub process: Process,
    /// Steps created as successors
    pub inserted_steps: Vec<ProcessStep>,
    /// Checklist categories whose steps changed
    pub affected_entry_types: BTreeSet<ChecklistEntryType>,
}

impl StepCommit {
    /// Terminal status given to the executed step
    pub fn status(&self) -> ProcessStepStatus {
        self.step.status
    }
}

/// Build the change set for `outcome` of `step`.
///
/// `process` must be the state the caller holds, whose version guards the
/// write. `pending_steps` are the TODO steps of the process, the executed
/// step included. The stored process ends up unlocked with a new version.
pub fn plan_step_commit(
    process: &Process,
    step: &ProcessStep,
    pending_steps: &[ProcessStep],
    outcome: StepOutcome,
    now: DateTime<Utc>,
    editor_id: Option<EditorId>,
) -> Result<StepCommit, ProcessError> {
    let outcome = reject_foreign_step_types(process, step, outcome);

    let (status, message) = match &outcome {
        StepOutcome::Done { message, .. } => (ProcessStepStatus::Done, message.clone()),
        StepOutcome::Skipped { message } => (ProcessStepStatus::Skipped, message.clone()),
        StepOutcome::Failed { message, .. } => (ProcessStepStatus::Failed, Some(message.clone())),
    };
    let executed = step.transitioned(status, message, now)?;

    let mut stored = process.released();
    let mut changes = ChangeSet::by_editor(editor_id);
    let mut affected = BTreeSet::new();
    let mut inserted_steps = Vec::new();

    fn touch(step: &ProcessStep, affected: &mut BTreeSet<ChecklistEntryType>) {
        if let Some(entry_type) = step.step_type.checklist_entry_type() {
            affected.insert(entry_type);
        }
    }

    touch(&executed, &mut affected);
    let mut step_mutations = vec![Mutation::UpdateStep(executed.clone())];

    // A failed attempt completes nothing, so its same-type twins stay pending
    let supersedes_twins = !matches!(outcome, StepOutcome::Failed { .. });

    // Steps still TODO after this commit
    let mut remaining: Vec<&ProcessStep> = Vec::new();
    for other in pending_steps
        .iter()
        .filter(|other| other.id != step.id && other.is_pending())
    {
        if supersedes_twins && other.step_type == step.step_type {
            let duplicate = other.transitioned(
                ProcessStepStatus::Duplicate,
                Some(format!("duplicate of step {}", step.id)),
                now,
            )?;
            touch(&duplicate, &mut affected);
            step_mutations.push(Mutation::UpdateStep(duplicate));
        } else {
            remaining.push(other);
        }
    }

    match outcome {
        StepOutcome::Failed {
            retryable: false, ..
        } => {
            stored.status = ProcessStatus::Failed;
            for other in remaining {
                let aborted = other.transitioned(
                    ProcessStepStatus::Aborted,
                    Some(format!("aborted after {} failed", step.step_type)),
                    now,
                )?;
                touch(&aborted, &mut affected);
                step_mutations.push(Mutation::UpdateStep(aborted));
            }
        }
        StepOutcome::Done {
            next_steps,
            skip_step_types,
            ..
        } => {
            let mut still_pending: BTreeSet<ProcessStepType> = BTreeSet::new();
            for other in remaining {
                if skip_step_types.contains(&other.step_type) {
                    let skipped = other.transitioned(
                        ProcessStepStatus::Skipped,
                        Some(format!("skipped by {}", step.step_type)),
                        now,
                    )?;
                    touch(&skipped, &mut affected);
                    step_mutations.push(Mutation::UpdateStep(skipped));
                } else {
                    still_pending.insert(other.step_type);
                }
            }

            for next in next_steps {
                if still_pending.insert(next) {
                    let successor = ProcessStep::new(process.id, next, now);
                    touch(&successor, &mut affected);
                    step_mutations.push(Mutation::InsertStep(successor.clone()));
                    inserted_steps.push(successor);
                }
            }
        }
        StepOutcome::Skipped { .. } | StepOutcome::Failed { .. } => {}
    }

    // The version guard goes first so a lost race fails before any step write
    changes.push(Mutation::UpdateProcess {
        expected_version: process.version,
        process: stored.clone(),
    });
    changes.mutations.extend(step_mutations);

    Ok(StepCommit {
        changes,
        step: executed,
        process: stored,
        inserted_steps,
        affected_entry_types: affected,
    })
}

/// Abort every TODO step of a process that is no longer active and unlock it
pub fn plan_abort_pending(
    process: &Process,
    pending_steps: &[ProcessStep],
    now: DateTime<Utc>,
) -> Result<StepCommit, ProcessError> {
    let reason = match process.status {
        ProcessStatus::Cancelled => "process cancelled",
        ProcessStatus::Failed => "process failed",
        ProcessStatus::Active => {
            return Err(ProcessError::InvalidProcessState(format!(
                "process {} is active",
                process.id
            )))
        }
    };

    let stored = process.released();
    let mut changes = ChangeSet::new().with(Mutation::UpdateProcess {
        expected_version: process.version,
        process: stored.clone(),
    });
    let mut affected = BTreeSet::new();
    let mut last = None;

    for step in pending_steps.iter().filter(|step| step.is_pending()) {
        let aborted = step.transitioned(ProcessStepStatus::Aborted, Some(reason.to_string()), now)?;
        if let Some(entry_type) = aborted.step_type.checklist_entry_type() {
            affected.insert(entry_type);
        }
        changes.push(Mutation::UpdateStep(aborted.clone()));
        last = Some(aborted);
    }

    let step = last.ok_or_else(|| {
        ProcessError::InvalidProcessState(format!("process {} has no pending steps", process.id))
    })?;

    Ok(StepCommit {
        changes,
        step,
        process: stored,
        inserted_steps: Vec::new(),
        affected_entry_types: affected,
    })
}

fn reject_foreign_step_types(process: &Process, step: &ProcessStep, outcome: StepOutcome) -> StepOutcome {
    let StepOutcome::Done {
        next_steps,
        skip_step_types,
        ..
    } = &outcome
    else {
        return outcome;
    };

    let foreign = next_steps
        .iter()
        .chain(skip_step_types.iter())
        .find(|step_type| step_type.process_type() != process.process_type)
        .copied();

    match foreign {
        Some(step_type) => StepOutcome::failed(format!(
            "invalid successor {} of {}: not a step of process type {}",
            step_type, step.step_type, process.process_type
        )),
        None => outcome,
    }
}
