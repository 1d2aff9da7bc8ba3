//! Claims processes and executes their pending steps
//!
//! A claim is an optimistic compare-and-swap on the process version that
//! also sets a lease. Only the holder of the current version can commit
//! a step result, so a worker whose lease expired and was taken over
//! loses its commit instead of writing twice.

use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::checklist_projection::ChecklistProjection;
use super::claim_policy::{ClaimPolicy, FifoByCreation};
use super::handler::{HandlerRegistry, StepContext, StepOutcome};
use super::metrics::ExecutorMetrics;
use super::step_commit::{plan_abort_pending, plan_step_commit, StepCommit};
use crate::clock::Clock;
use crate::config::ExecutorConfig;
use crate::domain::process::{Process, ProcessId};
use crate::domain::process_step::{ProcessStep, ProcessStepId, ProcessStepStatus};
use crate::domain::repository::{ChangeSet, ClaimQuery, Mutation, ProcessStore};
use crate::domain::step_type::ProcessStepType;
use crate::ProcessError;

/// A process leased to this executor
#[derive(Debug, Clone)]
pub struct ClaimedProcess {
    /// The process as stored by the claim; its version guards the commit
    pub process: Process,
    /// TODO steps of the claimed types, oldest first
    pub steps: Vec<ProcessStep>,
    /// All TODO steps of the process
    pub pending_steps: Vec<ProcessStep>,
}

/// What happened to one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Owning process
    pub process_id: ProcessId,
    /// Executed step
    pub step_id: ProcessStepId,
    /// Its type
    pub step_type: ProcessStepType,
    /// Status it was given
    pub status: ProcessStepStatus,
    /// Message it was given
    pub message: Option<String>,
    /// Whether the result was stored; false when the lease was lost
    pub committed: bool,
    /// Successor steps created
    pub inserted_steps: Vec<ProcessStepType>,
}

impl ExecutionReport {
    fn from_commit(commit: &StepCommit, committed: bool) -> Self {
        Self {
            process_id: commit.process.id,
            step_id: commit.step.id,
            step_type: commit.step.step_type,
            status: commit.step.status,
            message: commit.step.message.clone(),
            committed,
            inserted_steps: commit.inserted_steps.iter().map(|step| step.step_type).collect(),
        }
    }
}

/// Claims processes with work for its handlers and executes one step per claim
pub struct StepExecutor {
    store: Arc<dyn ProcessStore>,
    handlers: HandlerRegistry,
    projection: ChecklistProjection,
    policy: Arc<dyn ClaimPolicy>,
    clock: Arc<dyn Clock>,
    config: ExecutorConfig,
    metrics: ExecutorMetrics,
}

impl StepExecutor {
    /// Create an executor with FIFO claim order
    pub fn new(
        store: Arc<dyn ProcessStore>,
        handlers: HandlerRegistry,
        clock: Arc<dyn Clock>,
        config: ExecutorConfig,
    ) -> Self {
        let projection = ChecklistProjection::new(store.clone(), clock.clone());
        Self {
            store,
            handlers,
            projection,
            policy: Arc::new(FifoByCreation),
            clock,
            config,
            metrics: ExecutorMetrics,
        }
    }

    /// Replace the claim order
    pub fn with_claim_policy(mut self, policy: Arc<dyn ClaimPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Executor settings
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Step types this executor claims: those with a handler and their retriggers
    pub fn executable_step_types(&self) -> Vec<ProcessStepType> {
        let mut types: BTreeSet<ProcessStepType> = BTreeSet::new();
        for step_type in self.handlers.step_types() {
            types.insert(step_type);
            if let Some(retrigger) = step_type.retrigger_step() {
                types.insert(retrigger);
            }
        }
        types.into_iter().collect()
    }

    /// Lease the first claimable process with pending work of `step_types`.
    ///
    /// Candidates lost to another executor are skipped.
    pub async fn claim(
        &self,
        step_types: &[ProcessStepType],
    ) -> Result<Option<ClaimedProcess>, ProcessError> {
        let now = self.clock.now();
        let mut candidates = self
            .store
            .find_claim_candidates(&ClaimQuery {
                step_types: step_types.to_vec(),
                now,
                limit: self.config.claim_batch_size,
            })
            .await?;
        self.policy.order(&mut candidates);

        for candidate in candidates {
            let current = candidate.process;
            if current.is_locked(now) {
                continue;
            }

            let locked = current.locked(now, self.config.lock_lease());
            let claim = ChangeSet::new().with(Mutation::UpdateProcess {
                expected_version: current.version,
                process: locked.clone(),
            });
            match self.store.apply(claim).await {
                Ok(()) => {}
                Err(err) if err.is_concurrency_conflict() => {
                    debug!(process_id = %current.id, "Claim lost to another executor");
                    self.metrics.record_claim_conflict();
                    continue;
                }
                Err(err) => return Err(err),
            }

            let pending_steps: Vec<ProcessStep> = self
                .store
                .find_steps(&locked.id)
                .await?
                .into_iter()
                .filter(ProcessStep::is_pending)
                .collect();
            let steps: Vec<ProcessStep> = pending_steps
                .iter()
                .filter(|step| step_types.contains(&step.step_type))
                .cloned()
                .collect();

            if let Some(step) = steps.first().or(pending_steps.first()) {
                self.metrics.record_claim(step.step_type);
            }
            debug!(
                process_id = %locked.id,
                process_type = %locked.process_type,
                pending = pending_steps.len(),
                "Process claimed"
            );

            return Ok(Some(ClaimedProcess {
                process: locked,
                steps,
                pending_steps,
            }));
        }

        Ok(None)
    }

    /// Execute `step` of a claimed process and commit its result.
    ///
    /// Handler errors and panics become retryable failures of the step. A
    /// result whose lease was lost is reported with `committed == false`.
    #[instrument(skip(self, claimed, step), fields(process_id = %claimed.process.id, step_type = %step.step_type))]
    pub async fn execute(
        &self,
        claimed: &ClaimedProcess,
        step: &ProcessStep,
    ) -> Result<ExecutionReport, ProcessError> {
        let started = Instant::now();
        let outcome = self.run_handler(claimed, step).await;
        let elapsed = started.elapsed();

        let commit = match plan_step_commit(
            &claimed.process,
            step,
            &claimed.pending_steps,
            outcome,
            self.clock.now(),
            None,
        ) {
            Ok(commit) => commit,
            Err(err) => {
                self.release(&claimed.process).await;
                return Err(err);
            }
        };

        let report = self.commit(&claimed.process, commit).await?;
        if report.committed {
            self.metrics.record_step(report.step_type, report.status, elapsed);
            info!(
                step_id = %report.step_id,
                status = %report.status,
                successors = ?report.inserted_steps,
                "Step executed"
            );
        }
        Ok(report)
    }

    async fn run_handler(&self, claimed: &ClaimedProcess, step: &ProcessStep) -> StepOutcome {
        let Some(handler) = self.handlers.get(step.step_type) else {
            return match step.step_type.retriggered_step() {
                Some(target) => {
                    StepOutcome::done_with([target]).with_message(format!("{target} retriggered"))
                }
                None => StepOutcome::failed(format!("no handler registered for {}", step.step_type)),
            };
        };

        let ctx = StepContext {
            process: claimed.process.clone(),
            step: step.clone(),
            pending_steps: claimed.pending_steps.clone(),
        };
        match AssertUnwindSafe(handler.execute(&ctx)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(error = %err, "Step handler failed");
                StepOutcome::failed(format!("{err:#}"))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Step handler panicked");
                StepOutcome::failed(format!("handler panicked: {message}"))
            }
        }
    }

    async fn commit(
        &self,
        claimed: &Process,
        commit: StepCommit,
    ) -> Result<ExecutionReport, ProcessError> {
        match self.store.apply(commit.changes.clone()).await {
            Ok(()) => {
                self.projection
                    .recompute_for_process(&commit.process.id, commit.affected_entry_types.iter().copied())
                    .await;
                Ok(ExecutionReport::from_commit(&commit, true))
            }
            Err(err) if err.is_concurrency_conflict() => {
                warn!(
                    process_id = %claimed.id,
                    step_id = %commit.step.id,
                    error = %err,
                    "Lease lost before commit, discarding step result"
                );
                self.metrics.record_commit_conflict(commit.step.step_type);
                Ok(ExecutionReport::from_commit(&commit, false))
            }
            Err(err) => {
                error!(process_id = %claimed.id, error = %err, "Failed to commit step result");
                self.release(claimed).await;
                Err(err)
            }
        }
    }

    /// Drop the lease without recording anything; failures are only logged
    async fn release(&self, claimed: &Process) {
        let changes = ChangeSet::new().with(Mutation::UpdateProcess {
            expected_version: claimed.version,
            process: claimed.released(),
        });
        if let Err(err) = self.store.apply(changes).await {
            warn!(process_id = %claimed.id, error = %err, "Failed to release process lock");
        }
    }

    /// Claim one process and execute its oldest executable step.
    ///
    /// A cancelled or failed process gets its TODO steps aborted instead.
    /// Returns `None` when nothing was claimable.
    pub async fn run_once(&self) -> Result<Option<ExecutionReport>, ProcessError> {
        let step_types = self.executable_step_types();
        let Some(claimed) = self.claim(&step_types).await? else {
            return Ok(None);
        };

        if !claimed.process.is_active() {
            let commit = match plan_abort_pending(&claimed.process, &claimed.pending_steps, self.clock.now()) {
                Ok(commit) => commit,
                Err(err) => {
                    self.release(&claimed.process).await;
                    return Err(err);
                }
            };
            info!(
                process_id = %claimed.process.id,
                status = %claimed.process.status,
                aborted = claimed.pending_steps.len(),
                "Aborting pending steps of inactive process"
            );
            return self.commit(&claimed.process, commit).await.map(Some);
        }

        let Some(step) = claimed.steps.first().cloned() else {
            self.release(&claimed.process).await;
            return Ok(None);
        };
        self.execute(&claimed, &step).await.map(Some)
    }

    /// Poll until `shutdown` turns true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ProcessError> {
        let step_types = self.executable_step_types();
        info!(step_types = step_types.len(), "Step executor started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(err) => error!(error = %err, "Step execution failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Step executor stopped");
        Ok(())
    }

    /// Run until no claimable work is left or `max_steps` were executed.
    ///
    /// Returns the reports in execution order.
    pub async fn drain(&self, max_steps: usize) -> Result<Vec<ExecutionReport>, ProcessError> {
        let mut reports = Vec::new();
        while reports.len() < max_steps {
            match self.run_once().await? {
                Some(report) => reports.push(report),
                None => break,
            }
        }
        Ok(reports)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
