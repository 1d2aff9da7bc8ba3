//! Shared harness for the end-to-end tests.
//!
//! Everything runs against the in-memory store, wrapped in the audit
//! decorator, with a manual clock so lease expiry needs no sleeping.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use portal_process_core::{
    ApplicationId, AuditingProcessStore, ChecklistEntry, ChecklistEntryType, Clock, ExecutionReport,
    ExecutorConfig, HandlerRegistry, ManualClock, ProcessError, ProcessId, ProcessService, ProcessStep,
    ProcessStepHandler, ProcessStepType, ProcessStore, StepContext, StepExecutor, StepOutcome,
};
use portal_process_inmemory::InMemoryProcessStore;

/// Install a test subscriber once; later calls are no-ops
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("portal_process_core=debug")
        .with_test_writer()
        .try_init();
}

/// Lease used by [`TestEngine`] executors
pub const TEST_LEASE_SECS: i64 = 60;

/// Store, clock and services wired together
pub struct TestEngine {
    /// Frozen clock, moved by [`TestEngine::tick`]
    pub clock: Arc<ManualClock>,
    /// The undecorated store, for inspection
    pub backend: InMemoryProcessStore,
    /// The audited store every component writes through
    pub store: Arc<dyn ProcessStore>,
    /// Operator surface
    pub service: ProcessService,
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngine {
    /// Fresh engine with an empty store
    pub fn new() -> Self {
        init_test_tracing();

        let start = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).single().unwrap_or_else(Utc::now);
        let clock = Arc::new(ManualClock::new(start));
        let backend = InMemoryProcessStore::new();
        let store: Arc<dyn ProcessStore> =
            Arc::new(AuditingProcessStore::new(backend.clone(), clock.clone()));
        let service = ProcessService::new(store.clone(), clock.clone());

        Self {
            clock,
            backend,
            store,
            service,
        }
    }

    /// The clock as a trait object
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Executor settings used by the tests
    pub fn config(&self) -> ExecutorConfig {
        ExecutorConfig {
            lock_lease_secs: TEST_LEASE_SECS as u64,
            poll_interval_ms: 5,
            claim_batch_size: 10,
            worker_count: 1,
        }
    }

    /// Executor over the shared store
    pub fn executor(&self, handlers: HandlerRegistry) -> StepExecutor {
        StepExecutor::new(self.store.clone(), handlers, self.clock(), self.config())
    }

    /// Move the clock forward one second, so every write gets its own timestamp
    pub fn tick(&self) {
        self.clock.advance(Duration::seconds(1));
    }

    /// Move the clock past any lease taken now
    pub fn expire_leases(&self) {
        self.clock.advance(Duration::seconds(TEST_LEASE_SECS + 1));
    }

    /// Tick, then run one claim/execute round
    pub async fn step(&self, executor: &StepExecutor) -> Result<Option<ExecutionReport>, ProcessError> {
        self.tick();
        executor.run_once().await
    }

    /// Run rounds until nothing is claimable
    pub async fn run_until_idle(&self, executor: &StepExecutor) -> Result<Vec<ExecutionReport>, ProcessError> {
        let mut reports = Vec::new();
        for _ in 0..100 {
            match self.step(executor).await? {
                Some(report) => reports.push(report),
                None => return Ok(reports),
            }
        }
        Err(ProcessError::Other("executor did not go idle".to_string()))
    }

    /// Steps of a process
    pub async fn steps(&self, process_id: &ProcessId) -> Vec<ProcessStep> {
        self.service.get_steps(process_id).await.unwrap_or_default()
    }

    /// Steps of one type, oldest first
    pub async fn steps_of(&self, process_id: &ProcessId, step_type: ProcessStepType) -> Vec<ProcessStep> {
        self.steps(process_id)
            .await
            .into_iter()
            .filter(|step| step.step_type == step_type)
            .collect()
    }

    /// Stored checklist row of one category
    pub async fn entry(&self, application_id: &ApplicationId, entry_type: ChecklistEntryType) -> Option<ChecklistEntry> {
        self.service
            .checklist(application_id)
            .await
            .ok()?
            .into_iter()
            .find(|entry| entry.entry_type == entry_type)
    }
}

/// Handler that plays back queued results, then repeats a fallback
pub struct ScriptedHandler {
    script: Mutex<VecDeque<Result<StepOutcome, String>>>,
    fallback: StepOutcome,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    /// Always return `outcome`
    pub fn always(outcome: StepOutcome) -> Arc<Self> {
        Self::scripted(Vec::new(), outcome)
    }

    /// Return `script` in order, then `fallback`
    pub fn scripted(script: Vec<Result<StepOutcome, String>>, fallback: StepOutcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    /// How often the handler ran
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessStepHandler for ScriptedHandler {
    async fn execute(&self, _ctx: &StepContext) -> anyhow::Result<StepOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match next {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Handler that panics with `message`
pub struct PanickingHandler(pub &'static str);

#[async_trait]
impl ProcessStepHandler for PanickingHandler {
    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<StepOutcome> {
        if ctx.step.is_pending() {
            panic!("{}", self.0);
        }
        Ok(StepOutcome::done())
    }
}
