//! Step handlers and their registry

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::process::Process;
use crate::domain::process_step::ProcessStep;
use crate::domain::step_type::ProcessStepType;

/// Result of running a step handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Work completed
    Done {
        /// Step types to enqueue next
        next_steps: Vec<ProcessStepType>,
        /// Pending step types made unnecessary by this result
        skip_step_types: Vec<ProcessStepType>,
        /// Result detail
        message: Option<String>,
    },

    /// Work not applicable
    Skipped {
        /// Reason
        message: Option<String>,
    },

    /// Work failed
    Failed {
        /// Diagnostic
        message: String,
        /// Whether an operator retrigger may fix it; otherwise the process fails
        retryable: bool,
    },
}

impl StepOutcome {
    /// Done without follow-up work
    pub fn done() -> Self {
        StepOutcome::Done {
            next_steps: Vec::new(),
            skip_step_types: Vec::new(),
            message: None,
        }
    }

    /// Done, enqueueing `next_steps`
    pub fn done_with(next_steps: impl IntoIterator<Item = ProcessStepType>) -> Self {
        StepOutcome::Done {
            next_steps: next_steps.into_iter().collect(),
            skip_step_types: Vec::new(),
            message: None,
        }
    }

    /// Skipped with a reason
    pub fn skipped(message: impl Into<String>) -> Self {
        StepOutcome::Skipped {
            message: Some(message.into()),
        }
    }

    /// Retryable failure
    pub fn failed(message: impl Into<String>) -> Self {
        StepOutcome::Failed {
            message: message.into(),
            retryable: true,
        }
    }

    /// Failure that fails the whole process
    pub fn fatal(message: impl Into<String>) -> Self {
        StepOutcome::Failed {
            message: message.into(),
            retryable: false,
        }
    }

    /// Attach a message to a `Done` or `Skipped` outcome
    pub fn with_message(self, text: impl Into<String>) -> Self {
        match self {
            StepOutcome::Done {
                next_steps,
                skip_step_types,
                ..
            } => StepOutcome::Done {
                next_steps,
                skip_step_types,
                message: Some(text.into()),
            },
            StepOutcome::Skipped { .. } => StepOutcome::Skipped {
                message: Some(text.into()),
            },
            failed => failed,
        }
    }

    /// Mark pending steps of `step_types` as skipped on a `Done` outcome
    pub fn skipping(self, step_types: impl IntoIterator<Item = ProcessStepType>) -> Self {
        match self {
            StepOutcome::Done {
                next_steps,
                mut skip_step_types,
                message,
            } => {
                skip_step_types.extend(step_types);
                StepOutcome::Done {
                    next_steps,
                    skip_step_types,
                    message,
                }
            }
            other => other,
        }
    }
}

/// What a handler gets to see
#[derive(Debug, Clone)]
pub struct StepContext {
    /// The claimed process
    pub process: Process,
    /// The step being executed
    pub step: ProcessStep,
    /// All TODO steps of the process at claim time
    pub pending_steps: Vec<ProcessStep>,
}

impl StepContext {
    /// Whether a TODO step of `step_type` other than the current one exists
    pub fn has_pending(&self, step_type: ProcessStepType) -> bool {
        self.pending_steps
            .iter()
            .any(|step| step.step_type == step_type && step.id != self.step.id)
    }
}

/// Business logic behind one step type.
///
/// Errors and panics are reported as retryable failures of the step.
#[async_trait]
pub trait ProcessStepHandler: Send + Sync {
    /// Run the step
    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<StepOutcome>;
}

/// Handlers keyed by the step type they execute
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ProcessStepType, Arc<dyn ProcessStepHandler>>,
}

impl HandlerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `step_type`, replacing any previous one
    pub fn register(
        &mut self,
        step_type: ProcessStepType,
        handler: Arc<dyn ProcessStepHandler>,
    ) -> &mut Self {
        self.handlers.insert(step_type, handler);
        self
    }

    /// Builder form of [`HandlerRegistry::register`]
    pub fn with(mut self, step_type: ProcessStepType, handler: Arc<dyn ProcessStepHandler>) -> Self {
        self.handlers.insert(step_type, handler);
        self
    }

    /// Handler for `step_type`
    pub fn get(&self, step_type: ProcessStepType) -> Option<Arc<dyn ProcessStepHandler>> {
        self.handlers.get(&step_type).cloned()
    }

    /// Step types with a handler
    pub fn step_types(&self) -> Vec<ProcessStepType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("step_types", &self.step_types())
            .finish()
    }
}
