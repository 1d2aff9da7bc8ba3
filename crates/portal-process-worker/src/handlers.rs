//! Handlers shipped with the worker.
//!
//! They log the step and move the application checklist along its usual
//! order. Deployments with real integrations register their own handlers
//! for the same step types.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use portal_process_core::{HandlerRegistry, ProcessStepHandler, ProcessStepType, StepContext, StepOutcome};

/// Application checklist steps in the order they are completed
pub const APPLICATION_CHECKLIST_CHAIN: [ProcessStepType; 6] = [
    ProcessStepType::VerifyRegistration,
    ProcessStepType::CreateBusinessPartnerNumberPush,
    ProcessStepType::CreateIdentityWallet,
    ProcessStepType::StartClearingHouse,
    ProcessStepType::StartSelfDescriptionLp,
    ProcessStepType::ActivateApplication,
];

/// Completes its step and enqueues the configured successor
#[derive(Debug, Clone)]
pub struct ChainStepHandler {
    next: Option<ProcessStepType>,
}

impl ChainStepHandler {
    /// Handler enqueueing `next` once done
    pub fn new(next: Option<ProcessStepType>) -> Self {
        Self { next }
    }
}

#[async_trait]
impl ProcessStepHandler for ChainStepHandler {
    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<StepOutcome> {
        info!(
            process_id = %ctx.process.id,
            step_id = %ctx.step.id,
            step_type = %ctx.step.step_type,
            application_id = ?ctx.process.application_id,
            "Executing checklist step"
        );

        let outcome = match self.next {
            Some(next) if !ctx.has_pending(next) => StepOutcome::done_with([next]),
            _ => StepOutcome::done(),
        };
        Ok(outcome.with_message(format!("{} completed", ctx.step.step_type)))
    }
}

/// Registry with a chain handler for every step of [`APPLICATION_CHECKLIST_CHAIN`]
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for (index, step_type) in APPLICATION_CHECKLIST_CHAIN.iter().enumerate() {
        let next = APPLICATION_CHECKLIST_CHAIN.get(index + 1).copied();
        registry.register(*step_type, Arc::new(ChainStepHandler::new(next)));
    }
    registry
}
