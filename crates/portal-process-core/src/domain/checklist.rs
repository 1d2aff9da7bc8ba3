use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::process::ApplicationId;
use super::process_step::{ProcessStep, ProcessStepStatus};
use super::step_type::ProcessStepType;

coded_enum! {
    /// Category of the application checklist
    pub enum ChecklistEntryType {
        /// Registration data verified by an operator
        RegistrationVerification => "REGISTRATION_VERIFICATION",
        /// Business partner number assigned
        BusinessPartnerNumber => "BUSINESS_PARTNER_NUMBER",
        /// Identity wallet created
        IdentityWallet => "IDENTITY_WALLET",
        /// BPN credential issued
        BpnlCredential => "BPNL_CREDENTIAL",
        /// Clearing house check passed
        ClearingHouse => "CLEARING_HOUSE",
        /// Legal person self-description created
        SelfDescriptionLp => "SELF_DESCRIPTION_LP",
        /// Company activated
        ApplicationActivation => "APPLICATION_ACTIVATION",
    }
}

impl ChecklistEntryType {
    /// Step types that report into this category
    pub fn step_types(&self) -> Vec<ProcessStepType> {
        ProcessStepType::ALL
            .iter()
            .copied()
            .filter(|step_type| step_type.checklist_entry_type() == Some(*self))
            .collect()
    }
}

coded_enum! {
    /// Derived status of a checklist category
    pub enum ChecklistEntryStatus {
        /// No step of the category has been created yet
        ToDo => "TO_DO",
        /// At least one step of the category is pending
        InProgress => "IN_PROGRESS",
        /// The most recent step of the category completed
        Done => "DONE",
        /// The most recent step of the category failed
        Failed => "FAILED",
    }
}

/// One row of an application's checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistEntry {
    /// Application the entry belongs to
    pub application_id: ApplicationId,

    /// Category
    pub entry_type: ChecklistEntryType,

    /// Derived status
    pub status: ChecklistEntryStatus,

    /// Message of the step that decided the status
    pub comment: Option<String>,

    /// Creation timestamp
    pub date_created: DateTime<Utc>,

    /// Last status or comment change
    pub date_last_changed: DateTime<Utc>,
}

impl ChecklistEntry {
    /// Fresh `TO_DO` entry
    pub fn new(application_id: ApplicationId, entry_type: ChecklistEntryType, now: DateTime<Utc>) -> Self {
        Self {
            application_id,
            entry_type,
            status: ChecklistEntryStatus::ToDo,
            comment: None,
            date_created: now,
            date_last_changed: now,
        }
    }

    /// Whether the stored state already matches `state`
    pub fn matches(&self, state: &DerivedEntryState) -> bool {
        self.status == state.status && self.comment == state.comment
    }

    /// Copy carrying `state`, stamped at `now`
    pub fn with_state(&self, state: DerivedEntryState, now: DateTime<Utc>) -> Self {
        Self {
            status: state.status,
            comment: state.comment,
            date_last_changed: now,
            ..self.clone()
        }
    }
}

/// Status and comment computed from a category's steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedEntryState {
    /// Entry status
    pub status: ChecklistEntryStatus,
    /// Entry comment
    pub comment: Option<String>,
}

/// Compute the checklist state of `entry_type` from the process steps.
///
/// Duplicates never count. Any pending step keeps the category in progress.
/// Otherwise the steps changed last decide: a failure or abort among them
/// fails the category, anything else completes it.
pub fn derive_entry_state<'a, I>(entry_type: ChecklistEntryType, steps: I) -> DerivedEntryState
where
    I: IntoIterator<Item = &'a ProcessStep>,
{
    let relevant: Vec<&ProcessStep> = steps
        .into_iter()
        .filter(|step| step.step_type.checklist_entry_type() == Some(entry_type))
        .filter(|step| step.status != ProcessStepStatus::Duplicate)
        .collect();

    if relevant.is_empty() {
        return DerivedEntryState {
            status: ChecklistEntryStatus::ToDo,
            comment: None,
        };
    }

    if relevant.iter().any(|step| step.is_pending()) {
        return DerivedEntryState {
            status: ChecklistEntryStatus::InProgress,
            comment: None,
        };
    }

    let latest_change = relevant
        .iter()
        .map(|step| step.date_last_changed)
        .max()
        .unwrap_or_default();
    let latest: Vec<&ProcessStep> = relevant
        .into_iter()
        .filter(|step| step.date_last_changed == latest_change)
        .collect();

    let failed = latest.iter().find(|step| {
        matches!(
            step.status,
            ProcessStepStatus::Failed | ProcessStepStatus::Aborted
        )
    });

    match failed {
        Some(step) => DerivedEntryState {
            status: ChecklistEntryStatus::Failed,
            comment: step.message.clone(),
        },
        None => DerivedEntryState {
            status: ChecklistEntryStatus::Done,
            comment: latest.iter().rev().find_map(|step| step.message.clone()),
        },
    }
}
