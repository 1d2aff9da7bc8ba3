//! Keeps the application checklist in line with the steps of its processes

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::domain::checklist::{derive_entry_state, ChecklistEntry, ChecklistEntryType};
use crate::domain::process::{ApplicationId, ProcessId, ProcessType};
use crate::domain::repository::{ChangeSet, Mutation, ProcessStore};
use crate::ProcessError;

/// Attempts per recompute before giving up on a racing writer
const RECOMPUTE_ATTEMPTS: usize = 2;

/// Derives checklist rows from process steps and stores them
#[derive(Clone)]
pub struct ChecklistProjection {
    store: Arc<dyn ProcessStore>,
    clock: Arc<dyn Clock>,
}

impl ChecklistProjection {
    /// Create a projection over `store`
    pub fn new(store: Arc<dyn ProcessStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// `TO_DO` rows for every category, written when an application checklist starts
    pub fn initial_entries(application_id: ApplicationId, now: DateTime<Utc>) -> Vec<ChecklistEntry> {
        ChecklistEntryType::ALL
            .iter()
            .map(|entry_type| ChecklistEntry::new(application_id, *entry_type, now))
            .collect()
    }

    /// Stored checklist of an application, in category order
    pub async fn checklist(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ChecklistEntry>, ProcessError> {
        let mut entries = self.store.find_checklist(application_id).await?;
        entries.sort_by_key(|entry| entry.entry_type);
        Ok(entries)
    }

    /// Recompute one category and store it if it changed.
    ///
    /// Running it twice without step changes in between writes nothing the
    /// second time.
    pub async fn recompute(
        &self,
        application_id: ApplicationId,
        entry_type: ChecklistEntryType,
    ) -> Result<ChecklistEntry, ProcessError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_recompute(application_id, entry_type).await {
                Err(err) if err.is_concurrency_conflict() && attempt < RECOMPUTE_ATTEMPTS => {
                    debug!(
                        application_id = %application_id,
                        entry_type = %entry_type,
                        "Checklist write raced, recomputing"
                    );
                }
                result => return result,
            }
        }
    }

    async fn try_recompute(
        &self,
        application_id: ApplicationId,
        entry_type: ChecklistEntryType,
    ) -> Result<ChecklistEntry, ProcessError> {
        let mut steps = Vec::new();
        for process in self
            .store
            .find_processes_for_application(&application_id)
            .await?
            .into_iter()
            .filter(|process| process.process_type == ProcessType::ApplicationChecklist)
        {
            steps.extend(self.store.find_steps(&process.id).await?);
        }

        let state = derive_entry_state(entry_type, &steps);
        let existing = self
            .store
            .find_checklist(&application_id)
            .await?
            .into_iter()
            .find(|entry| entry.entry_type == entry_type);

        let now = self.clock.now();
        let (entry, mutation) = match existing {
            Some(entry) if entry.matches(&state) => return Ok(entry),
            Some(entry) => {
                let updated = entry.with_state(state, now);
                (updated.clone(), Mutation::UpdateChecklistEntry(updated))
            }
            None => {
                let created = ChecklistEntry::new(application_id, entry_type, now).with_state(state, now);
                (created.clone(), Mutation::InsertChecklistEntry(created))
            }
        };

        self.store.apply(ChangeSet::new().with(mutation)).await?;
        debug!(
            application_id = %application_id,
            entry_type = %entry_type,
            status = %entry.status,
            "Checklist entry updated"
        );
        Ok(entry)
    }

    /// Recompute `entry_types` for the application behind `process_id`.
    ///
    /// Failures are logged; the step history stays authoritative and the
    /// next recompute of the category repairs the row.
    pub async fn recompute_for_process(
        &self,
        process_id: &ProcessId,
        entry_types: impl IntoIterator<Item = ChecklistEntryType>,
    ) {
        let process = match self.store.find_process(process_id).await {
            Ok(Some(process)) => process,
            Ok(None) => return,
            Err(err) => {
                warn!(process_id = %process_id, error = %err, "Failed to load process for checklist");
                return;
            }
        };
        let Some(application_id) = process.application_id else {
            return;
        };
        if process.process_type != ProcessType::ApplicationChecklist {
            return;
        }

        for entry_type in entry_types {
            if let Err(err) = self.recompute(application_id, entry_type).await {
                warn!(
                    application_id = %application_id,
                    entry_type = %entry_type,
                    error = %err,
                    "Failed to recompute checklist entry"
                );
            }
        }
    }

    /// Recompute every category of an application
    pub async fn recompute_all(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<ChecklistEntry>, ProcessError> {
        let mut entries = Vec::with_capacity(ChecklistEntryType::ALL.len());
        for entry_type in ChecklistEntryType::ALL {
            entries.push(self.recompute(application_id, *entry_type).await?);
        }
        Ok(entries)
    }
}
