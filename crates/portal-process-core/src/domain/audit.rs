use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::checklist::ChecklistEntry;
use super::process::{EditorId, Process};
use super::process_step::ProcessStep;

coded_enum! {
    /// Kind of change captured by an audit record
    pub enum AuditOperation {
        /// Row created
        Insert => "INSERT",
        /// Row changed
        Update => "UPDATE",
        /// Row removed
        Delete => "DELETE",
    }
}

coded_enum! {
    /// Entity kinds that carry an audit trail
    pub enum AuditedEntity {
        /// Process rows
        Process => "PROCESS",
        /// Process step rows
        ProcessStep => "PROCESS_STEP",
        /// Checklist rows
        ChecklistEntry => "CHECKLIST_ENTRY",
    }
}

/// Full copy of the entity as written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSnapshot {
    /// Process state
    Process(Process),
    /// Step state
    ProcessStep(ProcessStep),
    /// Checklist state
    ChecklistEntry(ChecklistEntry),
}

impl AuditSnapshot {
    /// Kind of entity captured
    pub fn entity(&self) -> AuditedEntity {
        match self {
            AuditSnapshot::Process(_) => AuditedEntity::Process,
            AuditSnapshot::ProcessStep(_) => AuditedEntity::ProcessStep,
            AuditSnapshot::ChecklistEntry(_) => AuditedEntity::ChecklistEntry,
        }
    }

    /// Identifier of the captured entity, as stored in its audit table
    pub fn entity_id(&self) -> String {
        match self {
            AuditSnapshot::Process(process) => process.id.to_string(),
            AuditSnapshot::ProcessStep(step) => step.id.to_string(),
            AuditSnapshot::ChecklistEntry(entry) => {
                checklist_entity_id(&entry.application_id.to_string(), entry.entry_type.as_str())
            }
        }
    }
}

/// Audit id of a checklist row, which has a composite key
pub fn checklist_entity_id(application_id: &str, entry_type: &str) -> String {
    format!("{application_id}/{entry_type}")
}

/// Immutable record of one write to an audited entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record id
    pub audit_id: Uuid,

    /// Kind of change
    pub operation: AuditOperation,

    /// Entity state after the change (before it, for deletes)
    pub snapshot: AuditSnapshot,

    /// When the change was made
    pub date_last_changed: DateTime<Utc>,

    /// Who made the change; `None` for the engine itself
    pub last_editor_id: Option<EditorId>,
}

impl AuditRecord {
    /// New record for `snapshot`
    pub fn new(
        operation: AuditOperation,
        snapshot: AuditSnapshot,
        now: DateTime<Utc>,
        last_editor_id: Option<EditorId>,
    ) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            operation,
            snapshot,
            date_last_changed: now,
            last_editor_id,
        }
    }
}
