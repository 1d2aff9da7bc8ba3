//! Mapping between table rows and domain types

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

use portal_process_core::{
    ApplicationId, AuditOperation, AuditRecord, AuditSnapshot, ChecklistEntry, EditorId, Process,
    ProcessError, ProcessId, ProcessStep, ProcessStepId, ProcessVersion,
};

/// Wrap a database error with what was being done
pub(crate) fn store_err(action: &str, err: sqlx::Error) -> ProcessError {
    ProcessError::StateStoreError(format!("Failed to {action}: {err}"))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, ProcessError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| ProcessError::SerializationError(format!("Error reading column {name}: {e}")))
}

fn coded<T>(row: &PgRow, name: &str) -> Result<T, ProcessError>
where
    T: FromStr<Err = ProcessError>,
{
    column::<String>(row, name)?.parse()
}

pub(crate) fn process_from_row(row: &PgRow) -> Result<Process, ProcessError> {
    Ok(Process {
        id: ProcessId(column(row, "id")?),
        process_type: coded(row, "process_type")?,
        status: coded(row, "process_status")?,
        version: ProcessVersion(column(row, "version")?),
        lock_expiry_date: column(row, "lock_expiry_date")?,
        application_id: column::<Option<Uuid>>(row, "application_id")?.map(ApplicationId),
        date_created: column(row, "date_created")?,
    })
}

pub(crate) fn step_from_row(row: &PgRow) -> Result<ProcessStep, ProcessError> {
    Ok(ProcessStep {
        id: ProcessStepId(column(row, "id")?),
        process_id: ProcessId(column(row, "process_id")?),
        step_type: coded(row, "process_step_type")?,
        status: coded(row, "process_step_status")?,
        message: column(row, "message")?,
        date_created: column(row, "date_created")?,
        date_last_changed: column(row, "date_last_changed")?,
    })
}

pub(crate) fn checklist_from_row(row: &PgRow) -> Result<ChecklistEntry, ProcessError> {
    Ok(ChecklistEntry {
        application_id: ApplicationId(column(row, "application_id")?),
        entry_type: coded(row, "checklist_entry_type")?,
        status: coded(row, "checklist_entry_status")?,
        comment: column(row, "comment")?,
        date_created: column(row, "date_created")?,
        date_last_changed: column(row, "date_last_changed")?,
    })
}

/// Rebuild an audit record from an audit table row and its entity snapshot
pub(crate) fn audit_from_row(row: &PgRow, snapshot: AuditSnapshot) -> Result<AuditRecord, ProcessError> {
    let operation: AuditOperation = coded(row, "audit_v1_operation")?;
    let date_last_changed: DateTime<Utc> = column(row, "audit_v1_date_last_changed")?;
    let editor: Option<Uuid> = column(row, "audit_v1_last_editor_id")?;

    Ok(AuditRecord {
        audit_id: column(row, "audit_v1_id")?,
        operation,
        snapshot,
        date_last_changed,
        last_editor_id: editor.map(EditorId),
    })
}
