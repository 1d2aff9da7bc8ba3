use async_trait::async_trait;
use sqlx::PgConnection;
use tracing::{debug, trace};
use uuid::Uuid;

use portal_process_core::{
    domain::audit::AuditedEntity, ApplicationId, AuditRecord, AuditSnapshot, ChangeSet,
    ChecklistEntry, ClaimCandidate, ClaimQuery, Mutation, Process, ProcessError, ProcessId,
    ProcessStep, ProcessStore, ProcessVersion,
};

use crate::rows::{audit_from_row, checklist_from_row, process_from_row, step_from_row, store_err};
use crate::PostgresConnection;

const PROCESS_COLUMNS: &str =
    "id, process_type, process_status, version, lock_expiry_date, application_id, date_created";
const STEP_COLUMNS: &str =
    "id, process_id, process_step_type, process_step_status, message, date_created, date_last_changed";
const CHECKLIST_COLUMNS: &str =
    "application_id, checklist_entry_type, checklist_entry_status, comment, date_created, date_last_changed";
const AUDIT_COLUMNS: &str =
    "audit_v1_id, audit_v1_operation, audit_v1_date_last_changed, audit_v1_last_editor_id";

/// Postgres implementation of the ProcessStore
///
/// A change set runs in one transaction; the first failing mutation rolls
/// back everything written before it.
#[derive(Clone)]
pub struct PostgresProcessStore {
    conn: PostgresConnection,
}

impl PostgresProcessStore {
    /// Create a store over an open connection
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }

    /// The underlying connection
    pub fn connection(&self) -> &PostgresConnection {
        &self.conn
    }
}

#[async_trait]
impl ProcessStore for PostgresProcessStore {
    async fn find_process(&self, id: &ProcessId) -> Result<Option<Process>, ProcessError> {
        let query = format!("SELECT {PROCESS_COLUMNS} FROM processes WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| store_err("load process", e))?;
        row.as_ref().map(process_from_row).transpose()
    }

    async fn find_processes_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Process>, ProcessError> {
        let query = format!(
            "SELECT {PROCESS_COLUMNS} FROM processes WHERE application_id = $1 ORDER BY date_created, id"
        );
        let rows = sqlx::query(&query)
            .bind(application_id.0)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| store_err("load application processes", e))?;
        rows.iter().map(process_from_row).collect()
    }

    async fn find_steps(&self, process_id: &ProcessId) -> Result<Vec<ProcessStep>, ProcessError> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM process_steps WHERE process_id = $1 ORDER BY sequence"
        );
        let rows = sqlx::query(&query)
            .bind(process_id.0)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| store_err("load process steps", e))?;
        rows.iter().map(step_from_row).collect()
    }

    async fn find_claim_candidates(
        &self,
        query: &ClaimQuery,
    ) -> Result<Vec<ClaimCandidate>, ProcessError> {
        let step_types: Vec<String> = query
            .step_types
            .iter()
            .map(|step_type| step_type.as_str().to_string())
            .collect();
        let sql = "
            SELECT p.id, p.process_type, p.process_status, p.version, p.lock_expiry_date,
                   p.application_id, p.date_created, MIN(s.date_created) AS oldest_pending
            FROM processes p
            JOIN process_steps s ON s.process_id = p.id
            WHERE s.process_step_status = 'TODO'
              AND (p.lock_expiry_date IS NULL OR p.lock_expiry_date <= $1)
              AND (p.process_status <> 'ACTIVE' OR s.process_step_type = ANY($2))
            GROUP BY p.id
            ORDER BY oldest_pending, p.id
            LIMIT $3
        ";

        let rows = sqlx::query(sql)
            .bind(query.now)
            .bind(&step_types)
            .bind(query.limit as i64)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| store_err("find claimable processes", e))?;

        rows.iter()
            .map(|row| {
                use sqlx::Row;
                Ok(ClaimCandidate {
                    process: process_from_row(row)?,
                    oldest_pending: row.try_get("oldest_pending").map_err(|e| {
                        ProcessError::SerializationError(format!("Error reading oldest_pending: {e}"))
                    })?,
                })
            })
            .collect()
    }

    async fn find_checklist(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ChecklistEntry>, ProcessError> {
        let query = format!(
            "SELECT {CHECKLIST_COLUMNS} FROM application_checklist WHERE application_id = $1"
        );
        let rows = sqlx::query(&query)
            .bind(application_id.0)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| store_err("load checklist", e))?;

        let mut entries = rows.iter().map(checklist_from_row).collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.entry_type);
        Ok(entries)
    }

    async fn find_audit_records(
        &self,
        entity: AuditedEntity,
        entity_id: &str,
    ) -> Result<Vec<AuditRecord>, ProcessError> {
        let pool = self.conn.pool();
        let rows = match entity {
            AuditedEntity::Process => {
                let query = format!(
                    "SELECT {PROCESS_COLUMNS}, {AUDIT_COLUMNS} FROM audit_processes WHERE id = $1 ORDER BY audit_v1_sequence"
                );
                sqlx::query(&query).bind(parse_uuid(entity_id)?).fetch_all(pool).await
            }
            AuditedEntity::ProcessStep => {
                let query = format!(
                    "SELECT {STEP_COLUMNS}, {AUDIT_COLUMNS} FROM audit_process_steps WHERE id = $1 ORDER BY audit_v1_sequence"
                );
                sqlx::query(&query).bind(parse_uuid(entity_id)?).fetch_all(pool).await
            }
            AuditedEntity::ChecklistEntry => {
                let (application_id, entry_type) = entity_id.split_once('/').ok_or_else(|| {
                    ProcessError::Other(format!("invalid checklist audit id: {entity_id}"))
                })?;
                let query = format!(
                    "SELECT {CHECKLIST_COLUMNS}, {AUDIT_COLUMNS} FROM audit_application_checklist \
                     WHERE application_id = $1 AND checklist_entry_type = $2 ORDER BY audit_v1_sequence"
                );
                sqlx::query(&query)
                    .bind(parse_uuid(application_id)?)
                    .bind(entry_type)
                    .fetch_all(pool)
                    .await
            }
        }
        .map_err(|e| store_err("load audit records", e))?;

        rows.iter()
            .map(|row| {
                let snapshot = match entity {
                    AuditedEntity::Process => AuditSnapshot::Process(process_from_row(row)?),
                    AuditedEntity::ProcessStep => AuditSnapshot::ProcessStep(step_from_row(row)?),
                    AuditedEntity::ChecklistEntry => {
                        AuditSnapshot::ChecklistEntry(checklist_from_row(row)?)
                    }
                };
                audit_from_row(row, snapshot)
            })
            .collect()
    }

    async fn apply(&self, changes: ChangeSet) -> Result<(), ProcessError> {
        let mut tx = self
            .conn
            .pool()
            .begin()
            .await
            .map_err(|e| store_err("begin transaction", e))?;

        for mutation in &changes.mutations {
            apply_mutation(&mut *tx, mutation).await?;
        }
        for record in &changes.audit_records {
            insert_audit_record(&mut *tx, record).await?;
        }

        tx.commit()
            .await
            .map_err(|e| store_err("commit transaction", e))?;
        trace!(
            mutations = changes.mutations.len(),
            audit_records = changes.audit_records.len(),
            "Change set committed"
        );
        Ok(())
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, ProcessError> {
    Uuid::parse_str(value).map_err(|e| ProcessError::Other(format!("invalid id {value}: {e}")))
}

async fn apply_mutation(conn: &mut PgConnection, mutation: &Mutation) -> Result<(), ProcessError> {
    match mutation {
        Mutation::InsertProcess(process) => {
            let result = sqlx::query(
                "INSERT INTO processes (id, process_type, process_status, version, lock_expiry_date, application_id, date_created)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(process.id.0)
            .bind(process.process_type.as_str())
            .bind(process.status.as_str())
            .bind(process.version.0)
            .bind(process.lock_expiry_date)
            .bind(process.application_id.map(|id| id.0))
            .bind(process.date_created)
            .execute(&mut *conn)
            .await
            .map_err(|e| store_err("insert process", e))?;

            if result.rows_affected() == 0 {
                return Err(ProcessError::ConcurrencyConflict(format!(
                    "process {} already exists",
                    process.id
                )));
            }
        }
        Mutation::UpdateProcess {
            expected_version,
            process,
        } => {
            let result = sqlx::query(
                "UPDATE processes
                 SET process_status = $2, version = $3, lock_expiry_date = $4, application_id = $5
                 WHERE id = $1 AND version = $6",
            )
            .bind(process.id.0)
            .bind(process.status.as_str())
            .bind(process.version.0)
            .bind(process.lock_expiry_date)
            .bind(process.application_id.map(|id| id.0))
            .bind(expected_version.0)
            .execute(&mut *conn)
            .await
            .map_err(|e| store_err("update process", e))?;

            if result.rows_affected() == 0 {
                return Err(version_mismatch(conn, &process.id, *expected_version).await);
            }
        }
        Mutation::DeleteProcess {
            expected_version,
            process,
        } => {
            let result = sqlx::query("DELETE FROM processes WHERE id = $1 AND version = $2")
                .bind(process.id.0)
                .bind(expected_version.0)
                .execute(&mut *conn)
                .await
                .map_err(|e| store_err("delete process", e))?;

            if result.rows_affected() == 0 {
                return Err(version_mismatch(conn, &process.id, *expected_version).await);
            }
        }
        Mutation::InsertStep(step) => {
            let result = sqlx::query(
                "INSERT INTO process_steps (id, process_id, process_step_type, process_step_status, message, date_created, date_last_changed)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(step.id.0)
            .bind(step.process_id.0)
            .bind(step.step_type.as_str())
            .bind(step.status.as_str())
            .bind(&step.message)
            .bind(step.date_created)
            .bind(step.date_last_changed)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_foreign_key_violation() {
                        return ProcessError::ProcessNotFound(step.process_id.to_string());
                    }
                }
                store_err("insert process step", e)
            })?;

            if result.rows_affected() == 0 {
                return Err(ProcessError::ConcurrencyConflict(format!(
                    "step {} already exists",
                    step.id
                )));
            }
        }
        Mutation::UpdateStep(step) => {
            // Terminal statuses are final: only TODO rows can be rewritten
            let result = sqlx::query(
                "UPDATE process_steps
                 SET process_step_status = $2, message = $3, date_last_changed = $4
                 WHERE id = $1 AND process_step_status = 'TODO'",
            )
            .bind(step.id.0)
            .bind(step.status.as_str())
            .bind(&step.message)
            .bind(step.date_last_changed)
            .execute(&mut *conn)
            .await
            .map_err(|e| store_err("update process step", e))?;

            if result.rows_affected() == 0 {
                let exists = sqlx::query("SELECT 1 FROM process_steps WHERE id = $1")
                    .bind(step.id.0)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(|e| store_err("load process step", e))?
                    .is_some();
                return Err(if exists {
                    ProcessError::InvalidStepTransition(format!("step {} is no longer TODO", step.id))
                } else {
                    ProcessError::StepNotFound(step.id.to_string())
                });
            }
        }
        Mutation::DeleteStep(step) => {
            let result = sqlx::query("DELETE FROM process_steps WHERE id = $1")
                .bind(step.id.0)
                .execute(&mut *conn)
                .await
                .map_err(|e| store_err("delete process step", e))?;

            if result.rows_affected() == 0 {
                return Err(ProcessError::StepNotFound(step.id.to_string()));
            }
        }
        Mutation::InsertChecklistEntry(entry) => {
            let result = sqlx::query(
                "INSERT INTO application_checklist (application_id, checklist_entry_type, checklist_entry_status, comment, date_created, date_last_changed)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (application_id, checklist_entry_type) DO NOTHING",
            )
            .bind(entry.application_id.0)
            .bind(entry.entry_type.as_str())
            .bind(entry.status.as_str())
            .bind(&entry.comment)
            .bind(entry.date_created)
            .bind(entry.date_last_changed)
            .execute(&mut *conn)
            .await
            .map_err(|e| store_err("insert checklist entry", e))?;

            if result.rows_affected() == 0 {
                return Err(ProcessError::ConcurrencyConflict(format!(
                    "checklist entry {} of application {} already exists",
                    entry.entry_type, entry.application_id
                )));
            }
        }
        Mutation::UpdateChecklistEntry(entry) => {
            let result = sqlx::query(
                "UPDATE application_checklist
                 SET checklist_entry_status = $3, comment = $4, date_last_changed = $5
                 WHERE application_id = $1 AND checklist_entry_type = $2",
            )
            .bind(entry.application_id.0)
            .bind(entry.entry_type.as_str())
            .bind(entry.status.as_str())
            .bind(&entry.comment)
            .bind(entry.date_last_changed)
            .execute(&mut *conn)
            .await
            .map_err(|e| store_err("update checklist entry", e))?;

            if result.rows_affected() == 0 {
                return Err(ProcessError::StateStoreError(format!(
                    "checklist entry {} of application {} not found",
                    entry.entry_type, entry.application_id
                )));
            }
        }
    }
    Ok(())
}

async fn version_mismatch(
    conn: &mut PgConnection,
    process_id: &ProcessId,
    expected: ProcessVersion,
) -> ProcessError {
    let exists = sqlx::query("SELECT 1 FROM processes WHERE id = $1")
        .bind(process_id.0)
        .fetch_optional(&mut *conn)
        .await;
    match exists {
        Ok(Some(_)) => {
            debug!(process_id = %process_id, expected = %expected, "Process version changed");
            ProcessError::ConcurrencyConflict(format!(
                "process {process_id} no longer has version {expected}"
            ))
        }
        Ok(None) => ProcessError::ProcessNotFound(process_id.to_string()),
        Err(e) => store_err("load process", e),
    }
}

async fn insert_audit_record(conn: &mut PgConnection, record: &AuditRecord) -> Result<(), ProcessError> {
    let editor = record.last_editor_id.map(|editor| editor.0);
    let operation = record.operation.as_str();

    let query = match &record.snapshot {
        AuditSnapshot::Process(process) => sqlx::query(
            "INSERT INTO audit_processes (audit_v1_id, id, process_type, process_status, version, lock_expiry_date, application_id, date_created,
                                          audit_v1_operation, audit_v1_date_last_changed, audit_v1_last_editor_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.audit_id)
        .bind(process.id.0)
        .bind(process.process_type.as_str())
        .bind(process.status.as_str())
        .bind(process.version.0)
        .bind(process.lock_expiry_date)
        .bind(process.application_id.map(|id| id.0))
        .bind(process.date_created),
        AuditSnapshot::ProcessStep(step) => sqlx::query(
            "INSERT INTO audit_process_steps (audit_v1_id, id, process_id, process_step_type, process_step_status, message, date_created, date_last_changed,
                                              audit_v1_operation, audit_v1_date_last_changed, audit_v1_last_editor_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.audit_id)
        .bind(step.id.0)
        .bind(step.process_id.0)
        .bind(step.step_type.as_str())
        .bind(step.status.as_str())
        .bind(step.message.clone())
        .bind(step.date_created)
        .bind(step.date_last_changed),
        AuditSnapshot::ChecklistEntry(entry) => sqlx::query(
            "INSERT INTO audit_application_checklist (audit_v1_id, application_id, checklist_entry_type, checklist_entry_status, comment,
                                                      date_created, date_last_changed,
                                                      audit_v1_operation, audit_v1_date_last_changed, audit_v1_last_editor_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.audit_id)
        .bind(entry.application_id.0)
        .bind(entry.entry_type.as_str())
        .bind(entry.status.as_str())
        .bind(entry.comment.clone())
        .bind(entry.date_created)
        .bind(entry.date_last_changed),
    };

    query
        .bind(operation)
        .bind(record.date_last_changed)
        .bind(editor)
        .execute(&mut *conn)
        .await
        .map_err(|e| store_err("insert audit record", e))?;
    Ok(())
}
