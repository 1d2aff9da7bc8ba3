/// Generate SQL migrations for the PostgreSQL process store
///
/// Every statement is idempotent, so the full list can be replayed on
/// each startup. Audit tables mirror their entity table and add the
/// `audit_v1_*` columns.
pub fn generate_migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "20240601000000_processes",
            r#"
            CREATE TABLE IF NOT EXISTS processes (
                id UUID PRIMARY KEY,
                process_type TEXT NOT NULL,
                process_status TEXT NOT NULL,
                version UUID NOT NULL,
                lock_expiry_date TIMESTAMPTZ NULL,
                application_id UUID NULL,
                date_created TIMESTAMPTZ NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_processes_application_id ON processes(application_id);

            CREATE TABLE IF NOT EXISTS process_steps (
                id UUID PRIMARY KEY,
                sequence BIGSERIAL NOT NULL,
                process_id UUID NOT NULL REFERENCES processes(id) ON DELETE CASCADE,
                process_step_type TEXT NOT NULL,
                process_step_status TEXT NOT NULL,
                message TEXT NULL,
                date_created TIMESTAMPTZ NOT NULL,
                date_last_changed TIMESTAMPTZ NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_process_steps_process_id ON process_steps(process_id, sequence);

            -- Claim queries only ever look at pending steps
            CREATE INDEX IF NOT EXISTS idx_process_steps_pending
                ON process_steps(process_step_type, date_created)
                WHERE process_step_status = 'TODO';
            "#,
        ),
        (
            "20240601000001_application_checklist",
            r#"
            CREATE TABLE IF NOT EXISTS application_checklist (
                application_id UUID NOT NULL,
                checklist_entry_type TEXT NOT NULL,
                checklist_entry_status TEXT NOT NULL,
                comment TEXT NULL,
                date_created TIMESTAMPTZ NOT NULL,
                date_last_changed TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (application_id, checklist_entry_type)
            );
            "#,
        ),
        (
            "20240601000002_audit_tables",
            r#"
            CREATE TABLE IF NOT EXISTS audit_processes (
                audit_v1_id UUID PRIMARY KEY,
                id UUID NOT NULL,
                process_type TEXT NOT NULL,
                process_status TEXT NOT NULL,
                version UUID NOT NULL,
                lock_expiry_date TIMESTAMPTZ NULL,
                application_id UUID NULL,
                date_created TIMESTAMPTZ NOT NULL,
                audit_v1_operation TEXT NOT NULL,
                audit_v1_date_last_changed TIMESTAMPTZ NOT NULL,
                audit_v1_last_editor_id UUID NULL,
                audit_v1_sequence BIGSERIAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_processes_id ON audit_processes(id, audit_v1_sequence);

            CREATE TABLE IF NOT EXISTS audit_process_steps (
                audit_v1_id UUID PRIMARY KEY,
                id UUID NOT NULL,
                process_id UUID NOT NULL,
                process_step_type TEXT NOT NULL,
                process_step_status TEXT NOT NULL,
                message TEXT NULL,
                date_created TIMESTAMPTZ NOT NULL,
                date_last_changed TIMESTAMPTZ NOT NULL,
                audit_v1_operation TEXT NOT NULL,
                audit_v1_date_last_changed TIMESTAMPTZ NOT NULL,
                audit_v1_last_editor_id UUID NULL,
                audit_v1_sequence BIGSERIAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_process_steps_id ON audit_process_steps(id, audit_v1_sequence);

            CREATE TABLE IF NOT EXISTS audit_application_checklist (
                audit_v1_id UUID PRIMARY KEY,
                application_id UUID NOT NULL,
                checklist_entry_type TEXT NOT NULL,
                checklist_entry_status TEXT NOT NULL,
                comment TEXT NULL,
                date_created TIMESTAMPTZ NOT NULL,
                date_last_changed TIMESTAMPTZ NOT NULL,
                audit_v1_operation TEXT NOT NULL,
                audit_v1_date_last_changed TIMESTAMPTZ NOT NULL,
                audit_v1_last_editor_id UUID NULL,
                audit_v1_sequence BIGSERIAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_application_checklist_key
                ON audit_application_checklist(application_id, checklist_entry_type, audit_v1_sequence);
            "#,
        ),
    ]
}
