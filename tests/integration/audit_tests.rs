use pretty_assertions::assert_eq;
use uuid::Uuid;

use portal_process_core::{
    ApplicationId, AuditOperation, AuditSnapshot, AuditedEntity, ChangeSet, ChecklistEntryType, Clock, EditorId, HandlerRegistry,
    Mutation, NewProcess, ProcessId, ProcessStatus, ProcessStepStatus, ProcessStepType, ProcessStore,
    ProcessType, StepOutcome,
};
use portal_process_tests::{ScriptedHandler, TestEngine};

async fn process_trail(engine: &TestEngine, process_id: &ProcessId) -> Vec<(AuditOperation, Option<EditorId>)> {
    engine
        .store
        .find_audit_records(AuditedEntity::Process, &process_id.to_string())
        .await
        .unwrap()
        .into_iter()
        .map(|record| (record.operation, record.last_editor_id))
        .collect()
}

#[tokio::test]
async fn test_create_records_every_insert() {
    let engine = TestEngine::new();
    let editor = EditorId(Uuid::new_v4());
    let application_id = ApplicationId::new();

    let process = engine
        .service
        .create_process(
            NewProcess::new(ProcessType::ApplicationChecklist, [ProcessStepType::VerifyRegistration])
                .for_application(application_id)
                .by_editor(editor),
        )
        .await
        .unwrap();

    let records = engine.backend.audit_records().await;
    let inserts: Vec<_> = records
        .iter()
        .filter(|record| record.operation == AuditOperation::Insert)
        .collect();
    let count = |entity: AuditedEntity| inserts.iter().filter(|record| record.snapshot.entity() == entity).count();
    assert_eq!(count(AuditedEntity::Process), 1);
    assert_eq!(count(AuditedEntity::ProcessStep), 1);
    assert_eq!(count(AuditedEntity::ChecklistEntry), 7);
    assert!(inserts.iter().all(|record| record.last_editor_id == Some(editor)));
    assert!(inserts.iter().all(|record| record.date_last_changed == engine.clock.now()));

    // The projection's follow-up write is the engine's, not the editor's
    let updates: Vec<_> = records
        .iter()
        .filter(|record| record.operation == AuditOperation::Update)
        .collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].last_editor_id, None);
    assert!(matches!(
        &updates[0].snapshot,
        AuditSnapshot::ChecklistEntry(entry) if entry.entry_type == ChecklistEntryType::RegistrationVerification
    ));

    assert_eq!(process_trail(&engine, &process.id).await, vec![(AuditOperation::Insert, Some(editor))]);
}

#[tokio::test]
async fn test_executor_writes_update_records() {
    let engine = TestEngine::new();
    let process = engine
        .service
        .create_process(NewProcess::new(ProcessType::Mailing, [ProcessStepType::SendMail]))
        .await
        .unwrap();
    let step = engine.steps(&process.id).await.remove(0);

    let executor = engine.executor(
        HandlerRegistry::new().with(ProcessStepType::SendMail, ScriptedHandler::always(StepOutcome::done())),
    );
    engine.step(&executor).await.unwrap().unwrap();

    // Insert, claim, commit
    assert_eq!(
        process_trail(&engine, &process.id).await,
        vec![
            (AuditOperation::Insert, None),
            (AuditOperation::Update, None),
            (AuditOperation::Update, None),
        ]
    );

    let step_trail = engine
        .store
        .find_audit_records(AuditedEntity::ProcessStep, &step.id.to_string())
        .await
        .unwrap();
    assert_eq!(step_trail.len(), 2);
    assert_eq!(step_trail[1].operation, AuditOperation::Update);
    match &step_trail[1].snapshot {
        AuditSnapshot::ProcessStep(recorded) => assert_eq!(recorded.status, ProcessStepStatus::Done),
        other => panic!("unexpected snapshot {other:?}"),
    }

    // The last process snapshot is unlocked
    let last = engine
        .store
        .find_audit_records(AuditedEntity::Process, &process.id.to_string())
        .await
        .unwrap()
        .pop()
        .unwrap();
    match last.snapshot {
        AuditSnapshot::Process(recorded) => assert_eq!(recorded.lock_expiry_date, None),
        other => panic!("unexpected snapshot {other:?}"),
    }
}

#[tokio::test]
async fn test_cancel_records_editor() {
    let engine = TestEngine::new();
    let editor = EditorId(Uuid::new_v4());
    let process = engine
        .service
        .create_process(NewProcess::new(ProcessType::Mailing, [ProcessStepType::SendMail]))
        .await
        .unwrap();

    engine.tick();
    engine.service.cancel_process(&process.id, Some(editor)).await.unwrap();

    let trail = engine
        .store
        .find_audit_records(AuditedEntity::Process, &process.id.to_string())
        .await
        .unwrap();
    let last = trail.last().unwrap();
    assert_eq!(last.operation, AuditOperation::Update);
    assert_eq!(last.last_editor_id, Some(editor));
    assert!(matches!(&last.snapshot, AuditSnapshot::Process(p) if p.status == ProcessStatus::Cancelled));
}

#[tokio::test]
async fn test_delete_records_delete_operations() {
    let engine = TestEngine::new();
    let editor = EditorId(Uuid::new_v4());
    let process = engine
        .service
        .create_process(NewProcess::new(ProcessType::Mailing, [ProcessStepType::SendMail]))
        .await
        .unwrap();
    let executor = engine.executor(
        HandlerRegistry::new().with(ProcessStepType::SendMail, ScriptedHandler::always(StepOutcome::done())),
    );
    engine.run_until_idle(&executor).await.unwrap();

    engine.tick();
    engine.service.delete_process(&process.id, Some(editor)).await.unwrap();

    let deletes: Vec<_> = engine
        .backend
        .audit_records()
        .await
        .into_iter()
        .filter(|record| record.operation == AuditOperation::Delete)
        .map(|record| (record.snapshot.entity(), record.last_editor_id))
        .collect();
    assert_eq!(
        deletes,
        vec![
            (AuditedEntity::ProcessStep, Some(editor)),
            (AuditedEntity::Process, Some(editor)),
        ]
    );

    // The trail outlives the process
    let trail = process_trail(&engine, &process.id).await;
    assert_eq!(trail.last(), Some(&(AuditOperation::Delete, Some(editor))));
}

#[tokio::test]
async fn test_rejected_change_set_leaves_no_audit_records() {
    let engine = TestEngine::new();
    let process = engine
        .service
        .create_process(NewProcess::new(ProcessType::Mailing, [ProcessStepType::SendMail]))
        .await
        .unwrap();
    let written = engine.backend.audit_records().await.len();

    let current = engine.service.get_process(&process.id).await.unwrap();
    engine
        .store
        .apply(ChangeSet::new().with(Mutation::UpdateProcess {
            expected_version: current.version,
            process: current.released(),
        }))
        .await
        .unwrap();
    let written = written + 1;

    // Stale version: the step insert and both audit records are dropped
    let stale = engine
        .store
        .apply(
            ChangeSet::new()
                .with(Mutation::UpdateProcess {
                    expected_version: current.version,
                    process: current.with_status(ProcessStatus::Cancelled),
                })
                .with(Mutation::InsertStep(portal_process_core::ProcessStep::new(
                    process.id,
                    ProcessStepType::SendMail,
                    engine.clock().now(),
                ))),
        )
        .await;
    assert!(stale.unwrap_err().is_concurrency_conflict());
    assert_eq!(engine.backend.audit_records().await.len(), written);
    assert_eq!(engine.steps(&process.id).await.len(), 1);
}
