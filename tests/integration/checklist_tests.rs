use pretty_assertions::assert_eq;

use portal_process_core::{
    ApplicationId, ChangeSet, ChecklistEntryStatus, ChecklistEntryType, Clock, HandlerRegistry, Mutation,
    NewProcess, Process, ProcessStep, ProcessStepType, ProcessStore, ProcessType, StepOutcome,
};
use portal_process_tests::{ScriptedHandler, TestEngine};

async fn checklist_process(engine: &TestEngine, application_id: ApplicationId, initial: &[ProcessStepType]) -> Process {
    engine
        .service
        .create_process(
            NewProcess::new(ProcessType::ApplicationChecklist, initial.iter().copied())
                .for_application(application_id),
        )
        .await
        .unwrap()
}

async fn status(engine: &TestEngine, application_id: &ApplicationId, entry_type: ChecklistEntryType) -> ChecklistEntryStatus {
    engine.entry(application_id, entry_type).await.unwrap().status
}

#[tokio::test]
async fn test_entry_moves_from_todo_to_done() {
    let engine = TestEngine::new();
    let application_id = ApplicationId::new();
    checklist_process(&engine, application_id, &[ProcessStepType::VerifyRegistration]).await;

    assert_eq!(
        status(&engine, &application_id, ChecklistEntryType::BusinessPartnerNumber).await,
        ChecklistEntryStatus::ToDo
    );

    let executor = engine.executor(
        HandlerRegistry::new()
            .with(
                ProcessStepType::VerifyRegistration,
                ScriptedHandler::always(StepOutcome::done_with([ProcessStepType::CreateBusinessPartnerNumberPush])),
            )
            .with(
                ProcessStepType::CreateBusinessPartnerNumberPush,
                ScriptedHandler::always(StepOutcome::done().with_message("BPNL00000003AYRE")),
            ),
    );

    engine.step(&executor).await.unwrap().unwrap();
    assert_eq!(
        status(&engine, &application_id, ChecklistEntryType::BusinessPartnerNumber).await,
        ChecklistEntryStatus::InProgress
    );

    engine.step(&executor).await.unwrap().unwrap();
    let bpn = engine
        .entry(&application_id, ChecklistEntryType::BusinessPartnerNumber)
        .await
        .unwrap();
    assert_eq!(bpn.status, ChecklistEntryStatus::Done);
    assert_eq!(bpn.comment.as_deref(), Some("BPNL00000003AYRE"));
    assert_eq!(bpn.date_last_changed, engine.clock.now());
    assert!(bpn.date_created < bpn.date_last_changed);
}

#[tokio::test]
async fn test_failure_of_latest_step_fails_entry() {
    let engine = TestEngine::new();
    let application_id = ApplicationId::new();
    checklist_process(&engine, application_id, &[ProcessStepType::StartSelfDescriptionLp]).await;

    let executor = engine.executor(HandlerRegistry::new().with(
        ProcessStepType::StartSelfDescriptionLp,
        ScriptedHandler::always(StepOutcome::failed("sd factory returned 503")),
    ));
    engine.step(&executor).await.unwrap().unwrap();

    let entry = engine
        .entry(&application_id, ChecklistEntryType::SelfDescriptionLp)
        .await
        .unwrap();
    assert_eq!(entry.status, ChecklistEntryStatus::Failed);
    assert_eq!(entry.comment.as_deref(), Some("sd factory returned 503"));

    // Other categories are untouched
    assert_eq!(
        status(&engine, &application_id, ChecklistEntryType::ClearingHouse).await,
        ChecklistEntryStatus::ToDo
    );
}

#[tokio::test]
async fn test_recompute_is_idempotent() {
    let engine = TestEngine::new();
    let application_id = ApplicationId::new();
    checklist_process(&engine, application_id, &[ProcessStepType::CreateIdentityWallet]).await;

    let written = engine.backend.audit_records().await.len();
    let projection = engine.service.projection();

    engine.tick();
    let first = projection
        .recompute(application_id, ChecklistEntryType::IdentityWallet)
        .await
        .unwrap();
    let second = projection
        .recompute(application_id, ChecklistEntryType::IdentityWallet)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.status, ChecklistEntryStatus::InProgress);
    assert_eq!(engine.backend.audit_records().await.len(), written);
}

#[tokio::test]
async fn test_recompute_repairs_stale_row() {
    let engine = TestEngine::new();
    let application_id = ApplicationId::new();
    checklist_process(&engine, application_id, &[ProcessStepType::CreateIdentityWallet]).await;

    let mut stale = engine
        .entry(&application_id, ChecklistEntryType::IdentityWallet)
        .await
        .unwrap();
    stale.status = ChecklistEntryStatus::Done;
    stale.comment = Some("stale".to_string());
    engine
        .store
        .apply(ChangeSet::new().with(Mutation::UpdateChecklistEntry(stale)))
        .await
        .unwrap();

    let written = engine.backend.audit_records().await.len();
    engine.tick();
    let repaired = engine
        .service
        .projection()
        .recompute(application_id, ChecklistEntryType::IdentityWallet)
        .await
        .unwrap();
    assert_eq!(repaired.status, ChecklistEntryStatus::InProgress);
    assert_eq!(repaired.comment, None);
    assert_eq!(engine.backend.audit_records().await.len(), written + 1);

    engine
        .service
        .projection()
        .recompute(application_id, ChecklistEntryType::IdentityWallet)
        .await
        .unwrap();
    assert_eq!(engine.backend.audit_records().await.len(), written + 1);
}

#[tokio::test]
async fn test_recompute_all_creates_missing_rows() {
    let engine = TestEngine::new();
    let application_id = ApplicationId::new();

    // A process written without its checklist rows
    let now = engine.clock.now();
    let process = Process::new(ProcessType::ApplicationChecklist, Some(application_id), now);
    engine
        .store
        .apply(
            ChangeSet::new()
                .with(Mutation::InsertProcess(process.clone()))
                .with(Mutation::InsertStep(ProcessStep::new(
                    process.id,
                    ProcessStepType::StartClearingHouse,
                    now,
                ))),
        )
        .await
        .unwrap();
    assert!(engine.service.checklist(&application_id).await.unwrap().is_empty());

    engine.tick();
    let entries = engine.service.projection().recompute_all(application_id).await.unwrap();
    let types: Vec<_> = entries.iter().map(|entry| entry.entry_type).collect();
    assert_eq!(types, ChecklistEntryType::ALL.to_vec());

    let stored = engine.service.checklist(&application_id).await.unwrap();
    assert_eq!(stored, entries);
    for entry in stored {
        let expected = if entry.entry_type == ChecklistEntryType::ClearingHouse {
            ChecklistEntryStatus::InProgress
        } else {
            ChecklistEntryStatus::ToDo
        };
        assert_eq!(entry.status, expected, "{}", entry.entry_type);
    }
}

#[tokio::test]
async fn test_duplicate_steps_do_not_count() {
    let engine = TestEngine::new();
    let application_id = ApplicationId::new();
    let process = checklist_process(&engine, application_id, &[ProcessStepType::CreateIdentityWallet]).await;
    engine.tick();
    engine
        .store
        .apply(ChangeSet::new().with(Mutation::InsertStep(ProcessStep::new(
            process.id,
            ProcessStepType::CreateIdentityWallet,
            engine.clock.now(),
        ))))
        .await
        .unwrap();

    let executor = engine.executor(HandlerRegistry::new().with(
        ProcessStepType::CreateIdentityWallet,
        ScriptedHandler::always(StepOutcome::done().with_message("wallet created")),
    ));
    engine.run_until_idle(&executor).await.unwrap();

    let entry = engine
        .entry(&application_id, ChecklistEntryType::IdentityWallet)
        .await
        .unwrap();
    assert_eq!(entry.status, ChecklistEntryStatus::Done);
    assert_eq!(entry.comment.as_deref(), Some("wallet created"));
}

#[tokio::test]
async fn test_second_process_shares_checklist() {
    let engine = TestEngine::new();
    let application_id = ApplicationId::new();
    checklist_process(&engine, application_id, &[ProcessStepType::VerifyRegistration]).await;
    engine.tick();
    checklist_process(&engine, application_id, &[ProcessStepType::StartClearingHouse]).await;

    let checklist = engine.service.checklist(&application_id).await.unwrap();
    assert_eq!(checklist.len(), ChecklistEntryType::ALL.len());
    assert_eq!(
        status(&engine, &application_id, ChecklistEntryType::RegistrationVerification).await,
        ChecklistEntryStatus::InProgress
    );
    assert_eq!(
        status(&engine, &application_id, ChecklistEntryType::ClearingHouse).await,
        ChecklistEntryStatus::InProgress
    );
}

#[tokio::test]
async fn test_other_process_types_leave_checklist_alone() {
    let engine = TestEngine::new();
    let application_id = ApplicationId::new();
    engine
        .service
        .create_process(
            NewProcess::new(ProcessType::Mailing, [ProcessStepType::SendMail]).for_application(application_id),
        )
        .await
        .unwrap();

    let executor = engine.executor(
        HandlerRegistry::new().with(ProcessStepType::SendMail, ScriptedHandler::always(StepOutcome::done())),
    );
    engine.run_until_idle(&executor).await.unwrap();

    assert!(engine.service.checklist(&application_id).await.unwrap().is_empty());
}
