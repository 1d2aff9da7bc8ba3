//! End-to-end walkthroughs of claim, execute, retry, takeover and cancel

use pretty_assertions::assert_eq;

use portal_process_core::{
    ApplicationId, ChangeSet, ChecklistEntryStatus, ClaimQuery, Clock, ChecklistEntryType, HandlerRegistry, Mutation,
    NewProcess, ProcessStatus, ProcessStep, ProcessStepStatus, ProcessStepType, ProcessStore, ProcessType,
    StepOutcome,
};
use portal_process_tests::{ScriptedHandler, TestEngine};

async fn checklist_process(engine: &TestEngine, initial: &[ProcessStepType]) -> (ApplicationId, portal_process_core::Process) {
    let application_id = ApplicationId::new();
    let process = engine
        .service
        .create_process(
            NewProcess::new(ProcessType::ApplicationChecklist, initial.iter().copied())
                .for_application(application_id),
        )
        .await
        .unwrap();
    (application_id, process)
}

#[tokio::test]
async fn test_success_enqueues_successor_and_releases_lock() {
    let engine = TestEngine::new();
    let (application_id, process) = checklist_process(&engine, &[ProcessStepType::VerifyRegistration]).await;

    let handler = ScriptedHandler::always(
        StepOutcome::done_with([ProcessStepType::CreateBusinessPartnerNumberPush]),
    );
    let executor = engine.executor(HandlerRegistry::new().with(ProcessStepType::VerifyRegistration, handler.clone()));

    let report = engine.step(&executor).await.unwrap().unwrap();
    assert!(report.committed);
    assert_eq!(report.status, ProcessStepStatus::Done);
    assert_eq!(report.inserted_steps, vec![ProcessStepType::CreateBusinessPartnerNumberPush]);

    let steps = engine.steps(&process.id).await;
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].status, ProcessStepStatus::Done);
    assert_eq!(steps[1].step_type, ProcessStepType::CreateBusinessPartnerNumberPush);
    assert_eq!(steps[1].status, ProcessStepStatus::Todo);

    let stored = engine.service.get_process(&process.id).await.unwrap();
    assert_eq!(stored.lock_expiry_date, None);
    assert_ne!(stored.version, process.version);
    assert_eq!(handler.calls(), 1);

    let verification = engine
        .entry(&application_id, ChecklistEntryType::RegistrationVerification)
        .await
        .unwrap();
    assert_eq!(verification.status, ChecklistEntryStatus::Done);
    let bpn = engine
        .entry(&application_id, ChecklistEntryType::BusinessPartnerNumber)
        .await
        .unwrap();
    assert_eq!(bpn.status, ChecklistEntryStatus::InProgress);
}

#[tokio::test]
async fn test_racing_executors_claim_different_processes() {
    let engine = TestEngine::new();
    let (_, first) = checklist_process(&engine, &[ProcessStepType::VerifyRegistration]).await;
    engine.tick();
    let (_, second) = checklist_process(&engine, &[ProcessStepType::VerifyRegistration]).await;

    // Both executors read the candidates before either claims
    let candidates = engine
        .store
        .find_claim_candidates(&ClaimQuery {
            step_types: vec![ProcessStepType::VerifyRegistration],
            now: engine.clock.now(),
            limit: 10,
        })
        .await
        .unwrap();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].process.id, first.id);

    // A stale claim on the same version loses
    let now = engine.clock.now();
    let winner = engine
        .store
        .apply(ChangeSet::new().with(Mutation::UpdateProcess {
            expected_version: first.version,
            process: first.locked(now, chrono::Duration::seconds(60)),
        }))
        .await;
    let loser = engine
        .store
        .apply(ChangeSet::new().with(Mutation::UpdateProcess {
            expected_version: first.version,
            process: first.locked(now, chrono::Duration::seconds(60)),
        }))
        .await;
    assert!(winner.is_ok());
    assert!(loser.unwrap_err().is_concurrency_conflict());

    // The executor that lost moves on to the next process
    let executor = engine.executor(
        HandlerRegistry::new().with(ProcessStepType::VerifyRegistration, ScriptedHandler::always(StepOutcome::done())),
    );
    let claimed = executor
        .claim(&[ProcessStepType::VerifyRegistration])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.process.id, second.id);
}

#[tokio::test]
async fn test_retryable_failure_fails_checklist_entry_until_retriggered() {
    let engine = TestEngine::new();
    let (application_id, process) = checklist_process(&engine, &[ProcessStepType::StartClearingHouse]).await;

    let handler = ScriptedHandler::scripted(
        vec![Err("clearing house unavailable".to_string())],
        StepOutcome::done().with_message("submitted"),
    );
    let executor = engine.executor(HandlerRegistry::new().with(ProcessStepType::StartClearingHouse, handler.clone()));

    let report = engine.step(&executor).await.unwrap().unwrap();
    assert_eq!(report.status, ProcessStepStatus::Failed);
    assert_eq!(report.message.as_deref(), Some("clearing house unavailable"));

    let stored = engine.service.get_process(&process.id).await.unwrap();
    assert_eq!(stored.lock_expiry_date, None);
    assert_eq!(stored.status, ProcessStatus::Active);

    let entry = engine
        .entry(&application_id, ChecklistEntryType::ClearingHouse)
        .await
        .unwrap();
    assert_eq!(entry.status, ChecklistEntryStatus::Failed);
    assert_eq!(entry.comment.as_deref(), Some("clearing house unavailable"));

    // Nothing runs again until an operator retriggers
    assert!(engine.step(&executor).await.unwrap().is_none());

    engine
        .service
        .retrigger(&process.id, ProcessStepType::StartClearingHouse, None)
        .await
        .unwrap();
    let entry = engine
        .entry(&application_id, ChecklistEntryType::ClearingHouse)
        .await
        .unwrap();
    assert_eq!(entry.status, ChecklistEntryStatus::InProgress);

    let reports = engine.run_until_idle(&executor).await.unwrap();
    let executed: Vec<_> = reports.iter().map(|r| (r.step_type, r.status)).collect();
    assert_eq!(
        executed,
        vec![
            (ProcessStepType::RetriggerClearingHouse, ProcessStepStatus::Done),
            (ProcessStepType::StartClearingHouse, ProcessStepStatus::Done),
        ]
    );

    // The failed attempt stays in the history untouched
    let attempts = engine.steps_of(&process.id, ProcessStepType::StartClearingHouse).await;
    let statuses: Vec<_> = attempts.iter().map(|step| step.status).collect();
    assert_eq!(statuses, vec![ProcessStepStatus::Failed, ProcessStepStatus::Done]);

    let entry = engine
        .entry(&application_id, ChecklistEntryType::ClearingHouse)
        .await
        .unwrap();
    assert_eq!(entry.status, ChecklistEntryStatus::Done);
    assert_eq!(entry.comment.as_deref(), Some("submitted"));
    assert_eq!(handler.calls(), 2);
}

#[tokio::test]
async fn test_crashed_executor_is_taken_over_after_lease_expiry() {
    let engine = TestEngine::new();
    let (_, process) = checklist_process(&engine, &[ProcessStepType::CreateIdentityWallet]).await;

    // A second trigger enqueued the same work
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

    let handler = ScriptedHandler::always(StepOutcome::done());
    let crashed = engine.executor(HandlerRegistry::new().with(ProcessStepType::CreateIdentityWallet, handler.clone()));
    let survivor = engine.executor(HandlerRegistry::new().with(ProcessStepType::CreateIdentityWallet, handler.clone()));

    let stale_claim = crashed
        .claim(&[ProcessStepType::CreateIdentityWallet])
        .await
        .unwrap()
        .unwrap();

    // While the lease is live nobody else gets the process
    assert!(engine.step(&survivor).await.unwrap().is_none());

    engine.expire_leases();
    let report = engine.step(&survivor).await.unwrap().unwrap();
    assert!(report.committed);
    assert_eq!(report.status, ProcessStepStatus::Done);

    // The crashed executor wakes up and tries to record its result
    let step = stale_claim.steps[0].clone();
    let late = crashed.execute(&stale_claim, &step).await.unwrap();
    assert!(!late.committed);

    let statuses: Vec<_> = engine
        .steps_of(&process.id, ProcessStepType::CreateIdentityWallet)
        .await
        .into_iter()
        .map(|step| step.status)
        .collect();
    assert_eq!(statuses, vec![ProcessStepStatus::Done, ProcessStepStatus::Duplicate]);
    assert!(engine.step(&survivor).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_process_aborts_pending_steps() {
    let engine = TestEngine::new();
    let (application_id, process) = checklist_process(
        &engine,
        &[ProcessStepType::CreateIdentityWallet, ProcessStepType::StartClearingHouse],
    )
    .await;

    engine.tick();
    let cancelled = engine.service.cancel_process(&process.id, None).await.unwrap();
    assert_eq!(cancelled.status, ProcessStatus::Cancelled);

    // Handlers are irrelevant: the sweep never runs them
    let handler = ScriptedHandler::always(StepOutcome::done());
    let executor = engine.executor(HandlerRegistry::new().with(ProcessStepType::VerifyRegistration, handler.clone()));

    let report = engine.step(&executor).await.unwrap().unwrap();
    assert_eq!(report.status, ProcessStepStatus::Aborted);
    assert_eq!(handler.calls(), 0);

    let steps = engine.steps(&process.id).await;
    assert!(steps.iter().all(|step| step.status == ProcessStepStatus::Aborted));
    assert!(steps.iter().all(|step| step.message.as_deref() == Some("process cancelled")));
    assert!(engine.service.get_process(&process.id).await.unwrap().is_terminal(&steps));

    for entry_type in [ChecklistEntryType::IdentityWallet, ChecklistEntryType::ClearingHouse] {
        let entry = engine.entry(&application_id, entry_type).await.unwrap();
        assert_eq!(entry.status, ChecklistEntryStatus::Failed, "{entry_type}");
        assert_eq!(entry.comment.as_deref(), Some("process cancelled"));
    }

    assert!(engine.step(&executor).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_single_winner() {
    let engine = TestEngine::new();
    let (_, process) = checklist_process(&engine, &[ProcessStepType::VerifyRegistration]).await;

    let handler = ScriptedHandler::always(StepOutcome::done());
    let mut claims = Vec::new();
    for _ in 0..8 {
        let executor = engine.executor(HandlerRegistry::new().with(ProcessStepType::VerifyRegistration, handler.clone()));
        claims.push(tokio::spawn(async move {
            executor.claim(&[ProcessStepType::VerifyRegistration]).await
        }));
    }

    let mut winners = Vec::new();
    for result in futures::future::join_all(claims).await {
        if let Some(claimed) = result.unwrap().unwrap() {
            winners.push(claimed.process.id);
        }
    }
    assert_eq!(winners, vec![process.id]);
}

#[tokio::test]
async fn test_pending_retrigger_becomes_claimable_after_lease_expiry() {
    let engine = TestEngine::new();
    let (_, process) = checklist_process(&engine, &[ProcessStepType::CreateIdentityWallet]).await;

    let handler = ScriptedHandler::scripted(vec![Err("wallet service down".to_string())], StepOutcome::done());
    let executor = engine.executor(HandlerRegistry::new().with(ProcessStepType::CreateIdentityWallet, handler.clone()));
    engine.step(&executor).await.unwrap().unwrap();

    engine.tick();
    engine
        .service
        .retrigger(&process.id, ProcessStepType::CreateIdentityWallet, None)
        .await
        .unwrap();

    // An executor takes the retrigger and dies without committing
    let abandoned = executor
        .claim(&[ProcessStepType::RetriggerIdentityWallet])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(abandoned.steps[0].step_type, ProcessStepType::RetriggerIdentityWallet);
    assert!(engine.step(&executor).await.unwrap().is_none());

    engine.expire_leases();
    let reports = engine.run_until_idle(&executor).await.unwrap();
    let executed: Vec<_> = reports.iter().map(|r| r.step_type).collect();
    assert_eq!(
        executed,
        vec![ProcessStepType::RetriggerIdentityWallet, ProcessStepType::CreateIdentityWallet]
    );
    assert!(reports.iter().all(|r| r.committed && r.status == ProcessStepStatus::Done));
    assert!(engine
        .service
        .get_process(&process.id)
        .await
        .unwrap()
        .is_terminal(&engine.steps(&process.id).await));
}
