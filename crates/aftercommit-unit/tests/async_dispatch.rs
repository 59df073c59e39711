//! Integration tests for actions handed to a worker pool.

use std::sync::{Arc, Mutex};

use aftercommit_core::{ExecutionMode, JobStatus, SaturationPolicy};
use aftercommit_pool::{PoolConfig, WorkerPool};
use aftercommit_unit::{
    ActionFailure, ActionStatus, CollectingObserver, DeferredAction, MemoryStore, UnitError,
    UnitManager,
};

fn manager_with_pool(
    pool: WorkerPool,
    observer: &CollectingObserver,
) -> UnitManager<MemoryStore> {
    UnitManager::builder(MemoryStore::new())
        .executor(Arc::new(pool))
        .observer(Arc::new(observer.clone()))
        .build()
}

#[test]
fn async_actions_are_submitted_in_registration_order() -> anyhow::Result<()> {
    let observer = CollectingObserver::new();
    let manager = manager_with_pool(WorkerPool::new(PoolConfig::new(1, 16))?, &observer);
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut unit = manager.begin()?;
    for index in 0..5 {
        let order = Arc::clone(&order);
        unit.register(
            DeferredAction::after_commit(format!("job-{index}"), move |_done| {
                order.lock().expect("order lock").push(index);
                Ok::<_, ActionFailure>(())
            })
            .asynchronous(),
        )?;
    }

    let mut report = unit.commit()?;
    assert_eq!(report.pending_jobs(), 5);
    assert!(
        report
            .records()
            .iter()
            .all(|record| record.status == ActionStatus::Submitted)
    );

    let statuses = report.wait_async();

    assert_eq!(statuses, vec![JobStatus::Completed; 5]);
    assert_eq!(*order.lock().expect("order lock"), [0, 1, 2, 3, 4]);
    Ok(())
}

#[test]
fn async_action_sees_final_outcome() -> anyhow::Result<()> {
    let observer = CollectingObserver::new();
    let manager = manager_with_pool(WorkerPool::new(PoolConfig::new(2, 4))?, &observer);
    let (tx, rx) = std::sync::mpsc::channel();
    let mut unit = manager.begin()?;
    let unit_id = unit.id();
    unit.register(
        DeferredAction::after_completion("notify", move |done| tx.send((done.unit(), done.outcome())))
            .mode(ExecutionMode::Async),
    )?;

    let mut report = unit.rollback()?;
    report.wait_async();

    let (seen_unit, seen_outcome) = rx.recv()?;
    assert_eq!(seen_unit, Some(unit_id));
    assert_eq!(seen_outcome, aftercommit_core::CompletionOutcome::RolledBack);
    Ok(())
}

#[test]
fn async_failure_reaches_the_observer() -> anyhow::Result<()> {
    let observer = CollectingObserver::new();
    let manager = manager_with_pool(WorkerPool::new(PoolConfig::new(1, 4))?, &observer);
    let mut unit = manager.begin()?;
    unit.register(
        DeferredAction::after_commit("mailer", |_done| {
            Err::<(), ActionFailure>("smtp down".into())
        })
        .asynchronous(),
    )?;

    let mut report = unit.commit()?;
    report.wait_async();

    assert!(!report.has_failures());
    let failures = observer.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].action, "mailer");
    assert_eq!(failures[0].message, "smtp down");
    Ok(())
}

#[test]
fn rejected_submission_is_recorded_as_failure() -> anyhow::Result<()> {
    let observer = CollectingObserver::new();
    let pool = WorkerPool::new(
        PoolConfig::new(1, 1).with_saturation(SaturationPolicy::Reject),
    )?;
    let manager = manager_with_pool(pool, &observer);
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();

    let mut unit = manager.begin()?;
    unit.register(
        DeferredAction::after_commit("blocker", move |_done| {
            started_tx.send(())?;
            release_rx.recv()?;
            Ok::<_, ActionFailure>(())
        })
        .asynchronous(),
    )?;
    let mut first = unit.commit()?;
    started_rx.recv()?;

    let mut unit = manager.begin()?;
    for name in ["queued", "overflow"] {
        unit.register(
            DeferredAction::after_commit(name, |_done| Ok::<_, ActionFailure>(())).asynchronous(),
        )?;
    }
    let mut second = unit.commit()?;
    release_tx.send(())?;

    let statuses: Vec<_> = second.records().iter().map(|r| r.status).collect();
    assert_eq!(statuses, [ActionStatus::Submitted, ActionStatus::Failed]);
    assert!(second.records()[1]
        .error
        .as_deref()
        .is_some_and(|message| message.contains("queue is full")));
    assert_eq!(observer.len(), 1);
    first.wait_async();
    second.wait_async();
    Ok(())
}

#[test]
fn vetoed_commit_hands_back_async_rollback_jobs() -> anyhow::Result<()> {
    let observer = CollectingObserver::new();
    let manager = manager_with_pool(WorkerPool::new(PoolConfig::new(1, 4))?, &observer);
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let released = Arc::new(Mutex::new(false));
    let mut unit = manager.begin()?;
    unit.register(DeferredAction::before_commit("veto", |_tx| {
        Err::<(), ActionFailure>("registration vetoed".into())
    }))?;
    let flag = Arc::clone(&released);
    unit.register(
        DeferredAction::after_rollback("release-email", move |_done| {
            release_rx.recv()?;
            *flag.lock().expect("flag lock") = true;
            Ok::<_, ActionFailure>(())
        })
        .asynchronous(),
    )?;

    let mut error = match unit.commit() {
        Err(error @ UnitError::BeforeCommitFailed { .. }) => error,
        other => anyhow::bail!("expected a vetoed commit, got {other:?}"),
    };
    let report = error.report_mut().expect("forced rollback carries a report");
    assert_eq!(report.pending_jobs(), 1);
    assert_eq!(
        report.summary(),
        "✗ [before-commit] veto\n⇢ [after-rollback] release-email"
    );
    assert!(!*released.lock().expect("flag lock"));

    release_tx.send(())?;
    let statuses = report.wait_async();

    assert_eq!(statuses, vec![JobStatus::Completed]);
    assert!(*released.lock().expect("flag lock"));
    Ok(())
}
