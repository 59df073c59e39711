use std::sync::{Arc, Mutex};

use aftercommit_config::Settings;
use aftercommit_core::{ExecutionMode, SaturationPolicy};
use aftercommit_pool::{PoolConfig, PoolStats, WorkerPool};
use aftercommit_unit::{
    ActionFailure, CollectingObserver, Completion, DeferredAction, DispatchReport, MemoryStore,
    StagedWrites, UnitManager,
};
use clap::Args;
use thiserror::Error;
use tracing::info;

use crate::error::Result;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Email address of the customer to register
    #[arg(long, default_value = "ada@example.com")]
    email: String,

    /// Where the welcome mail action runs
    #[arg(long, value_enum, default_value_t = ExecutionMode::Inline)]
    mail_mode: ExecutionMode,

    /// Make the before-commit audit action fail, forcing a rollback
    #[arg(long)]
    fail_before_commit: bool,

    /// Roll the unit back instead of committing it
    #[arg(long)]
    rollback: bool,

    /// Skip the nested unit that persists the activation token
    #[arg(long)]
    no_nested: bool,

    /// Override the configured number of pool workers
    #[arg(long)]
    workers: Option<usize>,

    /// Override the configured pool saturation policy
    #[arg(long, value_enum)]
    saturation: Option<SaturationPolicy>,
}

#[derive(Debug, Error)]
enum DemoFailure {
    #[error("audit rejected registration of '{0}'")]
    AuditRejected(String),

    #[error("journal lock poisoned")]
    JournalPoisoned,
}

type Journal = Arc<Mutex<Vec<String>>>;

fn note(journal: &Journal, entry: String) -> std::result::Result<(), ActionFailure> {
    journal
        .lock()
        .map_err(|_| DemoFailure::JournalPoisoned)?
        .push(entry);
    Ok(())
}

fn pool_config(args: &DemoArgs, settings: &Settings) -> PoolConfig {
    let pool = settings.pool();
    PoolConfig::new(
        args.workers.unwrap_or(pool.workers()),
        pool.queue_capacity(),
    )
    .with_saturation(args.saturation.unwrap_or(pool.saturation()))
    .with_thread_name(pool.thread_name())
}

fn audit_action(args: &DemoArgs) -> DeferredAction<MemoryStore> {
    let email = args.email.clone();
    let fail = args.fail_before_commit;
    DeferredAction::before_commit("audit-registration", move |tx: &mut StagedWrites| {
        if fail {
            return Err(DemoFailure::AuditRejected(email));
        }
        tx.put(format!("audit:{email}"), "customer registered");
        Ok(())
    })
}

fn welcome_mail_action(args: &DemoArgs, journal: &Journal) -> DeferredAction<MemoryStore> {
    let email = args.email.clone();
    let nested = !args.no_nested;
    let journal = Arc::clone(journal);
    DeferredAction::after_commit(
        "welcome-mail",
        move |done: &Completion<MemoryStore>| -> std::result::Result<(), ActionFailure> {
            note(&journal, format!("welcome mail sent to {email}"))?;
            if nested {
                let token = done
                    .unit()
                    .map_or_else(|| String::from("token"), |unit| format!("token-{unit}"));
                let mut unit = done.begin_nested()?;
                unit.transaction_mut()?
                    .put(format!("activation:{email}"), token);
                unit.commit()?;
            }
            Ok(())
        },
    )
    .mode(args.mail_mode)
}

fn release_action(args: &DemoArgs, journal: &Journal) -> DeferredAction<MemoryStore> {
    let email = args.email.clone();
    let journal = Arc::clone(journal);
    DeferredAction::after_rollback("release-email", move |_done| {
        note(&journal, format!("email reservation released for {email}"))
    })
}

fn close_session_action(journal: &Journal) -> DeferredAction<MemoryStore> {
    let journal = Arc::clone(journal);
    DeferredAction::after_completion("close-session", move |done| {
        note(&journal, format!("session closed ({})", done.outcome()))
    })
}

pub(super) fn run(args: &DemoArgs, settings: &Settings) -> Result<()> {
    let store = MemoryStore::new();
    let observer = CollectingObserver::new();
    let journal = Journal::default();
    let pool = Arc::new(WorkerPool::new(pool_config(args, settings))?);
    info!(
        workers = pool.config().workers(),
        queue_capacity = pool.config().queue_capacity(),
        "worker pool started"
    );

    let manager = UnitManager::builder(store.clone())
        .executor(pool.clone())
        .observer(Arc::new(observer.clone()))
        .build();

    let mut unit = manager.begin()?;
    info!(unit = %unit.id(), email = %args.email, "registering customer");
    unit.transaction_mut()?
        .put(format!("customer:{}", args.email), "registered");
    unit.register(audit_action(args))?;
    unit.register(welcome_mail_action(args, &journal))?;
    unit.register(release_action(args, &journal))?;
    unit.register(close_session_action(&journal))?;

    let result = if args.rollback {
        unit.rollback()
    } else {
        unit.commit()
    };
    let outcome = unit.state();

    let mut result = match result {
        Err(e) if e.report().is_none() => return Err(e.into()),
        other => other,
    };
    match &mut result {
        Ok(report) => {
            report.wait_async();
        }
        Err(e) => {
            if let Some(report) = e.report_mut() {
                report.wait_async();
            }
        }
    }
    drop(unit);
    drop(manager);
    let stats = Arc::try_unwrap(pool).ok().map(WorkerPool::shutdown);

    let journal = journal
        .lock()
        .map(|entries| entries.clone())
        .unwrap_or_default();
    let report = match &result {
        Ok(report) => Some(report),
        Err(e) => e.report(),
    };
    print!(
        "{}",
        render(&Summary {
            outcome: &outcome.to_string(),
            report,
            journal: &journal,
            observer: &observer,
            store: &store,
            stats: stats.as_ref(),
        })
    );

    result.map(drop).map_err(Into::into)
}

struct Summary<'a> {
    outcome: &'a str,
    report: Option<&'a DispatchReport>,
    journal: &'a [String],
    observer: &'a CollectingObserver,
    store: &'a MemoryStore,
    stats: Option<&'a PoolStats>,
}

fn render(summary: &Summary<'_>) -> String {
    let mut lines = vec![format!("outcome: {}", summary.outcome)];

    if let Some(report) = summary.report {
        if let Some(unit) = report.unit() {
            lines.push(format!("unit: {unit}"));
        }
        let actions = report.summary();
        if !actions.is_empty() {
            lines.push(String::from("actions:"));
            lines.extend(actions.lines().map(|line| format!("  {line}")));
        }
    }

    if !summary.journal.is_empty() {
        lines.push(String::from("journal:"));
        lines.extend(summary.journal.iter().map(|entry| format!("  {entry}")));
    }

    let failures = summary.observer.failures();
    if !failures.is_empty() {
        lines.push(String::from("failed actions:"));
        lines.extend(
            failures
                .iter()
                .map(|f| format!("  ✗ [{}] {}: {}", f.phase, f.action, f.message)),
        );
    }

    lines.push(String::from("store:"));
    let snapshot = summary.store.snapshot();
    if snapshot.is_empty() {
        lines.push(String::from("  (empty)"));
    }
    lines.extend(
        snapshot
            .iter()
            .map(|(key, value)| format!("  {key} = {value}")),
    );

    if let Some(stats) = summary.stats {
        lines.push(format!(
            "pool: {} completed, {} panicked, {} rejected",
            stats.jobs_completed, stats.jobs_panicked, stats.jobs_rejected
        ));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use aftercommit_config::parse_settings;
    use aftercommit_unit::UnitError;

    use super::*;

    fn args() -> DemoArgs {
        DemoArgs {
            email: String::from("ada@example.com"),
            mail_mode: ExecutionMode::Inline,
            fail_before_commit: false,
            rollback: false,
            no_nested: false,
            workers: None,
            saturation: None,
        }
    }

    #[test]
    fn pool_config_prefers_command_line_overrides() {
        let settings =
            parse_settings("[pool]\nworkers = 8\nqueue-capacity = 3\n").expect("parse settings");
        let mut args = args();
        args.workers = Some(2);
        args.saturation = Some(SaturationPolicy::Reject);

        let config = pool_config(&args, &settings);

        assert_eq!(config.workers(), 2);
        assert_eq!(config.queue_capacity(), 3);
        assert_eq!(config.saturation(), SaturationPolicy::Reject);
    }

    #[test]
    fn default_settings_yield_default_pool_config() {
        let config = pool_config(&args(), &Settings::default());

        assert_eq!(config, PoolConfig::default());
        assert_eq!(config.thread_name(), aftercommit_core::DEFAULT_THREAD_NAME);
    }

    #[test]
    fn render_lists_store_and_journal() {
        let store = MemoryStore::new();
        let observer = CollectingObserver::new();
        let journal = vec![String::from("welcome mail sent to ada@example.com")];

        let output = render(&Summary {
            outcome: "committed",
            report: None,
            journal: &journal,
            observer: &observer,
            store: &store,
            stats: Some(&PoolStats::default()),
        });

        assert!(output.starts_with("outcome: committed\n"));
        assert!(output.contains("journal:\n  welcome mail sent to ada@example.com\n"));
        assert!(output.contains("store:\n  (empty)\n"));
        assert!(output.contains("pool: 0 completed, 0 panicked, 0 rejected\n"));
    }

    #[test]
    fn failing_audit_rejects_the_email() {
        let mut args = args();
        args.fail_before_commit = true;
        let store = MemoryStore::new();
        let manager = UnitManager::new(store.clone());
        let mut unit = manager.begin().expect("begin unit");
        unit.register(audit_action(&args)).expect("register audit");

        let result = unit.commit();

        let Err(UnitError::BeforeCommitFailed { source, .. }) = result else {
            panic!("expected audit failure");
        };
        assert_eq!(source.source.to_string(), "audit rejected registration of 'ada@example.com'");
        assert!(store.is_empty());
    }
}
