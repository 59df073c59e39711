use std::fmt;

use aftercommit_core::{CompletionOutcome, UnitId};
use tracing::debug;

use crate::action::{ActionBody, DeferredAction};
use crate::audit::DispatchReport;
use crate::completion::Completion;
use crate::error::UnitError;
use crate::manager::UnitManager;
use crate::registry::CompletionAction;
use crate::resource::Resource;
use crate::unit::UnitOfWork;

/// What [`ExecutionContext::register`] did with an action.
#[derive(Debug)]
pub enum Registration {
    /// Registered on the current unit.
    Deferred(UnitId),
    /// No unit was current and the action was a fallback, so it ran at once.
    RanImmediately(DispatchReport),
}

/// The "current unit" of one logical flow of control.
///
/// Holds a stack: [`begin_nested`](Self::begin_nested) suspends the current
/// unit and completing the nested one resumes it. A unit completed directly
/// through [`current_unit_mut`](Self::current_unit_mut) stops being current as
/// well. Each context is owned by a single flow; nothing here is shared
/// between threads.
pub struct ExecutionContext<R: Resource> {
    manager: UnitManager<R>,
    stack: Vec<UnitOfWork<R>>,
}

impl<R: Resource> ExecutionContext<R> {
    pub(crate) fn new(manager: UnitManager<R>) -> Self {
        Self {
            manager,
            stack: Vec::new(),
        }
    }

    /// Start a unit and make it current.
    ///
    /// # Errors
    ///
    /// Returns `UnitError::AlreadyActive` if a unit is already current, or
    /// `UnitError::Begin` if the resource cannot start a transaction.
    pub fn begin(&mut self) -> Result<UnitId, UnitError> {
        self.discard_finished();
        if let Some(unit) = self.stack.last() {
            return Err(UnitError::AlreadyActive { unit: unit.id() });
        }
        self.push()
    }

    /// Suspend the current unit, if any, and make a new independent one current.
    ///
    /// # Errors
    ///
    /// Returns `UnitError::Begin` if the resource cannot start a transaction.
    pub fn begin_nested(&mut self) -> Result<UnitId, UnitError> {
        self.push()
    }

    fn push(&mut self) -> Result<UnitId, UnitError> {
        self.discard_finished();
        let unit = self.manager.begin()?;
        let id = unit.id();
        if let Some(suspended) = self.stack.last() {
            debug!(unit = %id, suspended = %suspended.id(), "nested unit of work started");
        }
        self.stack.push(unit);
        Ok(id)
    }

    /// Drop units that were completed through `current_unit_mut`.
    fn discard_finished(&mut self) {
        self.stack.retain(UnitOfWork::is_active);
    }

    #[must_use]
    pub fn current_unit(&self) -> Option<&UnitOfWork<R>> {
        self.stack.iter().rev().find(|unit| unit.is_active())
    }

    pub fn current_unit_mut(&mut self) -> Option<&mut UnitOfWork<R>> {
        self.discard_finished();
        self.stack.last_mut()
    }

    /// Number of open units, current and suspended.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.iter().filter(|unit| unit.is_active()).count()
    }

    /// Write capability of the current unit.
    ///
    /// # Errors
    ///
    /// Returns `UnitError::NoActiveUnit` if no unit is current.
    pub fn transaction_mut(&mut self) -> Result<&mut R::Transaction, UnitError> {
        self.current_unit_mut()
            .ok_or(UnitError::NoActiveUnit)?
            .transaction_mut()
    }

    /// Register an action on the current unit.
    ///
    /// With no current unit, a fallback action runs immediately on this thread
    /// with a `Committed` completion that names no unit.
    ///
    /// # Errors
    ///
    /// Returns `UnitError::NoActiveUnit` if no unit is current and the action
    /// is not a fallback, or is a before-commit action. Registration errors of
    /// the current unit are passed through.
    pub fn register(&mut self, action: DeferredAction<R>) -> Result<Registration, UnitError> {
        if let Some(unit) = self.current_unit_mut() {
            let id = unit.id();
            unit.register(action)?;
            return Ok(Registration::Deferred(id));
        }
        if !action.is_fallback() {
            return Err(UnitError::NoActiveUnit);
        }

        let (meta, body) = action.into_parts();
        let ActionBody::Completion(run) = body else {
            return Err(UnitError::NoActiveUnit);
        };
        debug!(action = %meta.name, "no active unit, running fallback action");
        let outcome = CompletionOutcome::Committed;
        let completion = Completion::new(None, outcome, self.manager.clone());
        let mut report = DispatchReport::new(None, outcome);
        self.manager.dispatcher().run_inline(
            CompletionAction { meta, run },
            &completion,
            &mut report,
        );
        Ok(Registration::RanImmediately(report))
    }

    /// Complete the current unit and resume the one it suspended.
    ///
    /// # Errors
    ///
    /// Returns `UnitError::NoActiveUnit` if no unit is current, otherwise
    /// whatever [`UnitOfWork::complete`] returns. The unit is popped either way.
    pub fn complete(&mut self, outcome: CompletionOutcome) -> Result<DispatchReport, UnitError> {
        self.discard_finished();
        let mut unit = self.stack.pop().ok_or(UnitError::NoActiveUnit)?;
        unit.complete(outcome)
    }

    /// Commit the current unit.
    ///
    /// # Errors
    ///
    /// See [`complete`](Self::complete).
    pub fn commit(&mut self) -> Result<DispatchReport, UnitError> {
        self.complete(CompletionOutcome::Committed)
    }

    /// Roll back the current unit.
    ///
    /// # Errors
    ///
    /// See [`complete`](Self::complete).
    pub fn rollback(&mut self) -> Result<DispatchReport, UnitError> {
        self.complete(CompletionOutcome::RolledBack)
    }
}

impl<R: Resource> fmt::Debug for ExecutionContext<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;

    use aftercommit_pool::{PoolConfig, WorkerPool};

    use super::*;
    use crate::audit::ActionStatus;
    use crate::error::ActionFailure;
    use crate::memory::MemoryStore;

    fn context() -> (MemoryStore, ExecutionContext<MemoryStore>) {
        let store = MemoryStore::new();
        let context = UnitManager::new(store.clone()).context();
        (store, context)
    }

    #[test]
    fn begin_twice_is_rejected() -> Result<(), UnitError> {
        let (_, mut context) = context();
        let first = context.begin()?;

        let second = context.begin();

        assert!(matches!(second, Err(UnitError::AlreadyActive { unit }) if unit == first));
        assert_eq!(context.depth(), 1);
        Ok(())
    }

    #[test]
    fn nested_unit_suspends_and_resumes_outer() -> Result<(), UnitError> {
        let (store, mut context) = context();
        let outer = context.begin()?;
        context.transaction_mut()?.put("outer", "1");

        let inner = context.begin_nested()?;
        assert_eq!(context.depth(), 2);
        assert_eq!(context.current_unit().map(UnitOfWork::id), Some(inner));
        context.transaction_mut()?.put("inner", "1");
        context.commit()?;

        assert_eq!(store.get("inner").as_deref(), Some("1"));
        assert_eq!(store.get("outer"), None);
        assert_eq!(context.current_unit().map(UnitOfWork::id), Some(outer));

        context.rollback()?;
        assert_eq!(context.depth(), 0);
        assert_eq!(store.get("outer"), None);
        Ok(())
    }

    #[test]
    fn complete_without_unit_fails() {
        let (_, mut context) = context();

        assert!(matches!(context.commit(), Err(UnitError::NoActiveUnit)));
        assert!(matches!(
            context.transaction_mut(),
            Err(UnitError::NoActiveUnit)
        ));
    }

    #[test]
    fn register_without_unit_fails_unless_fallback() {
        let (_, mut context) = context();
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);

        let result = context.register(DeferredAction::after_commit("mail", move |_done| {
            *flag.lock().expect("flag lock") = true;
            Ok::<_, ActionFailure>(())
        }));

        assert!(matches!(result, Err(UnitError::NoActiveUnit)));
        assert!(!*ran.lock().expect("flag lock"));
    }

    #[test]
    fn fallback_runs_immediately_as_committed() -> Result<(), UnitError> {
        let (_, mut context) = context();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);

        let registration = context.register(
            DeferredAction::after_rollback("mail", move |done| {
                *sink.lock().expect("seen lock") = Some((done.unit(), done.outcome()));
                Ok::<_, ActionFailure>(())
            })
            .fallback(true),
        )?;

        assert!(matches!(registration, Registration::RanImmediately(ref report) if report.records().len() == 1));
        assert_eq!(
            *seen.lock().expect("seen lock"),
            Some((None, CompletionOutcome::Committed))
        );
        Ok(())
    }

    #[test]
    fn fallback_before_commit_without_unit_fails() {
        let (_, mut context) = context();

        let result = context.register(
            DeferredAction::before_commit("stamp", |_tx| Ok::<_, ActionFailure>(())).fallback(true),
        );

        assert!(matches!(result, Err(UnitError::NoActiveUnit)));
    }

    #[test]
    fn register_targets_the_current_unit() -> Result<(), UnitError> {
        let (_, mut context) = context();
        let outer = context.begin()?;
        context.begin_nested()?;
        context.commit()?;

        let registration = context.register(DeferredAction::after_commit("mail", |_done| {
            Ok::<_, ActionFailure>(())
        }))?;

        assert!(matches!(registration, Registration::Deferred(unit) if unit == outer));
        assert_eq!(context.current_unit().map(UnitOfWork::pending_actions), Some(1));
        Ok(())
    }

    #[test]
    fn unit_completed_directly_is_no_longer_current() -> Result<(), UnitError> {
        let (store, mut context) = context();
        let first = context.begin()?;
        if let Some(unit) = context.current_unit_mut() {
            unit.transaction_mut()?.put("customer:1", "ada@example.com");
            unit.commit()?;
        }

        assert!(context.current_unit().is_none());
        assert_eq!(context.depth(), 0);
        assert!(matches!(
            context.transaction_mut(),
            Err(UnitError::NoActiveUnit)
        ));
        let second = context.begin()?;
        assert_ne!(second, first);
        assert_eq!(store.get("customer:1").as_deref(), Some("ada@example.com"));
        Ok(())
    }

    #[test]
    fn fallback_runs_immediately_after_unit_completed_directly() -> Result<(), UnitError> {
        let (_, mut context) = context();
        context.begin()?;
        if let Some(unit) = context.current_unit_mut() {
            unit.rollback()?;
        }

        let registration = context.register(
            DeferredAction::after_commit("mail", |_done| Ok::<_, ActionFailure>(())).fallback(true),
        )?;

        assert!(matches!(registration, Registration::RanImmediately(_)));
        Ok(())
    }

    #[test]
    fn completing_nested_unit_directly_resumes_outer() -> Result<(), UnitError> {
        let (_, mut context) = context();
        let outer = context.begin()?;
        context.begin_nested()?;
        if let Some(inner) = context.current_unit_mut() {
            inner.commit()?;
        }

        assert_eq!(context.current_unit().map(UnitOfWork::id), Some(outer));
        assert_eq!(context.depth(), 1);
        let registration = context.register(DeferredAction::after_commit("mail", |_done| {
            Ok::<_, ActionFailure>(())
        }))?;
        assert!(matches!(registration, Registration::Deferred(unit) if unit == outer));
        Ok(())
    }

    #[test]
    fn async_fallback_without_unit_runs_on_calling_thread() -> Result<(), UnitError> {
        let pool = WorkerPool::new(PoolConfig::new(2, 4)).expect("start pool");
        let manager = UnitManager::builder(MemoryStore::new())
            .executor(Arc::new(pool))
            .build();
        let mut context = manager.context();
        let ran_on = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&ran_on);

        let registration = context.register(
            DeferredAction::after_commit("mail", move |_done| {
                *sink.lock().expect("thread lock") = Some(thread::current().id());
                Ok::<_, ActionFailure>(())
            })
            .asynchronous()
            .fallback(true),
        )?;

        let Registration::RanImmediately(report) = registration else {
            panic!("expected the fallback to run immediately");
        };
        assert_eq!(report.pending_jobs(), 0);
        assert_eq!(report.records()[0].status, ActionStatus::Executed);
        assert_eq!(*ran_on.lock().expect("thread lock"), Some(thread::current().id()));
        Ok(())
    }
}
