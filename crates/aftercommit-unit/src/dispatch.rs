use std::sync::Arc;

use aftercommit_core::{ExecutionMode, Executor, Job, Phase};
use tracing::{debug, warn};

use crate::action::guarded;
use crate::audit::DispatchReport;
use crate::completion::Completion;
use crate::error::ActionError;
use crate::observer::ActionObserver;
use crate::registry::{CompletionAction, StagingAction};
use crate::resource::Resource;

/// Runs registered actions for the phases an outcome selects.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    executor: Arc<dyn Executor>,
    observer: Arc<dyn ActionObserver>,
}

impl Dispatcher {
    pub(crate) fn new(executor: Arc<dyn Executor>, observer: Arc<dyn ActionObserver>) -> Self {
        Self { executor, observer }
    }

    /// Run before-commit actions in order against the unit's transaction.
    ///
    /// Stops at the first failure; the remaining actions are recorded as skipped.
    pub(crate) fn run_before_commit<R: Resource>(
        &self,
        actions: Vec<StagingAction<R>>,
        transaction: &mut R::Transaction,
        report: &mut DispatchReport,
    ) -> Result<(), ActionError> {
        let mut actions = actions.into_iter();

        while let Some(StagingAction { meta, run }) = actions.next() {
            report.record_start(&meta);
            debug!(action = %meta.name, phase = %meta.phase, "running action");

            if let Err(source) = guarded(|| run(&mut *transaction)) {
                let error = ActionError::new(meta.name, meta.phase, source);
                report.record_failure(&error);
                for skipped in actions {
                    report.record_skipped(&skipped.meta);
                }
                return Err(error);
            }
            report.record_success();
        }
        Ok(())
    }

    /// Run the after-phase actions selected by the completion's outcome.
    ///
    /// Phases come from [`Phase::after_phases`]; within a phase actions run in
    /// registration order and a failure never stops the ones after it.
    pub(crate) fn dispatch_after<R: Resource>(
        &self,
        actions: Vec<CompletionAction<R>>,
        completion: &Completion<R>,
        report: &mut DispatchReport,
    ) {
        let mut remaining = actions;

        for &phase in Phase::after_phases(completion.outcome()) {
            let (due, rest): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|action| action.meta.phase == phase);
            remaining = rest;

            for action in due {
                match action.meta.mode {
                    ExecutionMode::Inline => self.run_inline(action, completion, report),
                    ExecutionMode::Async => self.submit(action, completion, report),
                }
            }
        }
    }

    /// Run a single completion action on the calling thread.
    pub(crate) fn run_inline<R: Resource>(
        &self,
        action: CompletionAction<R>,
        completion: &Completion<R>,
        report: &mut DispatchReport,
    ) {
        let CompletionAction { meta, run } = action;
        report.record_start(&meta);
        debug!(action = %meta.name, phase = %meta.phase, "running action");

        match guarded(|| run(completion)) {
            Ok(()) => report.record_success(),
            Err(source) => {
                let error = ActionError::new(meta.name, meta.phase, source);
                report.record_failure(&error);
                self.observer.action_failed(&error);
            }
        }
    }

    fn submit<R: Resource>(
        &self,
        action: CompletionAction<R>,
        completion: &Completion<R>,
        report: &mut DispatchReport,
    ) {
        let CompletionAction { meta, run } = action;
        report.record_start(&meta);

        let observer = Arc::clone(&self.observer);
        let completion = completion.clone();
        let name = meta.name.clone();
        let phase = meta.phase;
        let job: Job = Box::new(move || {
            if let Err(source) = guarded(|| run(&completion)) {
                observer.action_failed(&ActionError::new(name, phase, source));
            }
        });

        match self.executor.submit(job) {
            Ok(handle) => {
                debug!(action = %meta.name, phase = %meta.phase, job = handle.id(), "action submitted");
                report.record_submitted(handle);
            }
            Err(source) => {
                warn!(action = %meta.name, error = %source, "action could not be submitted");
                let error = ActionError::new(meta.name, meta.phase, Box::new(source));
                report.record_failure(&error);
                self.observer.action_failed(&error);
            }
        }
    }
}
