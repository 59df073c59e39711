use std::fmt;

use aftercommit_core::{CompletionOutcome, UnitId, UnitState};
use tracing::{error, info, warn};

use crate::action::DeferredAction;
use crate::audit::DispatchReport;
use crate::completion::Completion;
use crate::error::{ActionError, ActionFailure, UnitError};
use crate::manager::UnitManager;
use crate::registry::Registry;
use crate::resource::Resource;

/// Why a requested commit ended as a rollback.
enum ForcedRollback {
    BeforeCommit(ActionError),
    Commit(ActionFailure),
}

/// A bounded span of work with an atomic commit/rollback outcome.
///
/// Owns the resource transaction while active and the actions registered
/// against it. [`complete`](Self::complete) finalizes the transaction and
/// dispatches the actions; after that the unit is terminal and accepts neither
/// writes nor registrations.
///
/// A unit dropped while still active is rolled back and its rollback and
/// completion actions are dispatched.
pub struct UnitOfWork<R: Resource> {
    id: UnitId,
    state: UnitState,
    transaction: Option<R::Transaction>,
    registry: Registry<R>,
    manager: UnitManager<R>,
}

impl<R: Resource> UnitOfWork<R> {
    pub(crate) fn new(id: UnitId, transaction: R::Transaction, manager: UnitManager<R>) -> Self {
        Self {
            id,
            state: UnitState::Active,
            transaction: Some(transaction),
            registry: Registry::default(),
            manager,
        }
    }

    #[must_use]
    pub fn id(&self) -> UnitId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> UnitState {
        self.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == UnitState::Active
    }

    /// Number of actions registered so far.
    #[must_use]
    pub fn pending_actions(&self) -> usize {
        self.registry.len()
    }

    /// The unit's write capability.
    ///
    /// # Errors
    ///
    /// Returns `UnitError::InvalidState` once the unit is no longer active.
    pub fn transaction_mut(&mut self) -> Result<&mut R::Transaction, UnitError> {
        let invalid = UnitError::InvalidState {
            unit: self.id,
            state: self.state,
        };
        if self.state != UnitState::Active {
            return Err(invalid);
        }
        self.transaction.as_mut().ok_or(invalid)
    }

    /// Register an action to run when this unit completes.
    ///
    /// # Errors
    ///
    /// Returns `UnitError::NoActiveUnit` if the unit is terminal, and
    /// `UnitError::AsyncBeforeCommit` for an asynchronous before-commit action.
    pub fn register(&mut self, action: DeferredAction<R>) -> Result<(), UnitError> {
        if self.state.is_terminal() {
            return Err(UnitError::NoActiveUnit);
        }
        tracing::debug!(
            unit = %self.id,
            action = action.name(),
            phase = %action.phase(),
            mode = %action.execution_mode(),
            "action registered"
        );
        self.registry.register(action)
    }

    /// Shorthand for `complete(CompletionOutcome::Committed)`.
    ///
    /// # Errors
    ///
    /// See [`complete`](Self::complete).
    pub fn commit(&mut self) -> Result<DispatchReport, UnitError> {
        self.complete(CompletionOutcome::Committed)
    }

    /// Shorthand for `complete(CompletionOutcome::RolledBack)`.
    ///
    /// # Errors
    ///
    /// See [`complete`](Self::complete).
    pub fn rollback(&mut self) -> Result<DispatchReport, UnitError> {
        self.complete(CompletionOutcome::RolledBack)
    }

    /// Finalize the unit with the requested outcome and dispatch its actions.
    ///
    /// For a commit, before-commit actions run first; if one fails, or if the
    /// resource refuses the commit, the unit is rolled back instead and the
    /// rollback phases are dispatched before the error is returned. The error
    /// carries the report of that dispatch.
    ///
    /// # Errors
    ///
    /// Returns `UnitError::InvalidState` if the unit is already terminal (no
    /// side effects), `UnitError::BeforeCommitFailed` if a before-commit
    /// action failed, and `UnitError::Commit` if the resource commit failed.
    pub fn complete(&mut self, outcome: CompletionOutcome) -> Result<DispatchReport, UnitError> {
        let invalid = UnitError::InvalidState {
            unit: self.id,
            state: self.state,
        };
        if self.state.is_terminal() {
            return Err(invalid);
        }
        let Some(mut transaction) = self.transaction.take() else {
            return Err(invalid);
        };

        let (staging, deferred) = self.registry.seal();
        let dispatcher = self.manager.dispatcher().clone();
        let mut report = DispatchReport::new(Some(self.id), outcome);
        let mut failure = None;

        let final_outcome = match outcome {
            CompletionOutcome::Committed => {
                self.state = UnitState::Committing;
                match dispatcher.run_before_commit(staging, &mut transaction, &mut report) {
                    Ok(()) => match self.manager.resource().commit(transaction) {
                        Ok(()) => CompletionOutcome::Committed,
                        Err(source) => {
                            warn!(unit = %self.id, error = %source, "commit failed, unit rolled back");
                            failure = Some(ForcedRollback::Commit(Box::new(source)));
                            CompletionOutcome::RolledBack
                        }
                    },
                    Err(source) => {
                        warn!(unit = %self.id, action = %source.action, "before-commit action failed, rolling back");
                        self.roll_back_resource(transaction);
                        failure = Some(ForcedRollback::BeforeCommit(source));
                        CompletionOutcome::RolledBack
                    }
                }
            }
            CompletionOutcome::RolledBack => {
                self.roll_back_resource(transaction);
                CompletionOutcome::RolledBack
            }
        };

        self.state = final_outcome.into();
        report.set_outcome(final_outcome);
        info!(unit = %self.id, outcome = %final_outcome, "unit of work completed");

        let completion = Completion::new(Some(self.id), final_outcome, self.manager.clone());
        dispatcher.dispatch_after(deferred, &completion, &mut report);

        match failure {
            None => Ok(report),
            Some(ForcedRollback::BeforeCommit(source)) => Err(UnitError::BeforeCommitFailed {
                unit: self.id,
                source,
                report: Box::new(report),
            }),
            Some(ForcedRollback::Commit(source)) => Err(UnitError::Commit {
                unit: self.id,
                source,
                report: Box::new(report),
            }),
        }
    }

    fn roll_back_resource(&mut self, transaction: R::Transaction) {
        self.state = UnitState::RollingBack;
        if let Err(source) = self.manager.resource().rollback(transaction) {
            error!(unit = %self.id, error = %source, "resource rollback failed");
        }
    }
}

impl<R: Resource> Drop for UnitOfWork<R> {
    fn drop(&mut self) {
        if self.is_active() {
            warn!(unit = %self.id, "unit of work dropped while active, rolling back");
            match self.rollback() {
                Ok(report) if report.has_failures() => warn!(
                    unit = %self.id,
                    failures = report.failures().count(),
                    "rollback actions of dropped unit failed"
                ),
                Ok(_) => {}
                Err(e) => {
                    error!(unit = %self.id, error = %e, "dropped unit could not be rolled back");
                }
            }
        }
    }
}

impl<R: Resource> fmt::Debug for UnitOfWork<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pending_actions", &self.registry.len())
            .finish_non_exhaustive()
    }
}
