use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use aftercommit_core::{ExecutionMode, Phase};

use crate::completion::Completion;
use crate::error::{ActionFailure, PanicError};
use crate::resource::Resource;

pub(crate) type StagingFn<R> = Box<
    dyn FnOnce(&mut <R as Resource>::Transaction) -> Result<(), ActionFailure> + Send + 'static,
>;

pub(crate) type CompletionFn<R> =
    Box<dyn FnOnce(&Completion<R>) -> Result<(), ActionFailure> + Send + 'static>;

#[derive(Debug, Clone)]
pub(crate) struct ActionMeta {
    pub(crate) name: String,
    pub(crate) phase: Phase,
    pub(crate) mode: ExecutionMode,
    pub(crate) fallback: bool,
}

pub(crate) enum ActionBody<R: Resource> {
    /// Runs before commit with the unit's write capability.
    Staging(StagingFn<R>),
    /// Runs once the outcome is final, with no access to the concluded unit.
    Completion(CompletionFn<R>),
}

/// A callback registered against a unit of work, bound to a phase.
///
/// Before-commit actions receive the unit's transaction and may still write
/// through it. Actions for the after phases only receive a [`Completion`]:
/// the concluded unit's transaction is already finalized and is never handed
/// out, so persisting anything requires [`Completion::begin_nested`].
///
/// ```ignore
/// unit.register(
///     DeferredAction::after_commit("send-activation-mail", move |done| {
///         mailer.send(&email)?;
///         let mut nested = done.begin_nested()?;
///         nested.transaction_mut()?.put(token_key, token);
///         nested.commit()?;
///         Ok::<_, ActionFailure>(())
///     })
///     .asynchronous(),
/// )?;
/// ```
pub struct DeferredAction<R: Resource> {
    meta: ActionMeta,
    body: ActionBody<R>,
}

impl<R: Resource> DeferredAction<R> {
    /// Action that runs inline before the resource commits.
    ///
    /// Returning an error (or panicking) rolls the whole unit back.
    pub fn before_commit<F, E>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(&mut R::Transaction) -> Result<(), E> + Send + 'static,
        E: Into<ActionFailure>,
    {
        Self {
            meta: ActionMeta::new(name, Phase::BeforeCommit),
            body: ActionBody::Staging(Box::new(
                move |tx: &mut R::Transaction| -> Result<(), ActionFailure> {
                    action(tx).map_err(Into::into)
                },
            )),
        }
    }

    /// Action that runs only if the unit commits.
    pub fn after_commit<F, E>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(&Completion<R>) -> Result<(), E> + Send + 'static,
        E: Into<ActionFailure>,
    {
        Self::after(Phase::AfterCommit, name, action)
    }

    /// Action that runs only if the unit rolls back.
    pub fn after_rollback<F, E>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(&Completion<R>) -> Result<(), E> + Send + 'static,
        E: Into<ActionFailure>,
    {
        Self::after(Phase::AfterRollback, name, action)
    }

    /// Action that runs for either outcome, after the outcome-specific phase.
    pub fn after_completion<F, E>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(&Completion<R>) -> Result<(), E> + Send + 'static,
        E: Into<ActionFailure>,
    {
        Self::after(Phase::AfterCompletion, name, action)
    }

    fn after<F, E>(phase: Phase, name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(&Completion<R>) -> Result<(), E> + Send + 'static,
        E: Into<ActionFailure>,
    {
        Self {
            meta: ActionMeta::new(name, phase),
            body: ActionBody::Completion(Box::new(
                move |done: &Completion<R>| -> Result<(), ActionFailure> {
                    action(done).map_err(Into::into)
                },
            )),
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.meta.mode = mode;
        self
    }

    /// Shorthand for `mode(ExecutionMode::Async)`.
    #[must_use]
    pub fn asynchronous(self) -> Self {
        self.mode(ExecutionMode::Async)
    }

    /// Run immediately when registered with no active unit, instead of failing.
    #[must_use]
    pub fn fallback(mut self, fallback: bool) -> Self {
        self.meta.fallback = fallback;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.meta.phase
    }

    #[must_use]
    pub fn execution_mode(&self) -> ExecutionMode {
        self.meta.mode
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.meta.fallback
    }

    pub(crate) fn into_parts(self) -> (ActionMeta, ActionBody<R>) {
        (self.meta, self.body)
    }
}

impl<R: Resource> fmt::Debug for DeferredAction<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredAction")
            .field("name", &self.meta.name)
            .field("phase", &self.meta.phase)
            .field("mode", &self.meta.mode)
            .field("fallback", &self.meta.fallback)
            .finish_non_exhaustive()
    }
}

impl ActionMeta {
    fn new(name: impl Into<String>, phase: Phase) -> Self {
        Self {
            name: name.into(),
            phase,
            mode: ExecutionMode::Inline,
            fallback: false,
        }
    }
}

/// Run `action`, turning a panic into an error.
pub(crate) fn guarded<F>(action: F) -> Result<(), ActionFailure>
where
    F: FnOnce() -> Result<(), ActionFailure>,
{
    match catch_unwind(AssertUnwindSafe(action)) {
        Ok(result) => result,
        Err(payload) => Err(Box::new(PanicError::from_payload(payload.as_ref()))),
    }
}
