use std::any::Any;
use std::fmt::Debug;

use aftercommit_core::{Phase, UnitId, UnitState};
use thiserror::Error;

use crate::audit::DispatchReport;

/// Boxed error returned by a failing deferred action.
pub type ActionFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A deferred action failed, by error or by panic.
#[derive(Debug, Error)]
#[error("action '{action}' failed during {phase}")]
pub struct ActionError {
    /// Name the action was registered under.
    pub action: String,
    /// Phase the action was dispatched in.
    pub phase: Phase,
    /// The underlying failure.
    #[source]
    pub source: ActionFailure,
}

impl ActionError {
    pub(crate) fn new(action: impl Into<String>, phase: Phase, source: ActionFailure) -> Self {
        Self {
            action: action.into(),
            phase,
            source,
        }
    }
}

/// A panic caught while running an action.
#[derive(Debug, Error)]
#[error("action panicked: {message}")]
pub struct PanicError {
    pub message: String,
}

impl PanicError {
    pub(crate) fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::from("non-string panic payload")
        };
        Self { message }
    }
}

/// Error from unit-of-work operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UnitError {
    /// The unit already reached `state` and cannot be completed or written to again.
    #[error("unit {unit} is already {state}")]
    InvalidState { unit: UnitId, state: UnitState },

    /// No unit is active to register against, and the action has no fallback.
    #[error("no active unit of work")]
    NoActiveUnit,

    /// `begin` was called while another unit is current in the same context.
    #[error("unit {unit} is already active in this context")]
    AlreadyActive { unit: UnitId },

    /// Before-commit actions must run inline.
    #[error("action '{action}' cannot run asynchronously before commit")]
    AsyncBeforeCommit { action: String },

    /// A before-commit action failed; the unit was rolled back instead.
    #[error("unit {unit} was rolled back because a before-commit action failed")]
    BeforeCommitFailed {
        unit: UnitId,
        #[source]
        source: ActionError,
        /// Dispatch of the rollback phases.
        report: Box<DispatchReport>,
    },

    /// The resource refused to start a transaction.
    #[error("failed to begin unit of work")]
    Begin {
        #[source]
        source: ActionFailure,
    },

    /// The resource failed to commit; the unit was rolled back instead.
    #[error("resource commit failed for unit {unit}")]
    Commit {
        unit: UnitId,
        #[source]
        source: ActionFailure,
        /// Dispatch of the rollback phases.
        report: Box<DispatchReport>,
    },
}

impl UnitError {
    /// Dispatch report of the rollback this error forced, if it forced one.
    #[must_use]
    pub fn report(&self) -> Option<&DispatchReport> {
        match self {
            Self::BeforeCommitFailed { report, .. } | Self::Commit { report, .. } => {
                Some(&**report)
            }
            _ => None,
        }
    }

    /// Mutable access to the forced rollback's report, to wait on its jobs.
    pub fn report_mut(&mut self) -> Option<&mut DispatchReport> {
        match self {
            Self::BeforeCommitFailed { report, .. } | Self::Commit { report, .. } => {
                Some(&mut **report)
            }
            _ => None,
        }
    }
}

/// Error from [`UnitManager::run`](crate::UnitManager::run).
#[derive(Debug, Error)]
pub enum RunError<E: Debug> {
    /// The body returned an error; the unit was rolled back.
    #[error("unit of work body failed")]
    Work(#[source] E),

    /// The unit itself failed to begin or complete.
    #[error("unit of work failed")]
    Unit(#[source] UnitError),
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use aftercommit_core::CompletionOutcome;

    use super::*;

    #[test]
    fn action_error_names_action_and_phase() {
        let err = ActionError::new("send-mail", Phase::AfterCommit, "smtp down".into());

        let msg = err.to_string();

        assert!(msg.contains("send-mail"));
        assert!(msg.contains("after-commit"));
    }

    #[test]
    fn action_error_exposes_source() {
        let err = ActionError::new("audit", Phase::BeforeCommit, "disk full".into());

        let source = err.source().map(ToString::to_string);

        assert_eq!(source.as_deref(), Some("disk full"));
    }

    #[test]
    fn panic_payload_str_becomes_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");

        let err = PanicError::from_payload(payload.as_ref());

        assert_eq!(err.message, "boom");
    }

    #[test]
    fn panic_payload_string_becomes_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));

        let err = PanicError::from_payload(payload.as_ref());

        assert_eq!(err.message, "kaboom");
    }

    #[test]
    fn invalid_state_mentions_unit_and_state() {
        let err = UnitError::InvalidState {
            unit: UnitId::new(3),
            state: UnitState::Committed,
        };

        let msg = err.to_string();

        assert!(msg.contains("uow-3"));
        assert!(msg.contains("committed"));
    }

    fn rollback_report() -> Box<DispatchReport> {
        Box::new(DispatchReport::new(
            Some(UnitId::new(1)),
            CompletionOutcome::RolledBack,
        ))
    }

    #[test]
    fn before_commit_failure_has_source_chain() {
        let err = UnitError::BeforeCommitFailed {
            unit: UnitId::new(1),
            source: ActionError::new("validate", Phase::BeforeCommit, "invalid".into()),
            report: rollback_report(),
        };

        let source = err.source();

        assert!(source.is_some_and(|s| s.to_string().contains("validate")));
    }

    #[test]
    fn forced_rollback_errors_carry_their_report() {
        let mut err = UnitError::Commit {
            unit: UnitId::new(1),
            source: "disk full".into(),
            report: rollback_report(),
        };

        assert_eq!(
            err.report().map(DispatchReport::outcome),
            Some(CompletionOutcome::RolledBack)
        );
        assert!(err.report_mut().is_some());
        assert!(UnitError::NoActiveUnit.report().is_none());
    }

    #[test]
    fn unit_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}

        assert_send_sync::<UnitError>();
    }
}
