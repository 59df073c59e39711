use std::fmt;

use aftercommit_core::{CompletionOutcome, UnitId};

use crate::error::UnitError;
use crate::manager::UnitManager;
use crate::resource::Resource;
use crate::unit::UnitOfWork;

/// What an after-phase action gets to see of a concluded unit.
///
/// Carries the outcome and the means to open a fresh unit, but not the
/// concluded unit's transaction. A `Completion` is owned and `Send`, so it can
/// travel to a worker thread with an asynchronous action.
pub struct Completion<R: Resource> {
    unit: Option<UnitId>,
    outcome: CompletionOutcome,
    manager: UnitManager<R>,
}

impl<R: Resource> Completion<R> {
    pub(crate) fn new(
        unit: Option<UnitId>,
        outcome: CompletionOutcome,
        manager: UnitManager<R>,
    ) -> Self {
        Self {
            unit,
            outcome,
            manager,
        }
    }

    /// The concluded unit, or `None` for a fallback action that ran without one.
    #[must_use]
    pub fn unit(&self) -> Option<UnitId> {
        self.unit
    }

    #[must_use]
    pub fn outcome(&self) -> CompletionOutcome {
        self.outcome
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.outcome == CompletionOutcome::Committed
    }

    /// Start a new unit of work, independent of the concluded one.
    ///
    /// # Errors
    ///
    /// Returns `UnitError::Begin` if the resource cannot start a transaction.
    pub fn begin_nested(&self) -> Result<UnitOfWork<R>, UnitError> {
        self.manager.begin()
    }
}

impl<R: Resource> Clone for Completion<R> {
    fn clone(&self) -> Self {
        Self {
            unit: self.unit,
            outcome: self.outcome,
            manager: self.manager.clone(),
        }
    }
}

impl<R: Resource> fmt::Debug for Completion<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("unit", &self.unit)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}
