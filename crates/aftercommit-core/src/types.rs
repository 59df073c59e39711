use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Opaque identity of a unit of work, unique per manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(u64);

impl UnitId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uow-{}", self.0)
    }
}

/// Final outcome of a unit of work. Computed once, never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionOutcome {
    Committed,
    RolledBack,
}

impl fmt::Display for CompletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    Active,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
}

impl UnitState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl From<CompletionOutcome> for UnitState {
    fn from(outcome: CompletionOutcome) -> Self {
        match outcome {
            CompletionOutcome::Committed => Self::Committed,
            CompletionOutcome::RolledBack => Self::RolledBack,
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::RollingBack => "rolling back",
            Self::RolledBack => "rolled back",
        };
        write!(f, "{s}")
    }
}

/// Point relative to a unit's conclusion at which a deferred action fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Runs synchronously before the underlying commit is finalized.
    BeforeCommit,
    AfterCommit,
    AfterRollback,
    /// Runs for either outcome, after the outcome-specific phase.
    AfterCompletion,
}

impl Phase {
    /// Phases dispatched once the resource has been finalized, in dispatch order.
    #[must_use]
    pub const fn after_phases(outcome: CompletionOutcome) -> &'static [Phase] {
        match outcome {
            CompletionOutcome::Committed => &[Phase::AfterCommit, Phase::AfterCompletion],
            CompletionOutcome::RolledBack => &[Phase::AfterRollback, Phase::AfterCompletion],
        }
    }

    /// Whether an action registered for this phase runs for the given outcome.
    #[must_use]
    pub fn fires_on(self, outcome: CompletionOutcome) -> bool {
        match self {
            Self::BeforeCommit => outcome == CompletionOutcome::Committed,
            _ => Self::after_phases(outcome).contains(&self),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BeforeCommit => "before-commit",
            Self::AfterCommit => "after-commit",
            Self::AfterRollback => "after-rollback",
            Self::AfterCompletion => "after-completion",
        };
        write!(f, "{s}")
    }
}

/// Where a deferred action executes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// On the thread completing the unit, which blocks until the action returns.
    #[default]
    Inline,
    /// Submitted to an executor; completion is not awaited.
    Async,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inline => "inline",
            Self::Async => "async",
        };
        write!(f, "{s}")
    }
}

/// What a bounded executor does when its queue is full.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SaturationPolicy {
    /// Block the submitter until a slot frees up.
    #[default]
    Block,
    /// Fail the submission immediately.
    Reject,
}

impl fmt::Display for SaturationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Block => "block",
            Self::Reject => "reject",
        };
        write!(f, "{s}")
    }
}
