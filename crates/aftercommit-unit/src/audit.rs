use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use aftercommit_core::{CompletionOutcome, ExecutionMode, JobHandle, JobStatus, Phase, UnitId};

use crate::action::ActionMeta;
use crate::error::ActionError;

/// Status of an action in the dispatch report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ActionStatus {
    /// Action ran inline and returned successfully.
    Executed,
    /// Action ran inline and failed, or could not be submitted.
    Failed,
    /// Action was handed to the executor.
    Submitted,
    /// Before-commit action skipped because an earlier one failed.
    Skipped,
}

/// Record of one dispatched action.
#[derive(Debug)]
pub struct ActionRecord {
    /// Name the action was registered under.
    pub name: String,
    pub phase: Phase,
    pub mode: ExecutionMode,
    pub status: ActionStatus,
    /// When dispatch of the action started.
    pub started_at: Instant,
    /// When the action returned or was submitted.
    pub completed_at: Option<Instant>,
    /// Failure message, if the action failed.
    pub error: Option<String>,
}

/// What happened when a unit of work was dispatched.
///
/// The report is `Send + Sync`, so it can ride along inside a [`UnitError`]
/// when a commit was turned into a rollback.
///
/// [`UnitError`]: crate::UnitError
#[derive(Debug)]
pub struct DispatchReport {
    unit: Option<UnitId>,
    outcome: CompletionOutcome,
    records: Vec<ActionRecord>,
    handles: Mutex<Vec<JobHandle>>,
}

impl DispatchReport {
    pub(crate) fn new(unit: Option<UnitId>, outcome: CompletionOutcome) -> Self {
        Self {
            unit,
            outcome,
            records: Vec::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_outcome(&mut self, outcome: CompletionOutcome) {
        self.outcome = outcome;
    }

    /// Record an action starting.
    pub(crate) fn record_start(&mut self, meta: &ActionMeta) {
        self.records.push(ActionRecord {
            name: meta.name.clone(),
            phase: meta.phase,
            mode: meta.mode,
            status: ActionStatus::Executed,
            started_at: Instant::now(),
            completed_at: None,
            error: None,
        });
    }

    /// Mark the last action as completed successfully.
    pub(crate) fn record_success(&mut self) {
        if let Some(record) = self.records.last_mut() {
            record.status = ActionStatus::Executed;
            record.completed_at = Some(Instant::now());
        }
    }

    /// Mark the last action as failed.
    pub(crate) fn record_failure(&mut self, error: &ActionError) {
        if let Some(record) = self.records.last_mut() {
            record.status = ActionStatus::Failed;
            record.completed_at = Some(Instant::now());
            record.error = Some(error.source.to_string());
        }
    }

    /// Mark the last action as submitted and keep its handle.
    pub(crate) fn record_submitted(&mut self, handle: JobHandle) {
        if let Some(record) = self.records.last_mut() {
            record.status = ActionStatus::Submitted;
            record.completed_at = Some(Instant::now());
        }
        self.handles_mut().push(handle);
    }

    fn handles_mut(&mut self) -> &mut Vec<JobHandle> {
        self.handles
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an action that was never started.
    pub(crate) fn record_skipped(&mut self, meta: &ActionMeta) {
        self.record_start(meta);
        if let Some(record) = self.records.last_mut() {
            record.status = ActionStatus::Skipped;
        }
    }

    /// The dispatched unit, or `None` for a fallback action run without one.
    #[must_use]
    pub fn unit(&self) -> Option<UnitId> {
        self.unit
    }

    #[must_use]
    pub fn outcome(&self) -> CompletionOutcome {
        self.outcome
    }

    /// Get all records, in dispatch order.
    #[must_use]
    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    /// Records of actions that failed inline or could not be submitted.
    pub fn failures(&self) -> impl Iterator<Item = &ActionRecord> {
        self.records
            .iter()
            .filter(|record| record.status == ActionStatus::Failed)
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Number of submitted jobs not yet waited on.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Block until every submitted asynchronous action has finished.
    ///
    /// Statuses are returned in submission order.
    pub fn wait_async(&mut self) -> Vec<JobStatus> {
        self.handles_mut().drain(..).map(JobHandle::wait).collect()
    }

    /// Get a summary of the dispatch for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                ActionStatus::Executed => "✓",
                ActionStatus::Failed => "✗",
                ActionStatus::Submitted => "⇢",
                ActionStatus::Skipped => "-",
            };
            lines.push(format!("{status} [{}] {}", record.phase, record.name));
        }
        lines.join("\n")
    }
}
