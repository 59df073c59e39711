use std::sync::{Arc, Mutex};

use aftercommit_core::Phase;
use tracing::warn;

use crate::error::ActionError;

/// Receives failures of deferred actions that cannot be returned to a caller.
///
/// Inline after-phase failures are also recorded in the `DispatchReport`;
/// failures inside asynchronous actions are only visible here.
pub trait ActionObserver: Send + Sync {
    fn action_failed(&self, error: &ActionError);
}

/// Logs action failures as `tracing` warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ActionObserver for TracingObserver {
    fn action_failed(&self, error: &ActionError) {
        warn!(
            action = %error.action,
            phase = %error.phase,
            cause = %error.source,
            "deferred action failed"
        );
    }
}

/// A failure captured by [`CollectingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub action: String,
    pub phase: Phase,
    pub message: String,
}

/// Keeps every reported failure in memory and logs it like [`TracingObserver`].
///
/// Cloning creates another handle to the same list.
#[derive(Debug, Default, Clone)]
pub struct CollectingObserver {
    failures: Arc<Mutex<Vec<FailureRecord>>>,
}

impl CollectingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Failures reported so far, in report order.
    #[must_use]
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures
            .lock()
            .map(|failures| failures.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.lock().map_or(0, |failures| failures.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActionObserver for CollectingObserver {
    fn action_failed(&self, error: &ActionError) {
        TracingObserver.action_failed(error);
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(FailureRecord {
                action: error.action.clone(),
                phase: error.phase,
                message: error.source.to_string(),
            });
        }
    }
}
