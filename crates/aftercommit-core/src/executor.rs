use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use thiserror::Error;

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Terminal status of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The job ran to completion.
    Completed,
    /// The job panicked; the panic was contained by the executor.
    Panicked,
    /// The executor went away without running the job.
    Abandoned,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SubmitError {
    #[error("executor queue is full (capacity {capacity})")]
    Saturated { capacity: usize },

    #[error("executor has been shut down")]
    ShutDown,
}

/// The worker-pool port consumed for asynchronous actions.
///
/// Implementations are expected to attempt every accepted job at least once
/// but give no ordering guarantee between jobs.
pub trait Executor: Send + Sync {
    /// Hand `job` to the executor.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError` if the executor refuses the job.
    fn submit(&self, job: Job) -> Result<JobHandle, SubmitError>;
}

/// Handle to a submitted job. Dropping it does not cancel the job.
#[derive(Debug)]
pub struct JobHandle {
    id: u64,
    receiver: Receiver<JobStatus>,
    status: Option<JobStatus>,
}

/// Write side of a [`JobHandle`], held by whoever runs the job.
#[derive(Debug)]
pub struct JobReporter {
    sender: Sender<JobStatus>,
}

impl JobHandle {
    /// Create a pending handle and the reporter that resolves it.
    #[must_use]
    pub fn pending(id: u64) -> (Self, JobReporter) {
        let (sender, receiver) = mpsc::channel();
        let handle = Self {
            id,
            receiver,
            status: None,
        };
        (handle, JobReporter { sender })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Status if the job has finished, without blocking.
    pub fn try_status(&mut self) -> Option<JobStatus> {
        if self.status.is_none() {
            self.status = match self.receiver.try_recv() {
                Ok(status) => Some(status),
                Err(TryRecvError::Disconnected) => Some(JobStatus::Abandoned),
                Err(TryRecvError::Empty) => None,
            };
        }
        self.status
    }

    /// Block until the job finishes or `timeout` elapses.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<JobStatus> {
        if self.status.is_none() {
            self.status = match self.receiver.recv_timeout(timeout) {
                Ok(status) => Some(status),
                Err(RecvTimeoutError::Disconnected) => Some(JobStatus::Abandoned),
                Err(RecvTimeoutError::Timeout) => None,
            };
        }
        self.status
    }

    /// Block until the job finishes.
    #[must_use]
    pub fn wait(self) -> JobStatus {
        match self.status {
            Some(status) => status,
            None => self.receiver.recv().unwrap_or(JobStatus::Abandoned),
        }
    }
}

impl JobReporter {
    /// Run `job`, containing any panic, and resolve the handle.
    pub fn run(self, job: Job) -> JobStatus {
        let status = match catch_unwind(AssertUnwindSafe(job)) {
            Ok(()) => JobStatus::Completed,
            Err(_) => JobStatus::Panicked,
        };
        // receiver may already be dropped
        let _ = self.sender.send(status);
        status
    }
}

/// Executor that runs every job immediately on the submitting thread.
#[derive(Debug, Default)]
pub struct InlineExecutor {
    next_id: AtomicU64,
}

impl InlineExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for InlineExecutor {
    fn submit(&self, job: Job) -> Result<JobHandle, SubmitError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (handle, reporter) = JobHandle::pending(id);
        reporter.run(job);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn inline_executor_runs_job_before_returning() -> Result<(), SubmitError> {
        let executor = InlineExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);

        let mut handle = executor.submit(Box::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }))?;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(handle.try_status(), Some(JobStatus::Completed));
        Ok(())
    }

    #[test]
    fn inline_executor_contains_panics() -> Result<(), SubmitError> {
        let executor = InlineExecutor::new();

        let handle = executor.submit(Box::new(|| panic!("job blew up")))?;

        assert_eq!(handle.wait(), JobStatus::Panicked);
        Ok(())
    }

    #[test]
    fn inline_executor_assigns_increasing_ids() -> Result<(), SubmitError> {
        let executor = InlineExecutor::new();

        let first = executor.submit(Box::new(|| {}))?;
        let second = executor.submit(Box::new(|| {}))?;

        assert!(second.id() > first.id());
        Ok(())
    }

    #[test]
    fn pending_handle_has_no_status_until_reported() {
        let (mut handle, reporter) = JobHandle::pending(1);

        assert_eq!(handle.try_status(), None);
        reporter.run(Box::new(|| {}));
        assert_eq!(handle.try_status(), Some(JobStatus::Completed));
    }

    #[test]
    fn dropped_reporter_abandons_handle() {
        let (handle, reporter) = JobHandle::pending(1);

        drop(reporter);

        assert_eq!(handle.wait(), JobStatus::Abandoned);
    }

    #[test]
    fn wait_timeout_returns_none_while_pending() {
        let (mut handle, _reporter) = JobHandle::pending(1);

        assert_eq!(handle.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn saturated_error_mentions_capacity() {
        let err = SubmitError::Saturated { capacity: 8 };

        assert!(err.to_string().contains('8'));
    }
}
