use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use aftercommit_core::{
    Executor, Job, JobHandle, JobReporter, JobStatus, SaturationPolicy, SubmitError,
};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::error::PoolError;

struct Task {
    job: Job,
    reporter: JobReporter,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicUsize,
    panicked: AtomicUsize,
    rejected: AtomicUsize,
}

/// Statistics collected by a worker pool.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs that ran to completion.
    pub jobs_completed: usize,
    /// Jobs that panicked on a worker.
    pub jobs_panicked: usize,
    /// Submissions refused because the queue was full.
    pub jobs_rejected: usize,
}

/// A fixed set of worker threads draining a bounded job queue.
///
/// ## Example
///
/// ```ignore
/// use aftercommit_core::Executor;
/// use aftercommit_pool::{PoolConfig, WorkerPool};
///
/// let pool = WorkerPool::new(PoolConfig::new(2, 16))?;
/// let handle = pool.submit(Box::new(|| send_welcome_mail()))?;
///
/// // ... do other work ...
///
/// handle.wait();
/// let stats = pool.shutdown();
/// println!("Completed {} jobs", stats.jobs_completed);
/// ```
pub struct WorkerPool {
    sender: Mutex<Option<SyncSender<Task>>>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
    next_id: AtomicU64,
    config: PoolConfig,
}

impl WorkerPool {
    /// Spawn the workers described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` for zero workers or zero capacity,
    /// and `PoolError::Spawn` if a worker thread cannot be created.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let (sender, receiver) = mpsc::sync_channel::<Task>(config.queue_capacity());
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(config.workers());
        for index in 0..config.workers() {
            let name = format!("{}-{index}", config.thread_name());
            let rx = Arc::clone(&receiver);
            let worker_counters = Arc::clone(&counters);

            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&rx, &worker_counters))
                .map_err(|source| PoolError::Spawn { name, source })?;
            workers.push(handle);
        }

        debug!(
            workers = config.workers(),
            queue_capacity = config.queue_capacity(),
            saturation = %config.saturation(),
            "worker pool started"
        );

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers,
            counters,
            next_id: AtomicU64::new(0),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Snapshot of the counters so far.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            jobs_completed: self.counters.completed.load(Ordering::SeqCst),
            jobs_panicked: self.counters.panicked.load(Ordering::SeqCst),
            jobs_rejected: self.counters.rejected.load(Ordering::SeqCst),
        }
    }

    /// Stop accepting jobs, let the workers drain the queue, and wait for them.
    /// Returns the final statistics.
    pub fn shutdown(mut self) -> PoolStats {
        self.close();
        for worker in std::mem::take(&mut self.workers) {
            if worker.join().is_err() {
                warn!("worker thread terminated abnormally");
            }
        }
        self.stats()
    }

    fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }

    fn current_sender(&self) -> Result<SyncSender<Task>, SubmitError> {
        self.sender
            .lock()
            .ok()
            .and_then(|sender| sender.clone())
            .ok_or(SubmitError::ShutDown)
    }
}

impl Executor for WorkerPool {
    fn submit(&self, job: Job) -> Result<JobHandle, SubmitError> {
        // cloned so a blocking send does not hold the lock
        let sender = self.current_sender()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (handle, reporter) = JobHandle::pending(id);
        let task = Task { job, reporter };

        match self.config.saturation() {
            SaturationPolicy::Block => {
                sender.send(task).map_err(|_| SubmitError::ShutDown)?;
            }
            SaturationPolicy::Reject => match sender.try_send(task) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.counters.rejected.fetch_add(1, Ordering::SeqCst);
                    return Err(SubmitError::Saturated {
                        capacity: self.config.queue_capacity(),
                    });
                }
                Err(TrySendError::Disconnected(_)) => return Err(SubmitError::ShutDown),
            },
        }

        debug!(job = id, "job submitted");
        Ok(handle)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
        // Don't join on drop - workers exit once the queue is drained
    }
}

fn worker_loop(receiver: &Mutex<Receiver<Task>>, counters: &Counters) {
    loop {
        let next = {
            let Ok(guard) = receiver.lock() else {
                break;
            };
            guard.recv()
        };
        let Ok(Task { job, reporter }) = next else {
            break;
        };

        match reporter.run(job) {
            JobStatus::Panicked => {
                counters.panicked.fetch_add(1, Ordering::SeqCst);
                warn!("job panicked on worker");
            }
            JobStatus::Completed | JobStatus::Abandoned => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
    debug!("worker exiting");
}
