use aftercommit_core::{
    DEFAULT_QUEUE_CAPACITY, DEFAULT_THREAD_NAME, DEFAULT_WORKERS, SaturationPolicy,
};

use crate::error::PoolError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    workers: usize,
    queue_capacity: usize,
    saturation: SaturationPolicy,
    thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            saturation: SaturationPolicy::default(),
            thread_name: String::from(DEFAULT_THREAD_NAME),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers,
            queue_capacity,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_saturation(mut self, saturation: SaturationPolicy) -> Self {
        self.saturation = saturation;
        self
    }

    /// Prefix for worker thread names; workers are suffixed with their index.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    #[must_use]
    pub fn saturation(&self) -> SaturationPolicy {
        self.saturation
    }

    #[must_use]
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub(crate) fn validate(&self) -> Result<(), PoolError> {
        if self.workers == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "at least one worker is required",
            });
        }
        if self.queue_capacity == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "queue capacity must be at least 1",
            });
        }
        Ok(())
    }
}
