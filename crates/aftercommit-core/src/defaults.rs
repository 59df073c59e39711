//! Worker pool defaults shared by the pool and the settings file.

/// Worker threads started when nothing else is configured.
pub const DEFAULT_WORKERS: usize = 4;

/// Jobs that may wait in the queue before saturation applies.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Name given to worker threads, suffixed with the worker index.
pub const DEFAULT_THREAD_NAME: &str = "aftercommit-worker";
