//! Bounded thread worker pool.
//!
//! `WorkerPool` implements the `Executor` port from `aftercommit-core` on top
//! of plain OS threads sharing a bounded job queue. When the queue is full
//! the configured `SaturationPolicy` decides whether submitters block or are
//! rejected.

mod config;
mod error;
mod pool;

pub use config::PoolConfig;
pub use error::PoolError;
pub use pool::{PoolStats, WorkerPool};
