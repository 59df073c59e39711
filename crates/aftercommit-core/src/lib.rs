pub mod defaults;
pub mod executor;
pub mod types;

pub use defaults::{DEFAULT_QUEUE_CAPACITY, DEFAULT_THREAD_NAME, DEFAULT_WORKERS};
pub use executor::{
    Executor, InlineExecutor, Job, JobHandle, JobReporter, JobStatus, SubmitError,
};
pub use types::*;
