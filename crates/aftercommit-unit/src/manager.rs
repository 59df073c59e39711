use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use aftercommit_core::{Executor, InlineExecutor, UnitId};
use tracing::debug;

use crate::context::ExecutionContext;
use crate::dispatch::Dispatcher;
use crate::error::{RunError, UnitError};
use crate::observer::{ActionObserver, TracingObserver};
use crate::resource::Resource;
use crate::unit::UnitOfWork;

struct ManagerInner<R> {
    resource: R,
    dispatcher: Dispatcher,
    next_id: AtomicU64,
}

/// Creates units of work over a shared resource.
///
/// Cloning is cheap and every clone allocates ids from the same sequence.
///
/// ## Example
///
/// ```ignore
/// let manager = UnitManager::builder(MemoryStore::new())
///     .executor(Arc::new(WorkerPool::new(PoolConfig::default())?))
///     .build();
///
/// let mut unit = manager.begin()?;
/// unit.transaction_mut()?.put("customer:1", "ada@example.com");
/// unit.register(DeferredAction::after_commit("welcome-mail", |_| send_welcome()))?;
/// let report = unit.commit()?;
/// ```
pub struct UnitManager<R: Resource> {
    inner: Arc<ManagerInner<R>>,
}

/// Builder for [`UnitManager`].
pub struct UnitManagerBuilder<R: Resource> {
    resource: R,
    executor: Arc<dyn Executor>,
    observer: Arc<dyn ActionObserver>,
}

impl<R: Resource> UnitManagerBuilder<R> {
    /// Executor for asynchronous actions. Defaults to [`InlineExecutor`].
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Observer for action failures. Defaults to [`TracingObserver`].
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn ActionObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn build(self) -> UnitManager<R> {
        UnitManager {
            inner: Arc::new(ManagerInner {
                resource: self.resource,
                dispatcher: Dispatcher::new(self.executor, self.observer),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

impl<R: Resource> UnitManager<R> {
    /// Manager with the default executor and observer.
    #[must_use]
    pub fn new(resource: R) -> Self {
        Self::builder(resource).build()
    }

    #[must_use]
    pub fn builder(resource: R) -> UnitManagerBuilder<R> {
        UnitManagerBuilder {
            resource,
            executor: Arc::new(InlineExecutor::new()),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Start a new, independent unit of work.
    ///
    /// # Errors
    ///
    /// Returns `UnitError::Begin` if the resource cannot start a transaction.
    pub fn begin(&self) -> Result<UnitOfWork<R>, UnitError> {
        let transaction = self
            .inner
            .resource
            .begin()
            .map_err(|source| UnitError::Begin {
                source: Box::new(source),
            })?;
        let id = UnitId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(unit = %id, "unit of work started");
        Ok(UnitOfWork::new(id, transaction, self.clone()))
    }

    /// A fresh execution context with no current unit.
    #[must_use]
    pub fn context(&self) -> ExecutionContext<R> {
        ExecutionContext::new(self.clone())
    }

    /// Run `work` inside a new unit: commit if it returns `Ok`, roll back if
    /// it returns `Err`.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Work` with the body's error after rolling back, or
    /// `RunError::Unit` if the unit failed to begin or commit.
    pub fn run<T, E, F>(&self, work: F) -> Result<T, RunError<E>>
    where
        F: FnOnce(&mut UnitOfWork<R>) -> Result<T, E>,
        E: Debug,
    {
        let mut unit = self.begin().map_err(RunError::Unit)?;
        match work(&mut unit) {
            Ok(value) => {
                unit.commit().map_err(RunError::Unit)?;
                Ok(value)
            }
            Err(error) => {
                unit.rollback().map_err(RunError::Unit)?;
                Err(RunError::Work(error))
            }
        }
    }

    #[must_use]
    pub fn resource(&self) -> &R {
        &self.inner.resource
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }
}

impl<R: Resource> Clone for UnitManager<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource> fmt::Debug for UnitManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitManager")
            .field("next_id", &self.inner.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
