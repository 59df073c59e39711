//! Units of work with deferred, phase-bound actions.
//!
//! A [`UnitOfWork`] wraps a resource transaction. Code running inside the unit
//! registers [`DeferredAction`]s tagged with a [`Phase`]; when the unit is
//! completed the dispatcher runs the actions whose phase matches the outcome,
//! in registration order, either inline or on an [`Executor`].
//!
//! Actions that run after the outcome is final never see the concluded
//! unit's transaction. To persist anything they must open a nested unit via
//! [`Completion::begin_nested`].
//!
//! [`Phase`]: aftercommit_core::Phase
//! [`Executor`]: aftercommit_core::Executor

mod action;
mod audit;
mod completion;
mod context;
mod dispatch;
mod error;
mod manager;
mod memory;
mod observer;
mod registry;
mod resource;
mod unit;

pub use action::DeferredAction;
pub use audit::{ActionRecord, ActionStatus, DispatchReport};
pub use completion::Completion;
pub use context::{ExecutionContext, Registration};
pub use error::{ActionError, ActionFailure, PanicError, RunError, UnitError};
pub use manager::{UnitManager, UnitManagerBuilder};
pub use memory::{MemoryStore, MemoryStoreError, StagedWrites};
pub use observer::{ActionObserver, CollectingObserver, FailureRecord, TracingObserver};
pub use resource::Resource;
pub use unit::UnitOfWork;
