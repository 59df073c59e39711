use aftercommit_core::{ExecutionMode, Phase};

use crate::action::{ActionBody, ActionMeta, CompletionFn, DeferredAction, StagingFn};
use crate::error::UnitError;
use crate::resource::Resource;

pub(crate) struct StagingAction<R: Resource> {
    pub(crate) meta: ActionMeta,
    pub(crate) run: StagingFn<R>,
}

pub(crate) struct CompletionAction<R: Resource> {
    pub(crate) meta: ActionMeta,
    pub(crate) run: CompletionFn<R>,
}

/// Actions registered against one unit, in registration order.
///
/// Only the owning unit writes to it while active; once sealed it is drained
/// by value for dispatch and accepts nothing further.
pub(crate) struct Registry<R: Resource> {
    staging: Vec<StagingAction<R>>,
    completion: Vec<CompletionAction<R>>,
    sealed: bool,
}

impl<R: Resource> Default for Registry<R> {
    fn default() -> Self {
        Self {
            staging: Vec::new(),
            completion: Vec::new(),
            sealed: false,
        }
    }
}

impl<R: Resource> Registry<R> {
    pub(crate) fn register(&mut self, action: DeferredAction<R>) -> Result<(), UnitError> {
        if self.sealed {
            return Err(UnitError::NoActiveUnit);
        }
        if action.phase() == Phase::BeforeCommit && action.execution_mode() == ExecutionMode::Async
        {
            return Err(UnitError::AsyncBeforeCommit {
                action: action.name().to_string(),
            });
        }

        let (meta, body) = action.into_parts();
        match body {
            ActionBody::Staging(run) => self.staging.push(StagingAction { meta, run }),
            ActionBody::Completion(run) => self.completion.push(CompletionAction { meta, run }),
        }
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.staging.len() + self.completion.len()
    }

    /// Close the registry and hand out its actions.
    pub(crate) fn seal(&mut self) -> (Vec<StagingAction<R>>, Vec<CompletionAction<R>>) {
        self.sealed = true;
        (
            std::mem::take(&mut self.staging),
            std::mem::take(&mut self.completion),
        )
    }
}
