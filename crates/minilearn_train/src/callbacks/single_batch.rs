//! Stop after the first batch.

use burn::tensor::backend::AutodiffBackend;
use minilearn_core::Model;

use crate::callback::Callback;
use crate::error::{Result, TrainError};
use crate::hooks::{Hook, HookSet};
use crate::learner::Learner;

/// Cancels the fit after one batch; useful to smoke-test a setup.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleBatchCB;

impl SingleBatchCB {
    /// Create the callback.
    pub fn new() -> Self {
        Self
    }
}

impl<B: AutodiffBackend, M: Model<B>> Callback<B, M> for SingleBatchCB {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::AfterBatch])
    }

    fn order(&self) -> i32 {
        1
    }

    fn after_batch(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Err(TrainError::cancel_fit())
    }
}
