//! Batch transforms.

use burn::tensor::backend::AutodiffBackend;
use minilearn_core::{Batch, Model};

use crate::callback::Callback;
use crate::error::Result;
use crate::hooks::{Hook, HookSet};
use crate::learner::Learner;

type Transform<B> = Box<dyn FnMut(Batch<B>) -> Result<Batch<B>> + Send>;

/// Replaces each batch with `tfm(batch)` before it is processed.
///
/// ```rust,ignore
/// // normalize inputs on both passes
/// let norm = BatchTransformCB::new(|b: Batch<B>| {
///     let [x, y] = ...;
///     Batch::pair((x - mean) / std, y).map_err(Into::into)
/// });
/// ```
pub struct BatchTransformCB<B: AutodiffBackend> {
    tfm: Transform<B>,
    on_train: bool,
    on_val: bool,
}

impl<B: AutodiffBackend> std::fmt::Debug for BatchTransformCB<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchTransformCB")
            .field("on_train", &self.on_train)
            .field("on_val", &self.on_val)
            .finish()
    }
}

impl<B: AutodiffBackend> BatchTransformCB<B> {
    /// Apply `tfm` on both passes.
    pub fn new(tfm: impl FnMut(Batch<B>) -> Result<Batch<B>> + Send + 'static) -> Self {
        Self {
            tfm: Box::new(tfm),
            on_train: true,
            on_val: true,
        }
    }

    /// Whether to transform training batches.
    #[must_use]
    pub fn on_train(mut self, on: bool) -> Self {
        self.on_train = on;
        self
    }

    /// Whether to transform validation batches.
    #[must_use]
    pub fn on_val(mut self, on: bool) -> Self {
        self.on_val = on;
        self
    }
}

impl<B: AutodiffBackend, M: Model<B>> Callback<B, M> for BatchTransformCB<B> {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::BeforeBatch])
    }

    fn before_batch(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        let applies = if learn.training() { self.on_train } else { self.on_val };
        if !applies {
            return Ok(());
        }
        if let Some(batch) = learn.batch.take() {
            learn.batch = Some((self.tfm)(batch)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::FitOptions;
    use crate::test_util::{learner_with, TestBackend, TestModel};
    use burn::prelude::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FirstInput(Vec<(bool, f32)>);

    impl Callback<TestBackend, TestModel> for FirstInput {
        fn hooks(&self) -> HookSet {
            HookSet::of(&[Hook::BeforeBatch])
        }

        fn order(&self) -> i32 {
            10
        }

        fn before_batch(&mut self, learn: &mut Learner<TestBackend, TestModel>) -> Result<()> {
            let x = learn.batch()?.tensors()[0].clone();
            let v = x.into_data().to_vec::<f32>().map_err(|e| crate::TrainError::Other(format!("{:?}", e)))?;
            self.0.push((learn.training(), v[0]));
            Ok(())
        }
    }

    fn zero_inputs(batch: Batch<TestBackend>) -> Result<Batch<TestBackend>> {
        let mut tensors = batch.tensors().to_vec();
        tensors[0] = tensors[0].clone().zeros_like();
        Ok(Batch::new(tensors)?)
    }

    #[test]
    fn test_transform_only_on_selected_pass() {
        let seen = Arc::new(Mutex::new(FirstInput::default()));
        let handle: crate::CallbackRef<TestBackend, TestModel> = seen.clone();
        let mut learn = learner_with(1, 1)
            .with_cb(BatchTransformCB::new(zero_inputs).on_val(false))
            .with_cbs([handle]);
        learn.fit_with(FitOptions::new(1)).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.0.len(), 2);
        assert_eq!(seen.0[0], (true, 0.0));
        assert!(!seen.0[1].0);
        assert_ne!(seen.0[1].1, 0.0);
    }
}
