//! Loss functions.
//!
//! A loss maps the model output and the batch targets to a single-element
//! tensor that stays on the autodiff graph, so `backward` reaches the model.

use burn::nn::loss::{CrossEntropyLossConfig, MseLoss, Reduction};
use burn::prelude::*;
use minilearn_core::CoreError;

use crate::error::{Result, TrainError};

/// A loss function the learner calls from its `get_loss` step.
pub trait LossFn<B: Backend>: Send + Sync {
    /// Reduce predictions against the batch targets to a scalar tensor.
    fn forward(&self, preds: Tensor<B, 2>, targets: &[Tensor<B, 2>]) -> Result<Tensor<B, 1>>;

    /// Get the loss name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<B, F> LossFn<B> for F
where
    B: Backend,
    F: Fn(Tensor<B, 2>, &[Tensor<B, 2>]) -> Result<Tensor<B, 1>> + Send + Sync,
{
    fn forward(&self, preds: Tensor<B, 2>, targets: &[Tensor<B, 2>]) -> Result<Tensor<B, 1>> {
        self(preds, targets)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

fn first_target<B: Backend>(targets: &[Tensor<B, 2>]) -> Result<Tensor<B, 2>> {
    targets
        .first()
        .cloned()
        .ok_or(TrainError::MissingState("targets"))
}

/// Mean Squared Error loss for regression.
#[derive(Debug, Clone, Copy, Default)]
pub struct MSELoss;

impl MSELoss {
    /// Create a new MSE loss.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> LossFn<B> for MSELoss {
    fn forward(&self, preds: Tensor<B, 2>, targets: &[Tensor<B, 2>]) -> Result<Tensor<B, 1>> {
        let targets = first_target(targets)?;
        if preds.dims() != targets.dims() {
            return Err(CoreError::ShapeMismatch(format!(
                "mse: predictions {:?} vs targets {:?}",
                preds.dims(),
                targets.dims()
            ))
            .into());
        }
        Ok(MseLoss::new().forward(preds, targets, Reduction::Mean))
    }

    fn name(&self) -> &str {
        "mse"
    }
}

/// Cross-entropy loss for classification.
///
/// Predictions are `(N, C)` logits; targets are a single `(N, 1)` column of
/// class indices stored as floats.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Create a new cross-entropy loss.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> LossFn<B> for CrossEntropyLoss {
    fn forward(&self, logits: Tensor<B, 2>, targets: &[Tensor<B, 2>]) -> Result<Tensor<B, 1>> {
        let targets = first_target(targets)?;
        let [n, _] = logits.dims();
        if targets.dims() != [n, 1] {
            return Err(CoreError::ShapeMismatch(format!(
                "cross entropy: expected class-index targets [{}, 1], got {:?}",
                n,
                targets.dims()
            ))
            .into());
        }
        let classes = targets.reshape([n]).int();
        let loss = CrossEntropyLossConfig::new().init(&logits.device());
        Ok(loss.forward(logits, classes))
    }

    fn name(&self) -> &str {
        "cross_entropy"
    }
}
