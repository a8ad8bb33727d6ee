//! The model collaborator contract.

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::error::Result;

/// A burn module the learner can train.
///
/// The learner never inspects the architecture. It switches the mode flag,
/// moves the module between devices with [`Module::fork`], hands the
/// module to the optimizer, and calls [`Model::forward`] through whichever
/// callback supplies the `predict` step. Gradients are collected per
/// parameter id with [`crate::grads`].
pub trait Model<B: AutodiffBackend>: AutodiffModule<B> + 'static {
    /// Forward pass over the model inputs of a batch.
    fn forward(&self, inputs: &[Tensor<B, 2>]) -> Result<Tensor<B, 2>>;

    /// Switch between training and evaluation mode.
    ///
    /// Modules without mode-dependent layers can ignore it.
    fn set_training(&mut self, _training: bool) {}
}
