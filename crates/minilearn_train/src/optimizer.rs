//! Optimizers and the factory the learner builds them from.

use burn::module::AutodiffModule;
use burn::optim::{self, decay::WeightDecayConfig, GradientsParams};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

/// An optimizer over a burn module.
///
/// The learner creates one per `fit` through its [`OptimizerFactory`] and
/// stores it in `learn.opt`; steps and schedulers drive it from there.
pub trait Optimizer<B: AutodiffBackend, M: AutodiffModule<B>>: Send {
    /// Apply `grads` to `model` and return the updated module.
    fn step(&mut self, model: M, grads: GradientsParams) -> Result<M>;

    /// Current learning rate.
    fn lr(&self) -> f64;

    /// Set the learning rate.
    fn set_lr(&mut self, lr: f64);

    /// Read a named hyperparameter such as `"lr"`.
    fn hyper(&self, name: &str) -> Option<f64> {
        (name == "lr").then(|| self.lr())
    }
}

/// Builds an optimizer for a model and learning rate.
pub trait OptimizerFactory<B: AutodiffBackend, M: AutodiffModule<B>>: Send + Sync {
    /// Create the optimizer.
    fn build(&self, model: &M, lr: f64) -> Result<Box<dyn Optimizer<B, M>>>;
}

impl<B, M, F> OptimizerFactory<B, M> for F
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    F: Fn(&M, f64) -> Result<Box<dyn Optimizer<B, M>>> + Send + Sync,
{
    fn build(&self, model: &M, lr: f64) -> Result<Box<dyn Optimizer<B, M>>> {
        self(model, lr)
    }
}

fn check_lr(lr: f64) -> Result<()> {
    if lr.is_finite() && lr >= 0.0 {
        Ok(())
    } else {
        Err(TrainError::InvalidLearningRate(format!(
            "learning rate must be finite and non-negative, got {}",
            lr
        )))
    }
}

/// Any burn optimizer, with the learning rate held on the side.
///
/// Burn takes the learning rate as an argument of every step, so schedulers
/// adjust it here between steps.
pub struct BurnOptimizer<O> {
    optim: O,
    lr: f64,
    hypers: Vec<(&'static str, f64)>,
}

impl<O> BurnOptimizer<O> {
    /// Wrap `optim` with a starting learning rate.
    ///
    /// # Errors
    ///
    /// Returns an error if `lr` is negative or not finite.
    pub fn new(optim: O, lr: f64) -> Result<Self> {
        check_lr(lr)?;
        Ok(Self {
            optim,
            lr,
            hypers: Vec::new(),
        })
    }

    /// Expose a fixed hyperparameter through [`Optimizer::hyper`].
    #[must_use]
    pub fn with_hyper(mut self, name: &'static str, value: f64) -> Self {
        self.hypers.push((name, value));
        self
    }
}

impl<B, M, O> Optimizer<B, M> for BurnOptimizer<O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: optim::Optimizer<M, B> + Send,
{
    fn step(&mut self, model: M, grads: GradientsParams) -> Result<M> {
        check_lr(self.lr)?;
        Ok(optim::Optimizer::step(&mut self.optim, self.lr, model, grads))
    }

    fn lr(&self) -> f64 {
        self.lr
    }

    fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }

    fn hyper(&self, name: &str) -> Option<f64> {
        if name == "lr" {
            return Some(self.lr);
        }
        self.hypers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }
}

/// SGD configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SgdConfig {
    /// L2 penalty added to each gradient.
    pub weight_decay: f64,
}

impl SgdConfig {
    /// Plain SGD.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set weight decay.
    #[must_use]
    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Create burn's SGD, `p -= lr * (grad + wd * p)`, for a module type.
    ///
    /// # Errors
    ///
    /// Returns an error if `lr` is negative or not finite.
    pub fn init<B: AutodiffBackend, M: AutodiffModule<B>>(
        &self,
        lr: f64,
    ) -> Result<BurnOptimizer<impl optim::Optimizer<M, B>>> {
        let decay = (self.weight_decay != 0.0)
            .then(|| WeightDecayConfig::new(self.weight_decay as f32));
        let optim = optim::SgdConfig::new()
            .with_weight_decay(decay)
            .init::<B, M>();
        Ok(BurnOptimizer::new(optim, lr)?
            .with_hyper("weight_decay", self.weight_decay)
            .with_hyper("wd", self.weight_decay))
    }
}

impl<B, M> OptimizerFactory<B, M> for SgdConfig
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + 'static,
{
    fn build(&self, _model: &M, lr: f64) -> Result<Box<dyn Optimizer<B, M>>> {
        Ok(Box::new(self.init::<B, M>(lr)?))
    }
}
