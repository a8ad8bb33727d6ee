//! The plain training steps: forward, loss, backward, optimizer step and
//! gradient reset.

use burn::tensor::backend::AutodiffBackend;
use minilearn_core::{grads, Model};

use crate::callback::Callback;
use crate::error::{Result, TrainError};
use crate::hooks::{Hook, HookSet};
use crate::learner::{Learner, StepOverride, TrainStep};

/// Set `learn.preds` from the first `n_inp` batch tensors.
pub fn predict<B: AutodiffBackend, M: Model<B>>(learn: &mut Learner<B, M>, n_inp: usize) -> Result<()> {
    let inputs = learn.batch()?.inputs(n_inp).to_vec();
    learn.preds = Some(learn.model.forward(&inputs)?);
    Ok(())
}

/// Set `learn.loss` from `learn.preds` and the remaining batch tensors.
pub fn get_loss<B: AutodiffBackend, M: Model<B>>(learn: &mut Learner<B, M>, n_inp: usize) -> Result<()> {
    let preds = learn.preds()?.clone();
    let targets = learn.batch()?.targets(n_inp).to_vec();
    learn.loss = Some(learn.loss_func.forward(preds, &targets)?);
    Ok(())
}

/// Backpropagate `learn.loss` and add the result to `learn.grads`.
pub fn backward<B: AutodiffBackend, M: Model<B>>(learn: &mut Learner<B, M>) -> Result<()> {
    let batch_grads = grads::backward(&learn.model, learn.loss()?);
    learn.grads = Some(grads::accumulate::<B, M>(
        &learn.model,
        learn.grads.take(),
        batch_grads,
    ));
    Ok(())
}

/// Apply the optimizer to the model with the accumulated gradients.
///
/// `learn.grads` is kept until `zero_grad`.
pub fn step<B: AutodiffBackend, M: Model<B>>(learn: &mut Learner<B, M>) -> Result<()> {
    let opt = learn.opt.as_mut().ok_or(TrainError::MissingState("opt"))?;
    let Some(acc) = learn.grads.as_ref() else {
        return Ok(());
    };
    let applied = grads::copy::<B, M>(&learn.model, acc);
    learn.model = opt.step(learn.model.clone(), applied)?;
    Ok(())
}

/// Drop the accumulated gradients.
pub fn zero_grad<B: AutodiffBackend, M: Model<B>>(learn: &mut Learner<B, M>) -> Result<()> {
    learn.opt.as_ref().ok_or(TrainError::MissingState("opt"))?;
    learn.grads = None;
    Ok(())
}

/// Supplies all five training steps as a callback.
///
/// The batch is split at `n_inp`: the leading tensors go to the model, the
/// rest to the loss function.
#[derive(Debug, Clone)]
pub struct TrainCB {
    n_inp: usize,
    zero_grad: bool,
}

impl Default for TrainCB {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainCB {
    /// One model input.
    pub fn new() -> Self {
        Self::with_inputs(1)
    }

    /// `n_inp` model inputs.
    pub fn with_inputs(n_inp: usize) -> Self {
        Self {
            n_inp,
            zero_grad: true,
        }
    }

    /// Leave `zero_grad` to another callback, e.g. [`MomentumGrad`].
    #[must_use]
    pub fn without_zero_grad(mut self) -> Self {
        self.zero_grad = false;
        self
    }
}

impl<B: AutodiffBackend, M: Model<B>> Callback<B, M> for TrainCB {
    fn hooks(&self) -> HookSet {
        if self.zero_grad {
            HookSet::STEPS
        } else {
            HookSet::STEPS.without(Hook::ZeroGrad)
        }
    }

    fn predict(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        predict(learn, self.n_inp)
    }

    fn get_loss(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        get_loss(learn, self.n_inp)
    }

    fn backward(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        backward(learn)
    }

    fn step(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        step(learn)
    }

    fn zero_grad(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        zero_grad(learn)
    }
}

/// One plain step installed as a direct override.
#[derive(Debug, Clone, Copy)]
pub struct PlainStep {
    step: TrainStep,
    n_inp: usize,
}

impl PlainStep {
    /// The plain implementation of `step`.
    pub fn new(step: TrainStep, n_inp: usize) -> Self {
        Self { step, n_inp }
    }
}

impl<B: AutodiffBackend, M: Model<B>> StepOverride<B, M> for PlainStep {
    fn run(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        match self.step {
            TrainStep::Predict => predict(learn, self.n_inp),
            TrainStep::GetLoss => get_loss(learn, self.n_inp),
            TrainStep::Backward => backward(learn),
            TrainStep::Step => step(learn),
            TrainStep::ZeroGrad => zero_grad(learn),
        }
    }
}

/// `zero_grad` that decays gradients by `mom` instead of clearing them.
///
/// Gradients then carry an exponentially decaying sum of past batches,
/// which acts as momentum for a plain SGD step. Usable as a callback next
/// to [`TrainCB::without_zero_grad`] or as a step override.
#[derive(Debug, Clone, Copy)]
pub struct MomentumGrad {
    mom: f64,
}

impl Default for MomentumGrad {
    fn default() -> Self {
        Self::new(0.85)
    }
}

impl MomentumGrad {
    /// Decay factor `mom`.
    pub fn new(mom: f64) -> Self {
        Self { mom }
    }

    /// The decay factor.
    #[must_use]
    pub fn mom(&self) -> f64 {
        self.mom
    }
}

impl<B: AutodiffBackend, M: Model<B>> StepOverride<B, M> for MomentumGrad {
    fn run(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        if let Some(acc) = learn.grads.as_mut() {
            grads::scale::<B, M>(&learn.model, acc, self.mom);
        }
        Ok(())
    }
}

impl<B: AutodiffBackend, M: Model<B>> Callback<B, M> for MomentumGrad {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::ZeroGrad])
    }

    fn zero_grad(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        StepOverride::run(self, learn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::FitOptions;
    use crate::test_util::{learner, learner_with, weight_grad, weights};

    #[test]
    fn test_train_cb_updates_parameters() {
        let mut learn = learner().with_cb(TrainCB::new());
        let before = weights(&learn);
        learn.fit_with(FitOptions::new(1).valid(false)).unwrap();

        assert_ne!(weights(&learn), before);
        assert!(learn.preds.is_some());
        assert!(learn.loss.is_some());
        // zero_grad ran after the last step
        assert!(weight_grad(&learn).is_none());
    }

    #[test]
    fn test_override_and_callback_steps_agree() {
        let mut by_cb = learner().with_cb(TrainCB::new());
        let mut by_override = learner().with_train_steps(1);
        by_cb.fit(2).unwrap();
        by_override.fit(2).unwrap();

        let a = weights(&by_cb);
        let b = weights(&by_override);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_validation_leaves_parameters_alone() {
        let mut learn = learner().with_cb(TrainCB::new());
        let before = weights(&learn);
        learn.fit_with(FitOptions::new(1).train(false)).unwrap();

        assert_eq!(weights(&learn), before);
        assert!(weight_grad(&learn).is_none());
    }

    #[test]
    fn test_momentum_decays_instead_of_clearing() {
        let opts = || FitOptions::new(1).valid(false).lr(0.0);

        let mut plain = learner_with(1, 1).with_cb(TrainCB::new().without_zero_grad());
        plain.fit_with(opts()).unwrap();
        let g = weight_grad(&plain).unwrap();

        let mut decayed = learner_with(1, 1)
            .with_cb(TrainCB::new().without_zero_grad())
            .with_cb(MomentumGrad::new(0.5));
        decayed.fit_with(opts()).unwrap();
        let half = weight_grad(&decayed).unwrap();

        assert!(g.iter().any(|v| v.abs() > 0.0));
        for (a, b) in g.iter().zip(&half) {
            assert!((a * 0.5 - b).abs() < 1e-6);
        }
        assert_eq!(MomentumGrad::default().mom(), 0.85);
    }
}
