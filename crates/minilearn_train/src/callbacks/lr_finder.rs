//! Learning-rate range test.

use burn::tensor::backend::AutodiffBackend;
use minilearn_core::{scalar, Model};

use crate::callback::Callback;
use crate::error::{Result, TrainError};
use crate::hooks::{Hook, HookSet};
use crate::learner::Learner;
use crate::plot::LinePlot;
use crate::scheduler::{ExponentialLR, SchedulerStepper};

/// Grows the learning rate by `gamma` every training batch and stops the
/// fit once the loss diverges.
///
/// Records the rate in effect and the loss of each training batch. The fit
/// is cancelled when a loss is NaN or exceeds `max_mult` times the lowest
/// loss so far. Validation passes are cancelled on their first batch.
#[derive(Debug)]
pub struct LRFinderCB {
    gamma: f64,
    max_mult: f64,
    stepper: Option<SchedulerStepper>,
    lrs: Vec<f64>,
    losses: Vec<f64>,
    min: f64,
    plot: Option<String>,
}

impl Default for LRFinderCB {
    fn default() -> Self {
        Self::new(1.3, 3.0)
    }
}

impl LRFinderCB {
    /// Create a finder.
    pub fn new(gamma: f64, max_mult: f64) -> Self {
        Self {
            gamma,
            max_mult,
            stepper: None,
            lrs: Vec::new(),
            losses: Vec::new(),
            min: f64::INFINITY,
            plot: None,
        }
    }

    /// Learning rates, one per recorded batch.
    #[must_use]
    pub fn lrs(&self) -> &[f64] {
        &self.lrs
    }

    /// Losses, one per recorded batch.
    #[must_use]
    pub fn losses(&self) -> &[f64] {
        &self.losses
    }

    /// Loss against learning rate on a log axis, rendered when the fit ends.
    #[must_use]
    pub fn plot(&self) -> Option<&str> {
        self.plot.as_deref()
    }
}

impl<B: AutodiffBackend, M: Model<B>> Callback<B, M> for LRFinderCB {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::BeforeFit, Hook::AfterBatch, Hook::CleanupFit])
    }

    fn before_fit(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        let opt = learn.opt_mut()?;
        let sched = ExponentialLR::new(opt.lr(), self.gamma);
        self.stepper = Some(SchedulerStepper::new(Box::new(sched), opt));
        self.lrs.clear();
        self.losses.clear();
        self.min = f64::INFINITY;
        self.plot = None;
        Ok(())
    }

    fn after_batch(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        if !learn.training() {
            return Err(TrainError::cancel_epoch());
        }

        let lr = learn.opt()?.lr();
        let loss = scalar(learn.loss()?)?;
        self.lrs.push(lr);
        self.losses.push(loss);
        if loss < self.min {
            self.min = loss;
        }
        if loss.is_nan() || loss > self.min * self.max_mult {
            tracing::debug!(lr, loss, min = self.min, "loss diverged; stopping range test");
            return Err(TrainError::cancel_fit());
        }

        let stepper = self.stepper.as_mut().ok_or(TrainError::MissingState("lr schedule"))?;
        stepper.step(learn.opt_mut()?);
        Ok(())
    }

    fn cleanup_fit(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        self.stepper = None;
        let points = self.lrs.iter().copied().zip(self.losses.iter().copied());
        let text = LinePlot::new(60, 12).log_x(true).title("loss vs lr").series("loss", points).render();
        if !text.is_empty() {
            tracing::info!("learning rate finder\n{}", text);
            self.plot = Some(text);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::TrainCB;
    use crate::learner::FitOptions;
    use crate::test_util::{learner_with, TestBackend, TestModel};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_rates_grow_geometrically_until_divergence() {
        let mut learn = learner_with(4, 1).with_cb(TrainCB::new());
        let found = learn.lr_find(2.0, 3.0, 1e-3, 50).unwrap();

        assert_eq!(found.lrs.len(), found.losses.len());
        assert!(!found.lrs.is_empty());
        assert!((found.lrs[0] - 1e-3).abs() < 1e-12);
        for pair in found.lrs.windows(2) {
            assert!((pair[1] / pair[0] - 2.0).abs() < 1e-9);
        }

        // divergence stopped the fit well before 50 epochs of 4 batches
        assert!(found.lrs.len() < 200);
        let min = found.losses.iter().copied().fold(f64::INFINITY, f64::min);
        let last = *found.losses.last().unwrap();
        assert!(last.is_nan() || last > 3.0 * min);
    }

    #[test]
    fn test_validation_is_cancelled_and_plot_rendered() {
        let finder = Arc::new(Mutex::new(LRFinderCB::new(1.0, 1e9)));
        let handle: crate::CallbackRef<TestBackend, TestModel> = finder.clone();
        let mut learn = learner_with(2, 1).with_cb(TrainCB::new());
        learn.fit_with(FitOptions::new(2).lr(1e-4).cb_ref(handle)).unwrap();

        let finder = finder.lock();
        // only training batches are recorded
        assert_eq!(finder.lrs().len(), 4);
        assert!(finder.lrs().iter().all(|&lr| (lr - 1e-4).abs() < 1e-12));
        assert!(finder.plot().is_some_and(|p| p.contains("(log)")));
    }
}
