//! Learning rate schedules and the stepper that applies them.
//!
//! A [`Scheduler`] is a pure function from step count to learning rate. A
//! [`SchedulerStepper`] owns one, counts steps, and writes the resulting
//! rate into an [`Optimizer`].

use std::f64::consts::PI;

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::optimizer::Optimizer;

/// Trait for learning rate schedulers.
pub trait Scheduler: Send + Sync {
    /// Learning rate after `step` scheduler steps.
    fn get_lr(&self, step: usize) -> f64;

    /// Get the scheduler name.
    fn name(&self) -> &str;
}

/// Builds a scheduler for the optimizer of the current fit.
///
/// Implemented for closures, so a schedule can read the optimizer's base
/// learning rate:
///
/// ```rust,ignore
/// let sched = BatchSchedCB::new(|opt: &dyn Optimizer<B, M>| {
///     Box::new(CosineAnnealingLR::new(opt.lr(), 0.0, 100)) as Box<dyn Scheduler>
/// });
/// ```
pub trait SchedulerFactory<B: AutodiffBackend, M: AutodiffModule<B>>: Send {
    /// Create the schedule.
    fn build(&self, opt: &dyn Optimizer<B, M>) -> Box<dyn Scheduler>;
}

impl<B, M, F> SchedulerFactory<B, M> for F
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    F: Fn(&dyn Optimizer<B, M>) -> Box<dyn Scheduler> + Send,
{
    fn build(&self, opt: &dyn Optimizer<B, M>) -> Box<dyn Scheduler> {
        self(opt)
    }
}

/// Drives an optimizer's learning rate through a [`Scheduler`].
pub struct SchedulerStepper {
    scheduler: Box<dyn Scheduler>,
    steps: usize,
}

impl std::fmt::Debug for SchedulerStepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerStepper")
            .field("scheduler", &self.scheduler.name())
            .field("steps", &self.steps)
            .finish()
    }
}

impl SchedulerStepper {
    /// Start at step 0 and apply its rate to `opt`.
    pub fn new<B: AutodiffBackend, M: AutodiffModule<B>>(
        scheduler: Box<dyn Scheduler>,
        opt: &mut dyn Optimizer<B, M>,
    ) -> Self {
        opt.set_lr(scheduler.get_lr(0));
        Self {
            scheduler,
            steps: 0,
        }
    }

    /// Advance one step and update `opt`.
    pub fn step<B: AutodiffBackend, M: AutodiffModule<B>>(&mut self, opt: &mut dyn Optimizer<B, M>) {
        self.steps += 1;
        opt.set_lr(self.scheduler.get_lr(self.steps));
    }

    /// Steps taken so far.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Rate for the current step.
    #[must_use]
    pub fn current_lr(&self) -> f64 {
        self.scheduler.get_lr(self.steps)
    }

    /// The wrapped schedule.
    #[must_use]
    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }
}

/// Configuration for [`OneCycleLR`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneCycleLRConfig {
    /// Peak learning rate.
    pub max_lr: f64,
    /// Total number of steps.
    pub total_steps: usize,
    /// Fraction of steps spent warming up.
    pub pct_start: f64,
    /// `max_lr / div_factor` is the starting rate.
    pub div_factor: f64,
    /// `max_lr / final_div_factor` is the final rate.
    pub final_div_factor: f64,
}

impl Default for OneCycleLRConfig {
    fn default() -> Self {
        Self {
            max_lr: 1e-3,
            total_steps: 1000,
            pct_start: 0.3,
            div_factor: 25.0,
            final_div_factor: 10000.0,
        }
    }
}

/// One-cycle policy: linear warmup to `max_lr`, then cosine decay.
#[derive(Debug, Clone)]
pub struct OneCycleLR {
    config: OneCycleLRConfig,
    initial_lr: f64,
    final_lr: f64,
    warmup_steps: usize,
}

impl OneCycleLR {
    /// Create a new OneCycleLR scheduler.
    pub fn new(config: OneCycleLRConfig) -> Self {
        let initial_lr = config.max_lr / config.div_factor;
        let final_lr = config.max_lr / config.final_div_factor;
        let warmup_steps = (config.total_steps as f64 * config.pct_start) as usize;

        Self {
            config,
            initial_lr,
            final_lr,
            warmup_steps,
        }
    }

    /// Create with just `max_lr` and `total_steps`.
    pub fn simple(max_lr: f64, total_steps: usize) -> Self {
        Self::new(OneCycleLRConfig {
            max_lr,
            total_steps,
            ..Default::default()
        })
    }
}

impl Scheduler for OneCycleLR {
    fn get_lr(&self, step: usize) -> f64 {
        let step = step.min(self.config.total_steps.saturating_sub(1));

        if step < self.warmup_steps {
            let progress = step as f64 / self.warmup_steps as f64;
            self.initial_lr + (self.config.max_lr - self.initial_lr) * progress
        } else {
            let annealing_steps = (self.config.total_steps - self.warmup_steps).max(1);
            let progress = (step - self.warmup_steps) as f64 / annealing_steps as f64;
            let cosine = (1.0 + (PI * progress).cos()) / 2.0;
            self.final_lr + (self.config.max_lr - self.final_lr) * cosine
        }
    }

    fn name(&self) -> &str {
        "OneCycleLR"
    }
}

/// Cosine annealing from `initial_lr` down to `min_lr`.
#[derive(Debug, Clone)]
pub struct CosineAnnealingLR {
    initial_lr: f64,
    min_lr: f64,
    total_steps: usize,
}

impl CosineAnnealingLR {
    /// Create a new cosine annealing scheduler.
    pub fn new(initial_lr: f64, min_lr: f64, total_steps: usize) -> Self {
        Self {
            initial_lr,
            min_lr,
            total_steps: total_steps.max(1),
        }
    }
}

impl Scheduler for CosineAnnealingLR {
    fn get_lr(&self, step: usize) -> f64 {
        let progress = step.min(self.total_steps) as f64 / self.total_steps as f64;
        let cosine = (1.0 + (PI * progress).cos()) / 2.0;
        self.min_lr + (self.initial_lr - self.min_lr) * cosine
    }

    fn name(&self) -> &str {
        "CosineAnnealingLR"
    }
}

/// Multiply by `gamma` every `step_size` steps.
#[derive(Debug, Clone)]
pub struct StepLR {
    initial_lr: f64,
    step_size: usize,
    gamma: f64,
}

impl StepLR {
    /// Create a new step decay scheduler.
    pub fn new(initial_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            initial_lr,
            step_size: step_size.max(1),
            gamma,
        }
    }
}

impl Scheduler for StepLR {
    fn get_lr(&self, step: usize) -> f64 {
        let n_decays = step / self.step_size;
        self.initial_lr * self.gamma.powi(n_decays as i32)
    }

    fn name(&self) -> &str {
        "StepLR"
    }
}

/// Constant learning rate.
#[derive(Debug, Clone)]
pub struct ConstantLR {
    lr: f64,
}

impl ConstantLR {
    /// Create a new constant LR scheduler.
    pub fn new(lr: f64) -> Self {
        Self { lr }
    }
}

impl Scheduler for ConstantLR {
    fn get_lr(&self, _step: usize) -> f64 {
        self.lr
    }

    fn name(&self) -> &str {
        "ConstantLR"
    }
}

/// Multiply by `gamma` every step.
#[derive(Debug, Clone)]
pub struct ExponentialLR {
    initial_lr: f64,
    gamma: f64,
}

impl ExponentialLR {
    /// Create a new exponential scheduler.
    ///
    /// # Arguments
    /// * `initial_lr` - Rate at step 0
    /// * `gamma` - Factor applied each step; above 1 for a range test
    pub fn new(initial_lr: f64, gamma: f64) -> Self {
        Self { initial_lr, gamma }
    }
}

impl Scheduler for ExponentialLR {
    fn get_lr(&self, step: usize) -> f64 {
        self.initial_lr * self.gamma.powi(step as i32)
    }

    fn name(&self) -> &str {
        "ExponentialLR"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::SgdConfig;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use minilearn_core::Linear;

    type B = Autodiff<NdArray>;

    #[test]
    fn test_one_cycle_shape() {
        let scheduler = OneCycleLR::simple(1e-2, 100);

        assert!((scheduler.get_lr(0) - 1e-2 / 25.0).abs() < 1e-10);
        assert!((scheduler.get_lr(30) - 1e-2).abs() < 1e-10);
        assert!(scheduler.get_lr(99) < 1e-4);
    }

    #[test]
    fn test_cosine_endpoints() {
        let scheduler = CosineAnnealingLR::new(1.0, 0.1, 10);
        assert!((scheduler.get_lr(0) - 1.0).abs() < 1e-10);
        assert!((scheduler.get_lr(5) - 0.55).abs() < 1e-10);
        assert!((scheduler.get_lr(10) - 0.1).abs() < 1e-10);
        assert!((scheduler.get_lr(50) - 0.1).abs() < 1e-10);
    }

    #[test]
    fn test_step_and_exponential() {
        let step = StepLR::new(1.0, 2, 0.5);
        let lrs: Vec<f64> = (0..5).map(|s| step.get_lr(s)).collect();
        assert_eq!(lrs, vec![1.0, 1.0, 0.5, 0.5, 0.25]);

        let exp = ExponentialLR::new(1e-5, 1.3);
        assert!((exp.get_lr(2) - 1e-5 * 1.69).abs() < 1e-12);
        assert_eq!(ConstantLR::new(0.2).get_lr(1000), 0.2);
    }

    #[test]
    fn test_stepper_drives_optimizer() {
        let mut opt = SgdConfig::new().init::<B, Linear<B>>(0.1).unwrap();
        let opt: &mut dyn Optimizer<B, Linear<B>> = &mut opt;

        let mut stepper = SchedulerStepper::new(Box::new(ExponentialLR::new(0.1, 2.0)), opt);
        assert!((opt.lr() - 0.1).abs() < 1e-12);

        stepper.step(opt);
        stepper.step(opt);
        assert_eq!(stepper.steps(), 2);
        assert!((opt.lr() - 0.4).abs() < 1e-12);
        assert!((stepper.current_lr() - 0.4).abs() < 1e-12);
        assert_eq!(stepper.scheduler().name(), "ExponentialLR");
    }
}
