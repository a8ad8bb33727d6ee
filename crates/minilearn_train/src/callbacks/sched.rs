//! Callbacks that drive a learning rate schedule.

use burn::tensor::backend::AutodiffBackend;
use minilearn_core::Model;

use crate::callback::Callback;
use crate::error::{Result, TrainError};
use crate::hooks::{Hook, HookSet};
use crate::learner::Learner;
use crate::scheduler::{SchedulerFactory, SchedulerStepper};

/// Shared state of the schedule callbacks: the factory and, during a fit,
/// the stepper built from `learn.opt`.
struct SchedState<B: AutodiffBackend, M: Model<B>> {
    factory: Box<dyn SchedulerFactory<B, M>>,
    stepper: Option<SchedulerStepper>,
}

impl<B: AutodiffBackend, M: Model<B>> SchedState<B, M> {
    fn new(factory: impl SchedulerFactory<B, M> + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            stepper: None,
        }
    }

    fn start(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        let opt = learn.opt_mut()?;
        let sched = self.factory.build(opt);
        tracing::debug!(scheduler = sched.name(), lr = sched.get_lr(0), "schedule started");
        self.stepper = Some(SchedulerStepper::new(sched, opt));
        Ok(())
    }

    fn step(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        if !learn.training() {
            return Ok(());
        }
        let stepper = self.stepper.as_mut().ok_or(TrainError::MissingState("lr schedule"))?;
        stepper.step(learn.opt_mut()?);
        Ok(())
    }

    fn steps(&self) -> usize {
        self.stepper.as_ref().map_or(0, SchedulerStepper::steps)
    }
}

/// Steps the schedule after every training batch.
pub struct BatchSchedCB<B: AutodiffBackend, M: Model<B>> {
    state: SchedState<B, M>,
}

impl<B: AutodiffBackend, M: Model<B>> BatchSchedCB<B, M> {
    /// Schedule built by `factory` at the start of each fit.
    pub fn new(factory: impl SchedulerFactory<B, M> + 'static) -> Self {
        Self {
            state: SchedState::new(factory),
        }
    }

    /// Steps taken in the current fit.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.state.steps()
    }
}

impl<B: AutodiffBackend, M: Model<B>> Callback<B, M> for BatchSchedCB<B, M> {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::BeforeFit, Hook::AfterBatch])
    }

    fn before_fit(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        self.state.start(learn)
    }

    fn after_batch(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        self.state.step(learn)
    }
}

/// Steps the schedule after every training epoch.
pub struct EpochSchedCB<B: AutodiffBackend, M: Model<B>> {
    state: SchedState<B, M>,
}

impl<B: AutodiffBackend, M: Model<B>> EpochSchedCB<B, M> {
    /// Schedule built by `factory` at the start of each fit.
    pub fn new(factory: impl SchedulerFactory<B, M> + 'static) -> Self {
        Self {
            state: SchedState::new(factory),
        }
    }

    /// Steps taken in the current fit.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.state.steps()
    }
}

impl<B: AutodiffBackend, M: Model<B>> Callback<B, M> for EpochSchedCB<B, M> {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::BeforeFit, Hook::AfterEpoch])
    }

    fn before_fit(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        self.state.start(learn)
    }

    fn after_epoch(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        self.state.step(learn)
    }
}
