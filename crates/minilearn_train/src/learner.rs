//! The learner: a callback-driven training loop.

use std::ops::Range;
use std::sync::Arc;

use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use minilearn_core::{Batch, Model};
use minilearn_data::{BatchSource, DataLoaders};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::callback::{cb_ref, invoke, Callback, CallbackId, CallbackRef, Callbacks};
use crate::callbacks::{EpochLog, LRFinderCB, MomentumGrad, PlainStep};
use crate::cancel::Scope;
use crate::context::{run_scoped, Dispatch};
use crate::error::{Result, TrainError};
use crate::hooks::Hook;
use crate::losses::{LossFn, MSELoss};
use crate::optimizer::{Optimizer, OptimizerFactory, SgdConfig};

/// Configuration for the Learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Default learning rate for `fit`.
    pub lr: f64,
    /// Number of leading batch tensors that are model inputs.
    pub n_inp: usize,
    /// Gradient decay used by [`Learner::with_momentum`] when called with `None`.
    pub mom: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            lr: 0.1,
            n_inp: 1,
            mom: 0.85,
        }
    }
}

impl LearnerConfig {
    /// Parse from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not a valid configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Options for a single [`Learner::fit_with`] call.
pub struct FitOptions<B: AutodiffBackend, M: Model<B>> {
    /// Number of epochs.
    pub n_epochs: usize,
    /// Run a training pass each epoch.
    pub train: bool,
    /// Run a validation pass each epoch.
    pub valid: bool,
    /// Learning rate override for this call.
    pub lr: Option<f64>,
    /// Callbacks registered for this call only.
    pub cbs: Vec<CallbackRef<B, M>>,
}

impl<B: AutodiffBackend, M: Model<B>> FitOptions<B, M> {
    /// Train and validate for `n_epochs`.
    pub fn new(n_epochs: usize) -> Self {
        Self {
            n_epochs,
            train: true,
            valid: true,
            lr: None,
            cbs: Vec::new(),
        }
    }

    /// Enable or disable the training pass.
    #[must_use]
    pub fn train(mut self, train: bool) -> Self {
        self.train = train;
        self
    }

    /// Enable or disable the validation pass.
    #[must_use]
    pub fn valid(mut self, valid: bool) -> Self {
        self.valid = valid;
        self
    }

    /// Override the learner's learning rate.
    #[must_use]
    pub fn lr(mut self, lr: f64) -> Self {
        self.lr = Some(lr);
        self
    }

    /// Add a callback for this call.
    #[must_use]
    pub fn cb<C: Callback<B, M> + 'static>(self, callback: C) -> Self {
        self.cb_ref(cb_ref(callback))
    }

    /// Add an already-shared callback for this call.
    #[must_use]
    pub fn cb_ref(mut self, callback: CallbackRef<B, M>) -> Self {
        self.cbs.push(callback);
        self
    }
}

/// The five pass-through operations of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrainStep {
    /// Set `preds` from the batch inputs.
    Predict,
    /// Set `loss` from `preds` and the batch targets.
    GetLoss,
    /// Compute gradients of `loss`.
    Backward,
    /// Apply the optimizer.
    Step,
    /// Reset gradients.
    ZeroGrad,
}

impl TrainStep {
    /// All steps, in execution order.
    pub const ALL: [TrainStep; 5] = [
        TrainStep::Predict,
        TrainStep::GetLoss,
        TrainStep::Backward,
        TrainStep::Step,
        TrainStep::ZeroGrad,
    ];

    /// The hook dispatched when no override is installed.
    #[must_use]
    pub const fn hook(self) -> Hook {
        match self {
            Self::Predict => Hook::Predict,
            Self::GetLoss => Hook::GetLoss,
            Self::Backward => Hook::Backward,
            Self::Step => Hook::Step,
            Self::ZeroGrad => Hook::ZeroGrad,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// A direct implementation of one [`TrainStep`], bypassing hook dispatch.
pub trait StepOverride<B: AutodiffBackend, M: Model<B>>: Send {
    /// Perform the step.
    fn run(&mut self, learn: &mut Learner<B, M>) -> Result<()>;
}

impl<B, M, F> StepOverride<B, M> for F
where
    B: AutodiffBackend,
    M: Model<B>,
    F: FnMut(&mut Learner<B, M>) -> Result<()> + Send,
{
    fn run(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        self(learn)
    }
}

/// Receives the record [`MetricsCB`](crate::MetricsCB) emits at each epoch end.
pub type EpochLogger = Arc<dyn Fn(&EpochLog) + Send + Sync>;

/// Learning rates and losses recorded by [`Learner::lr_find`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LrFind {
    /// Learning rate in effect for each training batch.
    pub lrs: Vec<f64>,
    /// Loss of each training batch.
    pub losses: Vec<f64>,
}

/// Learner manages model training.
///
/// The learner owns its collaborators and the transient state of the
/// current fit. Everything a batch does (predict, loss, backward, step,
/// zero-grad) is delegated to callbacks or to step overrides, so the loop
/// itself only sequences scopes and dispatches hooks.
///
/// # Example
///
/// ```rust,ignore
/// let mut learn = Learner::new(model, dls)
///     .with_loss(CrossEntropyLoss::new())
///     .with_lr(0.2)
///     .with_cb(TrainCB::new())
///     .with_cb(MetricsCB::new().with_metric(Accuracy::new()));
/// learn.fit(3)?;
/// ```
pub struct Learner<B: AutodiffBackend, M: Model<B>> {
    /// The model being trained.
    pub model: M,
    /// Paired train/valid sources.
    pub dls: DataLoaders<B>,
    /// Loss used by the plain `get_loss` step.
    pub loss_func: Box<dyn LossFn<B>>,
    /// Builds `opt` at the start of each fit.
    pub opt_func: Box<dyn OptimizerFactory<B, M>>,
    /// Default learning rate.
    pub lr: f64,
    /// Number of leading batch tensors that are model inputs.
    pub n_inp: usize,
    /// Gradient decay for [`Learner::with_momentum`].
    pub mom: f64,
    /// Registered callbacks.
    pub cbs: Callbacks<B, M>,

    /// Current epoch index.
    pub epoch: usize,
    /// Epoch count of the current fit.
    pub n_epochs: usize,
    /// Epochs the current fit iterates; callbacks may narrow it in `before_fit`.
    pub epochs: Range<usize>,
    /// Index of the current batch within its epoch.
    pub iter: usize,
    /// Current batch.
    pub batch: Option<Batch<B>>,
    /// Predictions for the current batch.
    pub preds: Option<Tensor<B, 2>>,
    /// Loss for the current batch.
    pub loss: Option<Tensor<B, 1>>,
    /// Optimizer of the current fit.
    pub opt: Option<Box<dyn Optimizer<B, M>>>,
    /// Gradients accumulated since the last `zero_grad`, keyed by parameter id.
    pub grads: Option<GradientsParams>,
    /// Source being iterated; callbacks may replace it in `before_epoch`.
    pub dl: Option<Arc<dyn BatchSource<B>>>,
    /// Sink for epoch metric records; `None` logs through `tracing`.
    pub epoch_logger: Option<EpochLogger>,

    training: bool,
    overrides: [Option<Box<dyn StepOverride<B, M>>>; 5],
}

impl<B: AutodiffBackend, M: Model<B>> Learner<B, M> {
    /// Create a learner with MSE loss, plain SGD and learning rate 0.1.
    pub fn new(model: M, dls: DataLoaders<B>) -> Self {
        let config = LearnerConfig::default();
        Self {
            model,
            dls,
            loss_func: Box::new(MSELoss::new()),
            opt_func: Box::new(SgdConfig::new()),
            lr: config.lr,
            n_inp: config.n_inp,
            mom: config.mom,
            cbs: Callbacks::new(),
            epoch: 0,
            n_epochs: 0,
            epochs: 0..0,
            iter: 0,
            batch: None,
            preds: None,
            loss: None,
            opt: None,
            grads: None,
            dl: None,
            epoch_logger: None,
            training: false,
            overrides: Default::default(),
        }
    }

    /// Apply `lr`, `n_inp` and `mom` from a configuration.
    #[must_use]
    pub fn with_config(mut self, config: &LearnerConfig) -> Self {
        self.lr = config.lr;
        self.n_inp = config.n_inp;
        self.mom = config.mom;
        self
    }

    /// Set the loss function.
    #[must_use]
    pub fn with_loss(mut self, loss: impl LossFn<B> + 'static) -> Self {
        self.loss_func = Box::new(loss);
        self
    }

    /// Set the optimizer factory.
    #[must_use]
    pub fn with_opt(mut self, opt_func: impl OptimizerFactory<B, M> + 'static) -> Self {
        self.opt_func = Box::new(opt_func);
        self
    }

    /// Set the default learning rate.
    #[must_use]
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    /// Register a callback.
    #[must_use]
    pub fn with_cb<C: Callback<B, M> + 'static>(mut self, callback: C) -> Self {
        self.cbs.add(cb_ref(callback));
        self
    }

    /// Register several shared callbacks.
    #[must_use]
    pub fn with_cbs(mut self, callbacks: impl IntoIterator<Item = CallbackRef<B, M>>) -> Self {
        for cb in callbacks {
            self.cbs.add(cb);
        }
        self
    }

    /// Install the plain steps as direct overrides.
    ///
    /// Equivalent to registering [`TrainCB`](crate::TrainCB) but without
    /// dispatch, so step callbacks are ignored.
    #[must_use]
    pub fn with_train_steps(mut self, n_inp: usize) -> Self {
        for step in TrainStep::ALL {
            self.set_step(step, PlainStep::new(step, n_inp));
        }
        self
    }

    /// Plain steps whose `zero_grad` scales gradients by `mom` instead of
    /// clearing them. `None` uses [`Learner::mom`].
    #[must_use]
    pub fn with_momentum(mut self, mom: impl Into<Option<f64>>) -> Self {
        if let Some(mom) = mom.into() {
            self.mom = mom;
        }
        let (n_inp, mom) = (self.n_inp, self.mom);
        let mut learn = self.with_train_steps(n_inp);
        learn.set_step(TrainStep::ZeroGrad, MomentumGrad::new(mom));
        learn
    }

    /// Register a callback, returning its id.
    pub fn add_cb(&mut self, callback: CallbackRef<B, M>) -> CallbackId {
        self.cbs.add(callback)
    }

    /// Unregister a callback.
    pub fn remove_cb(&mut self, id: CallbackId) -> Option<CallbackRef<B, M>> {
        self.cbs.remove(id)
    }

    /// Install a direct implementation of `step`.
    pub fn set_step(&mut self, step: TrainStep, op: impl StepOverride<B, M> + 'static) -> &mut Self {
        self.overrides[step.index()] = Some(Box::new(op));
        self
    }

    /// Remove the override for `step`, falling back to hook dispatch.
    pub fn clear_step(&mut self, step: TrainStep) -> &mut Self {
        self.overrides[step.index()] = None;
        self
    }

    /// Whether `step` has a direct override.
    #[must_use]
    pub fn has_step_override(&self, step: TrainStep) -> bool {
        self.overrides[step.index()].is_some()
    }

    /// Whether the current pass is a training pass.
    #[must_use]
    pub fn training(&self) -> bool {
        self.training
    }

    /// The current batch.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::MissingState`] outside of a batch.
    pub fn batch(&self) -> Result<&Batch<B>> {
        self.batch.as_ref().ok_or(TrainError::MissingState("batch"))
    }

    /// Predictions for the current batch.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::MissingState`] if no `predict` step ran.
    pub fn preds(&self) -> Result<&Tensor<B, 2>> {
        self.preds.as_ref().ok_or(TrainError::MissingState("preds"))
    }

    /// Loss for the current batch.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::MissingState`] if no `get_loss` step ran.
    pub fn loss(&self) -> Result<&Tensor<B, 1>> {
        self.loss.as_ref().ok_or(TrainError::MissingState("loss"))
    }

    /// The optimizer of the current fit.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::MissingState`] before the first fit.
    pub fn opt(&self) -> Result<&dyn Optimizer<B, M>> {
        self.opt.as_deref().ok_or(TrainError::MissingState("opt"))
    }

    /// Mutable access to the optimizer of the current fit.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::MissingState`] before the first fit.
    pub fn opt_mut(&mut self) -> Result<&mut (dyn Optimizer<B, M> + 'static)> {
        self.opt.as_deref_mut().ok_or(TrainError::MissingState("opt"))
    }

    /// Dispatch `hook` to every registered callback that declares it.
    ///
    /// Handles are collected before the first call, so callbacks may add or
    /// remove callbacks while being dispatched.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first callback error. A hook that reaches a
    /// callback which is itself still running, such as a `before_batch`
    /// that calls [`Learner::predict`] on a callback also providing
    /// `predict`, fails with [`TrainError::CallbackError`].
    pub fn callback(&mut self, hook: Hook) -> Result<()> {
        for cb in self.cbs.handlers(hook) {
            let Some(mut guard) = cb.try_lock() else {
                return Err(TrainError::CallbackError(format!(
                    "re-entrant dispatch of `{}` to a callback that is already running",
                    hook
                )));
            };
            tracing::trace!(%hook, callback = guard.name(), "dispatch");
            invoke(&mut *guard, hook, self)?;
        }
        Ok(())
    }

    /// Send an epoch record to the installed logger.
    pub fn log_epoch(&self, log: &EpochLog) {
        match &self.epoch_logger {
            Some(logger) => logger(log),
            None => tracing::info!(epoch = log.epoch, train = log.train, "{}", log),
        }
    }

    fn run_step(&mut self, step: TrainStep) -> Result<()> {
        match self.overrides[step.index()].take() {
            Some(mut op) => {
                let result = op.run(self);
                self.overrides[step.index()].get_or_insert(op);
                result
            }
            None => self.callback(step.hook()),
        }
    }

    /// Run the `predict` step.
    pub fn predict(&mut self) -> Result<()> {
        self.run_step(TrainStep::Predict)
    }

    /// Run the `get_loss` step.
    pub fn get_loss(&mut self) -> Result<()> {
        self.run_step(TrainStep::GetLoss)
    }

    /// Run the `backward` step.
    pub fn backward(&mut self) -> Result<()> {
        self.run_step(TrainStep::Backward)
    }

    /// Run the `step` step.
    pub fn step(&mut self) -> Result<()> {
        self.run_step(TrainStep::Step)
    }

    /// Run the `zero_grad` step.
    pub fn zero_grad(&mut self) -> Result<()> {
        self.run_step(TrainStep::ZeroGrad)
    }

    /// Train and validate for `n_epochs` at the default learning rate.
    ///
    /// # Errors
    ///
    /// Returns the first non-cancellation error raised by a step or
    /// callback, after every enclosing cleanup hook has run.
    pub fn fit(&mut self, n_epochs: usize) -> Result<()> {
        self.fit_with(FitOptions::new(n_epochs))
    }

    /// Fit with per-call options.
    ///
    /// Callbacks in `opts.cbs` are registered for this call and removed
    /// before it returns, whether it succeeds or fails.
    ///
    /// # Errors
    ///
    /// See [`Learner::fit`].
    pub fn fit_with(&mut self, opts: FitOptions<B, M>) -> Result<()> {
        let FitOptions {
            n_epochs,
            train,
            valid,
            lr,
            cbs,
        } = opts;

        let added: Vec<CallbackId> = cbs.into_iter().map(|cb| self.cbs.add(cb)).collect();
        let result = self.run_fit(n_epochs, train, valid, lr);
        for id in added {
            self.cbs.remove(id);
        }
        result
    }

    fn run_fit(&mut self, n_epochs: usize, train: bool, valid: bool, lr: Option<f64>) -> Result<()> {
        self.n_epochs = n_epochs;
        self.epochs = 0..n_epochs;
        self.epoch = 0;
        self.iter = 0;
        self.batch = None;
        self.preds = None;
        self.loss = None;
        self.grads = None;
        self.dl = None;
        self.epoch_logger = None;

        let lr = lr.unwrap_or(self.lr);
        self.opt = Some(self.opt_func.build(&self.model, lr)?);
        tracing::debug!(n_epochs, lr, train, valid, callbacks = self.cbs.len(), "fit started");

        let outcome = run_scoped(self, Scope::Fit, |learn| {
            for epoch in learn.epochs.clone() {
                learn.epoch = epoch;
                if train {
                    learn.one_epoch(true)?;
                }
                if valid {
                    let tracked = learn.model.clone();
                    learn.model = tracked.clone().no_grad();
                    let result = learn.one_epoch(false);
                    learn.model = tracked;
                    result?;
                }
            }
            Ok(())
        });

        match outcome {
            Ok(outcome) => {
                tracing::debug!(?outcome, epoch = self.epoch, "fit finished");
                Ok(())
            }
            Err(TrainError::Cancel(scope)) => {
                tracing::warn!(%scope, "cancellation escaped its scope; absorbed by fit");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Run one pass over the train (`training = true`) or valid source.
    ///
    /// # Errors
    ///
    /// Propagates step, callback and data errors; the epoch cancellation is
    /// absorbed.
    pub fn one_epoch(&mut self, training: bool) -> Result<()> {
        self.training = training;
        self.model.set_training(training);
        let dl = if training {
            Arc::clone(self.dls.train())
        } else {
            Arc::clone(self.dls.valid())
        };
        self.dl = Some(dl);

        run_scoped(self, Scope::Epoch, |learn| {
            let dl = learn.dl.clone().ok_or(TrainError::MissingState("dl"))?;
            for (iter, batch) in dl.batches().enumerate() {
                learn.iter = iter;
                learn.batch = Some(batch?);
                learn.preds = None;
                learn.loss = None;
                run_scoped(learn, Scope::Batch, Self::batch_body)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn batch_body(&mut self) -> Result<()> {
        self.predict()?;
        self.callback(Hook::AfterPredict)?;
        self.get_loss()?;
        self.callback(Hook::AfterLoss)?;
        if self.training() {
            self.backward()?;
            self.callback(Hook::AfterBackward)?;
            self.step()?;
            self.callback(Hook::AfterStep)?;
            self.zero_grad()?;
        }
        Ok(())
    }

    /// Learning-rate range test.
    ///
    /// Trains from `start_lr`, multiplying the rate by `gamma` after every
    /// batch, and stops once a loss exceeds `max_mult` times the lowest loss
    /// seen or after `max_epochs`. Validation passes are skipped. The model
    /// is left in whatever state the last step produced.
    ///
    /// # Errors
    ///
    /// See [`Learner::fit`].
    pub fn lr_find(&mut self, gamma: f64, max_mult: f64, start_lr: f64, max_epochs: usize) -> Result<LrFind> {
        let finder = Arc::new(Mutex::new(LRFinderCB::new(gamma, max_mult)));
        let handle: CallbackRef<B, M> = finder.clone();
        self.fit_with(FitOptions::new(max_epochs).lr(start_lr).cb_ref(handle))?;

        let finder = finder.lock();
        Ok(LrFind {
            lrs: finder.lrs().to_vec(),
            losses: finder.losses().to_vec(),
        })
    }
}

impl<B: AutodiffBackend, M: Model<B>> Dispatch for Learner<B, M> {
    fn dispatch(&mut self, hook: Hook) -> Result<()> {
        self.callback(hook)
    }
}
