//! # minilearn_train
//!
//! A callback-driven training loop.
//!
//! This crate provides:
//! - [`Learner`], which sequences fit, epoch and batch scopes and dispatches
//!   lifecycle hooks
//! - the [`Callback`] protocol, ordered by [`Callback::order`]
//! - scoped cancellation through [`TrainError::Cancel`]
//! - built-in callbacks: training steps, momentum, metrics, progress,
//!   device placement, schedules, recording and the learning-rate finder
//! - losses, burn SGD behind an optimizer factory, schedules and metrics
//!
//! The learner itself never computes anything: predict, loss, backward,
//! step and zero-grad are hooks like any other, supplied by [`TrainCB`] or
//! installed directly with [`Learner::with_train_steps`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use minilearn_train::{Learner, MetricsCB, ProgressCB, TrainCB, Accuracy};
//!
//! let mut learn = Learner::new(model, dls)
//!     .with_loss(CrossEntropyLoss::new())
//!     .with_cb(TrainCB::new())
//!     .with_cb(MetricsCB::new().with_metric(Accuracy::new()))
//!     .with_cb(ProgressCB::new().with_plot(true));
//!
//! learn.fit(3)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callback;
pub mod callbacks;
pub mod cancel;
pub mod context;
pub mod error;
pub mod hooks;
pub mod learner;
pub mod losses;
pub mod metrics;
pub mod optimizer;
pub mod plot;
pub mod scheduler;

#[cfg(test)]
mod test_util;

pub use callback::{cb_ref, Callback, CallbackId, CallbackRef, Callbacks};
pub use callbacks::{
    BatchSchedCB, BatchTransformCB, DeviceCB, EpochLog, EpochSchedCB, LRFinderCB, MetricsCB,
    MomentumGrad, PlainStep, ProgressCB, RecorderCB, RecorderView, SingleBatchCB, TrainCB,
};
pub use cancel::{Scope, ScopeOutcome};
pub use context::{run_scoped, Dispatch};
pub use error::{Result, TrainError};
pub use hooks::{Hook, HookSet};
pub use learner::{
    EpochLogger, FitOptions, Learner, LearnerConfig, LrFind, StepOverride, TrainStep,
};
pub use losses::{CrossEntropyLoss, LossFn, MSELoss};
pub use metrics::{Accuracy, Mean, Metric, MAE, MSE};
pub use optimizer::{BurnOptimizer, Optimizer, OptimizerFactory, SgdConfig};
pub use plot::LinePlot;
pub use scheduler::{
    ConstantLR, CosineAnnealingLR, ExponentialLR, OneCycleLR, OneCycleLRConfig, Scheduler,
    SchedulerFactory, SchedulerStepper, StepLR,
};
