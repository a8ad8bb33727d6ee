//! # minilearn
//!
//! A callback-driven training loop on top of burn.
//!
//! A [`Learner`](train::Learner) owns a model, paired train/valid batch
//! sources, a loss function and an optimizer factory. Fitting runs nested
//! fit, epoch and batch scopes; at every lifecycle point it dispatches a hook
//! to the registered callbacks, which do all of the actual work:
//!
//! - **Core**: batches, the `Model` trait over burn modules, gradient accumulation
//! - **Data**: datasets, shuffling loaders, paired train/valid sources
//! - **Training**: learner, callbacks, cancellation, metrics, schedules
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use minilearn::prelude::*;
//!
//! let dls = DataLoadersBuilder::new(train_ds, valid_ds)
//!     .batch_size(64)
//!     .seed(Seed::new(42))
//!     .build::<Backend>(&device)?;
//! let model = LinearConfig::new(n_features, 1).init::<Backend>(&device);
//!
//! let mut learn = Learner::new(model, dls)
//!     .with_cb(TrainCB::new())
//!     .with_cb(MetricsCB::new().with_metric(MSE::new()))
//!     .with_cb(ProgressCB::new());
//!
//! let found = learn.lr_find(1.3, 3.0, 1e-5, 10)?;
//! learn.fit(5)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub use minilearn_core as core;
pub use minilearn_data as data;
pub use minilearn_train as train;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use minilearn::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use minilearn_core::{
        scalar, Batch, HostTensor, Linear, LinearConfig, Model, Seed,
    };

    // Data
    pub use minilearn_data::{BatchSource, DataLoader, DataLoaders, DataLoadersBuilder, TensorDataset};

    // Training
    pub use minilearn_train::{
        cb_ref, Accuracy, BatchSchedCB, BatchTransformCB, Callback, CallbackRef, CrossEntropyLoss,
        DeviceCB, EpochLog, EpochSchedCB, FitOptions, Hook, HookSet, LRFinderCB, Learner,
        LearnerConfig, Metric, MetricsCB, MomentumGrad, ProgressCB, RecorderCB, Scheduler,
        SgdConfig, SingleBatchCB, TrainCB, TrainError, TrainStep, MSE, MSELoss,
    };
}

/// Everything, including schedules, the raw step functions and the scope
/// machinery.
pub mod all {
    pub use super::prelude::*;

    pub use minilearn_core::{grads, CoreError};
    pub use minilearn_data::{DataError, DataLoaderBuilder};
    pub use minilearn_train::callbacks::steps;
    pub use minilearn_train::{
        run_scoped, CallbackId, Callbacks, ConstantLR, CosineAnnealingLR, Dispatch, EpochLogger,
        BurnOptimizer, ExponentialLR, LinePlot, LossFn, LrFind, Mean, OneCycleLR, OneCycleLRConfig,
        Optimizer, OptimizerFactory, PlainStep, RecorderView, SchedulerFactory, SchedulerStepper,
        Scope, ScopeOutcome, StepLR, StepOverride, MAE,
    };
}
