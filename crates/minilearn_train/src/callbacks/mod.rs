//! Built-in callbacks.

mod device;
mod lr_finder;
mod metrics;
mod progress;
mod recorder;
mod sched;
mod single_batch;
mod train;
mod transform;

pub use device::DeviceCB;
pub use lr_finder::LRFinderCB;
pub use metrics::{EpochLog, MetricsCB};
pub use progress::ProgressCB;
pub use recorder::{RecorderCB, RecorderView};
pub use sched::{BatchSchedCB, EpochSchedCB};
pub use single_batch::SingleBatchCB;
pub use train::{MomentumGrad, PlainStep, TrainCB};
pub use transform::BatchTransformCB;

/// The plain step functions, for composing custom steps and overrides.
pub mod steps {
    pub use super::train::{backward, get_loss, predict, step, zero_grad};
}
