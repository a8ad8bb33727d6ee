//! Device placement.

use burn::module::Module;
use burn::tensor::backend::AutodiffBackend;
use minilearn_core::Model;

use crate::callback::Callback;
use crate::error::Result;
use crate::hooks::{Hook, HookSet};
use crate::learner::Learner;

/// Moves the model to a device before the fit and each batch before it is
/// processed.
#[derive(Debug, Clone)]
pub struct DeviceCB<B: AutodiffBackend> {
    device: B::Device,
}

impl<B: AutodiffBackend> Default for DeviceCB<B> {
    fn default() -> Self {
        Self::new(B::Device::default())
    }
}

impl<B: AutodiffBackend> DeviceCB<B> {
    /// Target `device`.
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// The target device.
    #[must_use]
    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

impl<B: AutodiffBackend, M: Model<B>> Callback<B, M> for DeviceCB<B> {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::BeforeFit, Hook::BeforeBatch])
    }

    fn before_fit(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        tracing::debug!(device = ?self.device, "moving model");
        learn.model = learn.model.clone().fork(&self.device);
        Ok(())
    }

    fn before_batch(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        if let Some(batch) = learn.batch.take() {
            learn.batch = Some(batch.to_device(&self.device));
        }
        Ok(())
    }
}
