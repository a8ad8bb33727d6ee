//! Gradient bookkeeping over burn's [`GradientsParams`].
//!
//! Gradients live outside the model, keyed by [`ParamId`], on the inner
//! backend. The learner holds one accumulated set per fit; these helpers
//! compute, sum, copy and rescale it for a given module.

use std::marker::PhantomData;

use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::{GradientsAccumulator, GradientsParams};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// Backpropagate `loss` and collect the gradient of every parameter of `module`.
pub fn backward<B: AutodiffBackend, M: AutodiffModule<B>>(
    module: &M,
    loss: &Tensor<B, 1>,
) -> GradientsParams {
    GradientsParams::from_grads(loss.backward(), module)
}

/// Add `grads` onto `acc`, or start a new accumulation when there is none.
pub fn accumulate<B: AutodiffBackend, M: AutodiffModule<B>>(
    module: &M,
    acc: Option<GradientsParams>,
    grads: GradientsParams,
) -> GradientsParams {
    let mut accumulator = GradientsAccumulator::<M>::new();
    if let Some(acc) = acc {
        accumulator.accumulate::<B>(module, acc);
    }
    accumulator.accumulate::<B>(module, grads);
    accumulator.grads()
}

/// Multiply every gradient of `module` held in `grads` by `factor`.
pub fn scale<B: AutodiffBackend, M: AutodiffModule<B>>(
    module: &M,
    grads: &mut GradientsParams,
    factor: f64,
) {
    let mut visitor = ScaleGrads::<B> {
        grads,
        factor,
        backend: PhantomData,
    };
    module.visit(&mut visitor);
}

/// A copy of the gradients of `module`, leaving `grads` intact.
///
/// Burn optimizers consume the gradients they apply, so a step that must
/// keep them around for accumulation steps on a copy.
pub fn copy<B: AutodiffBackend, M: AutodiffModule<B>>(
    module: &M,
    grads: &GradientsParams,
) -> GradientsParams {
    let mut out = GradientsParams::new();
    let mut visitor = CopyGrads::<B> {
        from: grads,
        to: &mut out,
        backend: PhantomData,
    };
    module.visit(&mut visitor);
    out
}

struct ScaleGrads<'a, B> {
    grads: &'a mut GradientsParams,
    factor: f64,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for ScaleGrads<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads
                .register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

struct CopyGrads<'a, B> {
    from: &'a GradientsParams,
    to: &'a mut GradientsParams,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for CopyGrads<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.from.get::<B::InnerBackend, D>(id) {
            self.to.register::<B::InnerBackend, D>(id, grad);
        }
    }
}
