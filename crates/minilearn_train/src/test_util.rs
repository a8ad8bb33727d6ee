//! Shared fixtures for unit tests.

use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use minilearn_core::{Batch, Linear, LinearConfig, Seed};
use minilearn_data::DataLoaders;

use crate::learner::Learner;

pub type TestBackend = Autodiff<NdArray>;
pub type TestModel = Linear<TestBackend>;

const BATCH_SIZE: usize = 4;

/// Batches of `y = 2 x0 - x1 + 0.5` over inputs in `[-1, 1]`.
fn batches(n: usize, offset: usize) -> Vec<Batch<TestBackend>> {
    let device = Default::default();
    (0..n)
        .map(|b| {
            let mut xs = Vec::with_capacity(BATCH_SIZE * 2);
            let mut ys = Vec::with_capacity(BATCH_SIZE);
            for i in 0..BATCH_SIZE {
                let k = ((offset + b) * BATCH_SIZE + i) as f32;
                let x0 = (k * 0.37).sin();
                let x1 = (k * 0.91).cos();
                xs.extend([x0, x1]);
                ys.push(2.0 * x0 - x1 + 0.5);
            }
            let x = Tensor::from_data(TensorData::new(xs, [BATCH_SIZE, 2]), &device);
            let y = Tensor::from_data(TensorData::new(ys, [BATCH_SIZE, 1]), &device);
            Batch::pair(x, y).unwrap()
        })
        .collect()
}

/// A linear learner over `n_train` training and `n_valid` validation batches.
pub fn learner_with(n_train: usize, n_valid: usize) -> Learner<TestBackend, TestModel> {
    let device = Default::default();
    let model = LinearConfig::new(2, 1)
        .with_seed(Seed::new(7))
        .init::<TestBackend>(&device);
    let dls = DataLoaders::new(batches(n_train, 0), batches(n_valid, n_train));
    Learner::new(model, dls)
}

/// Two training batches and one validation batch.
pub fn learner() -> Learner<TestBackend, TestModel> {
    learner_with(2, 1)
}

/// Weight then bias values, flattened.
pub fn weights(learn: &Learner<TestBackend, TestModel>) -> Vec<f32> {
    let mut values = learn.model.weight().into_data().to_vec::<f32>().unwrap();
    if let Some(bias) = learn.model.bias() {
        values.extend(bias.into_data().to_vec::<f32>().unwrap());
    }
    values
}

/// Accumulated gradient of the weight matrix, if any.
pub fn weight_grad(learn: &Learner<TestBackend, TestModel>) -> Option<Vec<f32>> {
    let grad = learn
        .grads
        .as_ref()?
        .get::<NdArray, 2>(learn.model.weight_id())?;
    Some(grad.into_data().to_vec::<f32>().unwrap())
}
