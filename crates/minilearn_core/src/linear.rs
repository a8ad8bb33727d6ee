//! A single dense layer, the smallest useful [`Model`].

use burn::module::{Param, ParamId};
use burn::nn;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model_trait::Model;
use crate::seed::Seed;

/// Configuration for [`Linear`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearConfig {
    /// Input features.
    pub n_in: usize,
    /// Output features.
    pub n_out: usize,
    /// Whether to learn a bias.
    pub bias: bool,
    /// Seed for the uniform initialization.
    pub seed: Seed,
}

impl LinearConfig {
    /// `n_in -> n_out` with bias and seed 0.
    pub fn new(n_in: usize, n_out: usize) -> Self {
        Self {
            n_in,
            n_out,
            bias: true,
            seed: Seed::default(),
        }
    }

    /// Enable or disable the bias.
    #[must_use]
    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Set the initialization seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Build the layer with weights drawn from `U(-1/sqrt(n_in), 1/sqrt(n_in))`
    /// and a zero bias.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Linear<B> {
        let bound = 1.0 / (self.n_in.max(1) as f32).sqrt();
        let mut rng = self.seed.derive("linear").to_rng();
        let weights: Vec<f32> = (0..self.n_in * self.n_out)
            .map(|_| rng.gen_range(-bound..=bound))
            .collect();

        let mut linear = nn::LinearConfig::new(self.n_in, self.n_out)
            .with_bias(self.bias)
            .init(device);
        linear.weight = Param::from_tensor(Tensor::from_data(
            TensorData::new(weights, [self.n_in, self.n_out]),
            device,
        ));
        if self.bias {
            linear.bias = Some(Param::from_tensor(Tensor::zeros([self.n_out], device)));
        }

        Linear { linear }
    }
}

/// `y = x W + b` over the first batch input.
#[derive(Module, Debug)]
pub struct Linear<B: Backend> {
    linear: nn::Linear<B>,
}

impl<B: Backend> Linear<B> {
    /// Input features.
    pub fn n_in(&self) -> usize {
        self.linear.weight.val().dims()[0]
    }

    /// The `[n_in, n_out]` weight matrix.
    pub fn weight(&self) -> Tensor<B, 2> {
        self.linear.weight.val()
    }

    /// Parameter id of the weight, the key of its gradient.
    pub fn weight_id(&self) -> ParamId {
        self.linear.weight.id
    }

    /// The `[n_out]` bias, if the layer has one.
    pub fn bias(&self) -> Option<Tensor<B, 1>> {
        self.linear.bias.as_ref().map(Param::val)
    }

    /// Parameter id of the bias.
    pub fn bias_id(&self) -> Option<ParamId> {
        self.linear.bias.as_ref().map(|b| b.id)
    }
}

impl<B: AutodiffBackend> Model<B> for Linear<B> {
    fn forward(&self, inputs: &[Tensor<B, 2>]) -> Result<Tensor<B, 2>> {
        let x = inputs.first().ok_or(CoreError::MissingInput {
            expected: 1,
            got: 0,
        })?;
        let [_, cols] = x.dims();
        if cols != self.n_in() {
            return Err(CoreError::ShapeMismatch(format!(
                "linear layer expects {} features, got {}",
                self.n_in(),
                cols
            )));
        }

        Ok(self.linear.forward(x.clone()))
    }
}
