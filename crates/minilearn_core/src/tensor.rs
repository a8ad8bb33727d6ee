//! Batch and host-side tensor types.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// One batch pulled from a data source.
///
/// An ordered tuple of rank-2 tensors sharing the leading (sample) dimension.
/// The first `n_inp` tensors feed the model, the rest are targets.
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    tensors: Vec<Tensor<B, 2>>,
}

impl<B: Backend> Batch<B> {
    /// Create a batch, checking that every tensor has the same number of rows.
    pub fn new(tensors: Vec<Tensor<B, 2>>) -> Result<Self> {
        if let Some(first) = tensors.first() {
            let rows = first.dims()[0];
            for (i, t) in tensors.iter().enumerate().skip(1) {
                let got = t.dims()[0];
                if got != rows {
                    return Err(CoreError::ShapeMismatch(format!(
                        "batch element {} has {} rows, element 0 has {}",
                        i, got, rows
                    )));
                }
            }
        }
        Ok(Self { tensors })
    }

    /// The common `(x, y)` case.
    pub fn pair(x: Tensor<B, 2>, y: Tensor<B, 2>) -> Result<Self> {
        Self::new(vec![x, y])
    }

    /// Number of tensors in the tuple.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether the tuple is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Number of samples (rows of the first tensor).
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.tensors.first().map_or(0, |t| t.dims()[0])
    }

    /// All tensors, in order.
    #[must_use]
    pub fn tensors(&self) -> &[Tensor<B, 2>] {
        &self.tensors
    }

    /// The first `n_inp` tensors.
    #[must_use]
    pub fn inputs(&self, n_inp: usize) -> &[Tensor<B, 2>] {
        &self.tensors[..n_inp.min(self.tensors.len())]
    }

    /// Everything after the first `n_inp` tensors.
    #[must_use]
    pub fn targets(&self, n_inp: usize) -> &[Tensor<B, 2>] {
        &self.tensors[n_inp.min(self.tensors.len())..]
    }

    /// Device of the first tensor.
    pub fn device(&self) -> Option<B::Device> {
        self.tensors.first().map(Tensor::device)
    }

    /// Move every tensor to `device`.
    #[must_use]
    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            tensors: self
                .tensors
                .into_iter()
                .map(|t| t.to_device(device))
                .collect(),
        }
    }
}

/// A detached, host-resident copy of a rank-2 tensor.
///
/// Metrics are computed on these so that accumulators never hold on to
/// device memory or autodiff graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostTensor {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl HostTensor {
    /// Create from row-major data.
    pub fn new(data: Vec<f32>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(CoreError::ShapeMismatch(format!(
                "{} values cannot fill a {}x{} tensor",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { data, rows, cols })
    }

    /// Read a tensor back to the host.
    pub fn from_tensor<B: Backend>(tensor: &Tensor<B, 2>) -> Result<Self> {
        let [rows, cols] = tensor.dims();
        let data = tensor
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CoreError::Conversion(format!("{:?}", e)))?;
        Self::new(data, rows, cols)
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major values.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// A single row.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Column index of the largest value in each row.
    #[must_use]
    pub fn argmax_rows(&self) -> Vec<usize> {
        (0..self.rows)
            .map(|i| {
                self.row(i)
                    .iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (j, &v)| {
                        if v > best.1 {
                            (j, v)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }
}

/// Read a single-element tensor (typically a loss) as `f64`.
pub fn scalar<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Result<f64> {
    let values = tensor
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoreError::Conversion(format!("{:?}", e)))?;
    match values.as_slice() {
        [v] => Ok(f64::from(*v)),
        _ => Err(CoreError::ShapeMismatch(format!(
            "expected a scalar, got {} values",
            values.len()
        ))),
    }
}
