//! In-memory tabular dataset.

use ndarray::{Array2, ArrayView1, Axis};

use crate::error::{DataError, Result};

/// A dataset of `(x, y)` rows held in host memory.
///
/// Both arrays are `(N, F)`: one row per sample. Targets are kept rank-2 so
/// that regression (`F` outputs) and classification (a single class-index
/// column) share one layout.
///
/// # Example
///
/// ```rust,ignore
/// use minilearn_data::TensorDataset;
/// use ndarray::Array2;
///
/// let x = Array2::<f32>::zeros((100, 4));
/// let y = Array2::<f32>::zeros((100, 1));
/// let ds = TensorDataset::from_arrays(x, y)?;
/// ```
#[derive(Debug, Clone)]
pub struct TensorDataset {
    x: Array2<f32>,
    y: Array2<f32>,
}

impl TensorDataset {
    /// Create a dataset from inputs and targets.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` and `y` have a different number of rows.
    pub fn from_arrays(x: Array2<f32>, y: Array2<f32>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(DataError::InvalidShape(format!(
                "x has {} samples but y has {} samples",
                x.nrows(),
                y.nrows()
            )));
        }
        Ok(Self { x, y })
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    /// Whether the dataset has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }

    /// Input width.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Target width.
    #[must_use]
    pub fn n_targets(&self) -> usize {
        self.y.ncols()
    }

    /// Inputs.
    #[must_use]
    pub fn x(&self) -> &Array2<f32> {
        &self.x
    }

    /// Targets.
    #[must_use]
    pub fn y(&self) -> &Array2<f32> {
        &self.y
    }

    /// A single `(x, y)` sample.
    pub fn get(&self, index: usize) -> Result<(ArrayView1<'_, f32>, ArrayView1<'_, f32>)> {
        if index >= self.len() {
            return Err(DataError::IndexOutOfBounds {
                index,
                length: self.len(),
            });
        }
        Ok((self.x.row(index), self.y.row(index)))
    }

    /// Gather the rows at `indices` into new contiguous arrays.
    pub fn select(&self, indices: &[usize]) -> Result<(Array2<f32>, Array2<f32>)> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(DataError::IndexOutOfBounds {
                index: bad,
                length: self.len(),
            });
        }
        Ok((
            self.x.select(Axis(0), indices),
            self.y.select(Axis(0), indices),
        ))
    }
}
