//! Training metrics.
//!
//! Metrics are stateful reducers over host-side copies of predictions and
//! targets: `reset` at the start of an epoch, `update` once per batch,
//! `compute` at the end.

use minilearn_core::{CoreError, HostTensor};

use crate::error::Result;

/// Trait for training metrics.
pub trait Metric: Send {
    /// Get the metric name.
    fn name(&self) -> &str;

    /// Clear all accumulated state.
    fn reset(&mut self);

    /// Fold one batch of predictions and targets into the state.
    fn update(&mut self, preds: &HostTensor, targets: &HostTensor) -> Result<()>;

    /// Current value of the metric.
    fn compute(&self) -> f64;

    /// Whether higher is better.
    fn higher_is_better(&self) -> bool {
        true
    }
}

fn check_rows(preds: &HostTensor, targets: &HostTensor) -> Result<()> {
    if preds.rows() != targets.rows() {
        return Err(CoreError::ShapeMismatch(format!(
            "metric got {} predictions for {} targets",
            preds.rows(),
            targets.rows()
        ))
        .into());
    }
    Ok(())
}

/// Weighted running mean.
///
/// As a [`Metric`] it averages every prediction value. The learner's loss is
/// tracked through [`Mean::update_value`], weighted by batch size.
#[derive(Debug, Clone, Default)]
pub struct Mean {
    sum: f64,
    weight: f64,
}

impl Mean {
    /// Create an empty mean.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` with `weight`.
    pub fn update_value(&mut self, value: f64, weight: f64) {
        self.sum += value * weight;
        self.weight += weight;
    }

    /// Total weight seen since the last reset.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }
}

impl Metric for Mean {
    fn name(&self) -> &str {
        "mean"
    }

    fn reset(&mut self) {
        self.sum = 0.0;
        self.weight = 0.0;
    }

    fn update(&mut self, preds: &HostTensor, _targets: &HostTensor) -> Result<()> {
        for &v in preds.data() {
            self.update_value(f64::from(v), 1.0);
        }
        Ok(())
    }

    fn compute(&self) -> f64 {
        if self.weight > 0.0 {
            self.sum / self.weight
        } else {
            0.0
        }
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}

/// Classification accuracy.
///
/// Multi-column predictions are scored by argmax; a single column is read as
/// a probability thresholded at 0.5. Targets are either one class-index
/// column or one-hot rows.
#[derive(Debug, Clone, Default)]
pub struct Accuracy {
    correct: usize,
    total: usize,
}

impl Accuracy {
    /// Create a new accuracy metric.
    pub fn new() -> Self {
        Self::default()
    }
}

fn classes(t: &HostTensor, threshold: bool) -> Vec<usize> {
    if t.cols() > 1 {
        t.argmax_rows()
    } else if threshold {
        t.data().iter().map(|&v| usize::from(v >= 0.5)).collect()
    } else {
        t.data().iter().map(|&v| v.round().max(0.0) as usize).collect()
    }
}

impl Metric for Accuracy {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn reset(&mut self) {
        self.correct = 0;
        self.total = 0;
    }

    fn update(&mut self, preds: &HostTensor, targets: &HostTensor) -> Result<()> {
        check_rows(preds, targets)?;
        let predicted = classes(preds, true);
        let actual = classes(targets, false);
        self.correct += predicted.iter().zip(&actual).filter(|(p, a)| p == a).count();
        self.total += predicted.len();
        Ok(())
    }

    fn compute(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Shared accumulator for the elementwise error metrics.
#[derive(Debug, Clone, Default)]
struct ErrorSum {
    sum: f64,
    count: usize,
}

impl ErrorSum {
    fn update(&mut self, preds: &HostTensor, targets: &HostTensor, f: fn(f64) -> f64) -> Result<()> {
        check_rows(preds, targets)?;
        if preds.cols() != targets.cols() {
            return Err(CoreError::ShapeMismatch(format!(
                "metric got {} prediction columns for {} target columns",
                preds.cols(),
                targets.cols()
            ))
            .into());
        }
        for (&p, &t) in preds.data().iter().zip(targets.data()) {
            self.sum += f(f64::from(p) - f64::from(t));
        }
        self.count += preds.data().len();
        Ok(())
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Mean Squared Error metric.
#[derive(Debug, Clone, Default)]
pub struct MSE(ErrorSum);

impl MSE {
    /// Create a new MSE metric.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for MSE {
    fn name(&self) -> &str {
        "mse"
    }

    fn reset(&mut self) {
        self.0 = ErrorSum::default();
    }

    fn update(&mut self, preds: &HostTensor, targets: &HostTensor) -> Result<()> {
        self.0.update(preds, targets, |d| d * d)
    }

    fn compute(&self) -> f64 {
        self.0.mean()
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}

/// Mean Absolute Error metric.
#[derive(Debug, Clone, Default)]
pub struct MAE(ErrorSum);

impl MAE {
    /// Create a new MAE metric.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for MAE {
    fn name(&self) -> &str {
        "mae"
    }

    fn reset(&mut self) {
        self.0 = ErrorSum::default();
    }

    fn update(&mut self, preds: &HostTensor, targets: &HostTensor) -> Result<()> {
        self.0.update(preds, targets, f64::abs)
    }

    fn compute(&self) -> f64 {
        self.0.mean()
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(data: &[f32], rows: usize, cols: usize) -> HostTensor {
        HostTensor::new(data.to_vec(), rows, cols).unwrap()
    }

    #[test]
    fn test_weighted_mean() {
        let mut m = Mean::new();
        m.update_value(1.0, 3.0);
        m.update_value(2.0, 1.0);
        assert!((m.compute() - 1.25).abs() < 1e-12);
        assert_eq!(m.weight(), 4.0);

        m.reset();
        assert_eq!(m.compute(), 0.0);
        assert_eq!(m.weight(), 0.0);
    }

    #[test]
    fn test_accuracy_argmax_and_indices() {
        let mut acc = Accuracy::new();
        let preds = host(&[0.9, 0.1, 0.2, 0.8, 0.6, 0.4], 3, 2);
        let targets = host(&[0.0, 1.0, 1.0], 3, 1);
        acc.update(&preds, &targets).unwrap();
        assert!((acc.compute() - 2.0 / 3.0).abs() < 1e-12);

        let preds = host(&[0.3, 0.7], 1, 2);
        let one_hot = host(&[0.0, 1.0], 1, 2);
        acc.update(&preds, &one_hot).unwrap();
        assert!((acc.compute() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_accuracy_binary_threshold() {
        let mut acc = Accuracy::new();
        let preds = host(&[0.7, 0.2], 2, 1);
        let targets = host(&[1.0, 1.0], 2, 1);
        acc.update(&preds, &targets).unwrap();
        assert!((acc.compute() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_error_metrics() {
        let preds = host(&[1.0, 2.0], 2, 1);
        let targets = host(&[0.0, 4.0], 2, 1);

        let mut mse = MSE::new();
        mse.update(&preds, &targets).unwrap();
        assert!((mse.compute() - 2.5).abs() < 1e-12);

        let mut mae = MAE::new();
        mae.update(&preds, &targets).unwrap();
        assert!((mae.compute() - 1.5).abs() < 1e-12);

        mae.reset();
        assert_eq!(mae.compute(), 0.0);
        assert!(!mae.higher_is_better());
    }

    #[test]
    fn test_row_mismatch_is_error() {
        let mut mse = MSE::new();
        let preds = host(&[1.0, 2.0], 2, 1);
        let targets = host(&[0.0], 1, 1);
        assert!(mse.update(&preds, &targets).is_err());
    }
}
