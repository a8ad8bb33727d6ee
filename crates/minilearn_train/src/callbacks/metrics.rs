//! Per-epoch metric tracking.

use std::fmt;

use burn::tensor::backend::AutodiffBackend;
use minilearn_core::{scalar, HostTensor, Model};
use serde::{Deserialize, Serialize};

use crate::callback::Callback;
use crate::error::{Result, TrainError};
use crate::hooks::{Hook, HookSet};
use crate::learner::{EpochLogger, Learner};
use crate::metrics::{Mean, Metric};

/// Metric values for one train or valid pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochLog {
    /// Epoch index.
    pub epoch: usize,
    /// Whether this was the training pass.
    pub train: bool,
    /// Metric values in registration order, `loss` last.
    pub values: Vec<(String, f64)>,
}

impl EpochLog {
    /// Value of the metric called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// Column names: the metrics, then `epoch` and `train`.
    #[must_use]
    pub fn header(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|(n, _)| n.clone())
            .chain(["epoch".to_string(), "train".to_string()])
            .collect()
    }

    /// Cells matching [`EpochLog::header`], values to three decimals.
    #[must_use]
    pub fn cells(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|(_, v)| format!("{:.3}", v))
            .chain([
                self.epoch.to_string(),
                if self.train { "train" } else { "eval" }.to_string(),
            ])
            .collect()
    }
}

impl fmt::Display for EpochLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.values {
            write!(f, "{}={:.3} ", name, value)?;
        }
        write!(f, "epoch={} {}", self.epoch, if self.train { "train" } else { "eval" })
    }
}

/// Tracks metrics over each pass and reports them at the end of the epoch.
///
/// Every metric is reset in `before_epoch` and updated in `after_batch`
/// with host copies of `learn.preds` and the first target tensor. The loss
/// is tracked separately as a mean weighted by batch size, and always
/// reported last under the name `loss`.
///
/// In `before_fit` the callback installs its logger on the learner if one
/// was given; otherwise records go to `tracing`. Callbacks ordered after it
/// (such as [`ProgressCB`](crate::ProgressCB)) may replace the logger.
pub struct MetricsCB {
    metrics: Vec<(String, Box<dyn Metric>)>,
    loss: Mean,
    logger: Option<EpochLogger>,
    history: Vec<EpochLog>,
}

impl fmt::Debug for MetricsCB {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCB")
            .field("metrics", &self.names())
            .field("history", &self.history.len())
            .finish()
    }
}

impl Default for MetricsCB {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCB {
    /// Dispatch position; [`ProgressCB`](crate::ProgressCB) runs right after.
    pub const ORDER: i32 = 0;

    /// Track only the loss.
    pub fn new() -> Self {
        Self {
            metrics: Vec::new(),
            loss: Mean::new(),
            logger: None,
            history: Vec::new(),
        }
    }

    /// Track `metric` under its own name.
    #[must_use]
    pub fn with_metric(self, metric: impl Metric + 'static) -> Self {
        let name = metric.name().to_string();
        self.with_named(name, metric)
    }

    /// Track `metric` under `name`.
    #[must_use]
    pub fn with_named(mut self, name: impl Into<String>, metric: impl Metric + 'static) -> Self {
        self.metrics.push((name.into(), Box::new(metric)));
        self
    }

    /// Send each epoch record to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: impl Fn(&EpochLog) + Send + Sync + 'static) -> Self {
        self.logger = Some(std::sync::Arc::new(logger));
        self
    }

    /// Reported names, `loss` last.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.metrics
            .iter()
            .map(|(n, _)| n.as_str())
            .chain(std::iter::once("loss"))
            .collect()
    }

    /// Records of the current fit so far.
    #[must_use]
    pub fn history(&self) -> &[EpochLog] {
        &self.history
    }

    /// The running loss mean.
    #[must_use]
    pub fn loss(&self) -> &Mean {
        &self.loss
    }

    /// Look up a tracked metric.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&dyn Metric> {
        self.metrics
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m.as_ref())
    }
}

impl<B: AutodiffBackend, M: Model<B>> Callback<B, M> for MetricsCB {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::BeforeFit, Hook::BeforeEpoch, Hook::AfterBatch, Hook::AfterEpoch])
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn before_fit(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        self.history.clear();
        if let Some(logger) = &self.logger {
            learn.epoch_logger = Some(logger.clone());
        }
        Ok(())
    }

    fn before_epoch(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        for (_, m) in &mut self.metrics {
            m.reset();
        }
        Metric::reset(&mut self.loss);
        Ok(())
    }

    fn after_batch(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        if !self.metrics.is_empty() {
            let preds = HostTensor::from_tensor(learn.preds()?)?;
            let target = learn
                .batch()?
                .targets(learn.n_inp)
                .first()
                .ok_or(TrainError::MissingState("targets"))?;
            let targets = HostTensor::from_tensor(target)?;
            for (_, m) in &mut self.metrics {
                m.update(&preds, &targets)?;
            }
        }

        let loss = scalar(learn.loss()?)?;
        let weight = learn.batch()?.batch_size() as f64;
        self.loss.update_value(loss, weight);
        Ok(())
    }

    fn after_epoch(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        let values = self
            .metrics
            .iter()
            .map(|(n, m)| (n.clone(), m.compute()))
            .chain(std::iter::once(("loss".to_string(), self.loss.compute())))
            .collect();
        let log = EpochLog {
            epoch: learn.epoch,
            train: learn.training(),
            values,
        };
        learn.log_epoch(&log);
        self.history.push(log);
        Ok(())
    }
}
