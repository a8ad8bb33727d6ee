//! Per-batch recording of optimizer hyperparameters and learner quantities.

use burn::tensor::backend::AutodiffBackend;
use minilearn_core::Model;

use crate::callback::Callback;
use crate::error::Result;
use crate::hooks::{Hook, HookSet};
use crate::learner::Learner;
use crate::optimizer::Optimizer;
use crate::plot::LinePlot;

/// What an extractor reads after a training batch.
pub struct RecorderView<'a, B: AutodiffBackend, M: Model<B>> {
    /// The optimizer of the fit; its hyperparameters are the usual subject.
    pub opt: &'a dyn Optimizer<B, M>,
    /// The learner, for anything else.
    pub learn: &'a Learner<B, M>,
}

type Extractor<B, M> = Box<dyn Fn(&RecorderView<'_, B, M>) -> Result<f64> + Send>;

/// Records named values after every training batch.
///
/// ```rust,ignore
/// let rec = RecorderCB::new()
///     .record("lr", |v| Ok(v.opt.lr()))
///     .record("loss", |v| Ok(scalar(v.learn.loss()?)?));
/// ```
pub struct RecorderCB<B: AutodiffBackend, M: Model<B>> {
    extractors: Vec<(String, Extractor<B, M>)>,
    recs: Vec<Vec<f64>>,
}

impl<B: AutodiffBackend, M: Model<B>> std::fmt::Debug for RecorderCB<B, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.extractors.iter().zip(&self.recs).map(|((n, _), r)| (n, r.len())))
            .finish()
    }
}

impl<B: AutodiffBackend, M: Model<B>> Default for RecorderCB<B, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: AutodiffBackend, M: Model<B>> RecorderCB<B, M> {
    /// Record nothing yet.
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
            recs: Vec::new(),
        }
    }

    /// Record `extract(view)` under `name`.
    #[must_use]
    pub fn record(
        mut self,
        name: impl Into<String>,
        extract: impl Fn(&RecorderView<'_, B, M>) -> Result<f64> + Send + 'static,
    ) -> Self {
        self.extractors.push((name.into(), Box::new(extract)));
        self.recs.push(Vec::new());
        self
    }

    /// Values recorded under `name` during the last fit.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.extractors
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| self.recs[i].as_slice())
    }

    /// All recorded series against batch index.
    #[must_use]
    pub fn plot(&self) -> String {
        self.extractors
            .iter()
            .zip(&self.recs)
            .fold(LinePlot::new(60, 12).title("recorder"), |plot, ((name, _), values)| {
                plot.indexed(name.clone(), values)
            })
            .render()
    }
}

impl<B: AutodiffBackend, M: Model<B>> Callback<B, M> for RecorderCB<B, M> {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::BeforeFit, Hook::AfterBatch])
    }

    fn before_fit(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        for rec in &mut self.recs {
            rec.clear();
        }
        Ok(())
    }

    fn after_batch(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        if !learn.training() {
            return Ok(());
        }
        let view = RecorderView {
            opt: learn.opt()?,
            learn,
        };
        for ((_, extract), rec) in self.extractors.iter().zip(&mut self.recs) {
            rec.push(extract(&view)?);
        }
        Ok(())
    }
}
