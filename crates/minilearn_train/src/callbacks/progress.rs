//! Progress bars and the epoch table.

use std::sync::Arc;

use burn::tensor::backend::AutodiffBackend;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use minilearn_core::{scalar, Model};
use parking_lot::Mutex;

use crate::callback::Callback;
use crate::callbacks::metrics::{EpochLog, MetricsCB};
use crate::error::Result;
use crate::hooks::{Hook, HookSet};
use crate::learner::Learner;
use crate::plot::LinePlot;

const EPOCH_TEMPLATE: &str = "[{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} epochs";
const BATCH_TEMPLATE: &str = "  {bar:30.green/white} {pos}/{len} {msg}";

/// Rows written by the table logger.
#[derive(Debug, Default)]
struct Table {
    lines: Vec<String>,
}

impl Table {
    fn push(&mut self, log: &EpochLog) -> Vec<String> {
        let mut out = Vec::new();
        if self.lines.is_empty() {
            out.push(log.header().join("\t"));
        }
        out.push(log.cells().join("\t"));
        self.lines.extend(out.iter().cloned());
        out
    }
}

/// Progress bars over epochs and batches, with the metrics as a table.
///
/// Runs right after [`MetricsCB`] and replaces its epoch logger with one
/// that prints a header row once, then one row per pass. The batch bar shows
/// the current loss. With [`ProgressCB::with_plot`] the training losses are
/// collected and rendered as a line plot when the fit ends.
pub struct ProgressCB {
    plot: bool,
    hidden: bool,
    multi: Option<MultiProgress>,
    epoch_bar: Option<ProgressBar>,
    batch_bar: Option<ProgressBar>,
    epochs_done: usize,
    table: Arc<Mutex<Table>>,
    losses: Vec<f64>,
    rendered: Option<String>,
}

impl std::fmt::Debug for ProgressCB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressCB")
            .field("plot", &self.plot)
            .field("hidden", &self.hidden)
            .field("losses", &self.losses.len())
            .finish()
    }
}

impl Default for ProgressCB {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCB {
    /// Bars drawn to stderr, no plot.
    pub fn new() -> Self {
        Self {
            plot: false,
            hidden: false,
            multi: None,
            epoch_bar: None,
            batch_bar: None,
            epochs_done: 0,
            table: Arc::default(),
            losses: Vec::new(),
            rendered: None,
        }
    }

    /// Collect training losses and plot them at the end of the fit.
    #[must_use]
    pub fn with_plot(mut self, plot: bool) -> Self {
        self.plot = plot;
        self
    }

    /// Draw nothing; rows and losses are still recorded.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Table lines written so far, header first.
    #[must_use]
    pub fn table(&self) -> Vec<String> {
        self.table.lock().lines.clone()
    }

    /// Epochs the epoch bar has counted in the current or last fit.
    #[must_use]
    pub fn epochs_done(&self) -> usize {
        self.epochs_done
    }

    /// Training losses collected for the plot.
    #[must_use]
    pub fn losses(&self) -> &[f64] {
        &self.losses
    }

    /// The plot rendered at the end of the last fit.
    #[must_use]
    pub fn rendered_plot(&self) -> Option<&str> {
        self.rendered.as_deref()
    }

    fn bar(&self, len: usize, template: &str) -> ProgressBar {
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template(template) {
            bar.set_style(style.progress_chars("=>-"));
        }
        match &self.multi {
            Some(multi) => multi.add(bar),
            None => bar,
        }
    }
}

impl<B: AutodiffBackend, M: Model<B>> Callback<B, M> for ProgressCB {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[
            Hook::BeforeFit,
            Hook::BeforeEpoch,
            Hook::AfterBatch,
            Hook::CleanupEpoch,
            Hook::CleanupFit,
        ])
    }

    fn order(&self) -> i32 {
        MetricsCB::ORDER + 1
    }

    fn before_fit(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        let multi = if self.hidden {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        self.multi = Some(multi.clone());
        self.epoch_bar = Some(self.bar(learn.epochs.len(), EPOCH_TEMPLATE));
        self.epochs_done = 0;
        self.losses.clear();
        self.rendered = None;
        self.table.lock().lines.clear();

        let table = Arc::clone(&self.table);
        learn.epoch_logger = Some(Arc::new(move |log: &EpochLog| {
            for line in table.lock().push(log) {
                if multi.println(&line).is_err() {
                    tracing::info!("{}", line);
                }
            }
        }));
        Ok(())
    }

    fn before_epoch(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        let len = learn.dl.as_ref().map_or(0, |dl| dl.len());
        self.batch_bar = Some(self.bar(len, BATCH_TEMPLATE));
        Ok(())
    }

    fn after_batch(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        let loss = match &learn.loss {
            Some(loss) => Some(scalar(loss)?),
            None => None,
        };
        if let Some(bar) = &self.batch_bar {
            bar.inc(1);
            if let Some(loss) = loss {
                bar.set_message(format!("{:.3}", loss));
            }
        }
        if let (true, true, Some(loss)) = (self.plot, learn.training(), loss) {
            self.losses.push(loss);
        }
        Ok(())
    }

    fn cleanup_epoch(&mut self, learn: &mut Learner<B, M>) -> Result<()> {
        if let Some(bar) = self.batch_bar.take() {
            bar.finish_and_clear();
        }
        // train and valid passes of one epoch land on the same position
        let done = learn.epoch.saturating_sub(learn.epochs.start) + 1;
        if done > self.epochs_done {
            self.epochs_done = done;
            if let Some(bar) = &self.epoch_bar {
                bar.set_position(done as u64);
            }
        }
        Ok(())
    }

    fn cleanup_fit(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        if let Some(bar) = self.batch_bar.take() {
            bar.finish_and_clear();
        }
        if let Some(bar) = self.epoch_bar.take() {
            bar.finish();
        }
        if self.plot && !self.losses.is_empty() {
            let text = LinePlot::new(60, 12)
                .title("train loss")
                .indexed("loss", &self.losses)
                .render();
            if let Some(multi) = &self.multi {
                if multi.println(&text).is_err() {
                    tracing::info!("\n{}", text);
                }
            }
            self.rendered = Some(text);
        }
        self.multi = None;
        Ok(())
    }
}
