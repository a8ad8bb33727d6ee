//! Integration tests for the training loop.
//!
//! These tests drive the full learner through the public API with small
//! synthetic datasets.

use std::sync::Arc;

use burn::optim::GradientsParams;
use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use ndarray::Array2;
use parking_lot::Mutex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use minilearn::all::*;

type TrainBackend = Autodiff<NdArray>;
type Net = Linear<TrainBackend>;
type Learn = Learner<TrainBackend, Net>;
type Log = Arc<Mutex<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// `n` rows of `y = 3 x0 - 2 x1 + 1` with a little noise.
fn regression_data(n: usize, seed: u64) -> TensorDataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut xs = Vec::with_capacity(n * 2);
    let mut ys = Vec::with_capacity(n);
    for _ in 0..n {
        let x0: f32 = rng.gen_range(-1.0..1.0);
        let x1: f32 = rng.gen_range(-1.0..1.0);
        xs.extend([x0, x1]);
        ys.push(3.0 * x0 - 2.0 * x1 + 1.0 + rng.gen_range(-0.01..0.01));
    }
    let x = Array2::from_shape_vec((n, 2), xs).unwrap();
    let y = Array2::from_shape_vec((n, 1), ys).unwrap();
    TensorDataset::from_arrays(x, y).unwrap()
}

/// Two well separated classes, label 1 when `x0 > 0`.
fn classification_data(n: usize, seed: u64) -> TensorDataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut xs = Vec::with_capacity(n * 2);
    let mut ys = Vec::with_capacity(n);
    for i in 0..n {
        let class = i % 2;
        let sign = if class == 1 { 1.0 } else { -1.0 };
        xs.extend([sign * rng.gen_range(0.5f32..1.5), rng.gen_range(-1.0f32..1.0)]);
        ys.push(class as f32);
    }
    let x = Array2::from_shape_vec((n, 2), xs).unwrap();
    let y = Array2::from_shape_vec((n, 1), ys).unwrap();
    TensorDataset::from_arrays(x, y).unwrap()
}

fn regression_learner(n_train: usize, n_valid: usize, batch_size: usize) -> Learn {
    let device = Default::default();
    let dls = DataLoadersBuilder::new(regression_data(n_train, 1), regression_data(n_valid, 2))
        .batch_size(batch_size)
        .seed(Seed::new(42))
        .build::<TrainBackend>(&device)
        .unwrap();
    let model = LinearConfig::new(2, 1).with_seed(Seed::new(3)).init::<TrainBackend>(&device);
    Learner::new(model, dls)
}

/// Fixed batches built directly from rows.
fn batch(x: &[f32], y: &[f32], rows: usize) -> Batch<TrainBackend> {
    let device = Default::default();
    let cols_x = x.len() / rows;
    let cols_y = y.len() / rows;
    Batch::pair(
        Tensor::from_data(TensorData::new(x.to_vec(), [rows, cols_x]), &device),
        Tensor::from_data(TensorData::new(y.to_vec(), [rows, cols_y]), &device),
    )
    .unwrap()
}

/// Appends `tag:hook` for every hook it declares; fails on request.
struct Tagged {
    tag: &'static str,
    order: i32,
    hooks: HookSet,
    log: Log,
    fail: Option<(Hook, fn() -> TrainError)>,
}

impl Tagged {
    fn new(tag: &'static str, order: i32, hooks: HookSet, log: &Log) -> Self {
        Self {
            tag,
            order,
            hooks,
            log: Arc::clone(log),
            fail: None,
        }
    }

    fn failing_at(mut self, hook: Hook, err: fn() -> TrainError) -> Self {
        self.fail = Some((hook, err));
        self
    }

    fn hit(&mut self, hook: Hook, learn: &Learn) -> Result<(), TrainError> {
        self.log.lock().push(format!("{}:{}", self.tag, hook));
        match self.fail {
            Some((h, err)) if h == hook && learn.training() => {
                self.fail = None;
                Err(err())
            }
            _ => Ok(()),
        }
    }
}

impl Callback<TrainBackend, Net> for Tagged {
    fn hooks(&self) -> HookSet {
        self.hooks
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn before_fit(&mut self, learn: &mut Learn) -> Result<(), TrainError> {
        self.hit(Hook::BeforeFit, learn)
    }

    fn cleanup_fit(&mut self, learn: &mut Learn) -> Result<(), TrainError> {
        self.hit(Hook::CleanupFit, learn)
    }

    fn after_fit(&mut self, learn: &mut Learn) -> Result<(), TrainError> {
        self.hit(Hook::AfterFit, learn)
    }

    fn cleanup_epoch(&mut self, learn: &mut Learn) -> Result<(), TrainError> {
        self.hit(Hook::CleanupEpoch, learn)
    }

    fn cleanup_batch(&mut self, learn: &mut Learn) -> Result<(), TrainError> {
        self.hit(Hook::CleanupBatch, learn)
    }

    fn after_batch(&mut self, learn: &mut Learn) -> Result<(), TrainError> {
        self.hit(Hook::AfterBatch, learn)
    }

    fn after_step(&mut self, learn: &mut Learn) -> Result<(), TrainError> {
        self.hit(Hook::AfterStep, learn)
    }
}

fn count(log: &Log, entry: &str) -> usize {
    log.lock().iter().filter(|e| e.as_str() == entry).count()
}

#[test]
fn test_dispatch_follows_order_then_registration() {
    init_tracing();
    let log = Log::default();
    let hooks = HookSet::of(&[Hook::BeforeFit]);
    let mut learn = regression_learner(8, 4, 4)
        .with_cb(Tagged::new("b", 2, hooks, &log))
        .with_cb(Tagged::new("a", 0, hooks, &log))
        .with_cb(Tagged::new("c", 1, hooks, &log))
        .with_cb(Tagged::new("d", 0, hooks, &log));

    learn.fit(1).unwrap();

    assert_eq!(
        *log.lock(),
        vec!["a:before_fit", "d:before_fit", "c:before_fit", "b:before_fit"]
    );
}

#[test]
fn test_fit_cancel_from_a_step_unwinds_every_scope_once() {
    init_tracing();
    let log = Log::default();
    let hooks = HookSet::of(&[
        Hook::AfterFit,
        Hook::CleanupFit,
        Hook::CleanupEpoch,
        Hook::CleanupBatch,
        Hook::AfterBatch,
    ]);
    let mut learn = regression_learner(12, 4, 4)
        .with_train_steps(1)
        .with_cb(Tagged::new("t", 0, hooks, &log));

    // cancel from inside the optimizer step of the second batch of epoch 1
    learn.set_step(TrainStep::Step, |learn: &mut Learn| {
        if learn.epoch == 1 && learn.iter == 1 {
            return Err(TrainError::cancel_fit());
        }
        steps::step(learn)
    });

    assert!(learn.fit(3).is_ok());
    assert_eq!(learn.epoch, 1);
    assert_eq!(count(&log, "t:cleanup_fit"), 1);
    // epoch 0 train + valid, epoch 1 train
    assert_eq!(count(&log, "t:cleanup_epoch"), 3);
    // 3 + 1 batches in epoch 0, 2 in epoch 1
    assert_eq!(count(&log, "t:cleanup_batch"), 6);
    assert_eq!(count(&log, "t:after_batch"), 5);
    assert_eq!(count(&log, "t:after_fit"), 0);
}

#[test]
fn test_epoch_cancel_continues_with_next_epoch() {
    let log = Log::default();
    let hooks = HookSet::of(&[Hook::AfterStep, Hook::CleanupBatch, Hook::CleanupEpoch, Hook::AfterFit]);
    let mut learn = regression_learner(12, 4, 4).with_cb(TrainCB::new()).with_cb(
        Tagged::new("t", 0, hooks, &log).failing_at(Hook::AfterStep, TrainError::cancel_epoch),
    );

    learn.fit(2).unwrap();

    let entries = log.lock().clone();
    let first_cleanup = entries.iter().position(|e| e == "t:cleanup_batch").unwrap();
    assert_eq!(entries[first_cleanup + 1], "t:cleanup_epoch");
    // epoch 0 stopped after one step, epoch 1 ran all three
    assert_eq!(count(&log, "t:after_step"), 4);
    assert_eq!(count(&log, "t:after_fit"), 1);
}

#[test]
fn test_per_fit_callbacks_removed_after_error() {
    let log = Log::default();
    let mut learn = regression_learner(8, 4, 4).with_cb(TrainCB::new());
    let before = learn.cbs.len();

    let tagged = Tagged::new("x", 0, HookSet::of(&[Hook::AfterBatch, Hook::CleanupFit]), &log)
        .failing_at(Hook::AfterBatch, || TrainError::CallbackError("boom".into()));
    let result = learn.fit_with(FitOptions::new(2).cb(tagged));

    assert!(matches!(result, Err(TrainError::CallbackError(_))));
    assert_eq!(count(&log, "x:after_batch"), 1);
    assert_eq!(count(&log, "x:cleanup_fit"), 1);
    assert_eq!(learn.cbs.len(), before);

    // a later fit no longer sees it
    learn.fit(1).unwrap();
    assert_eq!(count(&log, "x:after_batch"), 1);
}

#[test]
fn test_metrics_weighted_by_batch_size() {
    let train = vec![
        batch(&[1.0, 2.0, 3.0], &[1.0, 2.0, 5.0], 3),
        batch(&[0.0], &[2.0], 1),
    ];
    let valid = vec![batch(&[0.0], &[0.0], 1)];
    let device = Default::default();
    let model = LinearConfig::new(1, 1).init::<TrainBackend>(&device);
    let metrics = Arc::new(Mutex::new(MetricsCB::new().with_metric(MSE::new())));
    let handle: CallbackRef<TrainBackend, Net> = metrics.clone();

    let mut learn = Learner::new(model, DataLoaders::new(train, valid)).with_cbs([handle]);
    // predictions are the inputs; the loss is 1 on the first batch, 5 on the second
    learn.set_step(TrainStep::Predict, |learn: &mut Learn| {
        learn.preds = Some(learn.batch()?.tensors()[0].clone());
        Ok(())
    });
    learn.set_step(TrainStep::GetLoss, |learn: &mut Learn| {
        let value = if learn.iter == 0 { 1.0f32 } else { 5.0 };
        let device = learn.preds()?.device();
        learn.loss = Some(Tensor::from_floats([value], &device));
        Ok(())
    });
    learn.fit_with(FitOptions::new(1).valid(false)).unwrap();

    let metrics = metrics.lock();
    let log = &metrics.history()[0];
    // (3 * 1 + 1 * 5) / 4
    assert!((log.get("loss").unwrap() - 2.0).abs() < 1e-9);
    // squared errors 0, 0, 4, 4 over four rows
    assert!((log.get("mse").unwrap() - 2.0).abs() < 1e-6);
    assert_eq!(metrics.loss().weight(), 4.0);
}

#[test]
fn test_metrics_reset_each_epoch() {
    let mut metrics = MetricsCB::new().with_metric(MAE::new());
    let mut learn = regression_learner(8, 4, 4).with_train_steps(1);
    learn.fit_with(FitOptions::new(1).valid(false)).unwrap();

    Callback::<TrainBackend, Net>::after_batch(&mut metrics, &mut learn).unwrap();
    assert!(metrics.loss().weight() > 0.0);

    Callback::<TrainBackend, Net>::before_epoch(&mut metrics, &mut learn).unwrap();
    assert_eq!(metrics.loss().weight(), 0.0);
    assert_eq!(metrics.loss().compute(), 0.0);
    assert_eq!(metrics.metric("mae").unwrap().compute(), 0.0);
}

#[test]
fn test_momentum_scales_gradient_twice() {
    let device = Default::default();
    let mut learn = regression_learner(4, 4, 4).with_momentum(0.85);
    let mut acc = GradientsParams::new();
    acc.register::<NdArray, 2>(learn.model.weight_id(), Tensor::from_floats([[1.0], [-2.0]], &device));
    learn.grads = Some(acc);

    let grad = |learn: &Learn| {
        learn
            .grads
            .as_ref()
            .unwrap()
            .get::<NdArray, 2>(learn.model.weight_id())
            .unwrap()
            .into_data()
            .to_vec::<f32>()
            .unwrap()
    };

    learn.zero_grad().unwrap();
    let once = grad(&learn);
    assert!((once[0] - 0.85).abs() < 1e-6);
    assert!((once[1] + 1.7).abs() < 1e-6);

    learn.zero_grad().unwrap();
    let twice = grad(&learn);
    assert!((twice[0] - 0.85 * 0.85).abs() < 1e-6);
    assert!((twice[1] + 2.0 * 0.85 * 0.85).abs() < 1e-6);
}

#[test]
fn test_lr_finder_stops_on_rising_loss() {
    let mut learn = regression_learner(40, 4, 4).with_train_steps(1);
    // loss rises 1, 2, 3, 4, ... regardless of the model
    let calls = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&calls);
    learn.set_step(TrainStep::GetLoss, move |learn: &mut Learn| {
        let mut n = counter.lock();
        *n += 1;
        let device = learn.preds()?.device();
        learn.loss = Some(Tensor::from_floats([*n as f32], &device));
        Ok(())
    });
    learn.clear_step(TrainStep::Backward);

    let found = learn.lr_find(1.3, 3.0, 1e-5, 10).unwrap();

    // 4 > 3 * 1 stops the fit on the fourth batch
    assert_eq!(*calls.lock(), 4);
    assert_eq!(found.lrs.len(), 4);
    assert_eq!(found.losses, vec![1.0, 2.0, 3.0, 4.0]);
    assert!((found.lrs[0] - 1e-5).abs() < 1e-15);
    assert!((found.lrs[3] - 1e-5 * 1.3f64.powi(3)).abs() < 1e-15);
    assert!(learn.cbs.is_empty());
}

#[test]
fn test_end_to_end_epoch_records() {
    init_tracing();
    let records: Arc<Mutex<Vec<EpochLog>>> = Arc::default();
    let sink = Arc::clone(&records);

    // 12 training rows in batches of 4, 4 validation rows
    let mut learn = regression_learner(12, 4, 4)
        .with_cb(TrainCB::new())
        .with_cb(MetricsCB::new().with_metric(MAE::new()).with_logger(move |log| {
            sink.lock().push(log.clone());
        }));
    assert_eq!(learn.dls.train().len(), 3);
    assert_eq!(learn.dls.valid().len(), 1);

    learn.fit(2).unwrap();

    let records = records.lock();
    let seen: Vec<(usize, bool)> = records.iter().map(|r| (r.epoch, r.train)).collect();
    assert_eq!(seen, vec![(0, true), (0, false), (1, true), (1, false)]);
    for r in records.iter() {
        assert_eq!(r.header(), vec!["mae", "loss", "epoch", "train"]);
        assert!(r.get("loss").unwrap().is_finite());
    }
}

#[test]
fn test_classification_with_progress_and_schedule() {
    init_tracing();
    let device = Default::default();
    let dls = DataLoaders::<TrainBackend>::from_datasets(
        classification_data(64, 5),
        classification_data(32, 6),
        16,
        &device,
    )
    .unwrap();
    let model = LinearConfig::new(2, 2).with_seed(Seed::new(11)).init::<TrainBackend>(&device);

    let metrics = Arc::new(Mutex::new(MetricsCB::new().with_metric(Accuracy::new())));
    let progress = Arc::new(Mutex::new(ProgressCB::new().hidden().with_plot(true)));
    let metrics_ref: CallbackRef<TrainBackend, Net> = metrics.clone();
    let progress_ref: CallbackRef<TrainBackend, Net> = progress.clone();

    let mut learn = Learner::new(model, dls)
        .with_loss(CrossEntropyLoss::new())
        .with_lr(0.5)
        .with_cb(DeviceCB::<TrainBackend>::new(device))
        .with_cb(TrainCB::new())
        .with_cbs([progress_ref, metrics_ref])
        .with_cb(EpochSchedCB::new(|opt: &dyn Optimizer<TrainBackend, Net>| {
            Box::new(StepLR::new(opt.lr(), 5, 0.5)) as Box<dyn Scheduler>
        }));

    learn.fit(10).unwrap();

    let metrics = metrics.lock();
    let last = metrics.history().last().unwrap();
    assert!(!last.train);
    assert!(last.get("accuracy").unwrap() >= 0.9);

    let progress = progress.lock();
    // header plus one row per pass
    assert_eq!(progress.table().len(), 21);
    assert_eq!(progress.losses().len(), 40);
    assert!(progress.rendered_plot().is_some());
}

#[test]
fn test_single_batch_smoke_run() {
    let mut learn = regression_learner(12, 4, 4)
        .with_cb(TrainCB::new())
        .with_cb(SingleBatchCB::new());
    learn.fit(3).unwrap();
    assert_eq!((learn.epoch, learn.iter), (0, 0));
    assert!(learn.loss.is_some());
}

#[test]
fn test_config_drives_learner() {
    let config = LearnerConfig::from_json(r#"{ "lr": 0.05, "n_inp": 1, "mom": 0.6 }"#).unwrap();
    let mut learn = regression_learner(8, 4, 4)
        .with_config(&config)
        .with_momentum(None);
    assert_eq!(learn.mom, 0.6);
    learn.fit(1).unwrap();
    assert_eq!(learn.opt.as_ref().unwrap().lr(), 0.05);
}

/// Two dense layers with a ReLU between them.
#[derive(Module, Debug)]
struct Mlp<B: Backend> {
    hidden: nn::Linear<B>,
    act: nn::Relu,
    out: nn::Linear<B>,
}

impl<B: Backend> Mlp<B> {
    fn new(n_in: usize, n_hidden: usize, device: &B::Device) -> Self {
        Self {
            hidden: nn::LinearConfig::new(n_in, n_hidden).init(device),
            act: nn::Relu::new(),
            out: nn::LinearConfig::new(n_hidden, 1).init(device),
        }
    }
}

impl<B: burn::tensor::backend::AutodiffBackend> Model<B> for Mlp<B> {
    fn forward(&self, inputs: &[Tensor<B, 2>]) -> Result<Tensor<B, 2>, CoreError> {
        let x = inputs
            .first()
            .ok_or(CoreError::MissingInput { expected: 1, got: 0 })?;
        Ok(self.out.forward(self.act.forward(self.hidden.forward(x.clone()))))
    }
}

#[test]
fn test_mlp_gradients_cover_every_parameter() {
    let device = Default::default();
    let model = Mlp::<TrainBackend>::new(2, 8, &device);
    let x = Tensor::<TrainBackend, 2>::ones([4, 2], &device);
    let loss = model.forward(&[x]).unwrap().sum();

    let collected = grads::backward(&model, &loss);
    assert_eq!(collected.len(), 4);
}

#[test]
fn test_mlp_trains_through_learner() {
    init_tracing();
    let device = Default::default();
    let dls = DataLoadersBuilder::new(regression_data(64, 7), regression_data(16, 8))
        .batch_size(8)
        .seed(Seed::new(1))
        .build::<TrainBackend>(&device)
        .unwrap();
    let metrics = Arc::new(Mutex::new(MetricsCB::new()));
    let handle: CallbackRef<TrainBackend, Mlp<TrainBackend>> = metrics.clone();

    let mut learn = Learner::new(Mlp::new(2, 16, &device), dls)
        .with_lr(0.05)
        .with_cb(TrainCB::new())
        .with_cbs([handle]);
    learn.fit_with(FitOptions::new(6).valid(false)).unwrap();

    let metrics = metrics.lock();
    let losses: Vec<f64> = metrics
        .history()
        .iter()
        .map(|log| log.get("loss").unwrap())
        .collect();
    assert_eq!(losses.len(), 6);
    assert!(losses[5] < losses[0]);
    assert!(learn.grads.is_none());
}
