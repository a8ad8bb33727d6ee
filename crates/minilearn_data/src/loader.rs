//! Dataloader implementations for batched iteration.

use std::marker::PhantomData;
use std::sync::Arc;

use burn::prelude::*;
use minilearn_core::{Batch, Seed};
use parking_lot::Mutex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::dataset::TensorDataset;
use crate::error::{DataError, Result};
use crate::source::BatchSource;

/// A dataloader that produces `(x, y)` batches from a [`TensorDataset`].
///
/// Supports shuffling with an optional seed. A shuffled loader draws a new
/// permutation on every pass, so consecutive epochs see different orders.
///
/// # Example
///
/// ```rust,ignore
/// use minilearn_data::{DataLoader, TensorDataset};
/// use minilearn_core::Seed;
///
/// let loader = DataLoader::<NdArray>::builder(dataset)
///     .batch_size(32)
///     .shuffle(true)
///     .seed(Seed::new(42))
///     .build(&device)?;
///
/// for batch in loader.batches() {
///     let batch = batch?;
/// }
/// ```
pub struct DataLoader<B: Backend> {
    dataset: TensorDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    rng: Mutex<ChaCha8Rng>,
    device: B::Device,
}

impl<B: Backend> std::fmt::Debug for DataLoader<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("samples", &self.dataset.len())
            .field("batch_size", &self.batch_size)
            .field("shuffle", &self.shuffle)
            .field("drop_last", &self.drop_last)
            .finish()
    }
}

impl<B: Backend> DataLoader<B> {
    /// Create a new dataloader builder.
    #[must_use]
    pub fn builder(dataset: TensorDataset) -> DataLoaderBuilder<B> {
        DataLoaderBuilder::new(dataset)
    }

    /// Get the dataset.
    #[must_use]
    pub fn dataset(&self) -> &TensorDataset {
        &self.dataset
    }

    /// Get the batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Get the number of batches per pass.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Device the batches are created on.
    #[must_use]
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    fn indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            indices.shuffle(&mut *self.rng.lock());
        }
        indices
    }

    fn make_batch(&self, indices: &[usize]) -> Result<Batch<B>> {
        let (x, y) = self.dataset.select(indices)?;
        let rows = indices.len();
        let x_cols = x.ncols();
        let y_cols = y.ncols();

        let x_flat: Vec<f32> = x.iter().copied().collect();
        let y_flat: Vec<f32> = y.iter().copied().collect();
        let x = Tensor::<B, 2>::from_data(TensorData::new(x_flat, [rows, x_cols]), &self.device);
        let y = Tensor::<B, 2>::from_data(TensorData::new(y_flat, [rows, y_cols]), &self.device);

        Ok(Batch::pair(x, y)?)
    }
}

impl<B: Backend> BatchSource<B> for DataLoader<B> {
    fn batches(&self) -> Box<dyn Iterator<Item = Result<Batch<B>>> + '_> {
        let indices = self.indices();
        let batch_size = self.batch_size;
        Box::new((0..self.n_batches()).map(move |i| {
            let start = i * batch_size;
            let end = (start + batch_size).min(indices.len());
            self.make_batch(&indices[start..end])
        }))
    }

    fn len(&self) -> usize {
        self.n_batches()
    }
}

/// Builder for [`DataLoader`].
#[derive(Debug, Clone)]
pub struct DataLoaderBuilder<B: Backend> {
    dataset: TensorDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Option<Seed>,
    _backend: PhantomData<B>,
}

impl<B: Backend> DataLoaderBuilder<B> {
    /// Create a new builder.
    #[must_use]
    pub fn new(dataset: TensorDataset) -> Self {
        Self {
            dataset,
            batch_size: 32,
            shuffle: false,
            drop_last: false,
            seed: None,
            _backend: PhantomData,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Enable or disable dropping the last incomplete batch.
    #[must_use]
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Set the random seed for shuffling.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the dataloader, creating batches on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch size is zero or the dataset is empty.
    pub fn build(self, device: &B::Device) -> Result<DataLoader<B>> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidBatchSize(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        let rng = match self.seed {
            Some(seed) => seed.to_rng(),
            None => ChaCha8Rng::from_entropy(),
        };

        let loader = DataLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            drop_last: self.drop_last,
            rng: Mutex::new(rng),
            device: device.clone(),
        };
        tracing::debug!(
            samples = loader.dataset.len(),
            batches = loader.n_batches(),
            shuffle = loader.shuffle,
            "built dataloader"
        );
        Ok(loader)
    }
}

/// Paired batch sources for training and validation.
///
/// Either side may be any [`BatchSource`]: a [`DataLoader`], a `Vec` of
/// pre-built batches, or a custom implementation.
///
/// # Example
///
/// ```rust,ignore
/// use minilearn_data::DataLoaders;
///
/// let dls = DataLoaders::from_datasets(train_ds, valid_ds, 64, &device)?;
/// assert_eq!(dls.train().len(), 16);
/// ```
pub struct DataLoaders<B: Backend> {
    train: Arc<dyn BatchSource<B>>,
    valid: Arc<dyn BatchSource<B>>,
}

impl<B: Backend> Clone for DataLoaders<B> {
    fn clone(&self) -> Self {
        Self {
            train: Arc::clone(&self.train),
            valid: Arc::clone(&self.valid),
        }
    }
}

impl<B: Backend> std::fmt::Debug for DataLoaders<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoaders")
            .field("train_batches", &self.train.len())
            .field("valid_batches", &self.valid.len())
            .finish()
    }
}

impl<B: Backend> DataLoaders<B> {
    /// Pair two sources.
    pub fn new(
        train: impl BatchSource<B> + 'static,
        valid: impl BatchSource<B> + 'static,
    ) -> Self {
        Self {
            train: Arc::new(train),
            valid: Arc::new(valid),
        }
    }

    /// Pair two already-shared sources.
    #[must_use]
    pub fn from_sources(train: Arc<dyn BatchSource<B>>, valid: Arc<dyn BatchSource<B>>) -> Self {
        Self { train, valid }
    }

    /// Build shuffled training and ordered validation loaders from datasets.
    ///
    /// # Errors
    ///
    /// Returns an error if either dataset is empty or `batch_size` is zero.
    pub fn from_datasets(
        train: TensorDataset,
        valid: TensorDataset,
        batch_size: usize,
        device: &B::Device,
    ) -> Result<Self> {
        DataLoadersBuilder::new(train, valid)
            .batch_size(batch_size)
            .build(device)
    }

    /// The training source.
    #[must_use]
    pub fn train(&self) -> &Arc<dyn BatchSource<B>> {
        &self.train
    }

    /// The validation source.
    #[must_use]
    pub fn valid(&self) -> &Arc<dyn BatchSource<B>> {
        &self.valid
    }
}

/// Builder for [`DataLoaders`] over two in-memory datasets.
#[derive(Debug, Clone)]
pub struct DataLoadersBuilder {
    train: TensorDataset,
    valid: TensorDataset,
    batch_size: usize,
    shuffle_train: bool,
    seed: Option<Seed>,
}

impl DataLoadersBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(train: TensorDataset, valid: TensorDataset) -> Self {
        Self {
            train,
            valid,
            batch_size: 32,
            shuffle_train: true,
            seed: None,
        }
    }

    /// Set the batch size for both loaders.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling for the training loader.
    #[must_use]
    pub fn shuffle_train(mut self, shuffle: bool) -> Self {
        self.shuffle_train = shuffle;
        self
    }

    /// Set the random seed.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the dataloaders.
    ///
    /// # Errors
    ///
    /// Returns an error if either loader fails to build.
    pub fn build<B: Backend>(self, device: &B::Device) -> Result<DataLoaders<B>> {
        let mut train_builder = DataLoader::<B>::builder(self.train)
            .batch_size(self.batch_size)
            .shuffle(self.shuffle_train);

        if let Some(seed) = self.seed {
            train_builder = train_builder.seed(seed.derive("train"));
        }

        let valid_builder = DataLoader::<B>::builder(self.valid)
            .batch_size(self.batch_size)
            .shuffle(false);

        Ok(DataLoaders::new(
            train_builder.build(device)?,
            valid_builder.build(device)?,
        ))
    }
}
