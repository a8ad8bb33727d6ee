//! # minilearn_data
//!
//! Batch sources for the minilearn training loop.
//!
//! This crate provides:
//! - [`BatchSource`], the re-iterable stream of batches a learner consumes
//! - [`TensorDataset`] for in-memory `(x, y)` rows
//! - [`DataLoader`] for batched iteration with shuffling
//! - [`DataLoaders`] for paired train/valid sources
//!
//! ## Example
//!
//! ```rust,ignore
//! use minilearn_data::{DataLoadersBuilder, TensorDataset};
//! use minilearn_core::Seed;
//!
//! let train_ds = TensorDataset::from_arrays(x_train, y_train)?;
//! let valid_ds = TensorDataset::from_arrays(x_valid, y_valid)?;
//!
//! let dls = DataLoadersBuilder::new(train_ds, valid_ds)
//!     .batch_size(32)
//!     .seed(Seed::new(42))
//!     .build::<NdArray>(&device)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod dataset;
mod error;
mod loader;
mod source;

pub use dataset::TensorDataset;
pub use error::{DataError, Result};
pub use loader::{DataLoader, DataLoaderBuilder, DataLoaders, DataLoadersBuilder};
pub use source::BatchSource;
