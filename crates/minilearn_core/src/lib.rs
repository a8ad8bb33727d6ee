//! # minilearn_core
//!
//! Numeric collaborator types for the minilearn training loop.
//!
//! This crate provides:
//! - [`Batch`], an ordered tuple of tensors (inputs first, then targets)
//! - [`HostTensor`] for detached, host-side copies used by metrics
//! - the [`Model`] trait the learner trains, and a reference [`Linear`] layer
//! - [`grads`], accumulation and rescaling of per-parameter gradients
//! - [`Seed`] for deterministic shuffling and initialization
//!
//! Models are burn modules on an autodiff backend. Their gradients are kept
//! beside them as burn `GradientsParams`, keyed by parameter id.
//!
//! ## Example
//!
//! ```rust,ignore
//! use burn_autodiff::Autodiff;
//! use burn_ndarray::NdArray;
//! use minilearn_core::{LinearConfig, Model};
//!
//! let device = Default::default();
//! let model = LinearConfig::new(4, 1).init::<Autodiff<NdArray>>(&device);
//! let y = model.forward(&[x])?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub mod grads;
mod linear;
mod model_trait;
mod seed;
mod tensor;

pub use error::{CoreError, Result};
pub use linear::{Linear, LinearConfig};
pub use model_trait::Model;
pub use seed::Seed;
pub use tensor::{scalar, Batch, HostTensor};
