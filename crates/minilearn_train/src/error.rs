//! Error types for training.

use thiserror::Error;

use crate::cancel::Scope;

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Errors that can occur during training.
///
/// [`TrainError::Cancel`] is control flow rather than failure: it is raised
/// by callbacks to end a batch, an epoch or the whole fit early, and is
/// absorbed by the scope it names.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Early exit from the named scope.
    #[error("{0} cancelled")]
    Cancel(Scope),

    /// Transient learner state was read before any step produced it.
    #[error("Missing learner state: `{0}` has not been set")]
    MissingState(&'static str),

    /// Optimizer step failed.
    #[error("Optimizer step failed: {0}")]
    OptimizerError(String),

    /// Invalid learning rate.
    #[error("Invalid learning rate: {0}")]
    InvalidLearningRate(String),

    /// Callback error.
    #[error("Callback error: {0}")]
    CallbackError(String),

    /// Data error.
    #[error("Data error: {0}")]
    DataError(#[from] minilearn_data::DataError),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] minilearn_core::CoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl TrainError {
    /// Skip the rest of the current batch.
    #[must_use]
    pub const fn cancel_batch() -> Self {
        Self::Cancel(Scope::Batch)
    }

    /// Skip the rest of the current epoch.
    #[must_use]
    pub const fn cancel_epoch() -> Self {
        Self::Cancel(Scope::Epoch)
    }

    /// Stop the fit.
    #[must_use]
    pub const fn cancel_fit() -> Self {
        Self::Cancel(Scope::Fit)
    }

    /// Whether this is the cancellation for `scope`.
    #[must_use]
    pub fn is_cancel(&self, scope: Scope) -> bool {
        matches!(self, Self::Cancel(s) if *s == scope)
    }
}
