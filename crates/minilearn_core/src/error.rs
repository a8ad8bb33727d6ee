//! Error types for minilearn_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the numeric collaborators (models and batches).
#[derive(Error, Debug)]
pub enum CoreError {
    /// Shape mismatch between tensors.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A model was called without the inputs it needs.
    #[error("Missing input: expected {expected} input tensor(s), got {got}")]
    MissingInput {
        /// Number of inputs the model consumes.
        expected: usize,
        /// Number of inputs supplied.
        got: usize,
    },

    /// Tensor data could not be read back to the host.
    #[error("Tensor conversion failed: {0}")]
    Conversion(String),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}
