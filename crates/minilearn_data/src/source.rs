//! The batch source contract.

use burn::prelude::*;
use minilearn_core::Batch;

use crate::error::Result;

/// An iterable, re-iterable stream of batches.
///
/// Each call to [`BatchSource::batches`] starts a fresh pass; a learner calls
/// it once per epoch. Sources are shared between the learner and its
/// callbacks, so they are `Send + Sync` and iterate through `&self`.
pub trait BatchSource<B: Backend>: Send + Sync {
    /// Start a new pass over the data.
    fn batches(&self) -> Box<dyn Iterator<Item = Result<Batch<B>>> + '_>;

    /// Number of batches one pass yields.
    fn len(&self) -> usize;

    /// Whether a pass yields no batches.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pre-built batches, replayed in order on every pass.
impl<B: Backend> BatchSource<B> for Vec<Batch<B>> {
    fn batches(&self) -> Box<dyn Iterator<Item = Result<Batch<B>>> + '_> {
        Box::new(self.iter().cloned().map(Ok))
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}
