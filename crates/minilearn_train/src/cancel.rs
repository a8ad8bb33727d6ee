//! Lifecycle scopes and early-exit outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hooks::Hook;

/// One of the three nested lifecycle phases.
///
/// A fit contains epochs, an epoch contains batches. Each phase has its own
/// `before`, `after` and `cleanup` hooks and its own cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// The whole `fit` call.
    Fit,
    /// One pass over a data source.
    Epoch,
    /// One batch.
    Batch,
}

impl Scope {
    /// Lower-case name (`"fit"`, `"epoch"`, `"batch"`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::Epoch => "epoch",
            Self::Batch => "batch",
        }
    }

    /// Hook dispatched on entry.
    #[must_use]
    pub const fn before(self) -> Hook {
        match self {
            Self::Fit => Hook::BeforeFit,
            Self::Epoch => Hook::BeforeEpoch,
            Self::Batch => Hook::BeforeBatch,
        }
    }

    /// Hook dispatched when the body completes.
    #[must_use]
    pub const fn after(self) -> Hook {
        match self {
            Self::Fit => Hook::AfterFit,
            Self::Epoch => Hook::AfterEpoch,
            Self::Batch => Hook::AfterBatch,
        }
    }

    /// Hook dispatched on every exit.
    #[must_use]
    pub const fn cleanup(self) -> Hook {
        match self {
            Self::Fit => Hook::CleanupFit,
            Self::Epoch => Hook::CleanupEpoch,
            Self::Batch => Hook::CleanupBatch,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a scope that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOutcome {
    /// The body and `after` hook ran to completion.
    Completed,
    /// The scope's own cancellation was raised and absorbed.
    Cancelled,
}

impl ScopeOutcome {
    /// Whether the scope was cut short.
    #[must_use]
    pub const fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
