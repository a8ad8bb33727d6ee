//! Hook names and per-callback capability sets.

use std::fmt;
use std::ops::BitOr;

/// A point in the training lifecycle at which callbacks are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Before the first epoch.
    BeforeFit,
    /// After the last epoch, if the fit was not cut short.
    AfterFit,
    /// On every exit from a fit.
    CleanupFit,
    /// Before iterating a data source.
    BeforeEpoch,
    /// After the last batch of an epoch.
    AfterEpoch,
    /// On every exit from an epoch.
    CleanupEpoch,
    /// Before the step operations of a batch.
    BeforeBatch,
    /// After the step operations of a batch.
    AfterBatch,
    /// On every exit from a batch.
    CleanupBatch,
    /// Step: compute predictions.
    Predict,
    /// Step: compute the loss.
    GetLoss,
    /// Step: backpropagate.
    Backward,
    /// Step: update parameters.
    Step,
    /// Step: reset gradients.
    ZeroGrad,
    /// After predictions are set.
    AfterPredict,
    /// After the loss is set.
    AfterLoss,
    /// After gradients are computed.
    AfterBackward,
    /// After the optimizer step.
    AfterStep,
}

impl Hook {
    /// Every hook, in lifecycle order.
    pub const ALL: [Hook; 18] = [
        Hook::BeforeFit,
        Hook::AfterFit,
        Hook::CleanupFit,
        Hook::BeforeEpoch,
        Hook::AfterEpoch,
        Hook::CleanupEpoch,
        Hook::BeforeBatch,
        Hook::AfterBatch,
        Hook::CleanupBatch,
        Hook::Predict,
        Hook::GetLoss,
        Hook::Backward,
        Hook::Step,
        Hook::ZeroGrad,
        Hook::AfterPredict,
        Hook::AfterLoss,
        Hook::AfterBackward,
        Hook::AfterStep,
    ];

    /// The five pass-through step hooks.
    pub const STEPS: [Hook; 5] = [
        Hook::Predict,
        Hook::GetLoss,
        Hook::Backward,
        Hook::Step,
        Hook::ZeroGrad,
    ];

    /// Snake-case name, e.g. `"before_fit"`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BeforeFit => "before_fit",
            Self::AfterFit => "after_fit",
            Self::CleanupFit => "cleanup_fit",
            Self::BeforeEpoch => "before_epoch",
            Self::AfterEpoch => "after_epoch",
            Self::CleanupEpoch => "cleanup_epoch",
            Self::BeforeBatch => "before_batch",
            Self::AfterBatch => "after_batch",
            Self::CleanupBatch => "cleanup_batch",
            Self::Predict => "predict",
            Self::GetLoss => "get_loss",
            Self::Backward => "backward",
            Self::Step => "step",
            Self::ZeroGrad => "zero_grad",
            Self::AfterPredict => "after_predict",
            Self::AfterLoss => "after_loss",
            Self::AfterBackward => "after_backward",
            Self::AfterStep => "after_step",
        }
    }

    const fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The hooks a callback implements.
///
/// Declared once by [`Callback::hooks`](crate::Callback::hooks) and captured
/// at registration; the dispatcher only calls hooks in this set.
///
/// ```rust
/// use minilearn_train::{Hook, HookSet};
///
/// const HOOKS: HookSet = HookSet::of(&[Hook::BeforeFit, Hook::AfterBatch]);
/// assert!(HOOKS.contains(Hook::AfterBatch));
/// assert!(!HOOKS.contains(Hook::Predict));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HookSet(u32);

impl HookSet {
    /// No hooks.
    pub const EMPTY: Self = Self(0);

    /// The five pass-through steps.
    pub const STEPS: Self = Self::of(&Hook::STEPS);

    /// Set containing exactly `hooks`.
    #[must_use]
    pub const fn of(hooks: &[Hook]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < hooks.len() {
            bits |= hooks[i].bit();
            i += 1;
        }
        Self(bits)
    }

    /// Add `hook`.
    #[must_use]
    pub const fn with(self, hook: Hook) -> Self {
        Self(self.0 | hook.bit())
    }

    /// Remove `hook`.
    #[must_use]
    pub const fn without(self, hook: Hook) -> Self {
        Self(self.0 & !hook.bit())
    }

    /// Union of two sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether `hook` is in the set.
    #[must_use]
    pub const fn contains(self, hook: Hook) -> bool {
        self.0 & hook.bit() != 0
    }

    /// Whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of hooks in the set.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Hooks in the set, in lifecycle order.
    pub fn iter(self) -> impl Iterator<Item = Hook> {
        Hook::ALL.into_iter().filter(move |h| self.contains(*h))
    }
}

impl BitOr for HookSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOr<Hook> for HookSet {
    type Output = Self;

    fn bitor(self, rhs: Hook) -> Self {
        self.with(rhs)
    }
}

impl FromIterator<Hook> for HookSet {
    fn from_iter<I: IntoIterator<Item = Hook>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl From<Hook> for HookSet {
    fn from(hook: Hook) -> Self {
        Self::EMPTY.with(hook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_bits_are_distinct() {
        let all: HookSet = Hook::ALL.into_iter().collect();
        assert_eq!(all.len(), Hook::ALL.len());
    }

    #[test]
    fn test_set_operations() {
        let set = HookSet::of(&[Hook::BeforeFit, Hook::AfterEpoch]) | Hook::ZeroGrad;
        assert!(set.contains(Hook::ZeroGrad));
        assert_eq!(set.len(), 3);

        let set = set.without(Hook::ZeroGrad);
        assert!(!set.contains(Hook::ZeroGrad));
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Hook::BeforeFit, Hook::AfterEpoch]
        );
        assert!(HookSet::EMPTY.is_empty());
    }

    #[test]
    fn test_steps_set() {
        for hook in Hook::STEPS {
            assert!(HookSet::STEPS.contains(hook));
        }
        assert!(!HookSet::STEPS.contains(Hook::AfterStep));
    }

    #[test]
    fn test_names() {
        assert_eq!(Hook::GetLoss.to_string(), "get_loss");
        assert_eq!(Hook::CleanupFit.name(), "cleanup_fit");
    }
}
