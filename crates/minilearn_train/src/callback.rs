//! Callback protocol and registry.

use std::sync::Arc;

use burn::tensor::backend::AutodiffBackend;
use minilearn_core::Model;
use parking_lot::Mutex;

use crate::error::Result;
use crate::hooks::{Hook, HookSet};
use crate::learner::Learner;

/// Trait for training callbacks.
///
/// A callback declares the hooks it implements through [`Callback::hooks`]
/// and overrides the matching methods. Every hook receives the learner and
/// communicates only by reading and writing its public fields.
///
/// Returning [`TrainError::Cancel`](crate::TrainError::Cancel) from a hook
/// ends the named scope early; any other error aborts the fit.
///
/// # Example
///
/// ```rust,ignore
/// struct CountBatches(usize);
///
/// impl<B: AutodiffBackend, M: Model<B>> Callback<B, M> for CountBatches {
///     fn hooks(&self) -> HookSet {
///         HookSet::of(&[Hook::AfterBatch])
///     }
///
///     fn after_batch(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
///         self.0 += 1;
///         Ok(())
///     }
/// }
/// ```
pub trait Callback<B: AutodiffBackend, M: Model<B>>: Send {
    /// The hooks this callback implements.
    fn hooks(&self) -> HookSet;

    /// Dispatch position; lower runs first, ties keep registration order.
    fn order(&self) -> i32 {
        0
    }

    /// Get the callback name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called before the first epoch.
    fn before_fit(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Called after the last epoch.
    fn after_fit(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Called on every exit from a fit.
    fn cleanup_fit(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Called before each epoch.
    fn before_epoch(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Called after each epoch.
    fn after_epoch(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Called on every exit from an epoch.
    fn cleanup_epoch(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Called before each batch.
    fn before_batch(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Called after each batch.
    fn after_batch(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Called on every exit from a batch.
    fn cleanup_batch(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Step: set `learn.preds`.
    fn predict(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Step: set `learn.loss`.
    fn get_loss(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Step: compute gradients.
    fn backward(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Step: update parameters.
    fn step(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Step: reset gradients.
    fn zero_grad(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Called after `predict`.
    fn after_predict(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Called after `get_loss`.
    fn after_loss(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Called after `backward`.
    fn after_backward(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }

    /// Called after `step`.
    fn after_step(&mut self, _learn: &mut Learner<B, M>) -> Result<()> {
        Ok(())
    }
}

/// Shared handle to a registered callback.
///
/// Keep a clone to inspect the callback's state after `fit` returns.
pub type CallbackRef<B, M> = Arc<Mutex<dyn Callback<B, M>>>;

/// Wrap a callback in a shared handle.
pub fn cb_ref<B, M, C>(callback: C) -> CallbackRef<B, M>
where
    B: AutodiffBackend,
    M: Model<B>,
    C: Callback<B, M> + 'static,
{
    Arc::new(Mutex::new(callback))
}

/// Call the method of `cb` that implements `hook`.
pub(crate) fn invoke<B: AutodiffBackend, M: Model<B>>(
    cb: &mut dyn Callback<B, M>,
    hook: Hook,
    learn: &mut Learner<B, M>,
) -> Result<()> {
    match hook {
        Hook::BeforeFit => cb.before_fit(learn),
        Hook::AfterFit => cb.after_fit(learn),
        Hook::CleanupFit => cb.cleanup_fit(learn),
        Hook::BeforeEpoch => cb.before_epoch(learn),
        Hook::AfterEpoch => cb.after_epoch(learn),
        Hook::CleanupEpoch => cb.cleanup_epoch(learn),
        Hook::BeforeBatch => cb.before_batch(learn),
        Hook::AfterBatch => cb.after_batch(learn),
        Hook::CleanupBatch => cb.cleanup_batch(learn),
        Hook::Predict => cb.predict(learn),
        Hook::GetLoss => cb.get_loss(learn),
        Hook::Backward => cb.backward(learn),
        Hook::Step => cb.step(learn),
        Hook::ZeroGrad => cb.zero_grad(learn),
        Hook::AfterPredict => cb.after_predict(learn),
        Hook::AfterLoss => cb.after_loss(learn),
        Hook::AfterBackward => cb.after_backward(learn),
        Hook::AfterStep => cb.after_step(learn),
    }
}

/// Handle returned by [`Callbacks::add`], used to remove the callback again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

struct Entry<B: AutodiffBackend, M: Model<B>> {
    id: CallbackId,
    order: i32,
    hooks: HookSet,
    cb: CallbackRef<B, M>,
}

/// The ordered set of callbacks registered on a learner.
///
/// Entries are kept sorted by `order`, ties in registration order. Each
/// callback's order and hook set are read once, when it is added.
pub struct Callbacks<B: AutodiffBackend, M: Model<B>> {
    entries: Vec<Entry<B, M>>,
    next_id: u64,
}

impl<B: AutodiffBackend, M: Model<B>> Default for Callbacks<B, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: AutodiffBackend, M: Model<B>> std::fmt::Debug for Callbacks<B, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.id, e.order)))
            .finish()
    }
}

impl<B: AutodiffBackend, M: Model<B>> Callbacks<B, M> {
    /// Create a new empty callback list.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a callback.
    pub fn add(&mut self, cb: CallbackRef<B, M>) -> CallbackId {
        let (order, hooks) = {
            let guard = cb.lock();
            (guard.order(), guard.hooks())
        };
        let id = CallbackId(self.next_id);
        self.next_id += 1;

        let pos = self.entries.partition_point(|e| e.order <= order);
        self.entries.insert(
            pos,
            Entry {
                id,
                order,
                hooks,
                cb,
            },
        );
        id
    }

    /// Unregister a callback, returning its handle.
    pub fn remove(&mut self, id: CallbackId) -> Option<CallbackRef<B, M>> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos).cb)
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: CallbackId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no callbacks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handles in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &CallbackRef<B, M>> {
        self.entries.iter().map(|e| &e.cb)
    }

    /// Handles of the callbacks that implement `hook`, in dispatch order.
    #[must_use]
    pub fn handlers(&self, hook: Hook) -> Vec<CallbackRef<B, M>> {
        self.entries
            .iter()
            .filter(|e| e.hooks.contains(hook))
            .map(|e| Arc::clone(&e.cb))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{learner, TestBackend, TestModel};
    use proptest::prelude::*;

    type Log = Arc<Mutex<Vec<(usize, Hook)>>>;

    struct Tagged {
        tag: usize,
        order: i32,
        hooks: HookSet,
        log: Log,
    }

    impl Callback<TestBackend, TestModel> for Tagged {
        fn hooks(&self) -> HookSet {
            self.hooks
        }

        fn order(&self) -> i32 {
            self.order
        }

        fn before_fit(&mut self, _learn: &mut Learner<TestBackend, TestModel>) -> Result<()> {
            self.log.lock().push((self.tag, Hook::BeforeFit));
            Ok(())
        }

        fn after_fit(&mut self, _learn: &mut Learner<TestBackend, TestModel>) -> Result<()> {
            self.log.lock().push((self.tag, Hook::AfterFit));
            Ok(())
        }
    }

    fn tagged(tag: usize, order: i32, hooks: HookSet, log: &Log) -> CallbackRef<TestBackend, TestModel> {
        cb_ref(Tagged {
            tag,
            order,
            hooks,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn test_undeclared_hooks_are_skipped() {
        let log = Log::default();
        let mut learn = learner();
        learn.cbs.add(tagged(0, 0, HookSet::of(&[Hook::BeforeFit]), &log));
        learn.cbs.add(tagged(1, 0, HookSet::of(&[Hook::AfterFit]), &log));

        learn.callback(Hook::BeforeFit).unwrap();
        learn.callback(Hook::Predict).unwrap();

        assert_eq!(*log.lock(), vec![(0, Hook::BeforeFit)]);
    }

    #[test]
    fn test_remove_by_id() {
        let log = Log::default();
        let mut cbs = Callbacks::<TestBackend, TestModel>::new();
        let a = cbs.add(tagged(0, 0, HookSet::of(&[Hook::BeforeFit]), &log));
        let b = cbs.add(tagged(1, 0, HookSet::of(&[Hook::BeforeFit]), &log));

        assert!(cbs.remove(a).is_some());
        assert!(cbs.remove(a).is_none());
        assert!(!cbs.contains(a));
        assert!(cbs.contains(b));
        assert_eq!(cbs.len(), 1);
        assert_eq!(cbs.handlers(Hook::BeforeFit).len(), 1);
    }

    proptest! {
        #[test]
        fn prop_dispatch_order_is_stable_by_order(orders in prop::collection::vec(-3i32..4, 0..12)) {
            let log = Log::default();
            let mut learn = learner();
            for (tag, &order) in orders.iter().enumerate() {
                learn.cbs.add(tagged(tag, order, HookSet::of(&[Hook::BeforeFit]), &log));
            }

            learn.callback(Hook::BeforeFit).unwrap();
            learn.callback(Hook::BeforeFit).unwrap();

            let seen: Vec<usize> = log.lock().iter().map(|(tag, _)| *tag).collect();
            let mut expected: Vec<usize> = (0..orders.len()).collect();
            expected.sort_by_key(|&tag| orders[tag]);
            let twice: Vec<usize> = expected.iter().chain(expected.iter()).copied().collect();
            prop_assert_eq!(seen, twice);
        }
    }
}
