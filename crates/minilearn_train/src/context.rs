//! Scoped lifecycle execution.
//!
//! Every phase of a fit runs through [`run_scoped`]: `before_P`, the body,
//! `after_P` on success, and `cleanup_P` on every exit. The cancellation for
//! `P` is absorbed here; anything else keeps propagating once cleanup ran.

use crate::cancel::{Scope, ScopeOutcome};
use crate::error::{Result, TrainError};
use crate::hooks::Hook;

/// Something that can dispatch a hook to its callbacks.
///
/// Implemented by [`Learner`](crate::Learner).
pub trait Dispatch {
    /// Dispatch `hook` to every callback that declares it.
    fn dispatch(&mut self, hook: Hook) -> Result<()>;
}

/// Run `body` as the `scope` phase of `ctx`.
///
/// `before_P` counts as part of the guarded region: a cancellation it raises
/// skips the body and is absorbed, and `cleanup_P` still runs.
///
/// If both the guarded region and `cleanup_P` fail, the first error is
/// returned and the cleanup error is logged.
///
/// # Errors
///
/// Returns any error other than the cancellation for `scope`.
pub fn run_scoped<D, F>(ctx: &mut D, scope: Scope, body: F) -> Result<ScopeOutcome>
where
    D: Dispatch + ?Sized,
    F: FnOnce(&mut D) -> Result<()>,
{
    let mut result = ctx.dispatch(scope.before());
    if result.is_ok() {
        result = body(ctx);
    }
    if result.is_ok() {
        result = ctx.dispatch(scope.after());
    }

    let outcome = match result {
        Ok(()) => Ok(ScopeOutcome::Completed),
        Err(TrainError::Cancel(s)) if s == scope => {
            tracing::debug!(%scope, "cancellation absorbed");
            Ok(ScopeOutcome::Cancelled)
        }
        Err(e) => Err(e),
    };

    match ctx.dispatch(scope.cleanup()) {
        Ok(()) => outcome,
        Err(TrainError::Cancel(s)) if s == scope => outcome,
        Err(cleanup_err) => match outcome {
            Ok(_) => Err(cleanup_err),
            Err(first) => {
                tracing::warn!(%scope, error = %cleanup_err, "cleanup failed while unwinding");
                Err(first)
            }
        },
    }
}
