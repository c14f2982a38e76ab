//! Ambient current context, scoped to a task or a synchronous call.

use std::future::Future;

use crate::context::Context;

tokio::task_local! {
    static CURRENT: Context;
}

impl Context {
    /// Run `future` with `self` as the current context.
    ///
    /// Scopes nest; the innermost one wins.
    pub fn scope<F>(self, future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        CURRENT.scope(self, future)
    }

    /// Run `f` with `self` as the current context.
    pub fn sync_scope<F, R>(self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT.sync_scope(self, f)
    }

    /// The innermost scoped context, or [`Context::background`] outside
    /// any scope.
    pub fn current() -> Context {
        CURRENT.try_with(Context::clone).unwrap_or_default()
    }
}
