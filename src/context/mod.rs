//! Request context plumbing.
//!
//! # Responsibilities
//! - Carry an optional annotation store and an optional logger per unit of work
//! - Derive child contexts that share or shadow the parent's store
//! - Offer an ambient, task-scoped current context for code that cannot
//!   take the context as a parameter
//!
//! # Design Decisions
//! - The context is a plain value passed explicitly; the ambient scope is a
//!   typed tokio task-local, never a lookup keyed by a marker type
//! - Retrieving a store from an unannotated context returns a detached
//!   store; [`Context::annotation`] exposes the absence instead

pub mod scope;

use std::fmt;

use serde::Serialize;

use crate::annotation::{AnnotationOptions, AnnotationStore};
use crate::global;
use crate::logger::{Hook, Logger};

/// Request-scoped values used by the logging layer.
///
/// Cloning is cheap. A clone or child context refers to the same store
/// until a new store is installed on it.
#[derive(Clone, Default)]
pub struct Context {
    annotation: Option<AnnotationStore>,
    logger: Option<Logger>,
}

impl Context {
    /// The empty root context.
    pub fn background() -> Self {
        Self::default()
    }

    /// Store attached to this context, if any.
    pub fn annotation(&self) -> Option<&AnnotationStore> {
        self.annotation.as_ref()
    }

    /// Logger attached to this context, if any.
    pub fn logger(&self) -> Option<&Logger> {
        self.logger.as_ref()
    }

    /// Child context carrying `store`, shadowing any store of `self`.
    pub fn with_annotation_store(&self, store: AnnotationStore) -> Self {
        Self {
            annotation: Some(store),
            logger: self.logger.clone(),
        }
    }

    /// Child context carrying a fresh empty store.
    pub fn with_new_annotation_store(&self, options: AnnotationOptions) -> Self {
        self.with_annotation_store(AnnotationStore::new(options))
    }

    /// Child context carrying `logger`.
    pub fn with_logger(&self, logger: Logger) -> Self {
        Self {
            annotation: self.annotation.clone(),
            logger: Some(logger),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("annotation", &self.annotation)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// Derive a context carrying a fresh, empty annotation store.
///
/// A `None` parent is replaced by [`Context::background`].
pub fn new_annotated_context(parent: Option<&Context>, options: AnnotationOptions) -> Context {
    match parent {
        Some(parent) => parent.with_new_annotation_store(options),
        None => Context::background().with_new_annotation_store(options),
    }
}

/// Store attached to `ctx`, or a new detached store.
///
/// Writes to a detached store are visible to nobody else: two calls on an
/// unannotated context return two independent stores. Use
/// [`Context::annotation`] to tell the cases apart.
pub fn store_from_context(ctx: &Context) -> AnnotationStore {
    ctx.annotation().cloned().unwrap_or_default()
}

/// Write every pair of `values` into the context's store.
///
/// Returns `false` when the context carries no store, in which case the
/// values went to a detached store and are lost.
pub fn add_fields<I, K, V>(ctx: &Context, values: I) -> bool
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Serialize + Send + Sync + 'static,
{
    let attached = ctx.annotation().is_some();
    store_from_context(ctx).extend(values);
    attached
}

/// Logger for `ctx`: the attached logger, or the process default.
///
/// The result is bound to the context's store when that store is marked
/// as default.
pub fn logger_from_context(ctx: &Context) -> Logger {
    ctx.logger()
        .cloned()
        .unwrap_or_else(global::default_logger)
        .bind(ctx)
}

/// Derive a context whose logger runs `hooks` on every entry.
///
/// Returns the new context and its (bound) logger.
pub fn new_context<I>(ctx: &Context, hooks: I) -> (Context, Logger)
where
    I: IntoIterator<Item = std::sync::Arc<dyn Hook>>,
{
    let base = ctx.logger().cloned().unwrap_or_else(global::default_logger);
    let hooked = hooks.into_iter().fold(base, |logger, hook| logger.with_hook(hook));
    let derived = ctx.with_logger(hooked);
    let logger = logger_from_context(&derived);
    (derived, logger)
}
