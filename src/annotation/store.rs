//! Thread-safe key-value store for contextual log fields.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::observability::metrics;

/// A value that can be stored in an [`AnnotationStore`].
///
/// Implemented for every `Serialize + Send + Sync` type; the value is only
/// serialized when the store is snapshotted.
pub trait AnnotationValue: Send + Sync {
    /// Encode the value as JSON.
    fn to_json_value(&self) -> Result<Value, serde_json::Error>;
}

impl<T> AnnotationValue for T
where
    T: Serialize + Send + Sync,
{
    fn to_json_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// What a snapshot does with a value that cannot be serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializeFailurePolicy {
    /// Omit the offending key and keep the rest. Warns once per store.
    #[default]
    DropField,
    /// Fail the whole snapshot; a logger drops the entry.
    FailEntry,
}

/// Errors produced when snapshotting a store.
#[derive(Debug, Error)]
pub enum AnnotationError {
    /// A stored value is not representable as JSON.
    #[error("annotation field `{key}` cannot be serialized: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The snapshot itself could not be encoded.
    #[error("annotation snapshot could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Options applied when a store is created.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotationOptions {
    auto_inject: bool,
    on_serialize_error: SerializeFailurePolicy,
}

impl AnnotationOptions {
    /// Default options: not auto-injected, failing fields are dropped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the store as default: loggers bound to the context merge its
    /// contents into every entry.
    pub fn auto_inject(mut self) -> Self {
        self.auto_inject = true;
        self
    }

    /// Choose how unserializable values are handled.
    pub fn on_serialize_error(mut self, policy: SerializeFailurePolicy) -> Self {
        self.on_serialize_error = policy;
        self
    }
}

struct Inner {
    fields: DashMap<String, Arc<dyn AnnotationValue>>,
    auto_inject: bool,
    policy: SerializeFailurePolicy,
    warned: AtomicBool,
}

/// Concurrent string-keyed store of annotation fields.
///
/// Cloning is cheap and every clone refers to the same map.
#[derive(Clone)]
pub struct AnnotationStore {
    inner: Arc<Inner>,
}

impl AnnotationStore {
    /// Create an empty store.
    pub fn new(options: AnnotationOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                fields: DashMap::new(),
                auto_inject: options.auto_inject,
                policy: options.on_serialize_error,
                warned: AtomicBool::new(false),
            }),
        }
    }

    /// Whether the store is merged into entries automatically.
    pub fn is_default(&self) -> bool {
        self.inner.auto_inject
    }

    /// Policy applied to unserializable values.
    pub fn policy(&self) -> SerializeFailurePolicy {
        self.inner.policy
    }

    /// Store a value, replacing any previous value for `key`.
    pub fn insert<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Serialize + Send + Sync + 'static,
    {
        self.inner.fields.insert(key.into(), Arc::new(value));
    }

    /// Store every pair from `values`. Last write wins per key.
    pub fn extend<I, K, V>(&self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize + Send + Sync + 'static,
    {
        for (key, value) in values {
            self.insert(key, value);
        }
    }

    /// Current value for `key`, encoded as JSON.
    ///
    /// Returns `None` if the key is absent or its value cannot be encoded.
    pub fn get(&self, key: &str) -> Option<Value> {
        let value = self.inner.fields.get(key).map(|r| Arc::clone(r.value()))?;
        value.to_json_value().ok()
    }

    /// Remove `key`. Returns true if it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.fields.remove(key).is_some()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.fields.is_empty()
    }

    /// True if both handles refer to the same underlying map.
    pub fn ptr_eq(&self, other: &AnnotationStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copy the current pairs into a plain JSON map, keys sorted.
    ///
    /// Values are cloned out of the map before encoding, so writers that
    /// land after the copy do not affect the result.
    pub fn snapshot(&self) -> Result<Map<String, Value>, AnnotationError> {
        let mut entries: Vec<(String, Arc<dyn AnnotationValue>)> = self
            .inner
            .fields
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut map = Map::with_capacity(entries.len());
        for (key, value) in entries {
            match value.to_json_value() {
                Ok(encoded) => {
                    map.insert(key, encoded);
                }
                Err(source) => match self.inner.policy {
                    SerializeFailurePolicy::DropField => self.field_dropped(&key, &source),
                    SerializeFailurePolicy::FailEntry => {
                        return Err(AnnotationError::Serialize { key, source });
                    }
                },
            }
        }
        Ok(map)
    }

    /// Serialize a snapshot as a JSON object. An empty store yields `{}`.
    pub fn to_json(&self) -> Result<Vec<u8>, AnnotationError> {
        let map = self.snapshot()?;
        Ok(serde_json::to_vec(&map)?)
    }

    fn field_dropped(&self, key: &str, source: &serde_json::Error) {
        metrics::record_annotation_field_dropped();
        if !self.inner.warned.swap(true, Ordering::Relaxed) {
            log::warn!(
                target: "ctxlog",
                "annotation field `{key}` dropped from log output: {source}"
            );
        }
    }
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new(AnnotationOptions::default())
    }
}

impl fmt::Debug for AnnotationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationStore")
            .field("len", &self.len())
            .field("auto_inject", &self.inner.auto_inject)
            .field("policy", &self.inner.policy)
            .finish()
    }
}
