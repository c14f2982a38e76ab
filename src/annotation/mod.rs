//! Request-scoped annotation store.
//!
//! # Data Flow
//! ```text
//! new_annotated_context()   → empty AnnotationStore attached to a Context
//!     → add_fields()        → values stored type-erased in a DashMap
//!     → Logger (bound)      → snapshot() at emit time
//!     → JSON object nested under the `annotation` field
//! ```
//!
//! # Design Decisions
//! - Values stay opaque until a snapshot; serialization happens lazily
//! - Clones share one map, so child contexts observe the same store
//! - A value that fails to serialize is handled by the store's
//!   [`SerializeFailurePolicy`]

pub mod store;

pub use store::{
    AnnotationError, AnnotationOptions, AnnotationStore, AnnotationValue,
    SerializeFailurePolicy,
};
