//! Structured JSON logging with request-scoped annotations.
//!
//! # Data Flow
//! ```text
//! new_annotated_context ─→ add_fields (any task/thread)
//!         │
//!         ▼
//! logger_from_context ─→ Logger::info() ... .msg() ─→ one JSON line
//!                                                       │
//!                         log / tracing bridges ────────┤
//!                                                       ▼
//!                                      DiodeWriter (bounded, lossy) → stdout
//! ```

pub mod annotation;
pub mod bridge;
pub mod config;
pub mod context;
pub mod global;
pub mod level;
pub mod logger;
pub mod observability;
pub mod test_support;
pub mod writer;

pub use annotation::{AnnotationOptions, AnnotationStore, SerializeFailurePolicy};
pub use config::{Config, LoggerConfig};
pub use context::{
    add_fields, logger_from_context, new_annotated_context, new_context, store_from_context,
    Context,
};
pub use global::{init, GlobalHandles, InitError};
pub use level::Level;
pub use logger::{new_logger, Entry, Hook, LogError, Logger, LoggerOptions};
pub use writer::DiodeWriter;
