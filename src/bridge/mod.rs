//! Facade bridges.
//!
//! # Responsibilities
//! - Forward `log` records and `tracing` events into a [`Logger`]
//! - Map facade levels onto [`Level`] and record metadata onto the
//!   logger's configured field names
//!
//! # Data Flow
//! ```text
//! log::info!(..)      → LogBridge::log ─────┐
//! tracing::info!(..)  → TracingBridge::on_event ─┼→ LoggerSource::resolve
//!                                           │     (ambient Context bound)
//!                                           └→ Logger::entry_at → JSON line
//! ```
//!
//! # Design Decisions
//! - The call site comes from the record's file and line, so no stack walk
//!   is needed for bridged records
//! - Facade fields that clash with a name the logger writes itself are
//!   prefixed with `fields.` rather than discarded
//! - The target logger is resolved per record, so replacing the default
//!   logger also redirects bridged output

pub mod log_bridge;
pub mod tracing_bridge;

pub use log_bridge::LogBridge;
pub use tracing_bridge::TracingBridge;

use crate::config::FieldNames;
use crate::context::{logger_from_context, Context};
use crate::logger::Logger;

/// Field holding the record's target (module path or explicit target).
pub const TARGET_FIELD: &str = "target";

/// Logger a bridge writes to.
#[derive(Debug, Clone, Default)]
pub enum LoggerSource {
    /// The current context's logger, else the process default.
    #[default]
    Default,
    /// Always this logger.
    Fixed(Logger),
}

impl LoggerSource {
    /// Logger for the record being bridged, bound to the ambient context.
    pub fn resolve(&self) -> Logger {
        let ctx = Context::current();
        match self {
            LoggerSource::Default => logger_from_context(&ctx),
            LoggerSource::Fixed(logger) => logger.bind(&ctx),
        }
    }
}

/// Key under which a facade field is written.
pub(crate) fn field_key(names: &FieldNames, key: &str) -> String {
    if names.is_reserved(key) || key == TARGET_FIELD {
        format!("fields.{key}")
    } else {
        key.to_string()
    }
}

pub(crate) fn location(file: Option<&str>, line: Option<u32>) -> Option<String> {
    match (file, line) {
        (Some(file), Some(line)) => Some(format!("{file}:{line}")),
        _ => None,
    }
}
