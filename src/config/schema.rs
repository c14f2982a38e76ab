//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::level::{level_from_env, Level};
use crate::logger::caller::DEFAULT_CALLER_SKIP;
use crate::logger::stack::FrameFilter;

/// Root configuration for the logging layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Minimum level. When absent, read from `CTXLOG_LEVEL`.
    pub level: Option<Level>,

    /// Asynchronous writer settings.
    pub diode: DiodeConfig,

    /// Logger construction settings.
    pub logger: LoggerConfig,

    /// Install the default logger as the `log` facade handler.
    pub install_log_facade: bool,

    /// Install the default logger as the global `tracing` subscriber.
    pub install_tracing: bool,
}

impl Config {
    /// Effective minimum level.
    pub fn resolved_level(&self) -> Level {
        self.level.unwrap_or_else(level_from_env)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: None,
            diode: DiodeConfig::default(),
            logger: LoggerConfig::default(),
            install_log_facade: true,
            install_tracing: true,
        }
    }
}

/// Bounded asynchronous writer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiodeConfig {
    /// Maximum number of buffered entries before writes are dropped.
    pub buffer_size: usize,

    /// Interval at which dropped entries are counted and reported.
    pub poll_interval_ms: u64,
}

impl DiodeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DiodeConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            poll_interval_ms: 1,
        }
    }
}

/// Logger construction settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Attach the call site (`file:line`) to every entry.
    pub caller: bool,

    /// Attach a stack trace to error-level entries.
    pub stack: bool,

    /// Frames skipped above the logger's internals when resolving the
    /// call site. Raise it by one per wrapper function.
    pub caller_skip_frame_count: usize,

    /// Encoding of the timestamp field.
    pub timestamp_format: TimestampFormat,

    /// Names of the fields the logger writes itself.
    pub field_names: FieldNames,

    /// Frames removed from stack traces.
    pub frame_filter: FrameFilter,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            caller: true,
            stack: true,
            caller_skip_frame_count: DEFAULT_CALLER_SKIP,
            timestamp_format: TimestampFormat::default(),
            field_names: FieldNames::default(),
            frame_filter: FrameFilter::default(),
        }
    }
}

/// Timestamp encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// RFC 3339 in UTC, second precision (`2024-05-01T12:00:00Z`).
    #[default]
    Rfc3339,
    /// Milliseconds since the Unix epoch, as a number.
    UnixMillis,
}

/// Names of the fields the logger writes itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldNames {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub caller: String,
    pub error: String,
    pub stack: String,
    pub annotation: String,
}

impl FieldNames {
    /// All names paired with their setting key.
    pub fn entries(&self) -> [(&'static str, &str); 7] {
        [
            ("timestamp", self.timestamp.as_str()),
            ("level", self.level.as_str()),
            ("message", self.message.as_str()),
            ("caller", self.caller.as_str()),
            ("error", self.error.as_str()),
            ("stack", self.stack.as_str()),
            ("annotation", self.annotation.as_str()),
        ]
    }

    /// True if `key` is written by the logger and cannot be set by callers.
    pub fn is_reserved(&self, key: &str) -> bool {
        self.entries().iter().any(|(_, name)| *name == key)
    }
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            timestamp: "timestamp".to_string(),
            level: "level".to_string(),
            message: "message".to_string(),
            caller: "caller".to_string(),
            error: "error".to_string(),
            stack: "stack".to_string(),
            annotation: "annotation".to_string(),
        }
    }
}
