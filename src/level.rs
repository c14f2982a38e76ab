//! Log levels.
//!
//! # Responsibilities
//! - Define the level set shared by loggers and bridges
//! - Parse level names leniently (unknown names fall back to debug)
//! - Hold the process-wide minimum level
//!
//! # Design Decisions
//! - Parsing never fails: a misconfigured level degrades to `Debug`
//! - The global minimum is an atomic so hot paths never lock

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Environment variable consulted for the default minimum level.
pub const LEVEL_ENV_KEY: &str = "CTXLOG_LEVEL";

/// Severity of a log entry.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl Level {
    /// Lower-case name, as written to the `level` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }

    /// Matching filter for the `log` facade.
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Level::Trace => log::LevelFilter::Trace,
            Level::Debug => log::LevelFilter::Debug,
            Level::Info => log::LevelFilter::Info,
            Level::Warn => log::LevelFilter::Warn,
            Level::Error => log::LevelFilter::Error,
        }
    }
}

impl From<u8> for Level {
    fn from(val: u8) -> Self {
        match val {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            _ => Level::Error,
        }
    }
}

impl From<String> for Level {
    fn from(name: String) -> Self {
        parse_level(&name)
    }
}

impl From<Level> for String {
    fn from(level: Level) -> Self {
        level.as_str().to_string()
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Level::Error,
            log::Level::Warn => Level::Warn,
            log::Level::Info => Level::Info,
            log::Level::Debug => Level::Debug,
            log::Level::Trace => Level::Trace,
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::INFO => Level::Info,
            tracing::Level::DEBUG => Level::Debug,
            _ => Level::Trace,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a level name, case-insensitively.
///
/// Only `debug`, `info`, `warn` and `error` are recognized. Anything else,
/// including the empty string and names with surrounding whitespace,
/// resolves to [`Level::Debug`].
pub fn parse_level(name: &str) -> Level {
    match name.to_ascii_lowercase().as_str() {
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" => Level::Warn,
        "error" => Level::Error,
        _ => Level::Debug,
    }
}

/// Read the minimum level from [`LEVEL_ENV_KEY`].
pub fn level_from_env() -> Level {
    std::env::var(LEVEL_ENV_KEY)
        .map(|value| parse_level(&value))
        .unwrap_or(Level::Debug)
}

static GLOBAL_LEVEL: AtomicU8 = AtomicU8::new(Level::Trace as u8);

/// Set the process-wide minimum level. Applies to every logger.
pub fn set_global_level(level: Level) {
    GLOBAL_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Current process-wide minimum level.
pub fn global_level() -> Level {
    Level::from(GLOBAL_LEVEL.load(Ordering::Relaxed))
}
