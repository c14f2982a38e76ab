//! Structured JSON logger.
//!
//! # Responsibilities
//! - Bind a logger to an output sink (any `MakeWriter`)
//! - Enrich entries with timestamp, level, call site and, for errors, a
//!   filtered stack trace
//! - Merge the bound context's annotation store into each entry
//! - Run hooks and route internal failures to an error handler
//!
//! # Design Decisions
//! - One JSON object per entry, written with a single `write_all` so a
//!   line-oriented sink (the diode) sees whole entries
//! - Loggers are cheap to clone; derived loggers share the sink
//! - Failures never panic: they reach the error handler, which logs
//!   through the `log` facade and is guarded against re-entry

pub mod caller;
pub mod entry;
pub mod stack;

use std::cell::Cell;
use std::fmt;
use std::io::{self, Write};
use std::panic::Location;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter};

use crate::annotation::{AnnotationError, AnnotationStore};
use crate::config::LoggerConfig;
use crate::context::Context;
use crate::level::{global_level, Level};
use crate::observability::metrics;

pub use caller::{CALLER_SKIP_FRAME_COUNT, DEFAULT_CALLER_SKIP};
pub use entry::Entry;
pub use stack::{Frame, FrameFilter};

/// Callback run on every entry before it is encoded.
pub trait Hook: Send + Sync {
    fn run(&self, level: Level, message: &str, fields: &mut Map<String, Value>);
}

impl<F> Hook for F
where
    F: Fn(Level, &str, &mut Map<String, Value>) + Send + Sync,
{
    fn run(&self, level: Level, message: &str, fields: &mut Map<String, Value>) {
        self(level, message, fields)
    }
}

/// Failures raised while producing an entry.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to write log entry: {0}")]
    Write(#[from] io::Error),

    #[error("failed to encode log field: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("log entry dropped: {0}")]
    Annotation(#[from] AnnotationError),
}

/// Receives every [`LogError`] a logger encounters.
pub type ErrorHandler = Arc<dyn Fn(&LogError) + Send + Sync>;

/// Reports failures through the `log` facade.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|error: &LogError| match error {
        LogError::Annotation(_) => log::warn!(target: "ctxlog", "{error}"),
        _ => log::error!(target: "ctxlog", "{error}"),
    })
}

thread_local! {
    static HANDLING_ERROR: Cell<bool> = const { Cell::new(false) };
}

/// Options for [`new_logger`].
#[derive(Clone)]
pub struct LoggerOptions {
    config: LoggerConfig,
    level: Level,
    error_handler: Option<ErrorHandler>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl LoggerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the caller-skip count. Add one per wrapper function that
    /// sits between the logging call and the code that should be reported.
    pub fn with_caller_skip(mut self, skip: usize) -> Self {
        self.config.caller_skip_frame_count = skip;
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&LogError) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            config: LoggerConfig::default(),
            level: Level::Trace,
            error_handler: None,
            hooks: Vec::new(),
        }
    }
}

/// Build a logger writing JSON lines to `sink`.
pub fn new_logger<M>(sink: M, options: LoggerOptions) -> Logger
where
    M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    Logger {
        writer: Arc::new(BoxMakeWriter::new(sink)),
        config: Arc::new(options.config),
        level: options.level,
        fields: Arc::new(Map::new()),
        annotation: None,
        hooks: Arc::new(options.hooks),
        error_handler: options.error_handler.unwrap_or_else(default_error_handler),
    }
}

/// Structured logger bound to a sink.
#[derive(Clone)]
pub struct Logger {
    writer: Arc<BoxMakeWriter>,
    config: Arc<LoggerConfig>,
    level: Level,
    fields: Arc<Map<String, Value>>,
    annotation: Option<AnnotationStore>,
    hooks: Arc<Vec<Arc<dyn Hook>>>,
    error_handler: ErrorHandler,
}

impl Logger {
    /// Logger with default options.
    pub fn new<M>(sink: M) -> Self
    where
        M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        new_logger(sink, LoggerOptions::default())
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Store merged into every entry, if bound.
    pub fn annotation(&self) -> Option<&AnnotationStore> {
        self.annotation.as_ref()
    }

    /// Whether entries at `level` would be written.
    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.level && level >= global_level()
    }

    /// Copy with a different minimum level.
    pub fn with_level(&self, level: Level) -> Logger {
        Logger {
            level,
            ..self.clone()
        }
    }

    /// Copy that adds `key` to every entry.
    pub fn with_field<K, V>(&self, key: K, value: V) -> Logger
    where
        K: Into<String>,
        V: Serialize,
    {
        match serde_json::to_value(value) {
            Ok(value) => {
                let mut fields = (*self.fields).clone();
                fields.insert(key.into(), value);
                Logger {
                    fields: Arc::new(fields),
                    ..self.clone()
                }
            }
            Err(e) => {
                self.report(&LogError::Serialize(e));
                self.clone()
            }
        }
    }

    /// Copy that runs `hook` after the existing hooks.
    pub fn with_hook(&self, hook: Arc<dyn Hook>) -> Logger {
        let mut hooks = (*self.hooks).clone();
        hooks.push(hook);
        Logger {
            hooks: Arc::new(hooks),
            ..self.clone()
        }
    }

    /// Copy that merges `store` into every entry.
    pub fn with_annotation(&self, store: AnnotationStore) -> Logger {
        Logger {
            annotation: Some(store),
            ..self.clone()
        }
    }

    /// Copy bound to the context's store when that store is marked default.
    pub fn bind(&self, ctx: &Context) -> Logger {
        match ctx.annotation().filter(|store| store.is_default()) {
            Some(store) => self.with_annotation(store.clone()),
            None => self.clone(),
        }
    }

    #[track_caller]
    #[inline(never)]
    pub fn trace(&self) -> Entry<'_> {
        self.new_entry(Level::Trace)
    }

    #[track_caller]
    #[inline(never)]
    pub fn debug(&self) -> Entry<'_> {
        self.new_entry(Level::Debug)
    }

    #[track_caller]
    #[inline(never)]
    pub fn info(&self) -> Entry<'_> {
        self.new_entry(Level::Info)
    }

    #[track_caller]
    #[inline(never)]
    pub fn warn(&self) -> Entry<'_> {
        self.new_entry(Level::Warn)
    }

    #[track_caller]
    #[inline(never)]
    pub fn error(&self) -> Entry<'_> {
        self.new_entry(Level::Error)
    }

    /// Start an entry at `level`.
    #[track_caller]
    #[inline(never)]
    pub fn log(&self, level: Level) -> Entry<'_> {
        self.new_entry(level)
    }

    #[track_caller]
    #[inline(never)]
    fn new_entry(&self, level: Level) -> Entry<'_> {
        if !self.is_enabled(level) {
            return Entry::disabled();
        }
        let skip = self.config.caller_skip_frame_count;
        let caller = if !self.config.caller {
            None
        } else if skip == DEFAULT_CALLER_SKIP {
            Some(caller::format_location(Location::caller()))
        } else {
            caller::capture(skip)
        };
        Entry::new(self, level, caller)
    }

    /// Entry whose call site is already known, as with bridged records.
    pub(crate) fn entry_at(&self, level: Level, caller: Option<String>) -> Entry<'_> {
        if !self.is_enabled(level) {
            return Entry::disabled();
        }
        let caller = caller.filter(|_| self.config.caller);
        Entry::new(self, level, caller)
    }

    pub(crate) fn hooks(&self) -> &[Arc<dyn Hook>] {
        &self.hooks
    }

    pub(crate) fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub(crate) fn write_line(&self, line: &[u8]) {
        let sink: &BoxMakeWriter = &self.writer;
        let mut writer = sink.make_writer();
        if let Err(e) = writer.write_all(line) {
            metrics::record_write_error();
            self.report(&LogError::Write(e));
        }
    }

    pub(crate) fn report(&self, error: &LogError) {
        HANDLING_ERROR.with(|handling| {
            if handling.replace(true) {
                return;
            }
            (self.error_handler)(error);
            handling.set(false);
        });
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .field("config", &self.config)
            .field("fields", &self.fields)
            .field("annotation", &self.annotation)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationOptions, SerializeFailurePolicy};
    use crate::config::TimestampFormat;
    use crate::context::{add_fields, new_annotated_context};
    use crate::test_support::CaptureSink;
    use std::sync::Mutex;

    fn capture_logger(options: LoggerOptions) -> (Logger, CaptureSink) {
        let sink = CaptureSink::new();
        (new_logger(sink.clone(), options), sink)
    }

    #[test]
    fn test_entry_has_standard_fields() {
        let (logger, sink) = capture_logger(LoggerOptions::new());
        let line = line!() + 1;
        logger.info().field("attempt", 3).msg("hello");

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry["level"], "info");
        assert_eq!(entry["message"], "hello");
        assert_eq!(entry["attempt"], 3);
        assert!(entry["timestamp"].as_str().unwrap().ends_with('Z'));
        assert_eq!(entry["caller"], format!("src/logger/mod.rs:{line}"));
        assert!(entry.get("stack").is_none());
    }

    #[test]
    fn test_field_order_ends_with_message() {
        let (logger, sink) = capture_logger(LoggerOptions::new());
        logger.warn().field("k", "v").msg("ordered");

        let raw = sink.contents();
        let level = raw.find("\"level\"").unwrap();
        let field = raw.find("\"k\"").unwrap();
        let message = raw.find("\"message\"").unwrap();
        assert!(level < field && field < message);
        assert!(raw.ends_with('\n'));
    }

    #[test]
    fn test_level_filtering() {
        let (logger, sink) = capture_logger(LoggerOptions::new().with_level(Level::Warn));
        logger.debug().msg("hidden");
        logger.info().msg("hidden");
        logger.warn().msg("shown");
        logger.error().msg("shown");
        assert_eq!(sink.entries().len(), 2);
        assert!(!logger.is_enabled(Level::Info));
    }

    #[test]
    fn test_auto_inject_annotation() {
        let (logger, sink) = capture_logger(LoggerOptions::new());
        let ctx = new_annotated_context(None, AnnotationOptions::new().auto_inject());
        add_fields(&ctx, [("user_id", 42)]);

        logger.bind(&ctx).info().msg("annotated");

        let entry = &sink.entries()[0];
        assert_eq!(entry["annotation"]["user_id"], 42);
    }

    #[test]
    fn test_store_without_auto_inject_is_not_merged() {
        let (logger, sink) = capture_logger(LoggerOptions::new());
        let ctx = new_annotated_context(None, AnnotationOptions::new());
        add_fields(&ctx, [("user_id", 42)]);

        let bound = logger.bind(&ctx);
        assert!(bound.annotation().is_none());
        bound.info().msg("plain");

        let store = ctx.annotation().unwrap();
        bound.info().annotation(store).msg("explicit");

        let entries = sink.entries();
        assert!(entries[0].get("annotation").is_none());
        assert_eq!(entries[1]["annotation"]["user_id"], 42);
    }

    #[test]
    fn test_annotation_reflects_writes_after_binding() {
        let (logger, sink) = capture_logger(LoggerOptions::new());
        let ctx = new_annotated_context(None, AnnotationOptions::new().auto_inject());
        let bound = logger.bind(&ctx);

        bound.info().msg("first");
        add_fields(&ctx, [("late", "yes")]);
        bound.info().msg("second");

        let entries = sink.entries();
        assert_eq!(entries[0]["annotation"], serde_json::json!({}));
        assert_eq!(entries[1]["annotation"]["late"], "yes");
    }

    #[test]
    fn test_fail_entry_policy_drops_entry() {
        struct Unencodable;
        impl Serialize for Unencodable {
            fn serialize<S: serde::Serializer>(&self, _s: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("no"))
            }
        }

        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        let (logger, sink) = capture_logger(
            LoggerOptions::new().with_error_handler(move |e| seen.lock().unwrap().push(e.to_string())),
        );
        let ctx = new_annotated_context(
            None,
            AnnotationOptions::new()
                .auto_inject()
                .on_serialize_error(SerializeFailurePolicy::FailEntry),
        );
        add_fields(&ctx, [("bad", Unencodable)]);

        logger.bind(&ctx).info().msg("never written");

        assert!(sink.entries().is_empty());
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("bad"));
    }

    #[test]
    fn test_error_entries_carry_filtered_stack() {
        let (logger, sink) = capture_logger(LoggerOptions::new());
        let err = io::Error::new(io::ErrorKind::Other, "disk full");
        logger.error().err(&err).msg("write failed");

        let entry = &sink.entries()[0];
        assert_eq!(entry["error"], "disk full");
        let stack = entry["stack"].as_array().unwrap();
        assert!(!stack.is_empty());
        for frame in stack {
            let source = frame["source"].as_str().unwrap();
            assert!(!source.contains("/rustc/"), "runtime frame kept: {source}");
        }
        assert!(stack[0]["func"].as_str().unwrap().contains("test_error_entries_carry_filtered_stack"));
    }

    #[test]
    fn test_stack_can_be_disabled() {
        let mut config = LoggerConfig::default();
        config.stack = false;
        config.caller = false;
        let (logger, sink) = capture_logger(LoggerOptions::new().with_config(config));
        logger.error().msg("no stack");

        let entry = &sink.entries()[0];
        assert!(entry.get("stack").is_none());
        assert!(entry.get("caller").is_none());
    }

    #[test]
    fn test_unix_millis_timestamp() {
        let mut config = LoggerConfig::default();
        config.timestamp_format = TimestampFormat::UnixMillis;
        config.field_names.timestamp = "ts".to_string();
        let (logger, sink) = capture_logger(LoggerOptions::new().with_config(config));
        logger.info().msg("tick");

        let entry = &sink.entries()[0];
        assert!(entry["ts"].as_i64().unwrap() > 1_600_000_000_000);
        assert!(entry.get("timestamp").is_none());
    }

    #[test]
    fn test_with_field_and_reserved_names() {
        let (logger, sink) = capture_logger(LoggerOptions::new());
        let logger = logger.with_field("service", "billing");
        logger.info().field("level", "spoofed").msg("ctx");

        let entry = &sink.entries()[0];
        assert_eq!(entry["service"], "billing");
        assert_eq!(entry["level"], "info");
    }

    #[test]
    fn test_hooks_run_before_encoding() {
        let (logger, sink) = capture_logger(LoggerOptions::new());
        let hook: Arc<dyn Hook> = Arc::new(|level: Level, message: &str, fields: &mut Map<String, Value>| {
            fields.insert("hooked".to_string(), Value::from(format!("{level}:{message}")));
        });
        let logger = logger.with_hook(hook);
        logger.warn().msg("careful");

        assert_eq!(sink.entries()[0]["hooked"], "warn:careful");
    }

    #[test]
    fn test_write_errors_reach_handler() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let errors = Arc::new(Mutex::new(0usize));
        let seen = errors.clone();
        let logger = new_logger(
            || Broken,
            LoggerOptions::new().with_error_handler(move |e| {
                assert!(matches!(e, LogError::Write(_)));
                *seen.lock().unwrap() += 1;
            }),
        );
        logger.info().msg("lost");
        assert_eq!(*errors.lock().unwrap(), 1);
    }
}
