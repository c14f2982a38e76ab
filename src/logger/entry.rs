//! Entry builder.
//!
//! An entry collects fields until `msg` or `send` encodes it. Entries
//! below the logger's level are created disabled and every builder call
//! on them is a no-op.

use std::error::Error;
use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::annotation::AnnotationStore;
use crate::config::TimestampFormat;
use crate::level::Level;
use crate::logger::{stack, LogError, Logger};

/// Frames between `stack::capture` and the code that finished the entry:
/// `emit` and the public `msg`/`send`.
const STACK_SKIP: usize = 2;

/// A log entry under construction.
#[must_use = "entries are only written by `msg` or `send`"]
pub struct Entry<'a> {
    inner: Option<Inner<'a>>,
}

struct Inner<'a> {
    logger: &'a Logger,
    level: Level,
    caller: Option<String>,
    fields: Map<String, Value>,
    error: Option<String>,
    stack: bool,
    annotation: Option<AnnotationStore>,
}

impl<'a> Entry<'a> {
    pub(crate) fn new(logger: &'a Logger, level: Level, caller: Option<String>) -> Self {
        Self {
            inner: Some(Inner {
                logger,
                level,
                caller,
                fields: Map::new(),
                error: None,
                stack: false,
                annotation: None,
            }),
        }
    }

    pub(crate) fn disabled() -> Self {
        Self { inner: None }
    }

    /// False when the entry will not be written.
    pub fn enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Serialize,
    {
        if let Some(inner) = self.inner.as_mut() {
            match serde_json::to_value(value) {
                Ok(value) => {
                    inner.fields.insert(key.into(), value);
                }
                Err(e) => inner.logger.report(&LogError::Serialize(e)),
            }
        }
        self
    }

    pub fn fields<I, K, V>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        fields
            .into_iter()
            .fold(self, |entry, (key, value)| entry.field(key, value))
    }

    /// Attach an error. Its `Display` text becomes the error field.
    pub fn err<E>(mut self, error: &E) -> Self
    where
        E: Error + ?Sized,
    {
        if let Some(inner) = self.inner.as_mut() {
            inner.error = Some(error.to_string());
        }
        self
    }

    /// Attach a stack trace regardless of level.
    pub fn with_stack(mut self) -> Self {
        if let Some(inner) = self.inner.as_mut() {
            inner.stack = true;
        }
        self
    }

    /// Merge `store` into this entry, overriding the logger's store.
    pub fn annotation(mut self, store: &AnnotationStore) -> Self {
        if let Some(inner) = self.inner.as_mut() {
            inner.annotation = Some(store.clone());
        }
        self
    }

    /// Write the entry with `message`.
    #[inline(never)]
    pub fn msg<M: fmt::Display>(self, message: M) {
        self.emit(message.to_string());
    }

    /// Write the entry with an empty message.
    #[inline(never)]
    pub fn send(self) {
        self.emit(String::new());
    }

    #[inline(never)]
    fn emit(self, message: String) {
        let Some(mut inner) = self.inner else {
            return;
        };
        let logger = inner.logger;
        let config = logger.config();
        let names = &config.field_names;

        for hook in logger.hooks() {
            hook.run(inner.level, &message, &mut inner.fields);
        }

        let annotation = match inner.annotation.as_ref().or(logger.annotation()) {
            Some(store) => match store.snapshot() {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    logger.report(&LogError::Annotation(e));
                    return;
                }
            },
            None => None,
        };

        let stack = if config.stack && (inner.stack || inner.level == Level::Error) {
            Some(stack::capture(STACK_SKIP, &config.frame_filter))
        } else {
            None
        };

        let mut record = Map::new();
        record.insert(names.level.clone(), Value::from(inner.level.as_str()));
        record.insert(names.timestamp.clone(), timestamp(config.timestamp_format));
        for (key, value) in logger.fields() {
            if !names.is_reserved(key) {
                record.insert(key.clone(), value.clone());
            }
        }
        if let Some(snapshot) = annotation {
            record.insert(names.annotation.clone(), Value::Object(snapshot));
        }
        for (key, value) in inner.fields {
            if !names.is_reserved(&key) {
                record.insert(key, value);
            }
        }
        if let Some(error) = inner.error {
            record.insert(names.error.clone(), Value::from(error));
        }
        if let Some(frames) = stack {
            match serde_json::to_value(frames) {
                Ok(frames) => {
                    record.insert(names.stack.clone(), frames);
                }
                Err(e) => logger.report(&LogError::Serialize(e)),
            }
        }
        if let Some(caller) = inner.caller {
            record.insert(names.caller.clone(), Value::from(caller));
        }
        record.insert(names.message.clone(), Value::from(message));

        match serde_json::to_vec(&record) {
            Ok(mut line) => {
                line.push(b'\n');
                logger.write_line(&line);
            }
            Err(e) => logger.report(&LogError::Serialize(e)),
        }
    }
}

impl fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => f
                .debug_struct("Entry")
                .field("level", &inner.level)
                .field("caller", &inner.caller)
                .field("fields", &inner.fields)
                .finish(),
            None => f.write_str("Entry(disabled)"),
        }
    }
}

fn timestamp(format: TimestampFormat) -> Value {
    let now = Utc::now();
    match format {
        TimestampFormat::Rfc3339 => Value::from(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        TimestampFormat::UnixMillis => Value::from(now.timestamp_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{new_logger, LoggerOptions};
    use crate::test_support::CaptureSink;

    #[test]
    fn test_disabled_entry_ignores_builders() {
        let sink = CaptureSink::new();
        let logger = new_logger(sink.clone(), LoggerOptions::new().with_level(Level::Error));

        let entry = logger.info().field("k", 1).with_stack();
        assert!(!entry.enabled());
        entry.msg("dropped");
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_send_writes_empty_message() {
        let sink = CaptureSink::new();
        let logger = new_logger(sink.clone(), LoggerOptions::new());
        logger.debug().fields([("a", 1), ("b", 2)]).send();

        let entry = &sink.entries()[0];
        assert_eq!(entry["message"], "");
        assert_eq!(entry["a"], 1);
        assert_eq!(entry["b"], 2);
    }

    #[test]
    fn test_with_stack_below_error() {
        let sink = CaptureSink::new();
        let logger = new_logger(sink.clone(), LoggerOptions::new());
        logger.info().with_stack().msg("traced");

        assert!(sink.entries()[0]["stack"].is_array());
    }

    #[test]
    fn test_rfc3339_timestamp_parses() {
        let value = timestamp(TimestampFormat::Rfc3339);
        let text = value.as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(text).is_ok());
    }
}
