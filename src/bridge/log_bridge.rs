//! Bridge from the `log` crate.

use log::kv::{self, Key, VisitSource};
use log::{Log, Metadata, Record};
use serde_json::Value;

use crate::bridge::{field_key, location, LoggerSource, TARGET_FIELD};
use crate::config::FieldNames;
use crate::level::{global_level, Level};
use crate::logger::Logger;

/// `log::Log` implementation writing through a [`Logger`].
#[derive(Debug, Clone, Default)]
pub struct LogBridge {
    source: LoggerSource,
}

impl LogBridge {
    /// Bridge to the process default logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bridge to a fixed logger.
    pub fn with_logger(logger: Logger) -> Self {
        Self {
            source: LoggerSource::Fixed(logger),
        }
    }

    /// Install as the `log` facade's logger with `level` as the maximum
    /// forwarded level.
    pub fn install(self, level: Level) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level.to_level_filter());
        Ok(())
    }
}

impl Log for LogBridge {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        Level::from(metadata.level()) >= global_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = Level::from(record.level());
        let logger = self.source.resolve();
        if !logger.is_enabled(level) {
            return;
        }

        let mut fields = FieldCollector {
            names: &logger.config().field_names,
            fields: Vec::new(),
        };
        // A failing source still leaves the pairs visited so far.
        let _ = record.key_values().visit(&mut fields);
        let fields = fields.fields;

        logger
            .entry_at(level, location(record.file(), record.line()))
            .field(TARGET_FIELD, record.target())
            .fields(fields)
            .msg(record.args());
    }

    fn flush(&self) {}
}

struct FieldCollector<'a> {
    names: &'a FieldNames,
    fields: Vec<(String, Value)>,
}

impl<'kvs> VisitSource<'kvs> for FieldCollector<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: kv::Value<'kvs>) -> Result<(), kv::Error> {
        let value = if let Some(v) = value.to_bool() {
            Value::from(v)
        } else if let Some(v) = value.to_i64() {
            Value::from(v)
        } else if let Some(v) = value.to_u64() {
            Value::from(v)
        } else if let Some(v) = value.to_f64() {
            Value::from(v)
        } else {
            Value::from(value.to_string())
        };
        self.fields.push((field_key(self.names, key.as_str()), value));
        Ok(())
    }
}
