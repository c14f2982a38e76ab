//! Bridge from `tracing`.

use std::fmt;

use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::bridge::{field_key, location, LoggerSource, TARGET_FIELD};
use crate::config::FieldNames;
use crate::level::Level;
use crate::logger::Logger;

/// Field listing the names of the spans enclosing an event, root first.
pub const SPANS_FIELD: &str = "spans";

/// A tracing layer that writes events through a [`Logger`].
#[derive(Debug, Clone, Default)]
pub struct TracingBridge {
    source: LoggerSource,
}

impl TracingBridge {
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

    /// Install a registry carrying this layer as the global subscriber.
    pub fn install(self) -> Result<(), SetGlobalDefaultError> {
        tracing::subscriber::set_global_default(tracing_subscriber::registry().with(self))
    }
}

impl<S> Layer<S> for TracingBridge
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: LayerContext<'_, S>) {
        let metadata = event.metadata();
        let level = Level::from(*metadata.level());
        let logger = self.source.resolve();
        if !logger.is_enabled(level) {
            return;
        }

        let mut visitor = FieldVisitor {
            names: &logger.config().field_names,
            message: String::new(),
            fields: Vec::new(),
        };
        event.record(&mut visitor);
        let FieldVisitor { message, fields, .. } = visitor;

        let spans: Vec<String> = ctx
            .event_scope(event)
            .map(|scope| scope.from_root().map(|span| span.name().to_string()).collect())
            .unwrap_or_default();

        let mut entry = logger
            .entry_at(level, location(metadata.file(), metadata.line()))
            .field(TARGET_FIELD, metadata.target());
        if !spans.is_empty() {
            entry = entry.field(SPANS_FIELD, spans);
        }
        entry.fields(fields).msg(message);
    }
}

struct FieldVisitor<'a> {
    names: &'a FieldNames,
    message: String,
    fields: Vec<(String, Value)>,
}

impl FieldVisitor<'_> {
    fn push(&mut self, field: &Field, value: Value) {
        self.fields.push((field_key(self.names, field.name()), value));
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push(field, Value::from(value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push(field, Value::from(format!("{value:?}")));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, Value::from(value.to_string()));
    }
}
