//! `tracing` → event logger bridge.
//!
//! Service diagnostics are written with the `tracing` macros. This layer
//! turns each `tracing` event into a [`LogEvent`] so that they share the
//! logger's destinations, redaction and level routing. The event target
//! becomes the context; a `correlation_id` field becomes the correlation id.

use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::logging::{EventLogger, LogEvent, LogLevel};

pub struct EventBridgeLayer {
    logger: EventLogger,
}

impl EventBridgeLayer {
    pub fn new(logger: EventLogger) -> Self {
        Self { logger }
    }
}

impl<S: Subscriber> Layer<S> for EventBridgeLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let level = LogLevel::from(*metadata.level());
        let mut log_event = LogEvent::new(level, visitor.message.unwrap_or_default())
            .with_context(metadata.target());
        if let Some(cid) = visitor.correlation_id {
            log_event = log_event.with_correlation_id(cid);
        }
        if !visitor.fields.is_empty() {
            log_event = log_event.with_data(Value::Object(visitor.fields));
        }
        self.logger.log(log_event);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    correlation_id: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => {
                self.message = Some(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
            }
            "correlation_id" => {
                self.correlation_id = Some(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
            }
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.insert(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::String(format!("{:?}", value)));
    }
}
