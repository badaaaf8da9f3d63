//! A `tracing_subscriber::Layer` that turns spans and events into
//! [`LogRecord`]s and hands them to a caller-supplied handler, mirroring how
//! the host's own log pipeline turns its tracing output into structured
//! records rather than formatted text.

use crate::{LogLevel, LogRecord};
use std::collections::BTreeMap;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;

/// Holds the fields accumulated for one span, attached as a tracing
/// extension so they survive between `on_new_span` and `on_close`.
struct SpanFields(BTreeMap<String, serde_json::Value>, String);

/// A `Layer<H>` calls `handler` with one [`LogRecord`] per event, nesting
/// the event's enclosing spans (outermost first) into `spans`.
pub struct Layer<H> {
    handler: H,
}

impl<H> Layer<H>
where
    H: Fn(LogRecord) + Send + Sync + 'static,
{
    pub fn new(handler: H) -> Self {
        Layer { handler }
    }
}

impl<H, S> tracing_subscriber::Layer<S> for Layer<H>
where
    H: Fn(LogRecord) + Send + Sync + 'static,
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: Context<'_, S>,
    ) {
        let span = ctx.span(id).expect("span must exist in on_new_span");
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut()
            .insert(SpanFields(visitor.fields, attrs.metadata().name().to_string()));
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let message = visitor
            .fields
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();

        let spans = ctx
            .event_scope(event)
            .into_iter()
            .flat_map(|scope| scope)
            .map(|span| {
                let ext = span.extensions();
                let fields = ext
                    .get::<SpanFields>()
                    .map(|f| f.0.clone())
                    .unwrap_or_default();
                let name = ext
                    .get::<SpanFields>()
                    .map(|f| f.1.clone())
                    .unwrap_or_else(|| span.name().to_string());
                LogRecord {
                    timestamp: time::OffsetDateTime::now_utc(),
                    level: LogLevel::Info,
                    message: name,
                    fields,
                    spans: Vec::new(),
                }
            })
            // Innermost span was yielded first by `event_scope`; reverse so
            // `spans[0]` is the outermost, matching call-stack reading order.
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        (self.handler)(LogRecord {
            timestamp: time::OffsetDateTime::now_utc(),
            level: LogLevel::from(event.metadata().level()),
            message,
            fields: visitor.fields,
            spans,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    fields: BTreeMap<String, serde_json::Value>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::prelude::*;

    #[test]
    fn captures_event_message_and_fields() {
        let captured: Arc<Mutex<Vec<LogRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let layer = Layer::new(move |record| sink.lock().unwrap().push(record));

        tracing::subscriber::with_default(tracing_subscriber::registry().with(layer), || {
            tracing::info!(shard = 3, "dispatched command");
        });

        let records = captured.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "dispatched command");
        assert_eq!(records[0].level, LogLevel::Info);
        assert_eq!(records[0].fields.get("shard").unwrap(), &serde_json::json!(3));
    }

    #[test]
    fn nests_enclosing_span_names() {
        let captured: Arc<Mutex<Vec<LogRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let layer = Layer::new(move |record| sink.lock().unwrap().push(record));

        tracing::subscriber::with_default(tracing_subscriber::registry().with(layer), || {
            let span = tracing::info_span!("fan_out", index = "idx");
            let _guard = span.enter();
            tracing::warn!("shard timed out");
        });

        let records = captured.lock().unwrap();
        assert_eq!(records[0].spans.len(), 1);
        assert_eq!(records[0].spans[0].message, "fan_out");
    }
}
