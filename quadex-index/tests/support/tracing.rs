//! Span capture for verifying mutation instrumentation.
//!
//! Uses `tracing::subscriber::set_default()`, so each test gets its own
//! subscriber on the calling thread for as long as the guard lives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub name: &'static str,
    pub level: tracing::Level,
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct SpanStore(Arc<Mutex<Vec<CapturedSpan>>>);

impl SpanStore {
    pub fn has_span(&self, name: &str) -> bool {
        self.0.lock().unwrap().iter().any(|s| s.name == name)
    }

    pub fn find_span(&self, name: &str) -> Option<CapturedSpan> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }
}

struct SpanCaptureLayer {
    store: SpanStore,
}

impl<S> Layer<S> for SpanCaptureLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::span::Id,
        _ctx: Context<'_, S>,
    ) {
        let mut fields = FieldVisitor(HashMap::new());
        attrs.record(&mut fields);
        let meta = attrs.metadata();
        self.store.0.lock().unwrap().push(CapturedSpan {
            name: meta.name(),
            level: *meta.level(),
            fields: fields.0,
        });
    }
}

struct FieldVisitor(HashMap<String, String>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

/// Capture every span created on this thread while the guard is alive.
pub fn init_test_tracing() -> (SpanStore, tracing::subscriber::DefaultGuard) {
    let store = SpanStore::default();
    let layer = SpanCaptureLayer {
        store: store.clone(),
    };
    let subscriber = tracing_subscriber::registry::Registry::default().with(layer);
    let guard = tracing::subscriber::set_default(subscriber);
    (store, guard)
}
