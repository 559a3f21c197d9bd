//! Integration test verifying that `#[instrument]` annotations produce
//! the expected span hierarchy on `MemoryBackend` operations.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};
use warden_storage::{MemoryBackend, StorageBackend};

// ---------------------------------------------------------------------------
// Collecting layer: records span names as they are entered
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_backend_set_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let backend = MemoryBackend::new();
    backend
        .set_with_ttl("key-1", b"value-1".to_vec(), Duration::from_secs(60))
        .await
        .expect("set should succeed");

    let recorded = spans.lock().expect("lock poisoned");
    assert!(
        recorded.iter().any(|s| s == "set_with_ttl"),
        "expected a 'set_with_ttl' span, got: {recorded:?}"
    );
}

#[tokio::test]
async fn memory_backend_get_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let backend = MemoryBackend::new();
    let _ = backend.get("missing").await;

    let recorded = spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "get"), "expected a 'get' span, got: {recorded:?}");
}

#[tokio::test]
async fn memory_backend_compare_and_delete_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let backend = MemoryBackend::new();
    let _ = backend.compare_and_delete("lock", b"token").await;

    let recorded = spans.lock().expect("lock poisoned");
    assert!(
        recorded.iter().any(|s| s == "compare_and_delete"),
        "expected a 'compare_and_delete' span, got: {recorded:?}"
    );
}

#[tokio::test]
async fn memory_backend_ping_creates_span() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let backend = MemoryBackend::new();
    let _ = backend.ping().await;

    let recorded = spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "ping"), "expected a 'ping' span, got: {recorded:?}");
}
