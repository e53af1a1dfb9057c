//! Common test utilities and fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use vigil_lib::core::{Config, ConfigBuilder, Result, VigilError};
use vigil_lib::export::SpanSink;
use vigil_lib::trace::{Span, SpanId, SpanKind, SpanStatus, TraceId};

/// Sink that keeps every exported span in memory.
#[derive(Default)]
pub struct CollectingSink {
    spans: Mutex<Vec<Span>>,
    batches: AtomicUsize,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.spans.lock().iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.spans.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.lock().is_empty()
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn find(&self, name: &str) -> Option<Span> {
        self.spans.lock().iter().find(|s| s.name == name).cloned()
    }
}

#[async_trait]
impl SpanSink for CollectingSink {
    async fn export(&self, batch: &[Span]) -> Result<()> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.spans.lock().extend_from_slice(batch);
        Ok(())
    }

    fn name(&self) -> &str {
        "collecting"
    }
}

/// Sink that fails a fixed number of calls before delegating to a
/// [`CollectingSink`]. `usize::MAX` failures means it never recovers.
pub struct FlakySink {
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
    inner: Arc<CollectingSink>,
}

impl FlakySink {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            inner: CollectingSink::new(),
        })
    }

    pub fn delivered(&self) -> &CollectingSink {
        &self.inner
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpanSink for FlakySink {
    async fn export(&self, batch: &[Span]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if failing {
            return Err(VigilError::export("collector unavailable"));
        }
        self.inner.export(batch).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Config with a small buffer and a fast flush, suited to tests.
pub fn test_config(capacity: usize, batch_size: usize) -> Config {
    ConfigBuilder::new()
        .buffer_capacity(capacity)
        .batch_size(batch_size)
        .flush_interval(Duration::from_millis(20))
        .shutdown_deadline(Duration::from_secs(5))
        .build()
        .expect("test config is valid")
}

/// A finished span with the given name and fresh identifiers.
pub fn finished_span(name: &str) -> Span {
    let now = SystemTime::now();
    Span {
        trace_id: TraceId::generate(),
        span_id: SpanId::generate(),
        parent_span_id: None,
        name: name.to_string(),
        kind: SpanKind::Internal,
        start_time: now,
        end_time: now,
        status: SpanStatus::Ok,
        attributes: HashMap::new(),
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
