//! Batching exporter with a background flush loop.
//!
//! Finished spans are pushed into a lock-free [`SpanBuffer`]. A tokio task
//! drains it every flush interval (or earlier once a batch is ready) and hands
//! batches to the configured [`SpanSink`]. A batch the sink rejects is kept
//! pending and retried on the next tick. Shutdown flushes everything left
//! under a deadline.

use crate::core::{Result, VigilError};
use crate::export::buffer::SpanBuffer;
use crate::export::SpanSink;
use crate::trace::{Span, SpanProcessor};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// Export buffer and flush behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Maximum spans held in memory, buffered and pending combined
    pub buffer_capacity: usize,
    /// Maximum spans per sink call
    pub batch_size: usize,
    /// Interval between background flushes
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    /// Default time budget for the final flush
    #[serde(with = "humantime_serde")]
    pub shutdown_deadline: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 2048,
            batch_size: 512,
            flush_interval: Duration::from_secs(5),
            shutdown_deadline: Duration::from_secs(10),
        }
    }
}

impl ExportConfig {
    /// Check the limits are usable
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(VigilError::config("export.buffer_capacity must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(VigilError::config("export.batch_size must be greater than 0"));
        }
        if self.batch_size > self.buffer_capacity {
            return Err(VigilError::config(format!(
                "export.batch_size ({}) cannot exceed export.buffer_capacity ({})",
                self.batch_size, self.buffer_capacity
            )));
        }
        if self.flush_interval.is_zero() {
            return Err(VigilError::config("export.flush_interval must be non-zero"));
        }
        if self.shutdown_deadline.is_zero() {
            return Err(VigilError::config("export.shutdown_deadline must be non-zero"));
        }
        Ok(())
    }
}

/// Point-in-time exporter counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    /// Spans waiting in the buffer
    pub queued: usize,
    /// Spans from failed batches awaiting retry
    pub pending: usize,
    /// Spans ever accepted
    pub total_buffered: u64,
    /// Spans dropped to stay within capacity
    pub dropped: u64,
    /// Spans the sink accepted
    pub exported: u64,
    /// Successful sink calls
    pub flushes: u64,
    /// Failed sink calls
    pub failed_flushes: u64,
    /// Spans abandoned when shutdown ran out of time
    pub lost_on_shutdown: u64,
}

struct Shared {
    buffer: SpanBuffer,
    sink: Arc<dyn SpanSink>,
    pending: Mutex<VecDeque<Span>>,
    pending_len: AtomicUsize,
    flush_notify: Notify,
    stop: Notify,
    accepting: AtomicBool,
    /// Pushes that passed the `accepting` check and have not landed yet
    pushing: AtomicUsize,
    /// Spans handed to the sink whose call has not returned
    in_flight: AtomicUsize,
    dropped_pending: AtomicU64,
    exported: AtomicU64,
    flushes: AtomicU64,
    failed_flushes: AtomicU64,
    lost_on_shutdown: AtomicU64,
    config: ExportConfig,
}

/// Owns the export buffer and the background flush task.
pub struct ExportCoordinator {
    shared: Arc<Shared>,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ExportCoordinator {
    /// Validate `config` and spawn the flush loop on the current tokio runtime
    pub fn start(sink: Arc<dyn SpanSink>, config: ExportConfig) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| VigilError::config("export coordinator must start inside a tokio runtime"))?;

        let shared = Arc::new(Shared {
            buffer: SpanBuffer::new(config.buffer_capacity)?,
            sink,
            pending: Mutex::new(VecDeque::new()),
            pending_len: AtomicUsize::new(0),
            flush_notify: Notify::new(),
            stop: Notify::new(),
            accepting: AtomicBool::new(true),
            pushing: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            dropped_pending: AtomicU64::new(0),
            exported: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
            lost_on_shutdown: AtomicU64::new(0),
            config,
        });

        let handle = runtime.spawn(Shared::flush_loop(Arc::clone(&shared)));
        tracing::debug!(
            sink = shared.sink.name(),
            capacity = shared.config.buffer_capacity,
            interval = ?shared.config.flush_interval,
            "Export coordinator started"
        );

        Ok(Self {
            shared,
            handle: parking_lot::Mutex::new(Some(handle)),
        })
    }

    /// Queue a finished span without blocking.
    ///
    /// Fails with [`VigilError::ShutDown`] once shutdown has begun.
    pub fn push(&self, span: Span) -> Result<()> {
        // Pairs with the SeqCst swap in `shutdown`: either this push sees the
        // flag cleared or shutdown waits for it before draining.
        self.shared.pushing.fetch_add(1, Ordering::SeqCst);
        if !self.shared.accepting.load(Ordering::SeqCst) {
            self.shared.pushing.fetch_sub(1, Ordering::SeqCst);
            return Err(VigilError::ShutDown);
        }
        self.shared.buffer.push(span);
        self.shared.pushing.fetch_sub(1, Ordering::SeqCst);
        if self.shared.buffer.len() >= self.shared.config.batch_size {
            self.shared.flush_notify.notify_one();
        }
        Ok(())
    }

    /// Ask the background task to flush now instead of at the next tick
    pub fn request_flush(&self) {
        self.shared.flush_notify.notify_one();
    }

    /// Whether spans are still accepted
    pub fn is_running(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
    }

    /// Export settings in use
    pub fn config(&self) -> &ExportConfig {
        &self.shared.config
    }

    /// Current counters
    pub fn stats(&self) -> ExportStats {
        let shared = &self.shared;
        ExportStats {
            queued: shared.buffer.len(),
            pending: shared.pending_len.load(Ordering::Relaxed),
            total_buffered: shared.buffer.total_buffered(),
            dropped: shared.buffer.total_dropped() + shared.dropped_pending.load(Ordering::Relaxed),
            exported: shared.exported.load(Ordering::Relaxed),
            flushes: shared.flushes.load(Ordering::Relaxed),
            failed_flushes: shared.failed_flushes.load(Ordering::Relaxed),
            lost_on_shutdown: shared.lost_on_shutdown.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting spans, stop the flush loop and deliver everything left.
    ///
    /// Sink failures are retried with backoff until `deadline`. Spans still
    /// undelivered at that point are discarded and reported through
    /// [`VigilError::ShutdownTimeout`].
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        if !self.shared.accepting.swap(false, Ordering::SeqCst) {
            return Err(VigilError::ShutDown);
        }
        self.shared.stop.notify_one();
        let mut handle = self.handle.lock().take();

        let drain = async {
            while self.shared.pushing.load(Ordering::SeqCst) > 0 {
                tokio::task::yield_now().await;
            }
            if let Some(handle) = handle.as_mut() {
                handle.await?;
            }
            self.shared.drain_all().await;
            Ok::<(), VigilError>(())
        };

        match tokio::time::timeout(deadline, drain).await {
            Ok(result) => {
                tracing::debug!(
                    exported = self.shared.exported.load(Ordering::Relaxed),
                    "Export coordinator shut down"
                );
                result
            },
            Err(_) => {
                if let Some(handle) = handle.filter(|h| !h.is_finished()) {
                    handle.abort();
                    let _ = handle.await;
                }
                let undelivered = self.shared.discard_all().await;
                self.shared
                    .lost_on_shutdown
                    .fetch_add(undelivered as u64, Ordering::Relaxed);
                let timeout_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
                tracing::error!(
                    undelivered,
                    timeout_ms,
                    sink = self.shared.sink.name(),
                    "Shutdown deadline exceeded, spans lost"
                );
                Err(VigilError::ShutdownTimeout {
                    undelivered,
                    timeout_ms,
                })
            },
        }
    }
}

impl SpanProcessor for ExportCoordinator {
    fn on_end(&self, span: Span) {
        if let Err(e) = self.push(span) {
            tracing::debug!(error = %e, "Span finished after exporter shutdown");
        }
    }
}

impl Drop for ExportCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

impl Shared {
    async fn flush_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.flush_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.stop.notified() => break,
                _ = interval.tick() => {},
                _ = self.flush_notify.notified() => {},
            }
            self.flush_once().await;
        }
    }

    /// Deliver pending spans, then whatever was buffered when the flush began.
    ///
    /// Returns false as soon as the sink rejects a batch.
    async fn flush_once(&self) -> bool {
        let batch_size = self.config.batch_size;
        let mut pending = self.pending.lock().await;

        while !pending.is_empty() {
            let take = batch_size.min(pending.len());
            let batch: Vec<Span> = pending.drain(..take).collect();
            if !self.deliver(&batch).await {
                for span in batch.into_iter().rev() {
                    pending.push_front(span);
                }
                self.trim_pending(&mut pending);
                return false;
            }
            self.pending_len.store(pending.len(), Ordering::Relaxed);
        }

        let mut remaining = self.buffer.len();
        while remaining > 0 {
            let batch = self.buffer.drain_batch(batch_size.min(remaining));
            if batch.is_empty() {
                break;
            }
            remaining = remaining.saturating_sub(batch.len());
            if !self.deliver(&batch).await {
                pending.extend(batch);
                self.trim_pending(&mut pending);
                return false;
            }
        }
        true
    }

    /// Hand `batch` to the sink. If this future is dropped mid-call the
    /// batch stays counted in `in_flight` so shutdown can report it lost.
    async fn deliver(&self, batch: &[Span]) -> bool {
        self.in_flight.fetch_add(batch.len(), Ordering::Relaxed);
        let outcome = self.sink.export(batch).await;
        self.in_flight.fetch_sub(batch.len(), Ordering::Relaxed);
        match outcome {
            Ok(()) => {
                self.exported.fetch_add(batch.len() as u64, Ordering::Relaxed);
                self.flushes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(spans = batch.len(), sink = self.sink.name(), "Flushed spans");
                true
            },
            Err(e) => {
                self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    spans = batch.len(),
                    sink = self.sink.name(),
                    category = e.category(),
                    error = %e,
                    "Sink rejected batch, will retry"
                );
                false
            },
        }
    }

    /// Drop the oldest pending spans until pending and buffered fit the capacity
    fn trim_pending(&self, pending: &mut VecDeque<Span>) {
        let capacity = self.config.buffer_capacity;
        let mut dropped = 0u64;
        while !pending.is_empty() && pending.len() + self.buffer.len() > capacity {
            pending.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            self.dropped_pending.fetch_add(dropped, Ordering::Relaxed);
            tracing::warn!(dropped, "Retry queue over capacity, dropped oldest pending spans");
        }
        self.pending_len.store(pending.len(), Ordering::Relaxed);
    }

    async fn drain_all(&self) {
        let mut attempt = 0u32;
        loop {
            if self.flush_once().await {
                if self.buffer.is_empty() && self.pending_len.load(Ordering::Relaxed) == 0 {
                    return;
                }
                continue;
            }
            attempt = attempt.saturating_add(1);
            let delay = Duration::from_millis(10u64 << attempt.min(7));
            tracing::warn!(attempt, ?delay, "Final flush failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    async fn discard_all(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let mut lost = pending.len();
        pending.clear();
        self.pending_len.store(0, Ordering::Relaxed);
        lost += self.buffer.drain_batch(usize::MAX).len();
        lost += self.in_flight.swap(0, Ordering::Relaxed);
        lost
    }
}
