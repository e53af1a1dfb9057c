//! Lock-free bounded buffer of finished spans.
//!
//! Producers never wait: when the queue is full the oldest span is evicted to
//! make room for the newest one.

use crate::core::{Result, VigilError};
use crate::trace::Span;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bounded MPMC span queue with oldest-first eviction.
pub struct SpanBuffer {
    queue: ArrayQueue<Span>,
    total_buffered: AtomicU64,
    total_dropped: AtomicU64,
}

impl SpanBuffer {
    /// Create a buffer holding at most `capacity` spans
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(VigilError::config("export buffer capacity must be non-zero"));
        }
        Ok(Self {
            queue: ArrayQueue::new(capacity),
            total_buffered: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
        })
    }

    /// Append a span, evicting the oldest one if the buffer is full.
    ///
    /// Returns the evicted span, if any.
    #[inline]
    pub fn push(&self, span: Span) -> Option<Span> {
        self.total_buffered.fetch_add(1, Ordering::Relaxed);
        let evicted = self.queue.force_push(span);
        if let Some(old) = &evicted {
            self.total_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                trace_id = %old.trace_id,
                span_id = %old.span_id,
                "Export buffer full, dropped oldest span"
            );
        }
        evicted
    }

    /// Remove up to `max` spans in FIFO order
    pub fn drain_batch(&self, max: usize) -> Vec<Span> {
        let mut batch = Vec::with_capacity(max.min(self.queue.len()));
        while batch.len() < max {
            match self.queue.pop() {
                Some(span) => batch.push(span),
                None => break,
            }
        }
        batch
    }

    /// Spans currently queued
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Maximum number of queued spans
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Spans ever accepted, including later evicted ones
    pub fn total_buffered(&self) -> u64 {
        self.total_buffered.load(Ordering::Relaxed)
    }

    /// Spans evicted because the buffer was full
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }
}
