//! Delivery of finished spans to an external trace sink.

pub mod buffer;
pub mod coordinator;

pub use buffer::SpanBuffer;
pub use coordinator::{ExportConfig, ExportCoordinator, ExportStats};

use crate::core::Result;
use crate::trace::Span;
use async_trait::async_trait;

/// Destination for batches of finished spans.
///
/// Errors are contained by the [`ExportCoordinator`], which retries the batch
/// on its next flush.
#[async_trait]
pub trait SpanSink: Send + Sync {
    /// Deliver one batch, in the order the spans finished
    async fn export(&self, batch: &[Span]) -> Result<()>;

    /// Name used in log events
    fn name(&self) -> &str {
        "sink"
    }
}

/// Writes every span as one JSON document through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

#[async_trait]
impl SpanSink for LoggingSink {
    async fn export(&self, batch: &[Span]) -> Result<()> {
        for span in batch {
            let json = serde_json::to_string(span)?;
            tracing::info!(target: "vigil::spans", span = %json, "span exported");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
