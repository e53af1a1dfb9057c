//! Span lifecycle: identities, sampling, explicit context propagation and
//! scoped spans.

pub mod context;
pub mod sampler;
pub mod tracer;
pub mod types;

pub use context::Context;
pub use sampler::{ProbabilitySampler, Sampler};
pub use tracer::{ScopedSpan, SpanBuilder, SpanProcessor, Tracer};
pub use types::{Span, SpanContext, SpanId, SpanKind, SpanState, SpanStatus, TraceId};
