//! Per-task current-span slot.
//!
//! A [`Context`] is threaded explicitly through the calls of one logical
//! thread of execution. Scoped spans borrow it mutably for their lifetime,
//! which makes the save/restore stack discipline a borrow-checker guarantee:
//! an inner scope must end before its parent can be touched again.

use crate::trace::types::SpanContext;

/// Carries the reference to the span currently open in one logical task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    current: Option<SpanContext>,
}

impl Context {
    /// A root context with no current span
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose current span is `parent`, e.g. one received from
    /// another task
    pub fn with_parent(parent: SpanContext) -> Self {
        Self {
            current: Some(parent),
        }
    }

    /// The span currently open in this context
    pub fn current_span(&self) -> Option<SpanContext> {
        self.current
    }

    /// Independent copy for a spawned task, rooted at the current span.
    ///
    /// Spans opened through the fork never change this context.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    pub(crate) fn replace(&mut self, span: Option<SpanContext>) -> Option<SpanContext> {
        std::mem::replace(&mut self.current, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::types::{SpanId, TraceId};

    #[test]
    fn test_fork_is_independent() {
        let parent = SpanContext {
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
            sampled: true,
        };
        let cx = Context::with_parent(parent);
        let mut forked = cx.fork();
        forked.replace(None);

        assert_eq!(cx.current_span(), Some(parent));
        assert_eq!(forked.current_span(), None);
        assert_eq!(Context::new().current_span(), None);
    }
}
