//! Span creation, scoping and finalization.

use crate::trace::context::Context;
use crate::trace::sampler::Sampler;
use crate::trace::types::{Span, SpanContext, SpanId, SpanKind, SpanState, SpanStatus, TraceId};
use std::collections::HashMap;
use std::fmt::Display;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::SystemTime;

/// Receives finalized, sampled spans.
///
/// Called from the span-ending call site, so implementations must not block.
pub trait SpanProcessor: Send + Sync {
    /// Take ownership of a finished span
    fn on_end(&self, span: Span);
}

/// Creates spans and routes finished ones to a [`SpanProcessor`].
pub struct Tracer {
    sampler: Sampler,
    processor: Arc<dyn SpanProcessor>,
}

impl Tracer {
    /// Tracer applying `sampler` and handing sampled spans to `processor`
    pub fn new(sampler: Sampler, processor: Arc<dyn SpanProcessor>) -> Self {
        Self { sampler, processor }
    }

    /// The default sampling policy
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Start describing a span called `name`
    pub fn span_builder<S: Into<String>>(&self, name: S) -> SpanBuilder<'_> {
        SpanBuilder {
            tracer: self,
            name: name.into(),
            kind: SpanKind::default(),
            parent: Parent::Current,
            sampler: None,
            attributes: HashMap::new(),
        }
    }

    /// Run `f` inside a scoped span named `name`.
    ///
    /// An `Err` from `f` marks the span failed before it ends.
    pub fn in_span<T, E, F>(&self, cx: &mut Context, name: &str, f: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce(&mut Context) -> Result<T, E>,
    {
        let mut scope = self.span_builder(name).start_scoped_span(cx);
        let result = f(&mut *scope);
        if let Err(e) = &result {
            scope.set_status(SpanStatus::Error(e.to_string()));
        }
        result
    }
}

enum Parent {
    Current,
    Explicit(SpanContext),
    Root,
}

/// Describes a span before it starts.
pub struct SpanBuilder<'t> {
    tracer: &'t Tracer,
    name: String,
    kind: SpanKind,
    parent: Parent,
    sampler: Option<Sampler>,
    attributes: HashMap<String, String>,
}

impl<'t> SpanBuilder<'t> {
    /// Set the span kind
    pub fn kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Use `parent` instead of the context's current span
    pub fn with_parent(mut self, parent: SpanContext) -> Self {
        self.parent = Parent::Explicit(parent);
        self
    }

    /// Start a new trace even if the context has a current span
    pub fn root(mut self) -> Self {
        self.parent = Parent::Root;
        self
    }

    /// Override the tracer's sampler for this span
    pub fn sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Attach an attribute
    pub fn attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Start the span and make it current in `cx` until the returned guard
    /// is dropped.
    pub fn start_scoped_span<'a>(self, cx: &'a mut Context) -> ScopedSpan<'a>
    where
        't: 'a,
    {
        let parent = match self.parent {
            Parent::Current => cx.current_span(),
            Parent::Explicit(parent) => Some(parent),
            Parent::Root => None,
        };
        let trace_id = parent.map_or_else(TraceId::generate, |p| p.trace_id);
        let sampler = self.sampler.as_ref().unwrap_or(&self.tracer.sampler);
        let span_context = SpanContext {
            trace_id,
            span_id: SpanId::generate(),
            sampled: sampler.should_sample(parent.as_ref(), trace_id),
        };

        let start_time = SystemTime::now();
        let mut scope = ScopedSpan {
            tracer: self.tracer,
            saved: None,
            cx,
            span_context,
            state: SpanState::Created,
            data: Some(Span {
                trace_id,
                span_id: span_context.span_id,
                parent_span_id: parent.map(|p| p.span_id),
                name: self.name,
                kind: self.kind,
                start_time,
                end_time: start_time,
                status: SpanStatus::Unset,
                attributes: self.attributes,
            }),
        };
        scope.saved = scope.cx.replace(Some(span_context));
        scope.state = SpanState::Active;
        scope
    }
}

/// Guard for an active span.
///
/// Dropping the guard ends the span and restores the context's previous
/// current span, on every exit path including `?` and panics. The guard
/// dereferences to the [`Context`] it borrowed so children can be opened
/// through it.
pub struct ScopedSpan<'a> {
    tracer: &'a Tracer,
    cx: &'a mut Context,
    saved: Option<SpanContext>,
    span_context: SpanContext,
    state: SpanState,
    data: Option<Span>,
}

impl ScopedSpan<'_> {
    /// Identity of this span
    pub fn span_context(&self) -> SpanContext {
        self.span_context
    }

    /// Whether the span will be exported
    pub fn is_sampled(&self) -> bool {
        self.span_context.sampled
    }

    /// Lifecycle state
    pub fn state(&self) -> SpanState {
        self.state
    }

    /// Set the final status
    pub fn set_status(&mut self, status: SpanStatus) {
        if let Some(data) = self.data.as_mut() {
            data.status = status;
        }
    }

    /// Attach an attribute
    pub fn set_attribute<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        if let Some(data) = self.data.as_mut() {
            data.attributes.insert(key.into(), value.into());
        }
    }

    /// End the span now
    pub fn end(self) {}

    fn finish(&mut self) {
        let Some(mut span) = self.data.take() else {
            return;
        };
        span.end_time = SystemTime::now();
        if span.status == SpanStatus::Unset {
            span.status = if std::thread::panicking() {
                SpanStatus::Error("panicked".to_string())
            } else {
                SpanStatus::Ok
            };
        }
        self.state = SpanState::Ended;
        self.cx.replace(self.saved);

        if self.span_context.sampled {
            self.tracer.processor.on_end(span);
        }
    }
}

impl Deref for ScopedSpan<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.cx
    }
}

impl DerefMut for ScopedSpan<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.cx
    }
}

impl Drop for ScopedSpan<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
