//! W3C trace-context propagation.
//!
//! Contexts travel in the `trace-context` metadata entry and are read and
//! written with OpenTelemetry's `TraceContextPropagator`. A value the
//! propagator cannot parse is kept as is and forwarded unchanged.

use std::collections::HashMap;

use opentelemetry::Context;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{SpanContext, TraceContextExt, TraceFlags, TraceState};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{IdGenerator, RandomIdGenerator};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::message::TRACE_CONTEXT_KEY;

const TRACEPARENT_HEADER: &str = "traceparent";

/// Trace context carried by a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    span: SpanContext,
    /// Raw metadata value the propagator rejected.
    opaque: Option<String>,
}

impl TraceContext {
    /// Starts a new sampled trace.
    pub fn new_root() -> Self {
        let ids = RandomIdGenerator::default();
        Self::from_span(SpanContext::new(
            ids.new_trace_id(),
            ids.new_span_id(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        ))
    }

    /// Returns a context in the same trace with a fresh span id.
    ///
    /// An opaque context has no span to descend from and is returned as is.
    pub fn child(&self) -> Self {
        if self.opaque.is_some() {
            return self.clone();
        }
        Self::from_span(SpanContext::new(
            self.span.trace_id(),
            RandomIdGenerator::default().new_span_id(),
            self.span.trace_flags(),
            true,
            self.span.trace_state().clone(),
        ))
    }

    /// Reads the context from message metadata.
    pub fn extract(metadata: &HashMap<String, String>) -> Option<Self> {
        let raw = metadata.get(TRACE_CONTEXT_KEY)?;
        let cx = TraceContextPropagator::new().extract(&MetadataExtractor(metadata));
        let span = cx.span().span_context().clone();
        if span.is_valid() {
            Some(Self::from_span(span))
        } else {
            Some(Self {
                span: SpanContext::empty_context(),
                opaque: Some(raw.clone()),
            })
        }
    }

    /// Writes the context into message metadata.
    pub fn inject(&self, metadata: &mut HashMap<String, String>) {
        match &self.opaque {
            Some(raw) => {
                metadata.insert(TRACE_CONTEXT_KEY.to_string(), raw.clone());
            }
            None => TraceContextPropagator::new()
                .inject_context(&self.to_context(), &mut MetadataInjector(metadata)),
        }
    }

    /// Makes this context the remote parent of `span`.
    pub fn attach(&self, span: &tracing::Span) {
        if self.is_valid() {
            span.set_parent(self.to_context());
        }
    }

    /// Returns true if the context was parsed rather than carried opaquely.
    pub fn is_valid(&self) -> bool {
        self.span.is_valid()
    }

    /// Returns the trace id as 32 lowercase hex digits, empty when opaque.
    pub fn trace_id(&self) -> String {
        if self.is_valid() {
            self.span.trace_id().to_string()
        } else {
            String::new()
        }
    }

    /// Returns the span id as 16 lowercase hex digits, empty when opaque.
    pub fn span_id(&self) -> String {
        if self.is_valid() {
            self.span.span_id().to_string()
        } else {
            String::new()
        }
    }

    /// Returns true if the sampled flag is set.
    pub fn is_sampled(&self) -> bool {
        self.span.is_sampled()
    }

    fn from_span(span: SpanContext) -> Self {
        Self { span, opaque: None }
    }

    fn to_context(&self) -> Context {
        Context::new().with_remote_span_context(self.span.clone())
    }
}

/// Maps the propagator's `traceparent` header onto the metadata key.
fn metadata_key(header: &str) -> &str {
    if header == TRACEPARENT_HEADER {
        TRACE_CONTEXT_KEY
    } else {
        header
    }
}

struct MetadataExtractor<'a>(&'a HashMap<String, String>);

impl Extractor for MetadataExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(metadata_key(key)).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.0
            .keys()
            .map(|key| {
                if key == TRACE_CONTEXT_KEY {
                    TRACEPARENT_HEADER
                } else {
                    key.as_str()
                }
            })
            .collect()
    }
}

struct MetadataInjector<'a>(&'a mut HashMap<String, String>);

impl Injector for MetadataInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if !value.is_empty() {
            self.0.insert(metadata_key(key).to_string(), value);
        }
    }
}
