#![forbid(unsafe_code)]

//! Span side channel.
//!
//! Exactly one span wraps each invocation, purely for observability. Sinks
//! are infallible by construction: a sink that cannot record simply drops
//! the span, and the transaction outcome is never affected.

use serde_json::Value;

pub trait TraceSink {
    fn span_start(&mut self, method: &str, tracing: &Value);
    /// `error_code` is `None` for a committed invocation, or the stable
    /// runtime error code for a failed one.
    fn span_end(&mut self, method: &str, error_code: Option<&str>);
}

/// Default sink: spans vanish.
#[derive(Debug, Default)]
pub struct NoopTrace;

impl TraceSink for NoopTrace {
    fn span_start(&mut self, _method: &str, _tracing: &Value) {}
    fn span_end(&mut self, _method: &str, _error_code: Option<&str>) {}
}
