#![forbid(unsafe_code)]

//! Transport-agnostic request router.
//!
//! Resolves the method through the explicit registry, wraps the guarded
//! execution in one trace span, and shapes every outcome (success or any
//! escaping error) into the uniform response envelope. An unknown method
//! fails before the guard, so no transaction is ever opened for it.

use gantry_core::schema::AppSchema;
use gantry_store::SqliteStore;
use serde_json::Value;

use crate::envelope::{InvocationEnvelope, error_envelope, success_envelope};
use crate::error::RuntimeError;
use crate::guard;
use crate::registry::HandlerRegistry;
use crate::trace::{NoopTrace, TraceSink};

pub struct Dispatcher {
    app: AppSchema,
    registry: HandlerRegistry,
    store: SqliteStore,
    trace: Box<dyn TraceSink + Send>,
}

impl Dispatcher {
    pub fn new(app: AppSchema, registry: HandlerRegistry, store: SqliteStore) -> Self {
        Self {
            app,
            registry,
            store,
            trace: Box::new(NoopTrace),
        }
    }

    pub fn with_trace_sink(mut self, sink: Box<dyn TraceSink + Send>) -> Self {
        self.trace = sink;
        self
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.registry.method_names()
    }

    /// Raw-text entry for line-oriented transports.
    pub fn dispatch_line(&mut self, raw: &str) -> Value {
        match serde_json::from_str::<Value>(raw) {
            Ok(request) => self.dispatch(request),
            Err(err) => error_envelope(
                &Value::Null,
                &RuntimeError::Validation {
                    message: format!("malformed request: {err}"),
                },
            ),
        }
    }

    pub fn dispatch(&mut self, request: Value) -> Value {
        let envelope = match InvocationEnvelope::parse(request) {
            Ok(envelope) => envelope,
            Err((id, err)) => return error_envelope(&id, &err),
        };

        let Some(spec) = self.registry.get(&envelope.method) else {
            return error_envelope(
                &envelope.id,
                &RuntimeError::MethodNotFound {
                    method: envelope.method.clone(),
                },
            );
        };

        self.trace
            .span_start(&envelope.method, &envelope.meta.tracing);
        let outcome = guard::run(&mut self.store, &self.app, spec, &envelope);
        match outcome {
            Ok(result) => {
                self.trace.span_end(&envelope.method, None);
                success_envelope(&envelope.id, result)
            }
            Err(err) => {
                self.trace.span_end(&envelope.method, Some(err.code()));
                error_envelope(&envelope.id, &err)
            }
        }
    }
}
