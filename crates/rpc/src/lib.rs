#![forbid(unsafe_code)]

//! gantry_rpc: the invocation side of the runtime.
//!
//! The dispatcher receives `{id, method, params, meta}` envelopes, resolves
//! the method through an explicit registry, and runs the handler inside the
//! permission/transaction guard: one invocation, one transaction, commit on
//! success and unconditional rollback on denial or error.

mod actions;
mod context;
mod dispatcher;
mod envelope;
mod error;
mod guard;
mod params;
mod registry;
mod schema_load;
mod session_log;
mod support;
mod trace;

pub use actions::register_model_crud;
pub use context::ExecutionContext;
pub use dispatcher::Dispatcher;
pub use envelope::{
    Identity, InvocationEnvelope, InvocationMeta, error_envelope, success_envelope,
};
pub use error::RuntimeError;
pub use registry::{HandlerRegistry, HandlerResult, MethodKind, RegistryError};
pub use schema_load::{app_schema_from_json, load_app_schema};
pub use session_log::{SessionLog, write_crash_record};
pub use trace::{NoopTrace, TraceSink};
