#![forbid(unsafe_code)]

//! Explicit method dispatch table.
//!
//! Method names map to handler functions through a plain map built at
//! startup: no reflection, no dynamic resolution. Registration fails on
//! duplicates so a bad wiring is caught at construction, not at dispatch.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::RuntimeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodKind {
    /// Request/response operation; must produce a result payload.
    Action,
    /// Triggered unit of work; reports only success or failure.
    Job,
}

pub type HandlerResult = Result<Option<Value>, RuntimeError>;
pub type HandlerFn =
    Box<dyn for<'e> Fn(&mut ExecutionContext<'e>, &Value) -> HandlerResult + Send + Sync>;

pub struct MethodSpec {
    pub kind: MethodKind,
    handler: HandlerFn,
}

impl MethodSpec {
    pub fn invoke(&self, ctx: &mut ExecutionContext<'_>, params: &Value) -> HandlerResult {
        (self.handler)(ctx, params)
    }
}

impl std::fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodSpec")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum RegistryError {
    DuplicateMethod(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateMethod(name) => write!(f, "method registered twice: {name}"),
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Debug, Default)]
pub struct HandlerRegistry {
    methods: BTreeMap<String, MethodSpec>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_action<F>(&mut self, name: impl Into<String>, handler: F) -> Result<(), RegistryError>
    where
        F: for<'e> Fn(&mut ExecutionContext<'e>, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(name.into(), MethodKind::Action, Box::new(handler))
    }

    pub fn register_job<F>(&mut self, name: impl Into<String>, handler: F) -> Result<(), RegistryError>
    where
        F: for<'e> Fn(&mut ExecutionContext<'e>, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(name.into(), MethodKind::Job, Box::new(handler))
    }

    fn register(
        &mut self,
        name: String,
        kind: MethodKind,
        handler: HandlerFn,
    ) -> Result<(), RegistryError> {
        if self.methods.contains_key(&name) {
            return Err(RegistryError::DuplicateMethod(name));
        }
        self.methods.insert(name, MethodSpec { kind, handler });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.methods.keys().map(|name| name.as_str()).collect()
    }
}
