#![forbid(unsafe_code)]

//! Per-invocation execution context.
//!
//! Owns the invocation's identity/metadata view and a borrow of the open
//! transaction; created by the guard and torn down with it, never shared
//! across invocations. Handlers reach the store exclusively through the
//! helpers here, so every statement runs inside the guarded transaction.

use gantry_core::permission::PermissionState;
use gantry_core::schema::{AppSchema, ModelSchema};
use gantry_store::Transaction;
use gantry_store::query::{self, Filter, Page, Row, WriteMap};

use crate::envelope::Identity;
use crate::error::RuntimeError;

pub struct ExecutionContext<'e> {
    method: String,
    identity: Option<Identity>,
    permission: PermissionState,
    tx: &'e Transaction<'e>,
    app: &'e AppSchema,
}

impl<'e> ExecutionContext<'e> {
    pub(crate) fn new(
        method: String,
        identity: Option<Identity>,
        permission: PermissionState,
        tx: &'e Transaction<'e>,
        app: &'e AppSchema,
    ) -> Self {
        Self {
            method,
            identity,
            permission,
            tx,
            app,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    /// Confirms a pending verdict. Only meaningful under `Pending`; the
    /// guard commits a normally-completing body either way, so this is an
    /// assertion of intent that tests and handlers can observe.
    pub fn allow(&mut self) {
        if self.permission == PermissionState::Pending {
            self.permission = PermissionState::Granted;
        }
    }

    /// Asserts denial. The returned error must be propagated out of the
    /// handler; the guard treats it exactly like an upfront denial and
    /// rolls back everything this invocation wrote.
    #[must_use]
    pub fn deny(&mut self) -> RuntimeError {
        self.permission = PermissionState::Denied;
        RuntimeError::PermissionDenied { reason: None }
    }

    #[must_use]
    pub fn deny_with(&mut self, reason: impl Into<String>) -> RuntimeError {
        self.permission = PermissionState::Denied;
        RuntimeError::PermissionDenied {
            reason: Some(reason.into()),
        }
    }

    pub fn model(&self, name: &str) -> Result<&'e ModelSchema, RuntimeError> {
        self.app.model(name).ok_or_else(|| RuntimeError::Validation {
            message: format!("unknown model: {name}"),
        })
    }

    pub fn app(&self) -> &'e AppSchema {
        self.app
    }

    pub fn find_many(
        &self,
        model: &str,
        filter: &Filter,
        page: Page,
    ) -> Result<Vec<Row>, RuntimeError> {
        let model = self.model(model)?;
        Ok(query::find_many(self.tx, self.app, model, filter, page)?)
    }

    pub fn find_one(&self, model: &str, filter: &Filter) -> Result<Option<Row>, RuntimeError> {
        let model = self.model(model)?;
        Ok(query::find_one(self.tx, self.app, model, filter)?)
    }

    pub fn create(&self, model: &str, values: &WriteMap) -> Result<Row, RuntimeError> {
        let model = self.model(model)?;
        Ok(query::create_row(self.tx, self.app, model, values)?)
    }

    pub fn update(&self, model: &str, id: &str, values: &WriteMap) -> Result<Row, RuntimeError> {
        let model = self.model(model)?;
        Ok(query::update_row(self.tx, self.app, model, id, values)?)
    }

    pub fn delete(&self, model: &str, id: &str) -> Result<(), RuntimeError> {
        let model = self.model(model)?;
        Ok(query::delete_row(self.tx, model, id)?)
    }

    /// Escape hatch for handlers with needs beyond the CRUD helpers; the
    /// statement still runs inside this invocation's transaction.
    pub fn transaction(&self) -> &'e Transaction<'e> {
        self.tx
    }
}
