#![forbid(unsafe_code)]

//! Permission/transaction guard.
//!
//! One invocation, one transaction: `Idle -> InTransaction -> {Committed,
//! RolledBack}`. An upfront denial never runs the handler; an in-body
//! denial and every handler error roll the whole invocation back. No write
//! from a non-committed invocation is observable outside this function.

use gantry_core::permission::PermissionState;
use gantry_core::schema::AppSchema;
use gantry_store::SqliteStore;
use serde_json::{Value, json};

use crate::context::ExecutionContext;
use crate::envelope::InvocationEnvelope;
use crate::error::RuntimeError;
use crate::registry::{MethodKind, MethodSpec};

pub(crate) fn run(
    store: &mut SqliteStore,
    app: &AppSchema,
    spec: &MethodSpec,
    envelope: &InvocationEnvelope,
) -> Result<Value, RuntimeError> {
    let tx = store.begin()?;

    if envelope.meta.permission == PermissionState::Denied {
        rollback(tx)?;
        return Err(RuntimeError::PermissionDenied { reason: None });
    }

    let mut ctx = ExecutionContext::new(
        envelope.method.clone(),
        envelope.meta.identity.clone(),
        envelope.meta.permission,
        &tx,
        app,
    );
    let outcome = spec.invoke(&mut ctx, &envelope.params);
    drop(ctx);

    match outcome {
        Ok(result) => {
            let payload = match (spec.kind, result) {
                (MethodKind::Action, Some(payload)) => payload,
                (MethodKind::Action, None) => {
                    rollback(tx)?;
                    return Err(RuntimeError::NoResultFromHandler {
                        method: envelope.method.clone(),
                    });
                }
                // Jobs have no caller-facing payload beyond success.
                (MethodKind::Job, _) => json!({}),
            };
            tx.commit().map_err(|err| RuntimeError::Internal {
                detail: format!("commit failed: {err}"),
            })?;
            Ok(payload)
        }
        Err(err) => {
            rollback(tx)?;
            Err(err)
        }
    }
}

fn rollback(tx: gantry_store::Transaction<'_>) -> Result<(), RuntimeError> {
    // A rollback that itself fails must never read as success.
    tx.rollback().map_err(|err| RuntimeError::Internal {
        detail: format!("rollback failed: {err}"),
    })
}
