#![forbid(unsafe_code)]

mod support;

use gantry_core::permission::PermissionState;
use gantry_core::value::Value as ScalarValue;
use gantry_rpc::{ExecutionContext, HandlerRegistry};
use gantry_store::query::WriteMap;
use serde_json::{Value, json};
use support::*;

fn mark_job_ran(ctx: &ExecutionContext<'_>) -> Result<(), gantry_rpc::RuntimeError> {
    let mut values = WriteMap::new();
    values.set("didJobRun", ScalarValue::Bool(true));
    ctx.create("trackJob", &values)?;
    Ok(())
}

fn register_tracking_jobs(registry: &mut HandlerRegistry) {
    registry
        .register_job(
            "manualJob",
            |ctx: &mut ExecutionContext<'_>, _params: &Value| {
                mark_job_ran(ctx)?;
                Ok(None)
            },
        )
        .expect("register manualJob");

    // Mirrors a job that writes first and only then consults its own
    // denial condition.
    registry
        .register_job(
            "manualJobDeniedInCode",
            |ctx: &mut ExecutionContext<'_>, params: &Value| {
                mark_job_ran(ctx)?;
                let deny_it = params
                    .get("denyIt")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true);
                if deny_it {
                    return Err(ctx.deny());
                }
                Ok(None)
            },
        )
        .expect("register manualJobDeniedInCode");

    registry
        .register_action(
            "actionDeniedInCode",
            |ctx: &mut ExecutionContext<'_>, _params: &Value| {
                mark_job_ran(ctx)?;
                Err(ctx.deny_with("denied mid-action"))
            },
        )
        .expect("register actionDeniedInCode");

    registry
        .register_job(
            "manualJobWithException",
            |ctx: &mut ExecutionContext<'_>, _params: &Value| {
                mark_job_ran(ctx)?;
                Err(gantry_rpc::RuntimeError::Unknown {
                    message: "it blew up".to_string(),
                })
            },
        )
        .expect("register manualJobWithException");

    registry
        .register_job(
            "pendingAware",
            |ctx: &mut ExecutionContext<'_>, params: &Value| {
                mark_job_ran(ctx)?;
                match params.get("assert").and_then(|v| v.as_str()) {
                    Some("allow") => {
                        ctx.allow();
                        assert_eq!(ctx.permission(), PermissionState::Granted);
                    }
                    Some("deny") => return Err(ctx.deny()),
                    _ => {}
                }
                Ok(None)
            },
        )
        .expect("register pendingAware");
}

fn job_run_count(dispatcher: &mut gantry_rpc::Dispatcher) -> u64 {
    let response = dispatcher.dispatch(granted("listTrackJobs", json!({})));
    assert!(response.get("error").is_none(), "list failed: {response}");
    result_count(&response)
}

#[test]
fn denied_invocation_performs_zero_observable_writes() {
    let mut dispatcher = dispatcher_with(register_tracking_jobs);
    let response = dispatcher.dispatch(request("manualJob", json!({}), "denied"));
    assert_eq!(error_code(&response), Some("PERMISSION_DENIED"));
    assert_eq!(job_run_count(&mut dispatcher), 0);
}

#[test]
fn granted_job_commits_its_writes() {
    let mut dispatcher = dispatcher_with(register_tracking_jobs);
    let response = dispatcher.dispatch(granted("manualJob", json!({})));
    assert!(response.get("error").is_none());
    assert_eq!(job_run_count(&mut dispatcher), 1);
}

#[test]
fn in_body_deny_rolls_back_writes_performed_before_the_deny() {
    let mut dispatcher = dispatcher_with(register_tracking_jobs);
    let response = dispatcher.dispatch(granted(
        "manualJobDeniedInCode",
        json!({ "denyIt": true }),
    ));
    assert_eq!(error_code(&response), Some("PERMISSION_DENIED"));
    // Full-invocation atomicity: the write that preceded the deny is gone.
    assert_eq!(job_run_count(&mut dispatcher), 0);

    let response = dispatcher.dispatch(granted(
        "manualJobDeniedInCode",
        json!({ "denyIt": false }),
    ));
    assert!(response.get("error").is_none());
    assert_eq!(job_run_count(&mut dispatcher), 1);
}

#[test]
fn in_body_deny_has_the_same_contract_for_actions() {
    let mut dispatcher = dispatcher_with(register_tracking_jobs);
    let response = dispatcher.dispatch(granted("actionDeniedInCode", json!({})));
    assert_eq!(error_code(&response), Some("PERMISSION_DENIED"));
    assert_eq!(job_run_count(&mut dispatcher), 0);
}

#[test]
fn handler_error_rolls_back_and_surfaces_as_unknown() {
    let mut dispatcher = dispatcher_with(register_tracking_jobs);
    let response = dispatcher.dispatch(granted("manualJobWithException", json!({})));
    assert_eq!(error_code(&response), Some("UNKNOWN_ERROR"));
    assert_eq!(response["error"]["message"], json!("it blew up"));
    assert_eq!(job_run_count(&mut dispatcher), 0);
}

#[test]
fn pending_invocation_commits_on_normal_completion() {
    let mut dispatcher = dispatcher_with(register_tracking_jobs);
    let response = dispatcher.dispatch(request("pendingAware", json!({}), "pending"));
    assert!(response.get("error").is_none());
    assert_eq!(job_run_count(&mut dispatcher), 1);
}

#[test]
fn pending_invocation_with_explicit_allow_commits() {
    let mut dispatcher = dispatcher_with(register_tracking_jobs);
    let response = dispatcher.dispatch(request(
        "pendingAware",
        json!({ "assert": "allow" }),
        "pending",
    ));
    assert!(response.get("error").is_none());
    assert_eq!(job_run_count(&mut dispatcher), 1);
}

#[test]
fn pending_invocation_with_explicit_deny_rolls_back() {
    let mut dispatcher = dispatcher_with(register_tracking_jobs);
    let response = dispatcher.dispatch(request(
        "pendingAware",
        json!({ "assert": "deny" }),
        "pending",
    ));
    assert_eq!(error_code(&response), Some("PERMISSION_DENIED"));
    assert_eq!(job_run_count(&mut dispatcher), 0);
}

#[test]
fn failed_invocations_leave_later_invocations_untouched() {
    let mut dispatcher = dispatcher_with(register_tracking_jobs);

    let response = dispatcher.dispatch(granted("manualJobWithException", json!({})));
    assert_eq!(error_code(&response), Some("UNKNOWN_ERROR"));

    // The pool/connection is reusable after a rollback.
    let response = dispatcher.dispatch(granted("manualJob", json!({})));
    assert!(response.get("error").is_none());
    assert_eq!(job_run_count(&mut dispatcher), 1);
}
