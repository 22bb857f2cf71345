#![forbid(unsafe_code)]

//! Wire envelopes.
//!
//! A request is `{id, method, params, meta}`; `meta` carries the tracing
//! blob and the upstream permission verdict. A response is `{id, result}`
//! or `{id, error: {code, message, data?}}`, never both halves.

use gantry_core::permission::PermissionState;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::RuntimeError;

#[derive(Debug, Deserialize)]
struct WireRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    meta: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Clone, Debug)]
pub struct InvocationMeta {
    pub permission: PermissionState,
    pub identity: Option<Identity>,
    pub tracing: Value,
}

/// One inbound call, immutable once parsed.
#[derive(Clone, Debug)]
pub struct InvocationEnvelope {
    pub id: Value,
    pub method: String,
    pub params: Value,
    pub meta: InvocationMeta,
}

impl InvocationEnvelope {
    pub fn parse(request: Value) -> Result<Self, (Value, RuntimeError)> {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let wire: WireRequest = match serde_json::from_value(request) {
            Ok(wire) => wire,
            Err(err) => {
                return Err((
                    id,
                    RuntimeError::Validation {
                        message: format!("malformed request envelope: {err}"),
                    },
                ));
            }
        };

        let meta = match parse_meta(&wire.meta) {
            Ok(meta) => meta,
            Err(err) => return Err((wire.id, err)),
        };

        Ok(Self {
            id: wire.id,
            method: wire.method,
            params: wire.params,
            meta,
        })
    }
}

fn parse_meta(meta: &Value) -> Result<InvocationMeta, RuntimeError> {
    let status = meta
        .get("permissionState")
        .and_then(|v| v.get("status"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| RuntimeError::Validation {
            message: "meta.permissionState.status is required".to_string(),
        })?;
    // Fail closed on anything outside the tri-state.
    let permission = PermissionState::from_str(status).ok_or_else(|| RuntimeError::Validation {
        message: format!("meta.permissionState.status must be granted|pending|denied, got {status:?}"),
    })?;

    let identity = match meta.get("identity") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let id = value
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| RuntimeError::Validation {
                    message: "meta.identity.id must be a string".to_string(),
                })?;
            let email = value
                .get("email")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            Some(Identity {
                id: id.to_string(),
                email,
            })
        }
    };

    let tracing = meta.get("tracing").cloned().unwrap_or(Value::Null);

    Ok(InvocationMeta {
        permission,
        identity,
        tracing,
    })
}

pub fn success_envelope(id: &Value, result: Value) -> Value {
    json!({ "id": id, "result": result })
}

pub fn error_envelope(id: &Value, error: &RuntimeError) -> Value {
    let mut body = json!({
        "code": error.code(),
        "message": error.to_string(),
    });
    if let Some(data) = error.data()
        && let Some(obj) = body.as_object_mut()
    {
        obj.insert("data".to_string(), data);
    }
    json!({ "id": id, "error": body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(meta: Value) -> Value {
        json!({
            "id": 1,
            "method": "listPosts",
            "params": {},
            "meta": meta,
        })
    }

    #[test]
    fn parses_tri_state_and_identity() {
        let envelope = InvocationEnvelope::parse(request(json!({
            "permissionState": { "status": "pending" },
            "identity": { "id": "ident_1", "email": "ops@example.com" },
            "tracing": { "traceparent": "00-abc" },
        })))
        .expect("parse");
        assert_eq!(envelope.meta.permission, PermissionState::Pending);
        assert_eq!(
            envelope.meta.identity.as_ref().map(|i| i.id.as_str()),
            Some("ident_1")
        );
    }

    #[test]
    fn missing_permission_state_fails_closed() {
        let err = InvocationEnvelope::parse(request(json!({}))).expect_err("must fail");
        assert_eq!(err.1.code(), "INVALID_INPUT");
    }

    #[test]
    fn unrecognized_status_fails_closed() {
        let err = InvocationEnvelope::parse(request(json!({
            "permissionState": { "status": "approved" },
        })))
        .expect_err("must fail");
        assert_eq!(err.1.code(), "INVALID_INPUT");
        assert_eq!(err.0, json!(1));
    }

    #[test]
    fn error_envelope_carries_code_message_and_data() {
        let error = RuntimeError::UniqueConstraint {
            table: "post".to_string(),
            column: "title".to_string(),
            value: Some(json!("hello")),
            detail: "UNIQUE constraint failed: post.title".to_string(),
        };
        let envelope = error_envelope(&json!(7), &error);
        assert_eq!(envelope["id"], json!(7));
        assert_eq!(envelope["error"]["code"], json!("UNIQUE_VIOLATION"));
        assert_eq!(envelope["error"]["data"]["value"], json!("hello"));
        assert!(envelope.get("result").is_none());
    }
}
