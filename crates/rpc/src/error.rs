#![forbid(unsafe_code)]

//! The runtime error taxonomy that crosses the boundary to the caller.
//!
//! Every failure leaving the guard is one of these variants, each with a
//! stable string code. Raw store/driver errors never leak verbatim; they
//! survive only inside the `detail` diagnostic of a matched variant.

use gantry_core::value::Value;
use gantry_store::StoreError;
use serde_json::json;

#[derive(Debug)]
pub enum RuntimeError {
    Validation {
        message: String,
    },
    NotNullConstraint {
        table: String,
        column: String,
        detail: String,
    },
    UniqueConstraint {
        table: String,
        column: String,
        value: Option<serde_json::Value>,
        detail: String,
    },
    ForeignKeyConstraint {
        table: String,
        column: Option<String>,
        value: Option<serde_json::Value>,
        detail: String,
    },
    RecordNotFound,
    MethodNotFound {
        method: String,
    },
    NoResultFromHandler {
        method: String,
    },
    PermissionDenied {
        reason: Option<String>,
    },
    Internal {
        detail: String,
    },
    Unknown {
        message: String,
    },
}

impl RuntimeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "INVALID_INPUT",
            Self::NotNullConstraint { .. } => "NOT_NULL_VIOLATION",
            Self::UniqueConstraint { .. } => "UNIQUE_VIOLATION",
            Self::ForeignKeyConstraint { .. } => "FOREIGN_KEY_VIOLATION",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            Self::NoResultFromHandler { .. } => "NO_RESULT_FROM_HANDLER",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::Internal { .. } => "INTERNAL_ERROR",
            Self::Unknown { .. } => "UNKNOWN_ERROR",
        }
    }

    /// Structured diagnostic payload. Only the constraint variants carry
    /// data; everything else is code + message.
    pub fn data(&self) -> Option<serde_json::Value> {
        match self {
            Self::NotNullConstraint {
                table,
                column,
                detail,
            } => Some(json!({
                "table": table,
                "column": column,
                "detail": detail,
            })),
            Self::UniqueConstraint {
                table,
                column,
                value,
                detail,
            } => Some(json!({
                "table": table,
                "column": column,
                "value": value.clone().unwrap_or(serde_json::Value::Null),
                "detail": detail,
            })),
            Self::ForeignKeyConstraint {
                table,
                column,
                value,
                detail,
            } => Some(json!({
                "table": table,
                "column": column.clone().map_or(serde_json::Value::Null, serde_json::Value::String),
                "value": value.clone().unwrap_or(serde_json::Value::Null),
                "detail": detail,
            })),
            _ => None,
        }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation { message } => write!(f, "invalid input: {message}"),
            Self::NotNullConstraint { table, column, .. } => {
                write!(f, "field '{column}' of '{table}' cannot be null")
            }
            Self::UniqueConstraint { table, column, .. } => {
                write!(f, "field '{column}' of '{table}' must be unique")
            }
            Self::ForeignKeyConstraint { table, column, .. } => match column {
                Some(column) => write!(
                    f,
                    "field '{column}' of '{table}' references a row that does not exist"
                ),
                None => write!(f, "'{table}' references a row that does not exist"),
            },
            Self::RecordNotFound => write!(f, "record not found"),
            Self::MethodNotFound { method } => write!(f, "method not found: {method}"),
            Self::NoResultFromHandler { method } => {
                write!(f, "no result returned from handler for {method}")
            }
            Self::PermissionDenied { reason } => match reason {
                Some(reason) => write!(f, "not permitted: {reason}"),
                None => write!(f, "not permitted"),
            },
            Self::Internal { detail } => write!(f, "internal error: {detail}"),
            Self::Unknown { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<StoreError> for RuntimeError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotNullViolation {
                table,
                column,
                detail,
            } => Self::NotNullConstraint {
                table,
                column,
                detail,
            },
            StoreError::UniqueViolation {
                table,
                column,
                value,
                detail,
            } => Self::UniqueConstraint {
                table,
                column,
                value: value.as_ref().map(json_scalar),
                detail,
            },
            StoreError::ForeignKeyViolation {
                table,
                column,
                value,
                detail,
            } => Self::ForeignKeyConstraint {
                table,
                column,
                value: value.as_ref().map(json_scalar),
                detail,
            },
            StoreError::RecordNotFound => Self::RecordNotFound,
            err @ (StoreError::InvalidInput(_)
            | StoreError::UnknownField { .. }
            | StoreError::UnknownRelation { .. }
            | StoreError::InvalidOperator { .. }
            | StoreError::InvalidOperand { .. }
            | StoreError::InvalidEnumMember { .. }
            | StoreError::Schema(_)) => Self::Validation {
                message: err.to_string(),
            },
            err @ (StoreError::Io(_) | StoreError::Sql(_)) => Self::Internal {
                detail: err.to_string(),
            },
        }
    }
}

/// Scalar -> JSON, used for diagnostic payloads.
pub(crate) fn json_scalar(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Text(text) => serde_json::Value::String(text.clone()),
        Value::Integer(n) | Value::Timestamp(n) => {
            serde_json::Value::Number(serde_json::Number::from(*n))
        }
        Value::Bool(flag) => serde_json::Value::Bool(*flag),
    }
}
