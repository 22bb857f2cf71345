#![forbid(unsafe_code)]

use gantry_core::schema::{ModelSchema, SchemaError};
use gantry_core::value::Value;

use crate::query::WriteMap;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    UnknownField {
        model: String,
        field: String,
    },
    UnknownRelation {
        model: String,
        relation: String,
    },
    InvalidOperator {
        field: String,
        operator: &'static str,
        field_type: &'static str,
    },
    InvalidOperand {
        field: String,
        expected: &'static str,
        got: &'static str,
    },
    InvalidEnumMember {
        field: String,
        value: String,
    },
    NotNullViolation {
        table: String,
        column: String,
        detail: String,
    },
    UniqueViolation {
        table: String,
        column: String,
        value: Option<Value>,
        detail: String,
    },
    ForeignKeyViolation {
        table: String,
        column: Option<String>,
        value: Option<Value>,
        detail: String,
    },
    RecordNotFound,
    Schema(SchemaError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::UnknownField { model, field } => {
                write!(f, "unknown field {model}.{field}")
            }
            Self::UnknownRelation { model, relation } => {
                write!(f, "unknown relation {model}.{relation}")
            }
            Self::InvalidOperator {
                field,
                operator,
                field_type,
            } => write!(
                f,
                "operator {operator} is not valid for {field_type} field {field}"
            ),
            Self::InvalidOperand {
                field,
                expected,
                got,
            } => write!(
                f,
                "operand for {field} must be {expected}, got {got}"
            ),
            Self::InvalidEnumMember { field, value } => {
                write!(f, "value {value:?} is not a member of enum field {field}")
            }
            Self::NotNullViolation { table, column, .. } => {
                write!(f, "not-null constraint failed on {table}.{column}")
            }
            Self::UniqueViolation { table, column, .. } => {
                write!(f, "unique constraint failed on {table}.{column}")
            }
            Self::ForeignKeyViolation { table, column, .. } => match column {
                Some(column) => {
                    write!(f, "foreign key constraint failed on {table}.{column}")
                }
                None => write!(f, "foreign key constraint failed on {table}"),
            },
            Self::RecordNotFound => write!(f, "record not found"),
            Self::Schema(err) => write!(f, "schema: {err}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<SchemaError> for StoreError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

/// Maps a write failure to its constraint variant. SQLite reports the
/// offending table and column in the failure message for not-null and
/// unique violations; foreign-key failures name neither, so the column and
/// value are recovered from the write map where possible.
pub(crate) fn translate_write_error(
    err: rusqlite::Error,
    model: &ModelSchema,
    values: &WriteMap,
) -> StoreError {
    let rusqlite::Error::SqliteFailure(_, Some(message)) = &err else {
        return StoreError::Sql(err);
    };

    if let Some(rest) = message.strip_prefix("NOT NULL constraint failed: ")
        && let Some((table, column)) = split_constraint_target(rest)
    {
        return StoreError::NotNullViolation {
            table,
            column,
            detail: message.clone(),
        };
    }

    if let Some(rest) = message.strip_prefix("UNIQUE constraint failed: ") {
        // A multi-column unique index reports "t.a, t.b"; keep the first
        // column as the diagnostic anchor.
        let first = rest.split(',').next().unwrap_or(rest).trim();
        if let Some((table, column)) = split_constraint_target(first) {
            let value = value_for_column(model, values, &column);
            return StoreError::UniqueViolation {
                table,
                column,
                value,
                detail: message.clone(),
            };
        }
    }

    if message.contains("FOREIGN KEY constraint failed") {
        let (column, value) = foreign_key_diagnostic(model, values);
        return StoreError::ForeignKeyViolation {
            table: model.table.clone(),
            column,
            value,
            detail: message.clone(),
        };
    }

    StoreError::Sql(err)
}

fn split_constraint_target(target: &str) -> Option<(String, String)> {
    let (table, column) = target.trim().split_once('.')?;
    Some((table.to_string(), column.to_string()))
}

fn value_for_column(model: &ModelSchema, values: &WriteMap, column: &str) -> Option<Value> {
    let field = model.fields.iter().find(|field| field.column == column)?;
    values.get(&field.name).cloned()
}

fn foreign_key_diagnostic(
    model: &ModelSchema,
    values: &WriteMap,
) -> (Option<String>, Option<Value>) {
    // SQLite does not say which reference failed; the first relationship
    // column present in the write map is the best available anchor.
    for relation in &model.belongs_to {
        let field = model
            .fields
            .iter()
            .find(|field| field.column == relation.foreign_key_column);
        if let Some(field) = field
            && let Some(value) = values.get(&field.name)
            && !value.is_null()
        {
            return (Some(relation.foreign_key_column.clone()), Some(value.clone()));
        }
    }
    (None, None)
}
