#![forbid(unsafe_code)]

//! Loads compiled model metadata from its JSON form.
//!
//! The wire format is the schema compiler's output, not a user surface:
//! models with typed fields and belongs-to relationships. Column names
//! default to the snake_case of the field name; a relationship's foreign
//! key defaults to `<relation>_id`.

use gantry_core::schema::{AppSchema, BelongsTo, FieldDef, FieldType, ModelSchema};
use serde_json::Value;
use std::path::Path;

use crate::error::RuntimeError;

pub fn load_app_schema(path: &Path) -> Result<AppSchema, RuntimeError> {
    let raw = std::fs::read_to_string(path).map_err(|err| RuntimeError::Validation {
        message: format!("cannot read schema file {}: {err}", path.display()),
    })?;
    let json: Value = serde_json::from_str(&raw).map_err(|err| RuntimeError::Validation {
        message: format!("schema file is not valid JSON: {err}"),
    })?;
    app_schema_from_json(&json)
}

pub fn app_schema_from_json(json: &Value) -> Result<AppSchema, RuntimeError> {
    let models = json
        .get("models")
        .and_then(|v| v.as_array())
        .ok_or_else(|| invalid("schema must have a models array"))?;

    let mut parsed = Vec::with_capacity(models.len());
    for model in models {
        parsed.push(model_from_json(model)?);
    }

    let app = AppSchema::new(parsed);
    app.validate().map_err(|err| RuntimeError::Validation {
        message: format!("schema: {err}"),
    })?;
    Ok(app)
}

fn model_from_json(json: &Value) -> Result<ModelSchema, RuntimeError> {
    let name = required_str(json, "name", "model")?;
    let table = match json.get("table").and_then(|v| v.as_str()) {
        Some(table) => table.to_string(),
        None => snake_case(&name),
    };

    let mut model = ModelSchema::new(name.clone(), table);

    if let Some(fields) = json.get("fields") {
        let fields = fields
            .as_array()
            .ok_or_else(|| invalid("fields must be an array"))?;
        for field in fields {
            model.push_field(field_from_json(field)?);
        }
    }

    match json.get("belongsTo") {
        None | Some(Value::Null) => {}
        Some(Value::Array(relations)) => {
            for relation in relations {
                let relation_name = required_str(relation, "name", "relation")?;
                let foreign_key_column = match relation
                    .get("foreignKeyColumn")
                    .and_then(|v| v.as_str())
                {
                    Some(column) => column.to_string(),
                    None => format!("{}_id", snake_case(&relation_name)),
                };
                let references = required_str(relation, "references", "relation")?;
                model.push_belongs_to(BelongsTo {
                    name: relation_name,
                    foreign_key_column,
                    references,
                });
            }
        }
        Some(_) => return Err(invalid("belongsTo must be an array")),
    }

    Ok(model)
}

fn field_from_json(json: &Value) -> Result<FieldDef, RuntimeError> {
    let name = required_str(json, "name", "field")?;
    let column = match json.get("column").and_then(|v| v.as_str()) {
        Some(column) => column.to_string(),
        None => snake_case(&name),
    };
    let ty = match json.get("type").and_then(|v| v.as_str()) {
        Some("text") => FieldType::Text,
        Some("number") => FieldType::Number,
        Some("boolean") => FieldType::Boolean,
        Some("timestamp") => FieldType::Timestamp,
        Some("enum") => {
            let values = json
                .get("values")
                .and_then(|v| v.as_array())
                .ok_or_else(|| invalid("enum fields must declare values"))?
                .iter()
                .map(|member| {
                    member
                        .as_str()
                        .map(|s| s.to_string())
                        .ok_or_else(|| invalid("enum values must be strings"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            FieldType::Enum { values }
        }
        Some(other) => {
            return Err(RuntimeError::Validation {
                message: format!(
                    "field type must be text|number|boolean|timestamp|enum, got {other:?}"
                ),
            });
        }
        None => return Err(invalid("field type is required")),
    };

    Ok(FieldDef {
        name,
        column,
        ty,
        nullable: json
            .get("nullable")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        unique: json.get("unique").and_then(|v| v.as_bool()).unwrap_or(false),
    })
}

fn required_str(json: &Value, key: &str, what: &str) -> Result<String, RuntimeError> {
    json.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| RuntimeError::Validation {
            message: format!("{what} {key} must be a string"),
        })
}

fn invalid(message: &str) -> RuntimeError {
    RuntimeError::Validation {
        message: message.to_string(),
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (index, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if index > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
