#![forbid(unsafe_code)]

//! Action input parsing: JSON params into the typed condition language.
//!
//! Values are converted against the field's declared type, so a condition
//! reaches the store already carrying the right scalar kind; anything that
//! does not fit is a validation failure before any SQL exists.

use gantry_core::schema::{AppSchema, FieldType, ModelSchema};
use gantry_core::value::Value;
use gantry_store::query::{Condition, ConditionSet, Direction, Filter, Op, Page, WriteMap};
use serde_json::Map;

use crate::error::RuntimeError;

pub(crate) fn params_object(
    params: &serde_json::Value,
) -> Result<Map<String, serde_json::Value>, RuntimeError> {
    match params {
        serde_json::Value::Null => Ok(Map::new()),
        serde_json::Value::Object(map) => Ok(map.clone()),
        _ => Err(invalid("params must be an object")),
    }
}

/// Builds the filter for a list/get action from `where`, chained `orWhere`
/// alternatives and `orderBy`.
pub(crate) fn filter_from_params(
    app: &AppSchema,
    model: &ModelSchema,
    params: &Map<String, serde_json::Value>,
) -> Result<Filter, RuntimeError> {
    let mut first = match params.get("where") {
        None | Some(serde_json::Value::Null) => ConditionSet::new(),
        Some(serde_json::Value::Object(where_obj)) => {
            condition_set_from_where(app, model, where_obj)?
        }
        Some(_) => return Err(invalid("where must be an object")),
    };

    if let Some(order_by) = params.get("orderBy") {
        let serde_json::Value::Array(entries) = order_by else {
            return Err(invalid("orderBy must be an array"));
        };
        for entry in entries {
            let serde_json::Value::Object(entry) = entry else {
                return Err(invalid("orderBy entries must be objects"));
            };
            if entry.len() != 1 {
                return Err(invalid(
                    "orderBy entries must have exactly one field: direction pair",
                ));
            }
            for (field, direction) in entry {
                let direction = match direction.as_str() {
                    Some("asc") => Direction::Asc,
                    Some("desc") => Direction::Desc,
                    _ => return Err(invalid("orderBy direction must be asc or desc")),
                };
                first = first.ordered_by(field.clone(), direction);
            }
        }
    }

    let mut filter = Filter::from(first);

    match params.get("orWhere") {
        None | Some(serde_json::Value::Null) => {}
        Some(serde_json::Value::Array(alternatives)) => {
            for alternative in alternatives {
                let serde_json::Value::Object(where_obj) = alternative else {
                    return Err(invalid("orWhere entries must be objects"));
                };
                filter = filter.or(condition_set_from_where(app, model, where_obj)?);
            }
        }
        Some(_) => return Err(invalid("orWhere must be an array")),
    }

    Ok(filter)
}

fn condition_set_from_where(
    app: &AppSchema,
    model: &ModelSchema,
    where_obj: &Map<String, serde_json::Value>,
) -> Result<ConditionSet, RuntimeError> {
    let mut set = ConditionSet::new();
    for (field_path, constraint) in where_obj {
        let field_ty = resolve_field_type(app, model, field_path)?;
        match constraint {
            serde_json::Value::Object(operators) => {
                if operators.is_empty() {
                    return Err(invalid("constraint object must name an operator"));
                }
                for (operator, operand) in operators {
                    let op = op_from_json(operator, operand, field_ty)?;
                    set = set.with(Condition::new(field_path.clone(), op));
                }
            }
            // Direct-value shorthand is equality.
            scalar => {
                let value = value_from_json(field_ty, scalar)?;
                set = set.with(Condition::new(field_path.clone(), Op::Equals(value)));
            }
        }
    }
    Ok(set)
}

fn op_from_json(
    operator: &str,
    operand: &serde_json::Value,
    field_ty: &FieldType,
) -> Result<Op, RuntimeError> {
    let op = match operator {
        "equals" => Op::Equals(value_from_json(field_ty, operand)?),
        "notEquals" => Op::NotEquals(value_from_json(field_ty, operand)?),
        "contains" => Op::Contains(text_operand(operator, operand)?),
        "startsWith" => Op::StartsWith(text_operand(operator, operand)?),
        "endsWith" => Op::EndsWith(text_operand(operator, operand)?),
        "oneOf" => {
            let serde_json::Value::Array(members) = operand else {
                return Err(invalid("oneOf expects an array"));
            };
            let members = members
                .iter()
                .map(|member| value_from_json(field_ty, member))
                .collect::<Result<Vec<_>, _>>()?;
            Op::OneOf(members)
        }
        "greaterThan" => Op::GreaterThan(value_from_json(field_ty, operand)?),
        "greaterOrEqual" => Op::GreaterOrEqual(value_from_json(field_ty, operand)?),
        "lessThan" => Op::LessThan(value_from_json(field_ty, operand)?),
        "lessOrEqual" => Op::LessOrEqual(value_from_json(field_ty, operand)?),
        "before" => Op::Before(value_from_json(field_ty, operand)?),
        "after" => Op::After(value_from_json(field_ty, operand)?),
        "onOrBefore" => Op::OnOrBefore(value_from_json(field_ty, operand)?),
        "onOrAfter" => Op::OnOrAfter(value_from_json(field_ty, operand)?),
        _ => {
            return Err(RuntimeError::Validation {
                message: format!("unknown operator: {operator}"),
            });
        }
    };
    Ok(op)
}

fn text_operand(operator: &str, operand: &serde_json::Value) -> Result<String, RuntimeError> {
    operand
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| RuntimeError::Validation {
            message: format!("{operator} expects a string"),
        })
}

/// Converts one JSON scalar against a declared field type. Timestamps
/// travel as unix milliseconds.
pub(crate) fn value_from_json(
    field_ty: &FieldType,
    json: &serde_json::Value,
) -> Result<Value, RuntimeError> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    match field_ty {
        FieldType::Text | FieldType::Enum { .. } => json
            .as_str()
            .map(|s| Value::Text(s.to_string()))
            .ok_or_else(|| type_mismatch("a string", json)),
        FieldType::Number => json
            .as_i64()
            .map(Value::Integer)
            .ok_or_else(|| type_mismatch("an integer", json)),
        FieldType::Boolean => json
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| type_mismatch("a boolean", json)),
        FieldType::Timestamp => json
            .as_i64()
            .map(Value::Timestamp)
            .ok_or_else(|| type_mismatch("a unix-millisecond integer", json)),
    }
}

fn resolve_field_type<'a>(
    app: &'a AppSchema,
    model: &'a ModelSchema,
    path: &str,
) -> Result<&'a FieldType, RuntimeError> {
    match path.split_once('.') {
        None => model
            .field(path)
            .map(|field| &field.ty)
            .ok_or_else(|| RuntimeError::Validation {
                message: format!("unknown field {}.{path}", model.name),
            }),
        Some((relation_name, rest)) => {
            let relation = model.relation(relation_name).ok_or_else(|| {
                RuntimeError::Validation {
                    message: format!("unknown relation {}.{relation_name}", model.name),
                }
            })?;
            let referenced =
                app.model(&relation.references)
                    .ok_or_else(|| RuntimeError::Validation {
                        message: format!("unknown model {}", relation.references),
                    })?;
            referenced
                .field(rest)
                .map(|field| &field.ty)
                .ok_or_else(|| RuntimeError::Validation {
                    message: format!("unknown field {}.{rest}", referenced.name),
                })
        }
    }
}

pub(crate) fn write_map_from_params(
    model: &ModelSchema,
    values: &serde_json::Value,
) -> Result<WriteMap, RuntimeError> {
    let serde_json::Value::Object(values) = values else {
        return Err(invalid("values must be an object"));
    };
    let mut map = WriteMap::new();
    for (field_name, json) in values {
        let field = model
            .field(field_name)
            .ok_or_else(|| RuntimeError::Validation {
                message: format!("unknown field {}.{field_name}", model.name),
            })?;
        map.set(field_name.clone(), value_from_json(&field.ty, json)?);
    }
    Ok(map)
}

pub(crate) fn page_from_params(
    params: &Map<String, serde_json::Value>,
) -> Result<Page, RuntimeError> {
    let mut page = Page::default();
    if let Some(limit) = params.get("limit") {
        page.limit = Some(
            limit
                .as_u64()
                .ok_or_else(|| invalid("limit must be a non-negative integer"))?,
        );
    }
    if let Some(offset) = params.get("offset") {
        page.offset = Some(
            offset
                .as_u64()
                .ok_or_else(|| invalid("offset must be a non-negative integer"))?,
        );
    }
    Ok(page)
}

pub(crate) fn required_id(
    params: &Map<String, serde_json::Value>,
) -> Result<String, RuntimeError> {
    params
        .get("id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| invalid("id must be a string"))
}

fn invalid(message: &str) -> RuntimeError {
    RuntimeError::Validation {
        message: message.to_string(),
    }
}

fn type_mismatch(expected: &str, json: &serde_json::Value) -> RuntimeError {
    RuntimeError::Validation {
        message: format!("expected {expected}, got {json}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::schema::{FieldDef, ModelSchema};
    use serde_json::json;

    fn app() -> AppSchema {
        let mut post = ModelSchema::new("post", "post");
        post.push_field(FieldDef {
            name: "title".to_string(),
            column: "title".to_string(),
            ty: FieldType::Text,
            nullable: true,
            unique: false,
        });
        post.push_field(FieldDef {
            name: "views".to_string(),
            column: "views".to_string(),
            ty: FieldType::Number,
            nullable: false,
            unique: false,
        });
        AppSchema::new(vec![post])
    }

    fn parse_filter(params: serde_json::Value) -> Result<Filter, RuntimeError> {
        let app = app();
        let model = app.model("post").expect("post model");
        let params = params_object(&params)?;
        filter_from_params(&app, model, &params)
    }

    #[test]
    fn direct_value_shorthand_is_equality() {
        let filter = parse_filter(json!({ "where": { "title": "Fred" } })).expect("parse");
        assert_eq!(filter.sets().len(), 1);
        assert_eq!(
            filter.sets()[0].conditions,
            vec![Condition::equals("title", "Fred")]
        );
    }

    #[test]
    fn operator_objects_parse_per_type() {
        let filter = parse_filter(json!({
            "where": {
                "title": { "contains": "re" },
                "views": { "greaterThan": 3 },
            }
        }))
        .expect("parse");
        let conditions = &filter.sets()[0].conditions;
        assert!(conditions.contains(&Condition::contains("title", "re")));
        assert!(conditions.contains(&Condition::new(
            "views",
            Op::GreaterThan(Value::Integer(3))
        )));
    }

    #[test]
    fn unknown_operator_is_invalid_input() {
        let err = parse_filter(json!({ "where": { "title": { "matches": "x" } } }))
            .expect_err("must fail");
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn operand_type_mismatch_is_invalid_input() {
        let err =
            parse_filter(json!({ "where": { "views": { "equals": "three" } } })).expect_err("must fail");
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn or_where_adds_alternative_sets() {
        let filter = parse_filter(json!({
            "where": { "title": "a" },
            "orWhere": [ { "title": "b" } ],
        }))
        .expect("parse");
        assert_eq!(filter.sets().len(), 2);
    }

    #[test]
    fn order_by_entries_parse_in_declaration_order() {
        let filter = parse_filter(json!({
            "orderBy": [ { "views": "desc" }, { "title": "asc" } ],
        }))
        .expect("parse");
        assert_eq!(
            filter.sets()[0].order_by,
            vec![
                ("views".to_string(), Direction::Desc),
                ("title".to_string(), Direction::Asc),
            ]
        );
    }
}
