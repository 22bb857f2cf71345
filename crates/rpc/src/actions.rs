#![forbid(unsafe_code)]

//! Generated CRUD actions.
//!
//! Every model gets the five standard actions the schema compiler would
//! emit for it: get/list/create/update/delete. Bodies are thin: parse the
//! params against model metadata, run through the context helpers, shape
//! the result.

use gantry_core::schema::ModelSchema;
use serde_json::{Value, json};

use crate::context::ExecutionContext;
use crate::error::RuntimeError;
use crate::params::{
    filter_from_params, page_from_params, params_object, required_id, write_map_from_params,
};
use crate::registry::{HandlerRegistry, HandlerResult, RegistryError};

pub fn register_model_crud(
    registry: &mut HandlerRegistry,
    model: &ModelSchema,
) -> Result<(), RegistryError> {
    let type_name = capitalize(&model.name);

    let name = model.name.clone();
    registry.register_action(
        format!("get{type_name}"),
        move |ctx: &mut ExecutionContext<'_>, params: &Value| get_action(ctx, &name, params),
    )?;

    let name = model.name.clone();
    registry.register_action(
        format!("list{type_name}s"),
        move |ctx: &mut ExecutionContext<'_>, params: &Value| list_action(ctx, &name, params),
    )?;

    let name = model.name.clone();
    registry.register_action(
        format!("create{type_name}"),
        move |ctx: &mut ExecutionContext<'_>, params: &Value| create_action(ctx, &name, params),
    )?;

    let name = model.name.clone();
    registry.register_action(
        format!("update{type_name}"),
        move |ctx: &mut ExecutionContext<'_>, params: &Value| update_action(ctx, &name, params),
    )?;

    let name = model.name.clone();
    registry.register_action(
        format!("delete{type_name}"),
        move |ctx: &mut ExecutionContext<'_>, params: &Value| delete_action(ctx, &name, params),
    )?;

    Ok(())
}

fn get_action(ctx: &mut ExecutionContext<'_>, model_name: &str, params: &Value) -> HandlerResult {
    let params = params_object(params)?;
    let model = ctx.model(model_name)?;
    let filter = filter_from_params(ctx.app(), model, &params)?;
    match ctx.find_one(model_name, &filter)? {
        Some(row) => Ok(Some(Value::Object(row))),
        None => Err(RuntimeError::RecordNotFound),
    }
}

fn list_action(ctx: &mut ExecutionContext<'_>, model_name: &str, params: &Value) -> HandlerResult {
    let params = params_object(params)?;
    let model = ctx.model(model_name)?;
    let filter = filter_from_params(ctx.app(), model, &params)?;
    let page = page_from_params(&params)?;
    let rows = ctx.find_many(model_name, &filter, page)?;
    let count = rows.len();
    let results = rows.into_iter().map(Value::Object).collect::<Vec<_>>();
    Ok(Some(json!({ "results": results, "count": count })))
}

fn create_action(
    ctx: &mut ExecutionContext<'_>,
    model_name: &str,
    params: &Value,
) -> HandlerResult {
    let params = params_object(params)?;
    let model = ctx.model(model_name)?;
    let values = params
        .get("values")
        .ok_or_else(|| RuntimeError::Validation {
            message: "values is required".to_string(),
        })?;
    let values = write_map_from_params(model, values)?;
    let row = ctx.create(model_name, &values)?;
    Ok(Some(Value::Object(row)))
}

fn update_action(
    ctx: &mut ExecutionContext<'_>,
    model_name: &str,
    params: &Value,
) -> HandlerResult {
    let params = params_object(params)?;
    let model = ctx.model(model_name)?;
    let id = required_id(&params)?;
    let values = params
        .get("values")
        .ok_or_else(|| RuntimeError::Validation {
            message: "values is required".to_string(),
        })?;
    let values = write_map_from_params(model, values)?;
    let row = ctx.update(model_name, &id, &values)?;
    Ok(Some(Value::Object(row)))
}

fn delete_action(
    ctx: &mut ExecutionContext<'_>,
    model_name: &str,
    params: &Value,
) -> HandlerResult {
    let params = params_object(params)?;
    let id = required_id(&params)?;
    ctx.delete(model_name, &id)?;
    Ok(Some(json!({ "deleted": true })))
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalizes_camel_case_model_names() {
        assert_eq!(capitalize("post"), "Post");
        assert_eq!(capitalize("trackJob"), "TrackJob");
    }
}
