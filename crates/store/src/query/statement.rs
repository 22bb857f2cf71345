#![forbid(unsafe_code)]

//! Statement builders and transaction-scoped executors.
//!
//! Builders produce a `QueryPlan`; executors render it, bind the inputs
//! positionally and decode result rows back to field-keyed JSON objects.
//! Nothing here interpolates a caller value into statement text.

use gantry_core::schema::{AppSchema, FieldType, ModelSchema, PRIMARY_KEY_FIELD};
use gantry_core::value::Value;
use rusqlite::Transaction;
use serde_json::{Map, Number};

use crate::StoreError;
use crate::error::translate_write_error;
use crate::query::conditions::{self, Filter, check_operand};
use crate::query::{Page, QueryPlan, WriteMap, to_sql_value};

pub type Row = Map<String, serde_json::Value>;

pub fn select_plan(
    app: &AppSchema,
    model: &ModelSchema,
    filter: &Filter,
    page: Page,
) -> Result<QueryPlan, StoreError> {
    let compiled = conditions::compile(app, model, filter)?;

    let columns = model
        .fields
        .iter()
        .map(|field| format!("\"{}\".\"{}\"", model.table, field.column))
        .collect::<Vec<_>>()
        .join(", ");

    let mut plan = QueryPlan::new();
    plan.push_sql(format!("SELECT {columns} FROM \"{}\"", model.table));
    for join in &compiled.joins {
        plan.push_sql(join.render());
    }
    if !compiled.where_plan.is_empty() {
        plan.push_sql(" WHERE ");
        plan.append(compiled.where_plan);
    }
    if !compiled.order_sql.is_empty() {
        plan.push_sql(compiled.order_sql);
    }

    match (page.limit, page.offset) {
        (Some(limit), offset) => {
            plan.push_sql(" LIMIT ");
            plan.push_input(Value::Integer(to_i64(limit)?));
            if let Some(offset) = offset {
                plan.push_sql(" OFFSET ");
                plan.push_input(Value::Integer(to_i64(offset)?));
            }
        }
        (None, Some(offset)) => {
            // SQLite requires a LIMIT clause before OFFSET; -1 means unbounded.
            plan.push_sql(" LIMIT -1 OFFSET ");
            plan.push_input(Value::Integer(to_i64(offset)?));
        }
        (None, None) => {}
    }

    Ok(plan)
}

pub fn insert_plan(model: &ModelSchema, values: &WriteMap) -> Result<QueryPlan, StoreError> {
    validate_write(model, values)?;

    let mut plan = QueryPlan::new();
    if values.is_empty() {
        plan.push_sql(format!("INSERT INTO \"{}\" DEFAULT VALUES", model.table));
        return Ok(plan);
    }

    let mut columns = Vec::new();
    let mut inputs = Vec::new();
    for (field_name, value) in values.iter() {
        let field = model.field(field_name).ok_or_else(|| StoreError::UnknownField {
            model: model.name.clone(),
            field: field_name.to_string(),
        })?;
        columns.push(format!("\"{}\"", field.column));
        inputs.push(value.clone());
    }

    plan.push_sql(format!(
        "INSERT INTO \"{}\" ({}) VALUES (",
        model.table,
        columns.join(", ")
    ));
    for (index, value) in inputs.into_iter().enumerate() {
        if index > 0 {
            plan.push_sql(", ");
        }
        plan.push_input(value);
    }
    plan.push_sql(")");
    Ok(plan)
}

pub fn update_plan(
    model: &ModelSchema,
    id: &str,
    values: &WriteMap,
) -> Result<QueryPlan, StoreError> {
    if values.is_empty() {
        return Err(StoreError::InvalidInput("no fields to update"));
    }
    if values.get(PRIMARY_KEY_FIELD).is_some() {
        return Err(StoreError::InvalidInput("the id field cannot be updated"));
    }
    validate_write(model, values)?;

    let mut plan = QueryPlan::new();
    plan.push_sql(format!("UPDATE \"{}\" SET ", model.table));
    let mut first = true;
    for (field_name, value) in values.iter() {
        let field = model.field(field_name).ok_or_else(|| StoreError::UnknownField {
            model: model.name.clone(),
            field: field_name.to_string(),
        })?;
        if !first {
            plan.push_sql(", ");
        }
        plan.push_sql(format!("\"{}\" = ", field.column));
        plan.push_input(value.clone());
        first = false;
    }
    plan.push_sql(format!(" WHERE \"{PRIMARY_KEY_FIELD}\" IS "));
    plan.push_input(Value::Text(id.to_string()));
    Ok(plan)
}

pub fn delete_plan(model: &ModelSchema, id: &str) -> QueryPlan {
    let mut plan = QueryPlan::new();
    plan.push_sql(format!(
        "DELETE FROM \"{}\" WHERE \"{PRIMARY_KEY_FIELD}\" IS ",
        model.table
    ));
    plan.push_input(Value::Text(id.to_string()));
    plan
}

pub fn find_many(
    tx: &Transaction<'_>,
    app: &AppSchema,
    model: &ModelSchema,
    filter: &Filter,
    page: Page,
) -> Result<Vec<Row>, StoreError> {
    let plan = select_plan(app, model, filter, page)?;
    query_rows(tx, model, &plan)
}

pub fn find_one(
    tx: &Transaction<'_>,
    app: &AppSchema,
    model: &ModelSchema,
    filter: &Filter,
) -> Result<Option<Row>, StoreError> {
    let plan = select_plan(
        app,
        model,
        filter,
        Page {
            limit: Some(1),
            offset: None,
        },
    )?;
    Ok(query_rows(tx, model, &plan)?.into_iter().next())
}

/// Inserts a row and returns it as stored. When the write map lacks an id,
/// one is allocated from the per-table counter inside the same transaction.
pub fn create_row(
    tx: &Transaction<'_>,
    app: &AppSchema,
    model: &ModelSchema,
    values: &WriteMap,
) -> Result<Row, StoreError> {
    let mut values = values.clone();
    let id = match values.get(PRIMARY_KEY_FIELD) {
        Some(Value::Text(id)) => id.clone(),
        Some(_) => return Err(StoreError::InvalidInput("id must be text")),
        None => {
            let id = next_record_id(tx, &model.table)?;
            values.set(PRIMARY_KEY_FIELD, Value::Text(id.clone()));
            id
        }
    };

    let plan = insert_plan(model, &values)?;
    execute_write(tx, model, &values, &plan)?;
    read_back(tx, app, model, &id)
}

pub fn update_row(
    tx: &Transaction<'_>,
    app: &AppSchema,
    model: &ModelSchema,
    id: &str,
    values: &WriteMap,
) -> Result<Row, StoreError> {
    let plan = update_plan(model, id, values)?;
    let affected = execute_write(tx, model, values, &plan)?;
    if affected == 0 {
        return Err(StoreError::RecordNotFound);
    }
    read_back(tx, app, model, id)
}

pub fn delete_row(
    tx: &Transaction<'_>,
    model: &ModelSchema,
    id: &str,
) -> Result<(), StoreError> {
    let plan = delete_plan(model, id);
    let affected = execute_write(tx, model, &WriteMap::new(), &plan)?;
    if affected == 0 {
        return Err(StoreError::RecordNotFound);
    }
    Ok(())
}

fn query_rows(
    tx: &Transaction<'_>,
    model: &ModelSchema,
    plan: &QueryPlan,
) -> Result<Vec<Row>, StoreError> {
    let (text, params) = plan.render();
    let mut stmt = tx.prepare(&text)?;
    let bound = params.iter().map(to_sql_value).collect::<Vec<_>>();
    let rows = stmt.query_map(rusqlite::params_from_iter(bound), |row| {
        let mut decoded = Row::new();
        for (index, field) in model.fields.iter().enumerate() {
            let value = match &field.ty {
                FieldType::Text | FieldType::Enum { .. } => row
                    .get::<_, Option<String>>(index)?
                    .map_or(serde_json::Value::Null, serde_json::Value::String),
                FieldType::Number | FieldType::Timestamp => row
                    .get::<_, Option<i64>>(index)?
                    .map_or(serde_json::Value::Null, |n| {
                        serde_json::Value::Number(Number::from(n))
                    }),
                FieldType::Boolean => row
                    .get::<_, Option<i64>>(index)?
                    .map_or(serde_json::Value::Null, |n| {
                        serde_json::Value::Bool(n != 0)
                    }),
            };
            decoded.insert(field.name.clone(), value);
        }
        Ok(decoded)
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn execute_write(
    tx: &Transaction<'_>,
    model: &ModelSchema,
    values: &WriteMap,
    plan: &QueryPlan,
) -> Result<usize, StoreError> {
    let (text, params) = plan.render();
    let bound = params.iter().map(to_sql_value).collect::<Vec<_>>();
    tx.execute(&text, rusqlite::params_from_iter(bound))
        .map_err(|err| translate_write_error(err, model, values))
}

fn read_back(
    tx: &Transaction<'_>,
    app: &AppSchema,
    model: &ModelSchema,
    id: &str,
) -> Result<Row, StoreError> {
    let filter = Filter::from(
        conditions::ConditionSet::new().with(conditions::Condition::equals(
            PRIMARY_KEY_FIELD,
            Value::Text(id.to_string()),
        )),
    );
    find_one(tx, app, model, &filter)?.ok_or(StoreError::RecordNotFound)
}

fn validate_write(model: &ModelSchema, values: &WriteMap) -> Result<(), StoreError> {
    for (field_name, value) in values.iter() {
        let field = model.field(field_name).ok_or_else(|| StoreError::UnknownField {
            model: model.name.clone(),
            field: field_name.to_string(),
        })?;
        // Nullability is left to the store so not-null violations surface
        // through the error translator with the real constraint diagnostic.
        if !value.is_null() {
            check_operand(field_name, field, value)?;
        }
    }
    Ok(())
}

fn next_record_id(tx: &Transaction<'_>, table: &str) -> Result<String, StoreError> {
    use rusqlite::OptionalExtension;

    let current: i64 = tx
        .query_row(
            "SELECT value FROM gantry_counters WHERE name = ?1",
            rusqlite::params![table],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    let next = current + 1;
    tx.execute(
        "INSERT INTO gantry_counters(name, value) VALUES (?1, ?2) \
         ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        rusqlite::params![table, next],
    )?;
    Ok(format!("{table}_{next:012}"))
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}
