#![forbid(unsafe_code)]

//! Injection-safe statement assembly.
//!
//! A statement is built as an ordered sequence of parts: raw SQL fragments
//! (assembled exclusively from validated schema identifiers and fixed
//! keywords) and bound inputs. Rendering emits one `?` placeholder per
//! input, so no value reachable from a caller ever appears in statement
//! text.

mod conditions;
mod statement;

pub use conditions::{Condition, ConditionSet, Direction, Filter, Op};
pub use statement::{
    Row, create_row, delete_plan, delete_row, find_many, find_one, insert_plan, select_plan,
    update_plan, update_row,
};

use gantry_core::value::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum QueryPart {
    Sql(String),
    Input(Value),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryPlan {
    parts: Vec<QueryPart>,
}

impl QueryPlan {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    pub fn push_sql(&mut self, fragment: impl Into<String>) {
        self.parts.push(QueryPart::Sql(fragment.into()));
    }

    pub fn push_input(&mut self, value: Value) {
        self.parts.push(QueryPart::Input(value));
    }

    pub fn append(&mut self, other: QueryPlan) {
        self.parts.extend(other.parts);
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn parts(&self) -> &[QueryPart] {
        &self.parts
    }

    /// Renders to statement text plus the ordered bound-value list. Each
    /// input becomes a positional `?`; fragments are concatenated as-is.
    pub fn render(&self) -> (String, Vec<Value>) {
        let mut text = String::new();
        let mut params = Vec::new();
        for part in &self.parts {
            match part {
                QueryPart::Sql(fragment) => text.push_str(fragment),
                QueryPart::Input(value) => {
                    text.push('?');
                    params.push(value.clone());
                }
            }
        }
        (text, params)
    }
}

/// Ordered field -> value mapping for INSERT/UPDATE. Only keys present in
/// the map are written; insertion order is preserved so rendered column
/// lists are deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteMap {
    entries: Vec<(String, Value)>,
}

impl WriteMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| *name == field) {
            entry.1 = value;
        } else {
            self.entries.push((field, value));
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub(crate) fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Text(text) => rusqlite::types::Value::Text(text.clone()),
        Value::Integer(n) => rusqlite::types::Value::Integer(*n),
        Value::Bool(flag) => rusqlite::types::Value::Integer(i64::from(*flag)),
        Value::Timestamp(ms) => rusqlite::types::Value::Integer(*ms),
    }
}
