#![forbid(unsafe_code)]

//! SQLite-backed relational store for the runtime.
//!
//! The store handle is constructed explicitly by the hosting process and
//! passed down; there is no process-wide singleton. Tables are installed
//! from compiled model metadata, and all statement execution flows through
//! the query planner so every caller value is a bound parameter.

mod error;
pub mod query;

pub use error::StoreError;
pub use rusqlite::Transaction;

use gantry_core::schema::{AppSchema, FieldType, ModelSchema, PRIMARY_KEY_FIELD};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILE: &str = "gantry.db";

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: Option<PathBuf>,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let conn = Connection::open(storage_dir.join(DB_FILE))?;
        configure(&conn)?;
        Ok(Self {
            conn,
            storage_dir: Some(storage_dir),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        Ok(Self {
            conn,
            storage_dir: None,
        })
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    /// Creates the tables for every model plus the runtime's id-allocation
    /// counter table. Idempotent; existing tables are left untouched.
    pub fn install_schema(&self, app: &AppSchema) -> Result<(), StoreError> {
        app.validate()?;

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS gantry_counters (
              name TEXT PRIMARY KEY,
              value INTEGER NOT NULL
            );
            "#,
        )?;

        for model in &app.models {
            let ddl = create_table_sql(app, model);
            self.conn.execute_batch(&ddl)?;
        }
        Ok(())
    }

    /// Opens a transaction. Dropping it without an explicit commit rolls it
    /// back, which is exactly the teardown the guard relies on.
    pub fn begin(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self.conn.transaction()?)
    }
}

fn configure(conn: &Connection) -> Result<(), StoreError> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

fn create_table_sql(app: &AppSchema, model: &ModelSchema) -> String {
    let mut columns = vec![format!("\"{PRIMARY_KEY_FIELD}\" TEXT PRIMARY KEY")];

    for field in &model.fields {
        if field.name == PRIMARY_KEY_FIELD {
            continue;
        }
        let sql_type = match field.ty {
            FieldType::Text | FieldType::Enum { .. } => "TEXT",
            FieldType::Number | FieldType::Boolean | FieldType::Timestamp => "INTEGER",
        };
        let mut column = format!("\"{}\" {sql_type}", field.column);
        if !field.nullable {
            column.push_str(" NOT NULL");
        }
        if field.unique {
            column.push_str(" UNIQUE");
        }
        if let Some(relation) = model
            .belongs_to
            .iter()
            .find(|relation| relation.foreign_key_column == field.column)
            && let Some(referenced) = app.model(&relation.references)
        {
            column.push_str(&format!(
                " REFERENCES \"{}\"(\"{PRIMARY_KEY_FIELD}\")",
                referenced.table
            ));
        }
        columns.push(column);
    }

    // Relationships whose foreign key is not also declared as a field still
    // need their column on the owning table.
    for relation in &model.belongs_to {
        let declared = model
            .fields
            .iter()
            .any(|field| field.column == relation.foreign_key_column);
        if declared {
            continue;
        }
        let Some(referenced) = app.model(&relation.references) else {
            continue;
        };
        columns.push(format!(
            "\"{}\" TEXT REFERENCES \"{}\"(\"{PRIMARY_KEY_FIELD}\")",
            relation.foreign_key_column, referenced.table
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (\n  {}\n);",
        model.table,
        columns.join(",\n  ")
    )
}
