#![forbid(unsafe_code)]

//! Compiled model metadata consumed by the runtime.
//!
//! The schema compiler that produces this metadata lives outside this
//! repository; the runtime only reads it. Every identifier that can end up
//! inside a SQL statement is validated here so the statement builders can
//! quote them without further checks.

/// Semantic type of a model field. Enum fields carry their legal members.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Timestamp,
    Enum { values: Vec<String> },
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
            FieldType::Enum { .. } => "enum",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub column: String,
    pub ty: FieldType,
    pub nullable: bool,
    pub unique: bool,
}

/// Belongs-to relationship: a foreign-key column on the owning table
/// pointing at the primary key of the referenced model.
#[derive(Clone, Debug, PartialEq)]
pub struct BelongsTo {
    pub name: String,
    pub foreign_key_column: String,
    pub references: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelSchema {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldDef>,
    pub belongs_to: Vec<BelongsTo>,
}

pub const PRIMARY_KEY_FIELD: &str = "id";

impl ModelSchema {
    /// Every model carries an `id` Text primary key; it is installed here
    /// so callers never have to declare it.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: vec![FieldDef {
                name: PRIMARY_KEY_FIELD.to_string(),
                column: PRIMARY_KEY_FIELD.to_string(),
                ty: FieldType::Text,
                nullable: false,
                unique: true,
            }],
            belongs_to: Vec::new(),
        }
    }

    pub fn push_field(&mut self, field: FieldDef) {
        self.fields.push(field);
    }

    pub fn push_belongs_to(&mut self, relation: BelongsTo) {
        self.belongs_to.push(relation);
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&BelongsTo> {
        self.belongs_to
            .iter()
            .find(|relation| relation.name == name)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_identifier("model", &self.name)?;
        validate_identifier("table", &self.table)?;
        for field in &self.fields {
            validate_identifier("field", &field.name)?;
            validate_identifier("column", &field.column)?;
            if let FieldType::Enum { values } = &field.ty
                && values.is_empty()
            {
                return Err(SchemaError::EmptyEnum {
                    field: field.name.clone(),
                });
            }
        }
        for relation in &self.belongs_to {
            validate_identifier("relation", &relation.name)?;
            validate_identifier("column", &relation.foreign_key_column)?;
        }
        let mut seen = std::collections::BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    field: field.name.clone(),
                });
            }
        }
        for relation in &self.belongs_to {
            if !seen.insert(relation.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    field: relation.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppSchema {
    pub models: Vec<ModelSchema>,
}

impl AppSchema {
    pub fn new(models: Vec<ModelSchema>) -> Self {
        Self { models }
    }

    pub fn model(&self, name: &str) -> Option<&ModelSchema> {
        self.models.iter().find(|model| model.name == name)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        for model in &self.models {
            model.validate()?;
        }
        for model in &self.models {
            for relation in &model.belongs_to {
                if self.model(&relation.references).is_none() {
                    return Err(SchemaError::UnknownReference {
                        model: model.name.clone(),
                        relation: relation.name.clone(),
                        references: relation.references.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaError {
    InvalidIdentifier { kind: &'static str, value: String },
    DuplicateField { field: String },
    EmptyEnum { field: String },
    UnknownReference {
        model: String,
        relation: String,
        references: String,
    },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier { kind, value } => {
                write!(f, "invalid {kind} identifier: {value:?}")
            }
            Self::DuplicateField { field } => write!(f, "duplicate field name: {field}"),
            Self::EmptyEnum { field } => write!(f, "enum field has no members: {field}"),
            Self::UnknownReference {
                model,
                relation,
                references,
            } => write!(
                f,
                "relation {model}.{relation} references unknown model {references}"
            ),
        }
    }
}

impl std::error::Error for SchemaError {}

fn validate_identifier(kind: &'static str, value: &str) -> Result<(), SchemaError> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => chars
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_'),
        _ => false,
    };
    if !valid || value.len() > 128 {
        return Err(SchemaError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}
