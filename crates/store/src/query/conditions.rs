#![forbid(unsafe_code)]

//! The query condition language and its compiler.
//!
//! A `Condition` constrains one field with one typed operator. Conditions
//! inside a `ConditionSet` combine with AND; sets chained through
//! `Filter::or` combine with OR, and the whole disjunction is parenthesized
//! so it composes with any surrounding AND context. Operator legality is
//! checked against the field's declared type at compile time; an invalid
//! operator is an error here, never a silently wrong statement.

use gantry_core::schema::{AppSchema, FieldDef, FieldType, ModelSchema, PRIMARY_KEY_FIELD};
use gantry_core::value::Value;

use crate::StoreError;
use crate::query::QueryPlan;

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Equals(Value),
    NotEquals(Value),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    OneOf(Vec<Value>),
    GreaterThan(Value),
    GreaterOrEqual(Value),
    LessThan(Value),
    LessOrEqual(Value),
    Before(Value),
    After(Value),
    OnOrBefore(Value),
    OnOrAfter(Value),
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Equals(_) => "equals",
            Op::NotEquals(_) => "notEquals",
            Op::Contains(_) => "contains",
            Op::StartsWith(_) => "startsWith",
            Op::EndsWith(_) => "endsWith",
            Op::OneOf(_) => "oneOf",
            Op::GreaterThan(_) => "greaterThan",
            Op::GreaterOrEqual(_) => "greaterOrEqual",
            Op::LessThan(_) => "lessThan",
            Op::LessOrEqual(_) => "lessOrEqual",
            Op::Before(_) => "before",
            Op::After(_) => "after",
            Op::OnOrBefore(_) => "onOrBefore",
            Op::OnOrAfter(_) => "onOrAfter",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Op,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Op) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Op::Equals(value.into()))
    }

    pub fn not_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Op::NotEquals(value.into()))
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::new(field, Op::Contains(needle.into()))
    }

    pub fn starts_with(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::new(field, Op::StartsWith(needle.into()))
    }

    pub fn ends_with(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::new(field, Op::EndsWith(needle.into()))
    }

    pub fn one_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Op::OneOf(values))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConditionSet {
    pub conditions: Vec<Condition>,
    pub order_by: Vec<(String, Direction)>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn ordered_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }
}

/// One or more condition sets chained with OR.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    sets: Vec<ConditionSet>,
}

impl From<ConditionSet> for Filter {
    fn from(set: ConditionSet) -> Self {
        Self { sets: vec![set] }
    }
}

impl Filter {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn or(mut self, set: ConditionSet) -> Self {
        self.sets.push(set);
        self
    }

    pub fn sets(&self) -> &[ConditionSet] {
        &self.sets
    }

    fn is_unconstrained(&self) -> bool {
        self.sets.iter().all(|set| set.conditions.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct JoinClause {
    pub(crate) table: String,
    pub(crate) alias: String,
    pub(crate) owner_table: String,
    pub(crate) owner_fk_column: String,
}

impl JoinClause {
    pub(crate) fn render(&self) -> String {
        format!(
            " INNER JOIN \"{}\" AS \"{}\" ON \"{}\".\"{}\" = \"{}\".\"{}\"",
            self.table,
            self.alias,
            self.alias,
            PRIMARY_KEY_FIELD,
            self.owner_table,
            self.owner_fk_column,
        )
    }
}

/// Result of compiling a `Filter` against one model: the parenthesized
/// WHERE fragment (empty when unconstrained), the deduplicated joins that
/// relationship paths required, and the ORDER BY clause text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledQuery {
    pub(crate) where_plan: QueryPlan,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) order_sql: String,
}

pub(crate) fn compile(
    app: &AppSchema,
    model: &ModelSchema,
    filter: &Filter,
) -> Result<CompiledQuery, StoreError> {
    let mut joins: Vec<JoinClause> = Vec::new();
    let mut where_plan = QueryPlan::new();

    if !filter.is_unconstrained() {
        where_plan.push_sql("(");
        let mut first_set = true;
        for set in filter.sets() {
            if set.conditions.is_empty() {
                // An empty alternative matches everything.
                if !first_set {
                    where_plan.push_sql(" OR ");
                }
                where_plan.push_sql("1 = 1");
                first_set = false;
                continue;
            }
            if !first_set {
                where_plan.push_sql(" OR ");
            }
            where_plan.push_sql("(");
            let mut first_condition = true;
            for condition in &set.conditions {
                if !first_condition {
                    where_plan.push_sql(" AND ");
                }
                let fragment = compile_condition(app, model, condition, &mut joins)?;
                where_plan.append(fragment);
                first_condition = false;
            }
            where_plan.push_sql(")");
            first_set = false;
        }
        where_plan.push_sql(")");
    }

    let order_sql = compile_order_by(model, filter)?;

    Ok(CompiledQuery {
        where_plan,
        joins,
        order_sql,
    })
}

fn compile_condition(
    app: &AppSchema,
    model: &ModelSchema,
    condition: &Condition,
    joins: &mut Vec<JoinClause>,
) -> Result<QueryPlan, StoreError> {
    let (column_sql, field) = resolve_field(app, model, &condition.field, joins)?;
    check_operator(&condition.field, field, &condition.op)?;

    let mut plan = QueryPlan::new();
    match &condition.op {
        Op::Equals(value) => {
            // SQLite's two-argument IS is null-safe equality, so
            // equals(null) matches exactly the NULL rows.
            plan.push_sql(format!("{column_sql} IS "));
            plan.push_input(value.clone());
        }
        Op::NotEquals(value) => {
            // Distinct-from semantics: notEquals(v) matches NULL rows too.
            plan.push_sql(format!("{column_sql} IS NOT "));
            plan.push_input(value.clone());
        }
        Op::Contains(needle) => {
            plan.push_sql(format!("{column_sql} LIKE "));
            plan.push_input(Value::Text(format!("%{}%", escape_like(needle))));
            plan.push_sql(" ESCAPE '\\'");
        }
        Op::StartsWith(needle) => {
            plan.push_sql(format!("{column_sql} LIKE "));
            plan.push_input(Value::Text(format!("{}%", escape_like(needle))));
            plan.push_sql(" ESCAPE '\\'");
        }
        Op::EndsWith(needle) => {
            plan.push_sql(format!("{column_sql} LIKE "));
            plan.push_input(Value::Text(format!("%{}", escape_like(needle))));
            plan.push_sql(" ESCAPE '\\'");
        }
        Op::OneOf(values) => {
            if values.is_empty() {
                // IN () is not valid SQL; an empty member set matches nothing.
                plan.push_sql("1 = 0");
            } else {
                plan.push_sql(format!("{column_sql} IN ("));
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        plan.push_sql(", ");
                    }
                    plan.push_input(value.clone());
                }
                plan.push_sql(")");
            }
        }
        Op::GreaterThan(value) | Op::After(value) => {
            plan.push_sql(format!("{column_sql} > "));
            plan.push_input(value.clone());
        }
        Op::GreaterOrEqual(value) | Op::OnOrAfter(value) => {
            plan.push_sql(format!("{column_sql} >= "));
            plan.push_input(value.clone());
        }
        Op::LessThan(value) | Op::Before(value) => {
            plan.push_sql(format!("{column_sql} < "));
            plan.push_input(value.clone());
        }
        Op::LessOrEqual(value) | Op::OnOrBefore(value) => {
            plan.push_sql(format!("{column_sql} <= "));
            plan.push_input(value.clone());
        }
    }
    Ok(plan)
}

/// Resolves a condition field to its quoted column expression. A dotted
/// path crosses exactly one belongs-to relationship and contributes an
/// INNER JOIN against the referenced table, aliased `owner$relation` so
/// repeated paths reuse one join.
fn resolve_field<'a>(
    app: &'a AppSchema,
    model: &'a ModelSchema,
    path: &str,
    joins: &mut Vec<JoinClause>,
) -> Result<(String, &'a FieldDef), StoreError> {
    match path.split_once('.') {
        None => {
            let field = model.field(path).ok_or_else(|| StoreError::UnknownField {
                model: model.name.clone(),
                field: path.to_string(),
            })?;
            Ok((
                format!("\"{}\".\"{}\"", model.table, field.column),
                field,
            ))
        }
        Some((relation_name, rest)) => {
            if rest.contains('.') {
                return Err(StoreError::InvalidInput(
                    "condition paths may cross at most one relationship",
                ));
            }
            let relation =
                model
                    .relation(relation_name)
                    .ok_or_else(|| StoreError::UnknownRelation {
                        model: model.name.clone(),
                        relation: relation_name.to_string(),
                    })?;
            let referenced =
                app.model(&relation.references)
                    .ok_or_else(|| StoreError::UnknownRelation {
                        model: model.name.clone(),
                        relation: relation_name.to_string(),
                    })?;
            let field = referenced
                .field(rest)
                .ok_or_else(|| StoreError::UnknownField {
                    model: referenced.name.clone(),
                    field: rest.to_string(),
                })?;

            let alias = format!("{}${}", model.table, relation.name);
            let clause = JoinClause {
                table: referenced.table.clone(),
                alias: alias.clone(),
                owner_table: model.table.clone(),
                owner_fk_column: relation.foreign_key_column.clone(),
            };
            if !joins.contains(&clause) {
                joins.push(clause);
            }
            Ok((format!("\"{}\".\"{}\"", alias, field.column), field))
        }
    }
}

fn compile_order_by(model: &ModelSchema, filter: &Filter) -> Result<String, StoreError> {
    let mut clauses: Vec<(String, Direction)> = Vec::new();
    let mut has_id = false;
    for set in filter.sets() {
        for (field_name, direction) in &set.order_by {
            let field = model
                .field(field_name)
                .ok_or_else(|| StoreError::UnknownField {
                    model: model.name.clone(),
                    field: field_name.clone(),
                })?;
            if clauses
                .iter()
                .any(|(column, _)| column == &field.column)
            {
                continue;
            }
            if field.name == PRIMARY_KEY_FIELD {
                has_id = true;
            }
            clauses.push((field.column.clone(), *direction));
        }
    }

    if clauses.is_empty() {
        return Ok(String::new());
    }

    // Primary-key tie-break keeps explicitly ordered results deterministic.
    if !has_id {
        clauses.push((PRIMARY_KEY_FIELD.to_string(), Direction::Asc));
    }

    let rendered = clauses
        .iter()
        .map(|(column, direction)| {
            format!("\"{}\".\"{}\" {}", model.table, column, direction.as_sql())
        })
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(" ORDER BY {rendered}"))
}

fn check_operator(path: &str, field: &FieldDef, op: &Op) -> Result<(), StoreError> {
    let allowed = match &field.ty {
        FieldType::Text => matches!(
            op,
            Op::Equals(_)
                | Op::NotEquals(_)
                | Op::Contains(_)
                | Op::StartsWith(_)
                | Op::EndsWith(_)
                | Op::OneOf(_)
        ),
        FieldType::Number => matches!(
            op,
            Op::Equals(_)
                | Op::NotEquals(_)
                | Op::OneOf(_)
                | Op::GreaterThan(_)
                | Op::GreaterOrEqual(_)
                | Op::LessThan(_)
                | Op::LessOrEqual(_)
        ),
        FieldType::Boolean => matches!(op, Op::Equals(_) | Op::NotEquals(_)),
        FieldType::Timestamp => matches!(
            op,
            Op::Equals(_)
                | Op::NotEquals(_)
                | Op::Before(_)
                | Op::After(_)
                | Op::OnOrBefore(_)
                | Op::OnOrAfter(_)
        ),
        FieldType::Enum { .. } => {
            matches!(op, Op::Equals(_) | Op::NotEquals(_) | Op::OneOf(_))
        }
    };
    if !allowed {
        return Err(StoreError::InvalidOperator {
            field: path.to_string(),
            operator: op.name(),
            field_type: field.ty.name(),
        });
    }

    match op {
        Op::Equals(value) | Op::NotEquals(value) => {
            if !value.is_null() {
                check_operand(path, field, value)?;
            }
        }
        Op::OneOf(values) => {
            for value in values {
                check_operand(path, field, value)?;
            }
        }
        Op::GreaterThan(value)
        | Op::GreaterOrEqual(value)
        | Op::LessThan(value)
        | Op::LessOrEqual(value)
        | Op::Before(value)
        | Op::After(value)
        | Op::OnOrBefore(value)
        | Op::OnOrAfter(value) => check_operand(path, field, value)?,
        Op::Contains(_) | Op::StartsWith(_) | Op::EndsWith(_) => {}
    }
    Ok(())
}

pub(crate) fn check_operand(
    path: &str,
    field: &FieldDef,
    value: &Value,
) -> Result<(), StoreError> {
    let ok = match &field.ty {
        FieldType::Text => matches!(value, Value::Text(_)),
        FieldType::Number => matches!(value, Value::Integer(_)),
        FieldType::Boolean => matches!(value, Value::Bool(_)),
        FieldType::Timestamp => matches!(value, Value::Timestamp(_)),
        FieldType::Enum { values } => {
            let Value::Text(member) = value else {
                return Err(StoreError::InvalidOperand {
                    field: path.to_string(),
                    expected: "text",
                    got: value.type_name(),
                });
            };
            if !values.iter().any(|candidate| candidate == member) {
                return Err(StoreError::InvalidEnumMember {
                    field: path.to_string(),
                    value: member.clone(),
                });
            }
            true
        }
    };
    if !ok {
        return Err(StoreError::InvalidOperand {
            field: path.to_string(),
            expected: field.ty.name(),
            got: value.type_name(),
        });
    }
    Ok(())
}

fn escape_like(needle: &str) -> String {
    // %, _ and the escape character itself must read as literals so user
    // text can never widen a pattern match.
    let mut out = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::schema::{BelongsTo, FieldDef, FieldType, ModelSchema};

    fn app() -> AppSchema {
        let mut author = ModelSchema::new("author", "author");
        author.push_field(FieldDef {
            name: "name".to_string(),
            column: "name".to_string(),
            ty: FieldType::Text,
            nullable: false,
            unique: false,
        });

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
        post.push_field(FieldDef {
            name: "category".to_string(),
            column: "category".to_string(),
            ty: FieldType::Enum {
                values: vec!["Technical".to_string(), "Food".to_string()],
            },
            nullable: true,
            unique: false,
        });
        post.push_field(FieldDef {
            name: "authorId".to_string(),
            column: "author_id".to_string(),
            ty: FieldType::Text,
            nullable: true,
            unique: false,
        });
        post.push_belongs_to(BelongsTo {
            name: "author".to_string(),
            foreign_key_column: "author_id".to_string(),
            references: "author".to_string(),
        });

        AppSchema::new(vec![author, post])
    }

    fn compile_where(filter: &Filter) -> Result<(String, Vec<Value>), StoreError> {
        let app = app();
        let model = app.model("post").expect("post model");
        let compiled = compile(&app, model, filter)?;
        Ok(compiled.where_plan.render())
    }

    #[test]
    fn equals_renders_null_safe_is() {
        let filter = Filter::from(ConditionSet::new().with(Condition::equals("title", "Fred")));
        let (text, params) = compile_where(&filter).expect("compile");
        assert_eq!(text, "((\"post\".\"title\" IS ?))");
        assert_eq!(params, vec![Value::Text("Fred".to_string())]);
    }

    #[test]
    fn not_equals_renders_is_not() {
        let filter = Filter::from(
            ConditionSet::new().with(Condition::new("title", Op::NotEquals(Value::Null))),
        );
        let (text, params) = compile_where(&filter).expect("compile");
        assert_eq!(text, "((\"post\".\"title\" IS NOT ?))");
        assert_eq!(params, vec![Value::Null]);
    }

    #[test]
    fn sets_chain_with_or_and_parenthesize() {
        let filter = Filter::from(
            ConditionSet::new()
                .with(Condition::equals("title", "a"))
                .with(Condition::new("views", Op::GreaterThan(Value::Integer(10)))),
        )
        .or(ConditionSet::new().with(Condition::equals("title", "b")));
        let (text, params) = compile_where(&filter).expect("compile");
        assert_eq!(
            text,
            "((\"post\".\"title\" IS ? AND \"post\".\"views\" > ?) OR (\"post\".\"title\" IS ?))"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn contains_escapes_pattern_metacharacters() {
        let filter =
            Filter::from(ConditionSet::new().with(Condition::contains("title", "50%_done")));
        let (text, params) = compile_where(&filter).expect("compile");
        assert_eq!(text, "((\"post\".\"title\" LIKE ? ESCAPE '\\'))");
        assert_eq!(params, vec![Value::Text("%50\\%\\_done%".to_string())]);
    }

    #[test]
    fn one_of_renders_membership_test() {
        let filter = Filter::from(ConditionSet::new().with(Condition::one_of(
            "title",
            vec![Value::Text("a".to_string()), Value::Text("b".to_string())],
        )));
        let (text, params) = compile_where(&filter).expect("compile");
        assert_eq!(text, "((\"post\".\"title\" IN (?, ?)))");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn empty_one_of_matches_nothing() {
        let filter = Filter::from(ConditionSet::new().with(Condition::one_of("title", vec![])));
        let (text, params) = compile_where(&filter).expect("compile");
        assert_eq!(text, "((1 = 0))");
        assert!(params.is_empty());
    }

    #[test]
    fn relationship_path_joins_referenced_table() {
        let app = app();
        let model = app.model("post").expect("post model");
        let filter =
            Filter::from(ConditionSet::new().with(Condition::equals("author.name", "bob")));
        let compiled = compile(&app, model, &filter).expect("compile");

        let (text, _) = compiled.where_plan.render();
        assert_eq!(text, "((\"post$author\".\"name\" IS ?))");
        assert_eq!(compiled.joins.len(), 1);
        assert_eq!(
            compiled.joins[0].render(),
            " INNER JOIN \"author\" AS \"post$author\" ON \"post$author\".\"id\" = \"post\".\"author_id\""
        );
    }

    #[test]
    fn repeated_relationship_paths_share_one_join() {
        let app = app();
        let model = app.model("post").expect("post model");
        let filter = Filter::from(
            ConditionSet::new()
                .with(Condition::equals("author.name", "bob"))
                .with(Condition::contains("author.name", "b")),
        );
        let compiled = compile(&app, model, &filter).expect("compile");
        assert_eq!(compiled.joins.len(), 1);
    }

    #[test]
    fn invalid_operator_for_type_is_rejected() {
        let filter = Filter::from(
            ConditionSet::new().with(Condition::contains("views", "1")),
        );
        assert!(matches!(
            compile_where(&filter),
            Err(StoreError::InvalidOperator {
                operator: "contains",
                field_type: "number",
                ..
            })
        ));
    }

    #[test]
    fn operand_type_mismatch_is_rejected() {
        let filter = Filter::from(
            ConditionSet::new().with(Condition::new("views", Op::Equals(Value::Bool(true)))),
        );
        assert!(matches!(
            compile_where(&filter),
            Err(StoreError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn enum_member_outside_declared_set_is_rejected() {
        let filter = Filter::from(
            ConditionSet::new().with(Condition::equals("category", "Lifestyle")),
        );
        assert!(matches!(
            compile_where(&filter),
            Err(StoreError::InvalidEnumMember { .. })
        ));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let filter = Filter::from(ConditionSet::new().with(Condition::equals("missing", "x")));
        assert!(matches!(
            compile_where(&filter),
            Err(StoreError::UnknownField { .. })
        ));
    }

    #[test]
    fn ordering_appends_primary_key_tie_break() {
        let app = app();
        let model = app.model("post").expect("post model");
        let filter = Filter::from(
            ConditionSet::new().ordered_by("views", Direction::Desc),
        );
        let compiled = compile(&app, model, &filter).expect("compile");
        assert_eq!(
            compiled.order_sql,
            " ORDER BY \"post\".\"views\" DESC, \"post\".\"id\" ASC"
        );
    }

    #[test]
    fn no_ordering_yields_no_order_by() {
        let app = app();
        let model = app.model("post").expect("post model");
        let compiled = compile(&app, model, &Filter::empty()).expect("compile");
        assert!(compiled.order_sql.is_empty());
        assert!(compiled.where_plan.is_empty());
    }
}
