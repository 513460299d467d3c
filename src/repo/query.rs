//! Query escape hatch and entity query composition.
//!
//! # Responsibility
//! - Raw parameterized statements with named placeholders (`Query`).
//! - Typed entity selects built from condition fragments (`EntityQuery`).
//! - Best-effort SQL rendering for diagnostics (`to_sql`).
//!
//! # Invariants
//! - A statement never reaches the store with an unbound named placeholder.
//! - Entity selects alias state columns under fixed underscore names so row
//!   mapping is independent of per-entity column naming.

use crate::filter::PLACEHOLDER;
use crate::mapping::EntityMapping;
use crate::model::Entity;
use crate::session::Session;
use rusqlite::types::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use super::repository::{RepoError, RepoResult};

/// One bound named parameter: a single value or an expandable list.
#[derive(Debug, Clone)]
pub enum QueryParam {
    One(Value),
    Many(Vec<Value>),
}

impl QueryParam {
    fn values(&self) -> Vec<Value> {
        match self {
            Self::One(value) => vec![value.clone()],
            Self::Many(values) => values.clone(),
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Integer(_) => "Integer",
        Value::Real(_) => "Real",
        Value::Text(_) => "Text",
        Value::Blob(_) => "Blob",
    }
}

fn value_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}

/// Expands `:name` placeholders in `text` to positional markers, pulling
/// values from `params` in placeholder order. List parameters expand to one
/// marker per element.
fn render_named(
    text: &str,
    params: &BTreeMap<String, QueryParam>,
) -> RepoResult<(String, Vec<Value>)> {
    let mut sql = String::with_capacity(text.len());
    let mut values = Vec::new();
    let mut last = 0;

    for capture in PLACEHOLDER.captures_iter(text) {
        let Some(whole) = capture.get(0) else {
            continue;
        };
        let name = &capture[1];
        let param = params
            .get(name)
            .ok_or_else(|| RepoError::UnboundParameter(name.to_string()))?;

        sql.push_str(&text[last..whole.start()]);
        let expanded = param.values();
        if expanded.is_empty() {
            return Err(RepoError::UnboundParameter(name.to_string()));
        }
        let markers = vec!["?"; expanded.len()].join(", ");
        sql.push_str(&markers);
        values.extend(expanded);
        last = whole.end();
    }
    sql.push_str(&text[last..]);

    Ok((sql, values))
}

/// A raw statement with named parameters, for the cases the typed surface
/// does not cover.
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    params: BTreeMap<String, QueryParam>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn set_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), QueryParam::One(value));
        self
    }

    pub fn set_parameter_list(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.params.insert(name.into(), QueryParam::Many(values));
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn render(&self) -> RepoResult<(String, Vec<Value>)> {
        render_named(&self.text, &self.params)
    }

    /// Executes the statement and returns the affected row count.
    pub fn execute_update(&self, session: &Session) -> RepoResult<usize> {
        let (sql, values) = self.render()?;
        Ok(session.execute_sql(&sql, &values)?)
    }

    /// Executes the statement as a read and returns the raw rows.
    pub fn run(&self, session: &Session) -> RepoResult<Vec<Vec<Value>>> {
        let (sql, values) = self.render()?;
        Ok(session.query_rows(&sql, &values, |row| {
            let columns = row.as_ref().column_count();
            let mut raw = Vec::with_capacity(columns);
            for i in 0..columns {
                raw.push(Value::from(row.get_ref(i)?));
            }
            Ok(raw)
        })?)
    }

    /// Renders the statement text with its bindings annotated. Diagnostic
    /// output only, never fed back to the store.
    pub fn to_sql(&self) -> String {
        let mut out = self.text.clone();
        for (name, param) in &self.params {
            for value in param.values() {
                out.push_str(&format!(
                    "\n-- @{name} = {} [Type: {}]",
                    value_literal(&value),
                    value_type_name(&value)
                ));
            }
        }
        out
    }
}

/// Select list for an entity: state columns under fixed underscore aliases,
/// data columns aliased by property name.
pub(crate) fn select_list(mapping: &EntityMapping) -> String {
    let capabilities = mapping.capabilities();
    let mut columns = vec![format!("{} AS _id", mapping.id_column())];
    if capabilities.version {
        columns.push(format!("{} AS _version", mapping.version_column()));
    }
    if capabilities.soft_delete {
        columns.push(format!("{} AS _is_deleted", mapping.is_deleted_column()));
        columns.push(format!("{} AS _deleted_date", mapping.deleted_date_column()));
        columns.push(format!("{} AS _deleted_by", mapping.deleted_by_column()));
    }
    if capabilities.audit {
        columns.push(format!("{} AS _created_by", mapping.created_by_column()));
        columns.push(format!("{} AS _created_date", mapping.created_date_column()));
        columns.push(format!("{} AS _updated_by", mapping.updated_by_column()));
        columns.push(format!("{} AS _updated_date", mapping.updated_date_column()));
    }
    for property in mapping.properties() {
        columns.push(format!("{} AS {}", property.column, property.name));
    }
    columns.join(", ")
}

/// A typed entity select composed of condition fragments, ordering, and an
/// optional window. Session-enabled filters are appended at execution time.
pub struct EntityQuery<E: Entity> {
    mapping: Arc<EntityMapping>,
    conditions: Vec<(String, Vec<Value>)>,
    order_by: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    _marker: PhantomData<E>,
}

impl<E: Entity> EntityQuery<E> {
    pub(crate) fn new(mapping: Arc<EntityMapping>) -> Self {
        Self {
            mapping,
            conditions: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
            _marker: PhantomData,
        }
    }

    /// Appends a positional condition fragment with its bind values.
    pub fn filter(mut self, condition: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions.push((condition.into(), values));
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn where_clause(&self, session: &Session) -> RepoResult<(String, Vec<Value>)> {
        let mut sql = String::from(" WHERE 1 = 1");
        let mut values = Vec::new();
        for (condition, bound) in &self.conditions {
            sql.push_str(" AND (");
            sql.push_str(condition);
            sql.push(')');
            values.extend(bound.iter().cloned());
        }
        for (condition, bound) in session.render_enabled_filters()? {
            sql.push_str(" AND (");
            sql.push_str(&condition);
            sql.push(')');
            values.extend(bound);
        }
        Ok((sql, values))
    }

    pub(crate) fn render(&self, session: &Session) -> RepoResult<(String, Vec<Value>)> {
        let (where_sql, mut values) = self.where_clause(session)?;
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            select_list(&self.mapping),
            self.mapping.table(),
            where_sql
        );
        match &self.order_by {
            Some(clause) => {
                sql.push_str(" ORDER BY ");
                sql.push_str(clause);
            }
            None => {
                sql.push_str(" ORDER BY ");
                sql.push_str(self.mapping.id_column());
            }
        }
        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit));
            if let Some(offset) = self.offset {
                sql.push_str(" OFFSET ?");
                values.push(Value::Integer(offset));
            }
        }
        Ok((sql, values))
    }

    pub fn list(&self, session: &Session) -> RepoResult<Vec<E>> {
        let (sql, values) = self.render(session)?;
        Ok(session.query_rows(&sql, &values, |row| E::from_row(row))?)
    }

    pub fn first(&self, session: &Session) -> RepoResult<Option<E>> {
        let (sql, values) = self.render(session)?;
        Ok(session.query_optional(&sql, &values, |row| E::from_row(row))?)
    }

    /// Row count under the same conditions and enabled filters, ignoring
    /// ordering and windowing.
    pub fn count(&self, session: &Session) -> RepoResult<i64> {
        let (where_sql, values) = self.where_clause(session)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            self.mapping.table(),
            where_sql
        );
        let count = session
            .query_optional(&sql, &values, |row| row.get::<_, i64>(0))?
            .unwrap_or(0);
        Ok(count)
    }

    /// Renders the select with bindings annotated, for diagnostics.
    pub fn to_sql(&self, session: &Session) -> RepoResult<String> {
        let (sql, values) = self.render(session)?;
        let mut out = sql;
        for value in &values {
            out.push_str(&format!(
                "\n-- ? = {} [Type: {}]",
                value_literal(value),
                value_type_name(value)
            ));
        }
        Ok(out)
    }
}

/// One page of results with its window description.
#[derive(Debug, Clone)]
pub struct Page<E> {
    pub items: Vec<E>,
    pub page_number: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// Optional narrowing applied to a paged fetch before windowing.
#[derive(Debug, Clone, Default)]
pub struct PageFilter {
    pub condition: Option<String>,
    pub values: Vec<Value>,
}
