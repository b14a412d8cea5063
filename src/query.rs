// Declarative query specifications with bound parameters

use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Result, Row};

/// A SQL fragment with `?` placeholders and the values bound to them, in order
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    sql: String,
    params: Vec<Value>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Fragment without parameters
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn parenthesized(self) -> Self {
        Self {
            sql: format!("({})", self.sql),
            params: self.params,
        }
    }

    /// Join fragments with `AND`; `None` when there is nothing to join
    pub fn and_all(predicates: impl IntoIterator<Item = Predicate>) -> Option<Self> {
        Self::join(predicates, " AND ")
    }

    /// Join fragments with `OR` and wrap the result in parentheses
    pub fn or_all(predicates: impl IntoIterator<Item = Predicate>) -> Option<Self> {
        Self::join(predicates, " OR ").map(Self::parenthesized)
    }

    fn join(predicates: impl IntoIterator<Item = Predicate>, glue: &str) -> Option<Self> {
        let mut fragments = Vec::new();
        let mut params = Vec::new();
        for predicate in predicates {
            fragments.push(predicate.sql);
            params.extend(predicate.params);
        }
        if fragments.is_empty() {
            return None;
        }
        Some(Self {
            sql: fragments.join(glue),
            params,
        })
    }
}

/// Everything a host needs to run one query: columns, joins, filter,
/// grouping, having, ordering and limit.
///
/// An empty spec (see [`QuerySpec::none`]) means "no results", never "all rows".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub select: String,
    pub from: String,
    pub joins: Vec<Predicate>,
    pub conditions: Vec<Predicate>,
    pub group_by: Vec<String>,
    pub having: Vec<Predicate>,
    pub order_by: Option<String>,
    pub limit: Option<i64>,
}

impl QuerySpec {
    pub fn new(select: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            select: select.into(),
            from: from.into(),
            ..Self::default()
        }
    }

    /// The no-op spec
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.select.is_empty()
    }

    pub fn join(mut self, join: Predicate) -> Self {
        self.joins.push(join);
        self
    }

    pub fn filter(mut self, condition: Predicate) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn filter_opt(self, condition: Option<Predicate>) -> Self {
        match condition {
            Some(condition) => self.filter(condition),
            None => self,
        }
    }

    /// Render SQL text and its parameters in placeholder order
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        if self.is_none() {
            return (String::new(), Vec::new());
        }

        let mut sql = format!("SELECT {} FROM {}", self.select, self.from);
        let mut params = Vec::new();

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join.sql());
            params.extend_from_slice(join.params());
        }

        if let Some(conditions) = Predicate::and_all(self.conditions.iter().cloned()) {
            sql.push_str(" WHERE ");
            sql.push_str(conditions.sql());
            params.extend_from_slice(conditions.params());
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if let Some(having) = Predicate::and_all(self.having.iter().cloned()) {
            sql.push_str(" HAVING ");
            sql.push_str(having.sql());
            params.extend_from_slice(having.params());
        }

        if let Some(order_by) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(limit));
        }

        (sql, params)
    }

    /// Run the spec and map each row; the no-op spec returns no rows
    pub fn query_map<T, F>(&self, conn: &Connection, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> Result<T>,
    {
        if self.is_none() {
            return Ok(Vec::new());
        }

        let (sql, params) = self.to_sql();
        debug!("Running query: {sql} ({} params)", params.len());

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(f(row)?);
        }
        Ok(results)
    }
}

/// Escape `%`, `_` and `\` so a value matches literally under `LIKE ... ESCAPE '\'`
pub fn like_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}
