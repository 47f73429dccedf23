//! Minimal SELECT builder the EAV layer composes into.

use crate::query::SortOrder;
use rusqlite::types::Value as SqlValue;
use rusqlite::ToSql;

/// Named parameter and its bound value.
pub type SqlParam = (String, SqlValue);

/// SELECT statement under construction.
///
/// Aliases and parameter names are allocated from counters local to one
/// builder, so fragments produced for the same builder never collide.
#[derive(Debug, Clone, Default)]
pub struct SqlQueryBuilder {
    distinct: bool,
    select: Vec<String>,
    from: Option<(String, String)>,
    joins: Vec<String>,
    wheres: Vec<String>,
    order_by: Vec<String>,
    params: Vec<SqlParam>,
    limit: Option<u64>,
    offset: Option<u64>,
    alias_counter: usize,
    param_counter: usize,
}

impl SqlQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    pub fn select(&mut self, expression: impl Into<String>) -> &mut Self {
        self.select.push(expression.into());
        self
    }

    pub fn from(&mut self, table: impl Into<String>, alias: impl Into<String>) -> &mut Self {
        self.from = Some((table.into(), alias.into()));
        self
    }

    pub fn left_join(
        &mut self,
        table: &str,
        alias: &str,
        on: impl AsRef<str>,
    ) -> &mut Self {
        self.joins
            .push(format!("LEFT JOIN {table} {alias} ON {}", on.as_ref()));
        self
    }

    /// Adds one predicate; predicates are combined with AND.
    pub fn and_where(&mut self, predicate: impl Into<String>) -> &mut Self {
        self.wheres.push(predicate.into());
        self
    }

    pub fn order_by(&mut self, expression: impl AsRef<str>, order: SortOrder) -> &mut Self {
        self.order_by
            .push(format!("{} {}", expression.as_ref(), order.as_sql()));
        self
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: SqlValue) -> &mut Self {
        self.params.push((name.into(), value));
        self
    }

    pub fn set_parameters(&mut self, params: impl IntoIterator<Item = SqlParam>) -> &mut Self {
        self.params.extend(params);
        self
    }

    pub fn limit(&mut self, limit: Option<u64>) -> &mut Self {
        self.limit = limit;
        self
    }

    pub fn offset(&mut self, offset: Option<u64>) -> &mut Self {
        self.offset = offset;
        self
    }

    /// Fresh table alias such as `a3`.
    pub fn next_alias(&mut self, prefix: &str) -> String {
        self.alias_counter += 1;
        format!("{prefix}{}", self.alias_counter)
    }

    /// Fresh parameter placeholder such as `:p7`.
    pub fn next_parameter(&mut self) -> String {
        self.param_counter += 1;
        format!(":p{}", self.param_counter)
    }

    pub fn join_count(&self) -> usize {
        self.joins.len()
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    /// Parameters in the shape `Statement::query` accepts for named binding.
    pub fn named_params(&self) -> Vec<(&str, &dyn ToSql)> {
        self.params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }

    /// Renders the statement.
    pub fn sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.select.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.select.join(", "));
        }
        if let Some((table, alias)) = &self.from {
            sql.push_str(&format!(" FROM {table} {alias}"));
        }
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.wheres.is_empty() {
            let predicates: Vec<String> = self
                .wheres
                .iter()
                .map(|predicate| format!("({predicate})"))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        sql
    }
}
