//! Per-attribute predicate builder.
//!
//! # Invariants
//! - A builder holds at most one predicate; combining predicates on the
//!   same attribute goes through clones.
//! - Clones share the join of the builder they were cloned from.
//! - The join is emitted lazily, the first time a predicate, an ORDER BY or
//!   a nested join needs it.

use crate::error::{ContextError, EavError, EavResult};
use crate::model::attribute::Attribute;
use crate::model::family::Family;
use crate::model::storage::{ValueClass, DATA_TABLE};
use crate::model::value::ValueData;
use crate::query::eav::EavQueryBuilder;
use crate::query::sql::SqlParam;
use crate::query::{Condition, ConditionHandler};
use rusqlite::types::Value as SqlValue;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

/// Predicate builder over the value rows of one attribute.
#[derive(Debug)]
pub struct AttributeQueryBuilder<'a> {
    query: EavQueryBuilder<'a>,
    attribute: Attribute,
    value_class: ValueClass,
    enforce_family: bool,
    join_alias: String,
    join_applied: Rc<Cell<bool>>,
    skip_join: bool,
    condition: Option<Condition>,
}

impl Clone for AttributeQueryBuilder<'_> {
    /// Unconditioned builder reusing this builder's join.
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            attribute: self.attribute.clone(),
            value_class: self.value_class.clone(),
            enforce_family: self.enforce_family,
            join_alias: self.join_alias.clone(),
            join_applied: Rc::clone(&self.join_applied),
            skip_join: true,
            condition: None,
        }
    }
}

impl<'a> AttributeQueryBuilder<'a> {
    pub(crate) fn new(
        query: EavQueryBuilder<'a>,
        attribute: Attribute,
        value_class: ValueClass,
        enforce_family: bool,
        join_alias: String,
    ) -> Self {
        Self {
            query,
            attribute,
            value_class,
            enforce_family,
            join_alias,
            join_applied: Rc::new(Cell::new(false)),
            skip_join: false,
            condition: None,
        }
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    /// Alias of the value table join.
    pub fn join_alias(&self) -> &str {
        &self.join_alias
    }

    /// Qualified typed column, e.g. `a1.string_value`.
    pub fn column(&self) -> String {
        format!("{}.{}", self.join_alias, self.attribute.column_name())
    }

    pub fn is_join_applied(&self) -> bool {
        self.join_applied.get()
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    /// Emits the value table join.
    ///
    /// On a clone this only makes sure the shared join exists.
    ///
    /// # Errors
    /// - `Logic` when called twice on the original builder.
    /// - `Context` for axes unknown to the value class, or any context on a
    ///   non-contextual value class.
    pub fn apply_join(&self) -> EavResult<()> {
        if self.skip_join {
            return self.ensure_join();
        }
        if self.join_applied.get() {
            return Err(EavError::logic(format!(
                "join for attribute `{}` was already applied",
                self.attribute.code()
            )));
        }
        self.emit_join()
    }

    pub(crate) fn ensure_join(&self) -> EavResult<()> {
        if self.join_applied.get() {
            return Ok(());
        }
        self.emit_join()
    }

    fn emit_join(&self) -> EavResult<()> {
        let mut on = vec![format!("{}.data_id = {}.id", self.join_alias, self.query.alias())];
        let mut params: Vec<SqlParam> = Vec::new();

        let attribute_param = self.query.next_parameter();
        on.push(format!("{}.attribute_code = {attribute_param}", self.join_alias));
        params.push((
            attribute_param,
            SqlValue::Text(self.attribute.code().to_string()),
        ));

        if self.enforce_family {
            let family_param = self.query.next_parameter();
            on.push(format!("{}.family_code = {family_param}", self.join_alias));
            params.push((
                family_param,
                SqlValue::Text(self.attribute.require_family_code()?.to_string()),
            ));
        }

        if let Some(context) = self.query.context() {
            for (axis, value) in context {
                if !self.value_class.is_contextual() {
                    return Err(ContextError::NotContextual {
                        value_class: self.value_class.name().to_string(),
                    }
                    .into());
                }
                if !self.value_class.has_context_key(axis) {
                    return Err(ContextError::UnknownAxis {
                        axis: axis.clone(),
                        value_class: self.value_class.name().to_string(),
                    }
                    .into());
                }
                if !self.attribute.context_mask().contains(axis) {
                    continue;
                }
                let axis_param = self.query.next_parameter();
                on.push(format!("{}.{axis} = {axis_param}", self.join_alias));
                params.push((axis_param, SqlValue::Text(value.clone())));
            }
        }

        let table = self.value_class.table().to_string();
        let alias = self.join_alias.clone();
        self.query.with_sql(|sql| {
            sql.left_join(&table, &alias, on.join(" AND "));
            sql.set_parameters(params);
        });
        self.join_applied.set(true);
        Ok(())
    }

    fn with_condition(mut self, sql: String, params: Vec<SqlParam>) -> EavResult<Self> {
        if self.condition.is_some() {
            return Err(EavError::logic(format!(
                "a condition was already applied on attribute `{}`; clone the builder to add another",
                self.attribute.code()
            )));
        }
        self.condition = Some(Condition::new(sql, params));
        Ok(self)
    }

    fn bind(&self, value: impl Into<ValueData>) -> EavResult<(String, SqlParam)> {
        let value = value
            .into()
            .coerce(self.attribute.attribute_type().column())?;
        let name = self.query.next_parameter();
        Ok((name.clone(), (name, value.to_sql())))
    }

    fn compare(self, operator: &str, value: impl Into<ValueData>) -> EavResult<Self> {
        let (name, param) = self.bind(value)?;
        let sql = format!("{} {operator} {name}", self.column());
        self.with_condition(sql, vec![param])
    }

    /// `= value`; `Null` compiles to `IS NULL`.
    pub fn equals(self, value: impl Into<ValueData>) -> EavResult<Self> {
        let value = value.into();
        if value.is_null() {
            return self.is_null();
        }
        self.compare("=", value)
    }

    /// `!= value`; `Null` compiles to `IS NOT NULL`.
    pub fn not_equals(self, value: impl Into<ValueData>) -> EavResult<Self> {
        let value = value.into();
        if value.is_null() {
            return self.is_not_null();
        }
        self.compare("!=", value)
    }

    pub fn like(self, pattern: &str) -> EavResult<Self> {
        self.pattern("LIKE", pattern)
    }

    pub fn not_like(self, pattern: &str) -> EavResult<Self> {
        self.pattern("NOT LIKE", pattern)
    }

    fn pattern(self, operator: &str, pattern: &str) -> EavResult<Self> {
        let name = self.query.next_parameter();
        let sql = format!("{} {operator} {name}", self.column());
        self.with_condition(sql, vec![(name, SqlValue::Text(pattern.to_string()))])
    }

    pub fn gt(self, value: impl Into<ValueData>) -> EavResult<Self> {
        self.compare(">", value)
    }

    pub fn gte(self, value: impl Into<ValueData>) -> EavResult<Self> {
        self.compare(">=", value)
    }

    pub fn lt(self, value: impl Into<ValueData>) -> EavResult<Self> {
        self.compare("<", value)
    }

    pub fn lte(self, value: impl Into<ValueData>) -> EavResult<Self> {
        self.compare("<=", value)
    }

    pub fn between(
        self,
        low: impl Into<ValueData>,
        high: impl Into<ValueData>,
    ) -> EavResult<Self> {
        self.range("BETWEEN", low.into(), high.into())
    }

    pub fn not_between(
        self,
        low: impl Into<ValueData>,
        high: impl Into<ValueData>,
    ) -> EavResult<Self> {
        self.range("NOT BETWEEN", low.into(), high.into())
    }

    fn range(self, operator: &str, low: ValueData, high: ValueData) -> EavResult<Self> {
        let (low_name, low_param) = self.bind(low)?;
        let (high_name, high_param) = self.bind(high)?;
        let sql = format!("{} {operator} {low_name} AND {high_name}", self.column());
        self.with_condition(sql, vec![low_param, high_param])
    }

    /// `IN (...)`; an empty list matches nothing.
    pub fn in_list<T: Into<ValueData>>(self, values: impl IntoIterator<Item = T>) -> EavResult<Self> {
        self.list("IN", values, "0 = 1")
    }

    /// `NOT IN (...)`; an empty list matches everything.
    pub fn not_in_list<T: Into<ValueData>>(
        self,
        values: impl IntoIterator<Item = T>,
    ) -> EavResult<Self> {
        self.list("NOT IN", values, "1 = 1")
    }

    fn list<T: Into<ValueData>>(
        self,
        operator: &str,
        values: impl IntoIterator<Item = T>,
        when_empty: &str,
    ) -> EavResult<Self> {
        let mut names = Vec::new();
        let mut params = Vec::new();
        for value in values {
            let (name, param) = self.bind(value)?;
            names.push(name);
            params.push(param);
        }
        if names.is_empty() {
            return self.with_condition(when_empty.to_string(), params);
        }
        let sql = format!("{} {operator} ({})", self.column(), names.join(", "));
        self.with_condition(sql, params)
    }

    pub fn is_null(self) -> EavResult<Self> {
        let sql = format!("{} IS NULL", self.column());
        self.with_condition(sql, Vec::new())
    }

    pub fn is_not_null(self) -> EavResult<Self> {
        let sql = format!("{} IS NOT NULL", self.column());
        self.with_condition(sql, Vec::new())
    }

    /// Free-form predicate; `{column}` is replaced by the typed column.
    ///
    /// Parameter names should come from [`EavQueryBuilder::next_parameter`].
    pub fn raw_sql(self, sql: &str, params: Vec<SqlParam>) -> EavResult<Self> {
        let sql = sql.replace("{column}", &self.column());
        self.with_condition(sql, params)
    }

    /// Builder over the data targeted by this relation attribute.
    ///
    /// Attribute lookups in the returned builder search the allowed target
    /// families, or every family when the relation is unrestricted.
    ///
    /// # Errors
    /// - `Logic` when the attribute is not a relation.
    /// - `MissingFamily` for unknown allowed families.
    pub fn join(&self) -> EavResult<EavQueryBuilder<'a>> {
        if !self.attribute.is_relation() {
            return Err(EavError::logic(format!(
                "attribute `{}` is not a relation and cannot be joined",
                self.attribute.code()
            )));
        }
        self.ensure_join()?;

        let families = self.query.families();
        let allowed = self.attribute.allowed_families();
        let candidates: Vec<Arc<Family>> = if allowed.is_empty() {
            families.families().cloned().collect()
        } else {
            allowed
                .iter()
                .map(|code| families.get_family(code).map(Arc::clone))
                .collect::<EavResult<_>>()?
        };

        let target_alias = self.query.with_sql(|sql| sql.next_alias("d"));
        let on = format!("{target_alias}.id = {}", self.column());
        self.query.with_sql(|sql| {
            sql.left_join(DATA_TABLE, &target_alias, on);
        });
        Ok(self.query.nested(target_alias, candidates))
    }
}

impl ConditionHandler for AttributeQueryBuilder<'_> {
    fn condition(&self) -> EavResult<Condition> {
        let condition = self.condition.clone().ok_or_else(|| {
            EavError::logic(format!(
                "attribute `{}` has no condition to apply",
                self.attribute.code()
            ))
        })?;
        self.ensure_join()?;
        Ok(condition)
    }
}
