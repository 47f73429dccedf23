//! Composition layer over the SQL builder.

use crate::error::{EavError, EavResult};
use crate::model::attribute::Attribute;
use crate::model::context::Context;
use crate::model::family::Family;
use crate::model::storage::DATA_COLUMNS;
use crate::query::attribute::AttributeQueryBuilder;
use crate::query::sql::{SqlParam, SqlQueryBuilder};
use crate::query::{Condition, ConditionHandler, SortOrder};
use crate::registry::FamilyRegistry;
use rusqlite::types::Value as SqlValue;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub(crate) const ROOT_ALIAS: &str = "e";

#[derive(Debug)]
struct QueryState {
    sql: SqlQueryBuilder,
    applied: bool,
}

/// Query over data rows of one family (and its descendants).
///
/// Nested builders returned by [`AttributeQueryBuilder::join`] share the
/// same underlying statement; only the root alias differs.
#[derive(Debug, Clone)]
pub struct EavQueryBuilder<'a> {
    families: &'a FamilyRegistry,
    state: Rc<RefCell<QueryState>>,
    alias: String,
    candidates: Vec<Arc<Family>>,
    context: Option<Context>,
}

impl<'a> EavQueryBuilder<'a> {
    /// Selects data of `family_code` and every descendant family.
    ///
    /// # Errors
    /// - `MissingFamily` for unknown codes.
    pub fn for_family(families: &'a FamilyRegistry, family_code: &str) -> EavResult<Self> {
        let family = Arc::clone(families.get_family(family_code)?);
        let codes = families.matching_codes(family_code)?;

        let mut sql = SqlQueryBuilder::new();
        sql.distinct(true).from(family.data_class().table(), ROOT_ALIAS);
        for column in DATA_COLUMNS {
            sql.select(format!("{ROOT_ALIAS}.{column}"));
        }
        let mut placeholders = Vec::with_capacity(codes.len());
        for code in codes {
            let name = sql.next_parameter();
            sql.set_parameter(name.clone(), SqlValue::Text(code));
            placeholders.push(name);
        }
        sql.and_where(format!(
            "{ROOT_ALIAS}.family_code IN ({})",
            placeholders.join(", ")
        ));

        Ok(Self {
            families,
            state: Rc::new(RefCell::new(QueryState {
                sql,
                applied: false,
            })),
            alias: ROOT_ALIAS.to_string(),
            candidates: vec![family],
            context: None,
        })
    }

    /// Nested builder rooted at the data alias of a relation join.
    pub(crate) fn nested(&self, alias: String, candidates: Vec<Arc<Family>>) -> Self {
        Self {
            families: self.families,
            state: Rc::clone(&self.state),
            alias,
            candidates,
            context: self.context.clone(),
        }
    }

    /// Filtering context propagated to attribute builders created afterwards.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn set_context(&mut self, context: Option<Context>) {
        self.context = context;
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn families(&self) -> &'a FamilyRegistry {
        self.families
    }

    /// Attribute query builder restricted to the owning family of the attribute.
    pub fn attribute(&self, code: &str) -> EavResult<AttributeQueryBuilder<'a>> {
        self.attribute_with(code, true)
    }

    /// Attribute query builder; `enforce_family = false` matches the
    /// attribute in any family sharing its code.
    ///
    /// # Errors
    /// - `MissingAttribute` when no candidate family declares `code`.
    pub fn attribute_with(
        &self,
        code: &str,
        enforce_family: bool,
    ) -> EavResult<AttributeQueryBuilder<'a>> {
        let (family, attribute) = self.resolve_attribute(code)?;
        let join_alias = self.with_sql(|sql| sql.next_alias("a"));
        Ok(AttributeQueryBuilder::new(
            self.clone(),
            attribute.clone(),
            family.value_class().clone(),
            enforce_family,
            join_alias,
        ))
    }

    fn resolve_attribute(&self, code: &str) -> EavResult<(&Arc<Family>, &Attribute)> {
        self.candidates
            .iter()
            .find_map(|family| {
                family
                    .get_attribute(code)
                    .ok()
                    .map(|attribute| (family, attribute))
            })
            .ok_or_else(|| {
                EavError::missing_attribute(
                    self.candidates.first().map(|family| family.code()),
                    code,
                )
            })
    }

    /// Joins handler predicates with AND.
    pub fn get_and(&self, handlers: &[&dyn ConditionHandler]) -> EavResult<Condition> {
        self.compose(handlers, " AND ")
    }

    /// Joins handler predicates with OR.
    pub fn get_or(&self, handlers: &[&dyn ConditionHandler]) -> EavResult<Condition> {
        self.compose(handlers, " OR ")
    }

    fn compose(&self, handlers: &[&dyn ConditionHandler], glue: &str) -> EavResult<Condition> {
        self.ensure_not_applied()?;
        if handlers.is_empty() {
            return Err(EavError::logic("cannot compose an empty condition list"));
        }
        let mut parts = Vec::with_capacity(handlers.len());
        let mut params = Vec::new();
        for handler in handlers {
            let condition = handler.condition()?;
            parts.push(format!("({})", condition.sql));
            params.extend(condition.params);
        }
        Ok(Condition::new(parts.join(glue), params))
    }

    /// Commits `handler` into the WHERE clause. Allowed once per query.
    ///
    /// # Errors
    /// - `Logic` when already applied or when `handler` holds no predicate.
    pub fn apply(&self, handler: &dyn ConditionHandler) -> EavResult<()> {
        self.ensure_not_applied()?;
        let condition = handler.condition()?;
        let mut state = self.state.borrow_mut();
        state.sql.and_where(condition.sql);
        state.sql.set_parameters(condition.params);
        state.applied = true;
        Ok(())
    }

    pub fn is_applied(&self) -> bool {
        self.state.borrow().applied
    }

    /// Orders by the attribute column, joining the attribute first if needed.
    pub fn add_order_by(
        &self,
        attribute: &AttributeQueryBuilder<'a>,
        order: SortOrder,
    ) -> EavResult<()> {
        attribute.ensure_join()?;
        let column = attribute.column();
        self.with_sql(|sql| {
            sql.order_by(column, order);
        });
        Ok(())
    }

    pub fn set_limit(&self, limit: Option<u64>) {
        self.with_sql(|sql| {
            sql.limit(limit);
        });
    }

    pub fn set_offset(&self, offset: Option<u64>) {
        self.with_sql(|sql| {
            sql.offset(offset);
        });
    }

    /// Allocates a parameter name for raw predicates.
    pub fn next_parameter(&self) -> String {
        self.with_sql(SqlQueryBuilder::next_parameter)
    }

    /// Rendered statement.
    pub fn sql(&self) -> String {
        self.state.borrow().sql.sql()
    }

    /// Every bound parameter, including those of the base family filter.
    pub fn params(&self) -> Vec<SqlParam> {
        self.state.borrow().sql.params().to_vec()
    }

    pub fn join_count(&self) -> usize {
        self.state.borrow().sql.join_count()
    }

    /// Runs `f` against the shared SQL builder.
    pub(crate) fn with_sql<T>(&self, f: impl FnOnce(&mut SqlQueryBuilder) -> T) -> T {
        let mut state = self.state.borrow_mut();
        f(&mut state.sql)
    }

    fn ensure_not_applied(&self) -> EavResult<()> {
        if self.is_applied() {
            return Err(EavError::logic("query conditions were already applied"));
        }
        Ok(())
    }
}
