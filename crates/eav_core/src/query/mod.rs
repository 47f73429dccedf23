//! EAV query building.
//!
//! # Responsibility
//! - Translate attribute predicates into joins on value tables plus WHERE
//!   fragments with named parameters.
//! - Compose predicates with AND/OR and commit them to one SQL query.
//!
//! # Invariants
//! - Every interpolated identifier comes from the static model (validated
//!   codes, declared tables and axes); runtime values are always bound.
//! - One attribute query builder emits at most one join, shared by its clones.
//!
//! # See also
//! - `repo::SqliteDataRepository::fetch` for execution.

mod attribute;
mod eav;
mod sql;

pub use attribute::AttributeQueryBuilder;
pub use eav::EavQueryBuilder;
pub use sql::{SqlParam, SqlQueryBuilder};

use crate::error::EavResult;

/// ORDER BY direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// SQL predicate fragment with the parameters it references.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Condition {
    pub fn new(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Predicate without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// Anything able to produce one predicate for composition.
pub trait ConditionHandler {
    /// # Errors
    /// - `Logic` when the handler holds no predicate yet.
    fn condition(&self) -> EavResult<Condition>;
}

impl ConditionHandler for Condition {
    fn condition(&self) -> EavResult<Condition> {
        Ok(self.clone())
    }
}
