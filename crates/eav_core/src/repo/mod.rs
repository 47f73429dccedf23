//! Persistence of data and value records.
//!
//! # Responsibility
//! - Define the data access contract used by applications.
//! - Keep SQL, row mapping and cascade rules inside the storage boundary.
//!
//! # Invariants
//! - Write paths run `Data::validate()` and uniqueness checks before any
//!   SQL mutation.
//! - Repositories are only constructed over connections whose schema
//!   matches the registered storage classes.
//! - Repository APIs return semantic errors (`NotFound`, `Validation`,
//!   `UniqueViolation`) in addition to transport errors.

mod data_repo;
pub(crate) mod mapping;

pub use data_repo::{DataRepository, SqliteDataRepository};

use crate::db::DbError;
use crate::error::EavError;
use crate::model::data::{DataId, ValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from data repository and loader operations.
#[derive(Debug)]
pub enum RepoError {
    /// Model, lookup or query building failure.
    Eav(EavError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Data row does not exist.
    NotFound(DataId),
    /// Persisted rows cannot be converted to the runtime model.
    InvalidData(String),
    /// Data rejected by pre-write validation.
    Validation(ValidationError),
    /// Another data of the family already holds this value of a unique attribute.
    UniqueViolation {
        family: String,
        attribute: String,
        value: String,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Storage class table is missing.
    MissingRequiredTable(String),
    /// Storage class table lacks a base or context column.
    MissingRequiredColumn { table: String, column: String },
    /// Value class table carries a column its storage class does not declare.
    UnexpectedColumn { table: String, column: String },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eav(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "data not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::UniqueViolation {
                family,
                attribute,
                value,
            } => write!(
                f,
                "value `{value}` of attribute `{attribute}` is already used in family `{family}`"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "data repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "data repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "data repository requires column `{column}` in table `{table}`"
            ),
            Self::UnexpectedColumn { table, column } => write!(
                f,
                "table `{table}` has column `{column}` not declared by its value class"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Eav(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EavError> for RepoError {
    fn from(value: EavError) -> Self {
        Self::Eav(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}
