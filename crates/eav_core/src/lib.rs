//! Entity-attribute-value modeling over SQLite.
//!
//! Families declare typed attributes; data instances of a family store each
//! attribute as value rows. The crate boots the declaration tree into
//! registries, builds composable queries over value joins and hydrates data
//! in batches.

pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod logging;
pub mod model;
pub mod query;
pub mod registry;
pub mod repo;

pub use config::{EavConfig, Schema};
pub use db::{ensure_value_tables, open_db, open_db_in_memory, DbError, DbResult};
pub use error::{ConfigError, ContextError, EavError, EavResult};
pub use loader::{DataGraph, OptimizedDataLoader};
pub use logging::{default_log_level, init_logging, init_logging_with, logging_status};
pub use logging::{LoggingConfig, LoggingError};
pub use model::attribute::{Attribute, AttributeConfig};
pub use model::attribute_type::{AttributeType, StorageColumn, TypeConfig};
pub use model::context::Context;
pub use model::data::{AttributeValue, Data, DataId, ValidationError};
pub use model::family::{Family, FamilyConfig};
pub use model::value::{Value, ValueData};
pub use query::{
    AttributeQueryBuilder, Condition, ConditionHandler, EavQueryBuilder, SortOrder,
    SqlQueryBuilder,
};
pub use registry::{AttributeRegistry, FamilyRegistry, TypeRegistry};
pub use repo::{DataRepository, RepoError, RepoResult, SqliteDataRepository};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
