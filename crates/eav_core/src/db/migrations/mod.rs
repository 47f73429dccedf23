//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - Migrations only create storage for the built-in storage classes;
//!   extra value classes bring their own tables.

use crate::db::{DbError, DbResult};
use crate::model::storage::StorageLayout;
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "eav_init",
    sql: include_str!("0001_init.sql"),
}];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations in one transaction.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database is newer than this binary.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }
    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current_version)
    {
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        info!(
            "event=db_migrate module=db status=applied version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    Ok(())
}

/// Reads `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Creates the table of every value class not covered by migrations.
///
/// Tables use the layout of `eav_value` plus one nullable column per
/// context axis. Existing tables are left untouched.
///
/// # Errors
/// - `ValueTable` naming the table whose DDL failed.
pub fn ensure_value_tables(conn: &Connection, storage: &StorageLayout) -> DbResult<()> {
    for value_class in storage.value_classes() {
        let table = value_class.table();
        let axes: String = value_class
            .context_keys()
            .iter()
            .map(|axis| format!(",\n    {axis} TEXT NULL"))
            .collect();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
    id TEXT PRIMARY KEY NOT NULL,
    data_id TEXT NOT NULL REFERENCES eav_data(id) ON DELETE CASCADE,
    data_value_id TEXT NULL REFERENCES eav_data(id) ON DELETE SET NULL,
    attribute_code TEXT NOT NULL,
    family_code TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0,
    bool_value INTEGER NULL,
    integer_value INTEGER NULL,
    decimal_value REAL NULL,
    date_value TEXT NULL,
    datetime_value TEXT NULL,
    string_value TEXT NULL,
    text_value TEXT NULL{axes}
);
CREATE INDEX IF NOT EXISTS idx_{table}_data ON {table}(data_id, attribute_code);
CREATE INDEX IF NOT EXISTS idx_{table}_target ON {table}(data_value_id);"
        ))
        .map_err(|source| DbError::ValueTable {
            table: table.to_string(),
            source,
        })?;
        info!("event=db_value_table module=db status=ok table={table}");
    }
    Ok(())
}
