//! Row mapping and schema readiness checks shared by the repository and
//! the data loader.

use crate::config::Schema;
use crate::db::migrations::latest_version;
use crate::model::attribute_type::StorageColumn;
use crate::model::data::{Data, DataId};
use crate::model::storage::{ValueClass, DATA_COLUMNS, DATA_TABLE};
use crate::model::value::{Value, ValueData, DATETIME_FORMAT, DATE_FORMAT};
use crate::registry::FamilyRegistry;
use crate::repo::{RepoError, RepoResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, Row};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

const VALUE_BASE_COLUMNS: [&str; 6] = [
    "id",
    "data_id",
    "data_value_id",
    "attribute_code",
    "family_code",
    "position",
];

/// Typed columns other than the relation column, in row order.
const TYPED_COLUMNS: [StorageColumn; 7] = [
    StorageColumn::Bool,
    StorageColumn::Integer,
    StorageColumn::Decimal,
    StorageColumn::Date,
    StorageColumn::DateTime,
    StorageColumn::String,
    StorageColumn::Text,
];

/// Physical columns of a value table: base, typed, then context axes.
pub(crate) fn value_columns(value_class: &ValueClass) -> Vec<String> {
    VALUE_BASE_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .chain(TYPED_COLUMNS.iter().map(|column| column.column_name().to_string()))
        .chain(value_class.context_keys().iter().cloned())
        .collect()
}

/// Comma separated, alias-qualified column list.
pub(crate) fn qualified(columns: &[String], alias: &str) -> String {
    columns
        .iter()
        .map(|column| format!("{alias}.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn data_select_list(alias: &str) -> String {
    DATA_COLUMNS
        .iter()
        .map(|column| format!("{alias}.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Number of columns produced by [`value_columns`].
pub(crate) fn value_column_count(value_class: &ValueClass) -> usize {
    VALUE_BASE_COLUMNS.len() + TYPED_COLUMNS.len() + value_class.context_keys().len()
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

/// Reads a data row starting at column `offset`; values are left unhydrated.
pub(crate) fn parse_data_row(
    row: &Row<'_>,
    offset: usize,
    families: &FamilyRegistry,
) -> RepoResult<Data> {
    let id_text: String = row.get(offset)?;
    let id = parse_uuid(&id_text, "eav_data.id")?;
    let family_code: String = row.get(offset + 1)?;
    let family = Arc::clone(families.get_family(&family_code)?);
    let parent_id = row
        .get::<_, Option<String>>(offset + 2)?
        .map(|value| parse_uuid(&value, "eav_data.parent_id"))
        .transpose()?;
    let created_at: i64 = row.get(offset + 3)?;
    let updated_at: i64 = row.get(offset + 4)?;
    Ok(Data::from_storage(
        id, family, parent_id, created_at, updated_at,
    ))
}

/// Reads a value row laid out as [`value_columns`] starting at column 0.
///
/// The typed column is picked from the attribute declaration; values of
/// attributes unknown to the family fall back to the first non-null column.
pub(crate) fn parse_value_row(
    row: &Row<'_>,
    value_class: &ValueClass,
    families: &FamilyRegistry,
) -> RepoResult<Value> {
    let table = value_class.table();
    let id_text: String = row.get(0)?;
    let id = parse_uuid(&id_text, &format!("{table}.id"))?;
    let data_id_text: String = row.get(1)?;
    let data_id = parse_uuid(&data_id_text, &format!("{table}.data_id"))?;
    let target = row
        .get::<_, Option<String>>(2)?
        .map(|value| parse_uuid(&value, &format!("{table}.data_value_id")))
        .transpose()?;
    let attribute_code: String = row.get(3)?;
    let family_code: String = row.get(4)?;
    let position: i64 = row.get(5)?;

    let declared = families
        .get_family(&family_code)
        .ok()
        .and_then(|family| family.get_attribute(&attribute_code).ok())
        .map(|attribute| attribute.attribute_type().column());

    let data = match declared {
        Some(StorageColumn::Data) => target.map_or(ValueData::Null, ValueData::Data),
        Some(column) => read_typed(row, column, table)?,
        None => match target {
            Some(target) => ValueData::Data(target),
            None => first_non_null(row, table)?,
        },
    };

    let base = VALUE_BASE_COLUMNS.len() + TYPED_COLUMNS.len();
    let mut context = BTreeMap::new();
    for (index, axis) in value_class.context_keys().iter().enumerate() {
        let value: Option<String> = row.get(base + index)?;
        context.insert(axis.clone(), value);
    }

    Ok(Value::from_storage(
        id,
        data_id,
        attribute_code,
        family_code,
        position,
        value_class.name().to_string(),
        context,
        data,
    ))
}

fn typed_index(column: StorageColumn) -> Option<usize> {
    TYPED_COLUMNS
        .iter()
        .position(|candidate| *candidate == column)
        .map(|index| VALUE_BASE_COLUMNS.len() + index)
}

fn read_typed(row: &Row<'_>, column: StorageColumn, table: &str) -> RepoResult<ValueData> {
    let Some(index) = typed_index(column) else {
        return Ok(ValueData::Null);
    };
    let name = column.column_name();
    let data = match column {
        StorageColumn::Bool => row
            .get::<_, Option<i64>>(index)?
            .map_or(ValueData::Null, |value| ValueData::Bool(value != 0)),
        StorageColumn::Integer => row
            .get::<_, Option<i64>>(index)?
            .map_or(ValueData::Null, ValueData::Integer),
        StorageColumn::Decimal => row
            .get::<_, Option<f64>>(index)?
            .map_or(ValueData::Null, ValueData::Decimal),
        StorageColumn::Date => match row.get::<_, Option<String>>(index)? {
            Some(text) => NaiveDate::parse_from_str(&text, DATE_FORMAT)
                .map(ValueData::Date)
                .map_err(|_| {
                    RepoError::InvalidData(format!("invalid date `{text}` in {table}.{name}"))
                })?,
            None => ValueData::Null,
        },
        StorageColumn::DateTime => match row.get::<_, Option<String>>(index)? {
            Some(text) => NaiveDateTime::parse_from_str(&text, DATETIME_FORMAT)
                .map(ValueData::DateTime)
                .map_err(|_| {
                    RepoError::InvalidData(format!("invalid datetime `{text}` in {table}.{name}"))
                })?,
            None => ValueData::Null,
        },
        StorageColumn::String => row
            .get::<_, Option<String>>(index)?
            .map_or(ValueData::Null, ValueData::String),
        StorageColumn::Text => row
            .get::<_, Option<String>>(index)?
            .map_or(ValueData::Null, ValueData::Text),
        StorageColumn::Data => ValueData::Null,
    };
    Ok(data)
}

fn first_non_null(row: &Row<'_>, table: &str) -> RepoResult<ValueData> {
    for column in TYPED_COLUMNS {
        let data = read_typed(row, column, table)?;
        if !data.is_null() {
            return Ok(data);
        }
    }
    Ok(ValueData::Null)
}

/// Bind values for one value row, in [`value_columns`] order.
pub(crate) fn value_row_params(
    value: &Value,
    id: Uuid,
    data_id: DataId,
    value_class: &ValueClass,
) -> Vec<rusqlite::types::Value> {
    use rusqlite::types::Value as SqlValue;

    let data = value.data();
    let target = data
        .as_data_id()
        .map_or(SqlValue::Null, |target| SqlValue::Text(target.to_string()));
    let mut params = vec![
        SqlValue::Text(id.to_string()),
        SqlValue::Text(data_id.to_string()),
        target,
        SqlValue::Text(value.attribute_code().to_string()),
        SqlValue::Text(value.family_code().to_string()),
        SqlValue::Integer(value.position()),
    ];
    for column in TYPED_COLUMNS {
        params.push(if data.column() == Some(column) {
            data.to_sql()
        } else {
            SqlValue::Null
        });
    }
    for axis in value_class.context_keys() {
        let axis_value = value.context().get(axis).cloned().flatten();
        params.push(axis_value.map_or(SqlValue::Null, SqlValue::Text));
    }
    params
}

/// Verifies schema version and every storage class table of `schema`.
pub(crate) fn ensure_repository_ready(conn: &Connection, schema: &Schema) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let data_columns: Vec<String> = DATA_COLUMNS.iter().map(|column| column.to_string()).collect();
    ensure_table(conn, DATA_TABLE, &data_columns)?;
    for value_class in schema.storage().value_classes() {
        let table = value_class.table();
        let columns = value_columns(value_class);
        let present = ensure_table(conn, table, &columns)?;
        if let Some(extra) = present.into_iter().find(|column| !columns.contains(column)) {
            return Err(RepoError::UnexpectedColumn {
                table: table.to_string(),
                column: extra,
            });
        }
    }
    Ok(())
}

/// Checks `columns` exist in `table`; returns every column the table has.
fn ensure_table(conn: &Connection, table: &str, columns: &[String]) -> RepoResult<Vec<String>> {
    if !table_exists(conn, table)? {
        return Err(RepoError::MissingRequiredTable(table.to_string()));
    }
    let present = table_columns(conn, table)?;
    for column in columns {
        if !present.contains(column) {
            return Err(RepoError::MissingRequiredColumn {
                table: table.to_string(),
                column: column.clone(),
            });
        }
    }
    Ok(present)
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}
