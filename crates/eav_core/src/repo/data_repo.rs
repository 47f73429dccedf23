//! Data repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist data rows and their value rows in the family's storage classes.
//! - Execute composed EAV queries and hydrate results through the loader.
//!
//! # Invariants
//! - `save` runs defaults, validation, relation target and uniqueness
//!   checks before opening the write transaction.
//! - Value rows are upserted by identity; removed values are deleted in the
//!   same transaction as the data row write.
//! - Removing data deletes its value rows (cascade), nulls relation columns
//!   pointing at it and recursively removes embedded or orphan-removal targets.

use crate::config::Schema;
use crate::error::{EavError, EavResult};
use crate::loader::{DataGraph, OptimizedDataLoader};
use crate::model::data::{AttributeValue, Data, DataId, ValidationError};
use crate::model::storage::DATA_TABLE;
use crate::model::value::{Value, ValueData};
use crate::query::{AttributeQueryBuilder, Condition, ConditionHandler, EavQueryBuilder, SortOrder};
use crate::repo::mapping::{
    ensure_repository_ready, parse_data_row, parse_value_row, qualified, value_columns,
    value_row_params,
};
use crate::repo::{RepoError, RepoResult};
use chrono::Utc;
use log::{debug, info};
use rusqlite::types::Value as SqlValue;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Repository interface for data instances.
pub trait DataRepository {
    /// Inserts or updates one data instance and its loaded values.
    fn save(&self, data: &mut Data) -> RepoResult<DataId>;
    /// Loads one data instance with hydrated values.
    fn find(&self, id: DataId) -> RepoResult<Option<Data>>;
    /// Data of `family_code` (and descendants) matching every criterion.
    ///
    /// Single values compare with equality, collections with `IN`.
    fn find_by(
        &self,
        family_code: &str,
        criteria: &[(&str, AttributeValue)],
    ) -> RepoResult<Vec<Data>>;
    /// First match of [`find_by`](Self::find_by).
    fn find_one_by(
        &self,
        family_code: &str,
        criteria: &[(&str, AttributeValue)],
    ) -> RepoResult<Option<Data>>;
    /// Looks data up by the family's identifier attribute.
    fn find_by_identifier(&self, family_code: &str, identifier: ValueData)
        -> RepoResult<Option<Data>>;
    /// Every data of `family_code` and its descendant families.
    fn find_by_family(&self, family_code: &str) -> RepoResult<Vec<Data>>;
    /// Returns the only data of a singleton family, creating it when absent.
    fn get_instance(&self, family_code: &str) -> RepoResult<Data>;
    /// Deletes data and its owned related data; returns deleted row count.
    fn remove(&self, id: DataId) -> RepoResult<usize>;
    /// Loads values of other data that point at `data`.
    fn load_referers(&self, data: &mut Data) -> RepoResult<()>;
}

/// SQLite-backed data repository.
pub struct SqliteDataRepository<'a> {
    conn: &'a Connection,
    schema: &'a Schema,
}

impl<'a> SqliteDataRepository<'a> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'a Connection, schema: &'a Schema) -> RepoResult<Self> {
        ensure_repository_ready(conn, schema)?;
        Ok(Self { conn, schema })
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Starts a query over `family_code` and its descendants.
    pub fn query(&self, family_code: &str) -> EavResult<EavQueryBuilder<'a>> {
        EavQueryBuilder::for_family(self.schema.families(), family_code)
    }

    /// Loader bound to this repository's connection and schema.
    pub fn loader(&self) -> OptimizedDataLoader<'a> {
        OptimizedDataLoader::new(self.conn, self.schema)
    }

    /// Executes `query` and returns hydrated data in result order.
    pub fn fetch(&self, query: &EavQueryBuilder<'_>) -> RepoResult<Vec<Data>> {
        Ok(self.fetch_graph(query, 0)?.into_roots())
    }

    /// Executes `query` and prefetches relations `depth` levels deep.
    pub fn fetch_graph(&self, query: &EavQueryBuilder<'_>, depth: u32) -> RepoResult<DataGraph> {
        let rows = self.fetch_rows(query)?;
        self.loader().load(rows, depth)
    }

    fn fetch_rows(&self, query: &EavQueryBuilder<'_>) -> RepoResult<Vec<Data>> {
        let sql_text = query.sql();
        let started_at = Instant::now();
        let families = self.schema.families();
        let rows = query.with_sql(|sql| -> RepoResult<Vec<Data>> {
            let params = sql.named_params();
            let mut stmt = self.conn.prepare(&sql_text)?;
            let mut rows = stmt.query(params.as_slice())?;
            let mut found = Vec::new();
            while let Some(row) = rows.next()? {
                found.push(parse_data_row(row, 0, families)?);
            }
            Ok(found)
        })?;
        debug!(
            "event=eav_query module=repo status=ok params={} rows={} duration_ms={} sql={}",
            query.params().len(),
            rows.len(),
            started_at.elapsed().as_millis(),
            sql_text
        );
        Ok(rows)
    }

    fn criteria_query(
        &self,
        family_code: &str,
        criteria: &[(&str, AttributeValue)],
    ) -> RepoResult<EavQueryBuilder<'a>> {
        let query = self.query(family_code)?;
        let mut handlers: Vec<AttributeQueryBuilder<'a>> = Vec::with_capacity(criteria.len());
        for (code, value) in criteria {
            let attribute = query.attribute_with(code, false)?;
            let handler = match value {
                AttributeValue::Single(value) => attribute.equals(value.clone())?,
                AttributeValue::Collection(values) => attribute.in_list(values.clone())?,
            };
            handlers.push(handler);
        }
        if !handlers.is_empty() {
            let refs: Vec<&dyn ConditionHandler> = handlers
                .iter()
                .map(|handler| handler as &dyn ConditionHandler)
                .collect();
            let condition = query.get_and(&refs)?;
            query.apply(&condition)?;
        }
        let created_at = format!("{}.created_at", query.alias());
        let id = format!("{}.id", query.alias());
        query.with_sql(|sql| {
            sql.order_by(created_at, SortOrder::Asc)
                .order_by(id, SortOrder::Asc);
        });
        Ok(query)
    }

    fn check_relation_targets(&self, data: &Data) -> RepoResult<()> {
        let Ok(values) = data.values() else {
            return Ok(());
        };
        let families = self.schema.families();
        for attribute in data.family().attributes() {
            let allowed = attribute.allowed_families();
            if !attribute.is_relation() || allowed.is_empty() {
                continue;
            }
            let mut accepted = BTreeSet::new();
            for code in &allowed {
                accepted.extend(families.matching_codes(code)?);
            }
            let targets = values
                .iter()
                .filter(|value| value.attribute_code() == attribute.code())
                .filter_map(|value| value.data().as_data_id());
            for target in targets {
                let Some(family) = self.family_of(target)? else {
                    continue;
                };
                if !accepted.contains(&family) {
                    return Err(ValidationError::ForbiddenRelationTarget {
                        attribute: attribute.code().to_string(),
                        family,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn family_of(&self, id: DataId) -> RepoResult<Option<String>> {
        let family = self
            .conn
            .query_row(
                &format!("SELECT family_code FROM {DATA_TABLE} WHERE id = ?1;"),
                [id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(family)
    }

    /// Uniqueness is checked per family, attribute and value across all contexts.
    fn check_unique(&self, data: &Data) -> RepoResult<()> {
        let Ok(values) = data.values() else {
            return Ok(());
        };
        for attribute in data.family().attributes().iter().filter(|a| a.is_unique()) {
            let taken = values
                .iter()
                .filter(|value| value.attribute_code() == attribute.code())
                .map(Value::data)
                .filter(|value| !value.is_null());
            for value in taken {
                let query = self.query(data.family_code())?;
                let same_value = query.attribute(attribute.code())?.equals(value.clone())?;
                let other_data = match data.id() {
                    Some(id) => {
                        let name = query.next_parameter();
                        Condition::new(
                            format!("{}.id != {name}", query.alias()),
                            vec![(name, SqlValue::Text(id.to_string()))],
                        )
                    }
                    None => Condition::raw("1 = 1"),
                };
                let handlers: [&dyn ConditionHandler; 2] = [&same_value, &other_data];
                let condition = query.get_and(&handlers)?;
                query.apply(&condition)?;
                query.set_limit(Some(1));
                if !self.fetch_rows(&query)?.is_empty() {
                    return Err(RepoError::UniqueViolation {
                        family: data.family_code().to_string(),
                        attribute: attribute.code().to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn owned_targets(data: &Data) -> RepoResult<Vec<DataId>> {
        let values = data.values()?;
        let mut targets = Vec::new();
        let owning = data.family().attributes().iter().filter(|attribute| {
            attribute.is_relation() && (attribute.is_embedded() || attribute.has_orphan_removal())
        });
        for attribute in owning {
            targets.extend(
                values
                    .iter()
                    .filter(|value| value.attribute_code() == attribute.code())
                    .filter_map(|value| value.data().as_data_id()),
            );
        }
        Ok(targets)
    }
}

impl DataRepository for SqliteDataRepository<'_> {
    fn save(&self, data: &mut Data) -> RepoResult<DataId> {
        let started_at = Instant::now();
        data.prepare_for_save()?;
        data.validate()?;
        self.check_relation_targets(data)?;
        self.check_unique(data)?;

        let family = Arc::clone(data.family());
        let value_class = family.value_class().clone();
        let now = Utc::now().timestamp_millis();
        let id = data.id().unwrap_or_else(Uuid::new_v4);
        let created_at = data.created_at().unwrap_or(now);
        let removed: Vec<Uuid> = data.removed_values().to_vec();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            &format!(
                "INSERT INTO {DATA_TABLE} (id, family_code, parent_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    family_code = excluded.family_code,
                    parent_id = excluded.parent_id,
                    updated_at = excluded.updated_at;"
            ),
            params![
                id.to_string(),
                family.code(),
                data.parent_id().map(|value| value.to_string()),
                created_at,
                now,
            ],
        )?;

        let mut value_ids = Vec::new();
        if let Ok(values) = data.values() {
            let columns = value_columns(&value_class);
            let placeholders = (1..=columns.len())
                .map(|index| format!("?{index}"))
                .collect::<Vec<_>>()
                .join(", ");
            let updates = columns
                .iter()
                .skip(1)
                .map(|column| format!("{column} = excluded.{column}"))
                .collect::<Vec<_>>()
                .join(", ");
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})
                 ON CONFLICT(id) DO UPDATE SET {updates};",
                value_class.table(),
                columns.join(", ")
            ))?;
            for value in values {
                let value_id = value.id().unwrap_or_else(Uuid::new_v4);
                stmt.execute(params_from_iter(value_row_params(
                    value,
                    value_id,
                    id,
                    &value_class,
                )))?;
                value_ids.push(value_id);
            }
        }
        for value_id in &removed {
            tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1;", value_class.table()),
                [value_id.to_string()],
            )?;
        }
        tx.commit()?;

        if let Some(values) = data.values_mut_for_save() {
            for (value, value_id) in values.iter_mut().zip(&value_ids) {
                value.assign_identity(*value_id, id);
            }
        }
        data.mark_saved(id, now);

        info!(
            "event=data_save module=repo status=ok data_id={id} family={} values={} removed={} duration_ms={}",
            family.code(),
            value_ids.len(),
            removed.len(),
            started_at.elapsed().as_millis()
        );
        Ok(id)
    }

    fn find(&self, id: DataId) -> RepoResult<Option<Data>> {
        let graph = self.loader().load_ids(&[id], 0)?;
        Ok(graph.into_roots().into_iter().next())
    }

    fn find_by(
        &self,
        family_code: &str,
        criteria: &[(&str, AttributeValue)],
    ) -> RepoResult<Vec<Data>> {
        let query = self.criteria_query(family_code, criteria)?;
        self.fetch(&query)
    }

    fn find_one_by(
        &self,
        family_code: &str,
        criteria: &[(&str, AttributeValue)],
    ) -> RepoResult<Option<Data>> {
        let query = self.criteria_query(family_code, criteria)?;
        query.set_limit(Some(1));
        Ok(self.fetch(&query)?.into_iter().next())
    }

    fn find_by_identifier(
        &self,
        family_code: &str,
        identifier: ValueData,
    ) -> RepoResult<Option<Data>> {
        let family = self.schema.get_family(family_code)?;
        let Some(attribute) = family.attribute_as_identifier() else {
            return Err(EavError::logic(format!(
                "family `{family_code}` has no identifier attribute"
            ))
            .into());
        };
        self.find_one_by(
            family_code,
            &[(attribute.code(), AttributeValue::Single(identifier))],
        )
    }

    fn find_by_family(&self, family_code: &str) -> RepoResult<Vec<Data>> {
        self.find_by(family_code, &[])
    }

    fn get_instance(&self, family_code: &str) -> RepoResult<Data> {
        let family = self.schema.get_family(family_code)?;
        if !family.is_singleton() {
            return Err(
                EavError::logic(format!("family `{family_code}` is not a singleton")).into(),
            );
        }
        let existing = self
            .find_by_family(family_code)?
            .into_iter()
            .find(|data| data.family_code() == family_code);
        if let Some(data) = existing {
            return Ok(data);
        }
        let mut data = family.create_data()?;
        self.save(&mut data)?;
        Ok(data)
    }

    fn remove(&self, id: DataId) -> RepoResult<usize> {
        let started_at = Instant::now();
        let mut loader = self.loader();
        let mut visited = HashSet::new();
        let mut pending = vec![id];
        let mut doomed = Vec::new();
        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            let graph = loader.load_ids(&[current], 0)?;
            let Some(data) = graph.get(current) else {
                if current == id {
                    return Err(RepoError::NotFound(id));
                }
                continue;
            };
            pending.extend(Self::owned_targets(data)?);
            doomed.push(current);
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for target in &doomed {
            tx.execute(
                &format!("DELETE FROM {DATA_TABLE} WHERE id = ?1;"),
                [target.to_string()],
            )?;
        }
        tx.commit()?;

        info!(
            "event=data_remove module=repo status=ok data_id={id} removed={} duration_ms={}",
            doomed.len(),
            started_at.elapsed().as_millis()
        );
        Ok(doomed.len())
    }

    fn load_referers(&self, data: &mut Data) -> RepoResult<()> {
        let Some(id) = data.id() else {
            data.set_referers(Vec::new());
            return Ok(());
        };
        let families = self.schema.families();
        let mut referers = Vec::new();
        for value_class in self.schema.storage().value_classes() {
            let sql = format!(
                "SELECT {} FROM {} v
                 WHERE v.data_value_id = ?1
                 ORDER BY v.data_id, v.attribute_code, v.position;",
                qualified(&value_columns(value_class), "v"),
                value_class.table()
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query([id.to_string()])?;
            while let Some(row) = rows.next()? {
                referers.push(parse_value_row(row, value_class, families)?);
            }
        }
        data.set_referers(referers);
        Ok(())
    }
}
