//! Batched hydration of data values and related data.
//!
//! # Responsibility
//! - Load the values of many data instances with one query per value
//!   storage class and batch, instead of one query per instance.
//! - Follow autoload and embedded relations down to a bounded depth.
//!
//! # Invariants
//! - Relations are followed into an identity at most once per loader
//!   instance; cycles terminate on the already-loaded set.
//! - Roots handed to a load always come back hydrated, even when the loader
//!   already saw their identity.
//! - Values already present in memory are never overwritten by a load.
//! - Failures while discovering relation targets skip the prefetch, they
//!   never fail the load.
//!
//! # See also
//! - `repo::SqliteDataRepository` which hydrates every read through here.

mod graph;

pub use graph::DataGraph;

use crate::config::Schema;
use crate::model::data::{Data, DataId};
use crate::model::storage::{ValueClass, DATA_TABLE};
use crate::repo::mapping::{
    data_select_list, parse_data_row, parse_value_row, qualified, value_column_count,
    value_columns,
};
use crate::repo::RepoResult;
use log::{debug, info};
use rusqlite::{params_from_iter, Connection};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

/// Maximum identities bound into one `IN (...)` list.
const BATCH_SIZE: usize = 500;

#[derive(Debug, Default)]
struct LoadStats {
    batches: usize,
    values: usize,
    skipped: usize,
    partitions: usize,
}

/// Stateful loader; relations already followed are not followed again until
/// [`reset`](Self::reset).
pub struct OptimizedDataLoader<'a> {
    conn: &'a Connection,
    schema: &'a Schema,
    loaded: HashSet<DataId>,
}

impl<'a> OptimizedDataLoader<'a> {
    pub fn new(conn: &'a Connection, schema: &'a Schema) -> Self {
        Self {
            conn,
            schema,
            loaded: HashSet::new(),
        }
    }

    /// Hydrates `entities` and follows autoload/embedded relations `depth` levels.
    ///
    /// `depth = 0` only hydrates the given entities. Transient entities are
    /// kept as roots but have nothing to load.
    pub fn load(&mut self, entities: Vec<Data>, depth: u32) -> RepoResult<DataGraph> {
        let started_at = Instant::now();
        let mut graph = DataGraph::new();
        let mut ids = Vec::with_capacity(entities.len());
        for data in entities {
            if let Some(id) = data.id() {
                ids.push(id);
            }
            graph.insert_root(data);
        }
        let roots = ids.len();

        let mut stats = LoadStats::default();
        self.load_level(&mut graph, ids, depth, &mut stats)?;

        info!(
            "event=data_load module=loader status=ok roots={} entities={} partitions={} batches={} values={} skipped={} depth={} duration_ms={}",
            roots,
            graph.len(),
            stats.partitions,
            stats.batches,
            stats.values,
            stats.skipped,
            depth,
            started_at.elapsed().as_millis()
        );
        Ok(graph)
    }

    /// Reads data rows by id, then loads them like [`load`](Self::load).
    ///
    /// Unknown ids are ignored; roots keep the order of `ids`.
    pub fn load_ids(&mut self, ids: &[DataId], depth: u32) -> RepoResult<DataGraph> {
        let mut found = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {} FROM {DATA_TABLE} d WHERE d.id IN ({placeholders})",
                data_select_list("d")
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(chunk.iter().map(DataId::to_string)))?;
            while let Some(row) = rows.next()? {
                found.push(parse_data_row(row, 0, self.schema.families())?);
            }
        }
        found.sort_by_key(|data| {
            data.id()
                .and_then(|id| ids.iter().position(|candidate| *candidate == id))
        });
        self.load(found, depth)
    }

    /// Forgets every loaded identity.
    pub fn reset(&mut self) {
        self.loaded.clear();
    }

    pub fn is_loaded(&self, id: DataId) -> bool {
        self.loaded.contains(&id)
    }

    fn load_level(
        &mut self,
        graph: &mut DataGraph,
        ids: Vec<DataId>,
        depth: u32,
        stats: &mut LoadStats,
    ) -> RepoResult<()> {
        let mut pending = Vec::with_capacity(ids.len());
        let mut queued = HashSet::with_capacity(ids.len());
        for id in ids {
            let fresh_copy = graph.get(id).is_some_and(|data| !data.has_loaded_values());
            if (self.loaded.insert(id) || fresh_copy) && queued.insert(id) {
                pending.push(id);
            } else {
                stats.skipped += 1;
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        let mut partitions: BTreeMap<String, (ValueClass, Vec<DataId>)> = BTreeMap::new();
        for &id in &pending {
            let Some(data) = graph.get(id) else {
                continue;
            };
            if data.has_loaded_values() {
                continue;
            }
            let value_class = data.family().value_class();
            partitions
                .entry(value_class.name().to_string())
                .or_insert_with(|| (value_class.clone(), Vec::new()))
                .1
                .push(id);
        }

        stats.partitions += partitions.len();
        for (value_class, ids) in partitions.into_values() {
            for chunk in ids.chunks(BATCH_SIZE) {
                self.fetch_values(graph, &value_class, chunk, stats)?;
            }
            for id in ids {
                if let Some(data) = graph.get_mut(id) {
                    data.init_values();
                }
            }
        }

        if depth == 0 {
            return Ok(());
        }
        let targets = self.relation_targets(graph, &pending);
        self.load_level(graph, targets, depth - 1, stats)
    }

    fn fetch_values(
        &self,
        graph: &mut DataGraph,
        value_class: &ValueClass,
        chunk: &[DataId],
        stats: &mut LoadStats,
    ) -> RepoResult<()> {
        let families = self.schema.families();
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT {}, {}
             FROM {} v
             LEFT JOIN {DATA_TABLE} t ON t.id = v.data_value_id
             WHERE v.data_id IN ({placeholders})
             ORDER BY v.data_id, v.attribute_code, v.position",
            qualified(&value_columns(value_class), "v"),
            data_select_list("t"),
            value_class.table()
        );
        let target_offset = value_column_count(value_class);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(chunk.iter().map(DataId::to_string)))?;
        while let Some(row) = rows.next()? {
            let value = parse_value_row(row, value_class, families)?;
            if row.get::<_, Option<String>>(target_offset)?.is_some() {
                graph.insert(parse_data_row(row, target_offset, families)?);
            }
            if let Some(owner) = value.data_id().and_then(|id| graph.get_mut(id)) {
                owner.inject_value(value);
                stats.values += 1;
            }
        }
        stats.batches += 1;
        Ok(())
    }

    fn relation_targets(&self, graph: &DataGraph, pending: &[DataId]) -> Vec<DataId> {
        let mut targets = Vec::new();
        for &id in pending {
            let Some(data) = graph.get(id) else {
                continue;
            };
            let values = match data.values() {
                Ok(values) => values,
                Err(err) => {
                    debug!("event=prefetch_skip module=loader data_id={id} error={err}");
                    continue;
                }
            };
            let prefetched = data
                .family()
                .attributes()
                .iter()
                .filter(|attribute| {
                    attribute.is_relation() && (attribute.is_autoload() || attribute.is_embedded())
                });
            for attribute in prefetched {
                let related = values
                    .iter()
                    .filter(|value| value.attribute_code() == attribute.code())
                    .filter_map(|value| value.data().as_data_id())
                    .filter(|target| !self.loaded.contains(target));
                targets.extend(related);
            }
        }
        targets
    }
}
