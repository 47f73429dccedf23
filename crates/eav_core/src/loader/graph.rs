//! Identity-keyed arena of loaded data.

use crate::error::EavResult;
use crate::model::data::{Data, DataId};
use std::collections::HashMap;

/// Data loaded together, addressable by identity.
///
/// Relations resolve through the graph instead of object references, so
/// cyclic relations are plain id lookups.
#[derive(Debug, Default)]
pub struct DataGraph {
    entities: Vec<Data>,
    index: HashMap<DataId, usize>,
    roots: Vec<usize>,
}

impl DataGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `data` unless an entity with the same id is already present.
    ///
    /// Returns the slot of the stored entity.
    pub(crate) fn insert(&mut self, data: Data) -> usize {
        if let Some(&slot) = data.id().and_then(|id| self.index.get(&id)) {
            return slot;
        }
        let slot = self.entities.len();
        if let Some(id) = data.id() {
            self.index.insert(id, slot);
        }
        self.entities.push(data);
        slot
    }

    pub(crate) fn insert_root(&mut self, data: Data) {
        let slot = self.insert(data);
        if !self.roots.contains(&slot) {
            self.roots.push(slot);
        }
    }

    pub fn contains(&self, id: DataId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: DataId) -> Option<&Data> {
        self.index.get(&id).map(|&slot| &self.entities[slot])
    }

    pub fn get_mut(&mut self, id: DataId) -> Option<&mut Data> {
        self.index
            .get(&id)
            .copied()
            .map(move |slot| &mut self.entities[slot])
    }

    /// Entities passed to the load, in input order.
    pub fn roots(&self) -> impl Iterator<Item = &Data> {
        self.roots.iter().map(|&slot| &self.entities[slot])
    }

    /// Every entity, roots and related ones.
    pub fn iter(&self) -> impl Iterator<Item = &Data> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Targets of relation attribute `code` on `id` that are part of the graph.
    ///
    /// # Errors
    /// - `MissingAttribute` when `code` is not part of the family.
    /// - `ValuesNotLoaded` when the entity was loaded as a relation shell only.
    pub fn related(&self, id: DataId, code: &str) -> EavResult<Vec<&Data>> {
        let Some(data) = self.get(id) else {
            return Ok(Vec::new());
        };
        Ok(data
            .current_values(code, None)?
            .into_iter()
            .filter_map(|value| value.data().as_data_id())
            .filter_map(|target| self.get(target))
            .collect())
    }

    /// Consumes the graph, keeping only the roots.
    pub fn into_roots(self) -> Vec<Data> {
        let roots = self.roots;
        let mut slots: Vec<Option<Data>> = self.entities.into_iter().map(Some).collect();
        roots
            .into_iter()
            .filter_map(|slot| slots.get_mut(slot).and_then(Option::take))
            .collect()
    }
}
