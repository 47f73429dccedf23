//! Storage classes: which tables hold data rows and value rows.
//!
//! # Responsibility
//! - Describe value tables and the context-axis columns they declare.
//! - Resolve storage class names used by family declarations.
//!
//! # Invariants
//! - Every value table carries the base value columns plus exactly its
//!   declared context columns (verified by repositories at construction).
//! - Context keys are kept sorted so column order is deterministic.

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const DEFAULT_DATA_CLASS: &str = "default";
pub const DEFAULT_VALUE_CLASS: &str = "default";
pub const CONTEXTUAL_VALUE_CLASS: &str = "contextual";

pub const DATA_TABLE: &str = "eav_data";
pub const VALUE_TABLE: &str = "eav_value";
pub const CONTEXT_VALUE_TABLE: &str = "eav_context_value";

/// Columns of a data table, in the order queries select them.
pub const DATA_COLUMNS: [&str; 5] = ["id", "family_code", "parent_id", "created_at", "updated_at"];

/// Data storage class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataClass {
    name: String,
    table: String,
}

impl DataClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Value storage class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueClass {
    name: String,
    table: String,
    context_keys: Vec<String>,
}

impl ValueClass {
    pub fn new(name: impl Into<String>, table: impl Into<String>, context_keys: &[&str]) -> Self {
        let mut keys: Vec<String> = context_keys.iter().map(|key| key.to_string()).collect();
        keys.sort();
        keys.dedup();
        Self {
            name: name.into(),
            table: table.into(),
            context_keys: keys,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn context_keys(&self) -> &[String] {
        &self.context_keys
    }

    pub fn is_contextual(&self) -> bool {
        !self.context_keys.is_empty()
    }

    pub fn has_context_key(&self, axis: &str) -> bool {
        self.context_keys.iter().any(|key| key == axis)
    }
}

/// Declaration of an extra value storage class.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueClassConfig {
    pub table: String,
    #[serde(default)]
    pub context_keys: Vec<String>,
}

/// Known storage classes.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    data_classes: BTreeMap<String, DataClass>,
    value_classes: BTreeMap<String, ValueClass>,
}

impl Default for StorageLayout {
    fn default() -> Self {
        let mut layout = Self {
            data_classes: BTreeMap::new(),
            value_classes: BTreeMap::new(),
        };
        layout.data_classes.insert(
            DEFAULT_DATA_CLASS.to_string(),
            DataClass {
                name: DEFAULT_DATA_CLASS.to_string(),
                table: DATA_TABLE.to_string(),
            },
        );
        layout.add_value_class(ValueClass::new(DEFAULT_VALUE_CLASS, VALUE_TABLE, &[]));
        layout.add_value_class(ValueClass::new(
            CONTEXTUAL_VALUE_CLASS,
            CONTEXT_VALUE_TABLE,
            &["channel", "country", "language"],
        ));
        layout
    }
}

impl StorageLayout {
    /// Registers a value class; last write wins.
    pub fn add_value_class(&mut self, value_class: ValueClass) {
        self.value_classes
            .insert(value_class.name.clone(), value_class);
    }

    /// Registers a declared value class after checking its identifiers.
    pub fn declare_value_class(
        &mut self,
        name: &str,
        config: &ValueClassConfig,
    ) -> Result<(), ConfigError> {
        if !is_sql_identifier(name) {
            return Err(ConfigError::InvalidCode(name.to_string()));
        }
        if !is_sql_identifier(&config.table) {
            return Err(ConfigError::InvalidCode(config.table.clone()));
        }
        for axis in &config.context_keys {
            if !is_sql_identifier(axis) {
                return Err(ConfigError::InvalidCode(axis.clone()));
            }
        }
        let keys: Vec<&str> = config.context_keys.iter().map(String::as_str).collect();
        self.add_value_class(ValueClass::new(name, config.table.as_str(), &keys));
        Ok(())
    }

    pub fn data_class(&self, name: &str) -> Option<&DataClass> {
        self.data_classes.get(name)
    }

    pub fn value_class(&self, name: &str) -> Option<&ValueClass> {
        self.value_classes.get(name)
    }

    pub fn value_classes(&self) -> impl Iterator<Item = &ValueClass> {
        self.value_classes.values()
    }
}

/// Identifiers interpolated into SQL must be plain ASCII words.
pub(crate) fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::{StorageLayout, ValueClassConfig, CONTEXTUAL_VALUE_CLASS};

    #[test]
    fn default_layout_declares_contextual_axes_sorted() {
        let layout = StorageLayout::default();
        let contextual = layout.value_class(CONTEXTUAL_VALUE_CLASS).unwrap();
        assert_eq!(
            contextual.context_keys(),
            &["channel".to_string(), "country".to_string(), "language".to_string()]
        );
        assert!(!layout.value_class("default").unwrap().is_contextual());
    }

    #[test]
    fn declare_value_class_rejects_unsafe_identifiers() {
        let mut layout = StorageLayout::default();
        let config = ValueClassConfig {
            table: "values; DROP TABLE eav_data".to_string(),
            context_keys: Vec::new(),
        };
        assert!(layout.declare_value_class("custom", &config).is_err());
    }
}
