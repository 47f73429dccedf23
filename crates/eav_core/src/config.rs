//! Declaration tree and schema boot.
//!
//! # Responsibility
//! - Deserialize the static model (types, shared attributes, value storage
//!   classes, families) from JSON.
//! - Build the registries in dependency order and expose them as a `Schema`.
//!
//! # Invariants
//! - Attribute and family declaration order is preserved.
//! - Parents are registered before their children regardless of the order
//!   families are declared in.
//! - Boot either registers everything or fails; a `Schema` is never partial.

use crate::error::{ConfigError, EavError, EavResult};
use crate::model::attribute::AttributeConfig;
use crate::model::attribute_type::{AttributeType, TypeConfig};
use crate::model::data::Data;
use crate::model::family::{Family, FamilyConfig};
use crate::model::storage::{StorageLayout, ValueClassConfig};
use crate::registry::{AttributeRegistry, FamilyRegistry, TypeRegistry};
use log::{error, info};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Whole declaration tree.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EavConfig {
    /// Extra attribute types; a code shadowing a built-in type replaces it.
    #[serde(default)]
    pub types: BTreeMap<String, TypeConfig>,
    /// Shared attributes reused (and overridden) by families.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeConfig>,
    #[serde(default)]
    pub value_classes: BTreeMap<String, ValueClassConfig>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub families: Vec<(String, FamilyConfig)>,
}

impl EavConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// - `ConfigError::Parse` for malformed JSON or unknown keys.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// # Errors
    /// - `ConfigError::Parse` when the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| {
            ConfigError::Parse(format!("failed to read `{}`: {err}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn attribute_type(mut self, code: impl Into<String>, config: TypeConfig) -> Self {
        self.types.insert(code.into(), config);
        self
    }

    pub fn attribute(mut self, code: impl Into<String>, config: AttributeConfig) -> Self {
        self.attributes.insert(code.into(), config);
        self
    }

    pub fn family(mut self, code: impl Into<String>, config: FamilyConfig) -> Self {
        self.families.push((code.into(), config));
        self
    }
}

/// JSON object as ordered entries; `null` entries become `None`.
pub(crate) fn ordered_entries<'de, D, T>(deserializer: D) -> Result<Vec<(String, Option<T>)>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    map.into_iter()
        .map(|(key, value)| {
            if value.is_null() {
                return Ok((key, None));
            }
            let item = serde_json::from_value(value)
                .map_err(|err| D::Error::custom(format!("`{key}`: {err}")))?;
            Ok((key, Some(item)))
        })
        .collect()
}

/// JSON object as ordered entries; `null` entries become `T::default()`.
fn ordered_map<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let entries = ordered_entries::<D, T>(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|(key, value)| (key, value.unwrap_or_default()))
        .collect())
}

/// Booted static model.
#[derive(Debug, Clone)]
pub struct Schema {
    attributes: AttributeRegistry,
    families: FamilyRegistry,
    storage: StorageLayout,
}

impl Schema {
    /// Validates the declaration tree and registers every definition.
    ///
    /// # Errors
    /// - `Config` for any invalid declaration.
    /// - `MissingFamily` for a parent that is never declared.
    /// - `MissingAttributeType` for attributes of unknown types.
    pub fn from_config(config: &EavConfig) -> EavResult<Self> {
        let started_at = Instant::now();
        match Self::boot(config) {
            Ok(schema) => {
                info!(
                    "event=schema_boot module=config status=ok types={} attributes={} families={} duration_ms={}",
                    schema.types().len(),
                    schema.attributes.len(),
                    schema.families.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(schema)
            }
            Err(err) => {
                error!(
                    "event=schema_boot module=config status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    pub fn from_json_str(json: &str) -> EavResult<Self> {
        Self::from_config(&EavConfig::from_json_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> EavResult<Self> {
        Self::from_config(&EavConfig::from_json_file(path)?)
    }

    fn boot(config: &EavConfig) -> EavResult<Self> {
        let mut types = TypeRegistry::with_defaults();
        for (code, type_config) in &config.types {
            types.add_type(AttributeType::from_config(code, type_config)?);
        }

        let mut storage = StorageLayout::default();
        for (name, value_class) in &config.value_classes {
            storage.declare_value_class(name, value_class)?;
        }

        let mut attributes = AttributeRegistry::new(types);
        for (code, attribute_config) in &config.attributes {
            let attribute = attributes.create_attribute(code, attribute_config)?;
            attributes.add_attribute(attribute);
        }

        let mut families = FamilyRegistry::new();
        for (code, family_config) in registration_order(&config.families)? {
            let family =
                Family::from_config(code, family_config, &attributes, &families, &storage)?;
            families.add_family(family);
        }

        Ok(Self {
            attributes,
            families,
            storage,
        })
    }

    pub fn types(&self) -> &TypeRegistry {
        self.attributes.types()
    }

    pub fn attributes(&self) -> &AttributeRegistry {
        &self.attributes
    }

    pub fn families(&self) -> &FamilyRegistry {
        &self.families
    }

    pub fn storage(&self) -> &StorageLayout {
        &self.storage
    }

    pub fn get_family(&self, code: &str) -> EavResult<&Arc<Family>> {
        self.families.get_family(code)
    }

    /// Creates a transient instance of `family_code`.
    pub fn create_data(&self, family_code: &str) -> EavResult<Data> {
        self.families.get_family(family_code)?.create_data()
    }
}

/// Orders family declarations so parents come before children.
fn registration_order(
    families: &[(String, FamilyConfig)],
) -> EavResult<Vec<(&str, &FamilyConfig)>> {
    let declared: HashMap<&str, &FamilyConfig> = families
        .iter()
        .map(|(code, config)| (code.as_str(), config))
        .collect();

    let mut ordered = Vec::with_capacity(families.len());
    let mut placed: HashSet<&str> = HashSet::new();
    for (code, _) in families {
        let mut chain: Vec<&str> = Vec::new();
        let mut cursor = Some(code.as_str());
        while let Some(current) = cursor {
            if placed.contains(current) {
                break;
            }
            if chain.contains(&current) {
                return Err(ConfigError::ParentCycle(current.to_string()).into());
            }
            let config = declared
                .get(current)
                .ok_or_else(|| EavError::MissingFamily(current.to_string()))?;
            chain.push(current);
            cursor = config.parent.as_deref();
        }
        for current in chain.into_iter().rev() {
            placed.insert(current);
            ordered.push((current, declared[current]));
        }
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::{EavConfig, Schema};
    use crate::error::{ConfigError, EavError};
    use serde_json::json;

    #[test]
    fn declaration_order_of_attributes_is_kept() {
        let json = json!({
            "families": {
                "Page": {
                    "attributes": {
                        "zeta": {"type": "string"},
                        "alpha": {"type": "integer"},
                        "mid": null
                    }
                }
            }
        });
        let schema = Schema::from_json_str(&json.to_string()).unwrap();
        let codes: Vec<&str> = schema
            .get_family("Page")
            .unwrap()
            .attributes()
            .iter()
            .map(|attribute| attribute.code())
            .collect();
        assert_eq!(codes, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn children_may_be_declared_before_parents() {
        let json = json!({
            "families": {
                "Product": {"parent": "Item", "attributes": {"price": {"type": "decimal"}}},
                "Item": {"attributes": {"name": {"type": "string"}}}
            }
        });
        let schema = Schema::from_json_str(&json.to_string()).unwrap();
        let product = schema.get_family("Product").unwrap();
        assert!(product.has_attribute("name"));
        assert!(product.has_attribute("price"));
    }

    #[test]
    fn undeclared_parent_and_cycles_are_rejected() {
        let json = json!({"families": {"Product": {"parent": "Item"}}});
        assert_eq!(
            Schema::from_json_str(&json.to_string()).unwrap_err(),
            EavError::MissingFamily("Item".to_string())
        );

        let json = json!({"families": {
            "A": {"parent": "B"},
            "B": {"parent": "A"}
        }});
        assert!(matches!(
            Schema::from_json_str(&json.to_string()).unwrap_err(),
            EavError::Config(ConfigError::ParentCycle(_))
        ));
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = EavConfig::from_json_str(r#"{"familes": {}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn custom_types_and_value_classes_are_registered() {
        let json = json!({
            "types": {"money": {"column": "decimal", "widget": "money"}},
            "value_classes": {"versioned": {"table": "eav_versioned_value", "context_keys": ["version"]}},
            "families": {
                "Offer": {
                    "value_class": "versioned",
                    "attributes": {"price": {"type": "money", "context_mask": ["version"]}}
                }
            }
        });
        let schema = Schema::from_json_str(&json.to_string()).unwrap();
        assert!(schema.types().has_type("money"));
        let offer = schema.get_family("Offer").unwrap();
        assert_eq!(offer.value_class().table(), "eav_versioned_value");
    }
}
