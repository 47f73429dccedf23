//! Family definitions (dynamic entity types).
//!
//! # Responsibility
//! - Hold the ordered attribute set of one entity type, including every
//!   attribute inherited from the parent family.
//! - Act as the factory for data and value records of that type.
//!
//! # Invariants
//! - Inherited attributes are deep copies re-attached to this family, so
//!   overrides never leak into the parent.
//! - The identifier attribute, if any, is unique, required, single-valued and
//!   has an empty context mask.
//! - Every context axis used by attributes or the default context is a
//!   column of the family value class.

use crate::config::ordered_entries;
use crate::error::{ConfigError, EavError, EavResult};
use crate::model::attribute::{is_valid_code, Attribute, AttributeConfig};
use crate::model::context::{merge_contexts, Context};
use crate::model::data::Data;
use crate::model::storage::{
    DataClass, StorageLayout, ValueClass, DEFAULT_DATA_CLASS, DEFAULT_VALUE_CLASS,
};
use crate::model::value::Value;
use crate::registry::{AttributeRegistry, FamilyRegistry};
use serde::Deserialize;
use std::sync::Arc;

/// Family declaration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FamilyConfig {
    #[serde(default)]
    pub parent: Option<String>,
    /// Local attributes in declaration order; `null` reuses a shared attribute as is.
    #[serde(default, deserialize_with = "ordered_entries")]
    pub attributes: Vec<(String, Option<AttributeConfig>)>,
    #[serde(default)]
    pub attribute_as_label: Option<String>,
    #[serde(default)]
    pub attribute_as_identifier: Option<String>,
    #[serde(default)]
    pub instantiable: Option<bool>,
    #[serde(default)]
    pub singleton: Option<bool>,
    #[serde(default)]
    pub data_class: Option<String>,
    #[serde(default)]
    pub value_class: Option<String>,
    #[serde(default)]
    pub default_context: Context,
}

impl FamilyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn attribute(mut self, code: impl Into<String>, config: AttributeConfig) -> Self {
        self.attributes.push((code.into(), Some(config)));
        self
    }

    /// Reuses a shared attribute without local overrides.
    pub fn shared_attribute(mut self, code: impl Into<String>) -> Self {
        self.attributes.push((code.into(), None));
        self
    }

    pub fn label(mut self, code: impl Into<String>) -> Self {
        self.attribute_as_label = Some(code.into());
        self
    }

    pub fn identifier(mut self, code: impl Into<String>) -> Self {
        self.attribute_as_identifier = Some(code.into());
        self
    }

    pub fn value_class(mut self, name: impl Into<String>) -> Self {
        self.value_class = Some(name.into());
        self
    }

    pub fn abstract_family(mut self) -> Self {
        self.instantiable = Some(false);
        self
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = Some(true);
        self
    }

    pub fn default_context(mut self, context: Context) -> Self {
        self.default_context = context;
        self
    }
}

/// Runtime entity type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Family {
    code: String,
    parent_code: Option<String>,
    attributes: Vec<Attribute>,
    attribute_as_label: Option<String>,
    attribute_as_identifier: Option<String>,
    instantiable: bool,
    singleton: bool,
    data_class: DataClass,
    value_class: ValueClass,
    default_context: Context,
}

impl Family {
    /// Builds a family from its declaration.
    ///
    /// The parent must already be registered in `families`.
    ///
    /// # Errors
    /// - `MissingFamily` for an unknown parent.
    /// - `Config` for unknown label/identifier attributes, identifier
    ///   constraint violations and unknown storage classes.
    pub fn from_config(
        code: &str,
        config: &FamilyConfig,
        attributes: &AttributeRegistry,
        families: &FamilyRegistry,
        storage: &StorageLayout,
    ) -> EavResult<Self> {
        if !is_valid_code(code) {
            return Err(ConfigError::InvalidCode(code.to_string()).into());
        }

        let mut family = match &config.parent {
            Some(parent_code) => {
                let parent = families.get_family(parent_code)?;
                Self::inherit(code, parent)
            }
            None => Self::root(code, storage)?,
        };

        if let Some(name) = &config.data_class {
            family.data_class = storage
                .data_class(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownDataClass {
                    family: code.to_string(),
                    data_class: name.clone(),
                })?;
        }
        if let Some(name) = &config.value_class {
            family.value_class = storage
                .value_class(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownValueClass {
                    family: code.to_string(),
                    value_class: name.clone(),
                })?;
        }

        for (attribute_code, local) in &config.attributes {
            let local = local.clone().unwrap_or_default();
            let inherited = family
                .attributes
                .iter()
                .find(|attribute| attribute.code() == attribute_code)
                .cloned();
            let attribute = if let Some(mut inherited) = inherited {
                inherited.merge(&local, attributes.types())?;
                inherited
            } else if attributes.has_attribute(attribute_code) {
                let mut shared = attributes.get_attribute(attribute_code)?.clone();
                shared.merge(&local, attributes.types())?;
                shared
            } else {
                attributes.create_attribute(attribute_code, &local)?
            };
            family.add_attribute(attribute);
        }

        if let Some(label) = &config.attribute_as_label {
            if !family.has_attribute(label) {
                return Err(ConfigError::UnknownLabelAttribute {
                    family: code.to_string(),
                    attribute: label.clone(),
                }
                .into());
            }
            family.attribute_as_label = Some(label.clone());
        }
        if let Some(identifier) = &config.attribute_as_identifier {
            family.attribute_as_identifier = Some(identifier.clone());
        }
        family.validate_identifier()?;

        family.instantiable = config.instantiable.unwrap_or(true);
        family.singleton = config.singleton.unwrap_or(false);
        family.default_context = merge_contexts([&family.default_context, &config.default_context]);
        family.validate_context_axes()?;

        Ok(family)
    }

    fn root(code: &str, storage: &StorageLayout) -> EavResult<Self> {
        let data_class = storage
            .data_class(DEFAULT_DATA_CLASS)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownDataClass {
                family: code.to_string(),
                data_class: DEFAULT_DATA_CLASS.to_string(),
            })?;
        let value_class = storage
            .value_class(DEFAULT_VALUE_CLASS)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownValueClass {
                family: code.to_string(),
                value_class: DEFAULT_VALUE_CLASS.to_string(),
            })?;

        Ok(Self {
            code: code.to_string(),
            parent_code: None,
            attributes: Vec::new(),
            attribute_as_label: None,
            attribute_as_identifier: None,
            instantiable: true,
            singleton: false,
            data_class,
            value_class,
            default_context: Context::new(),
        })
    }

    fn inherit(code: &str, parent: &Family) -> Self {
        Self {
            code: code.to_string(),
            parent_code: Some(parent.code.clone()),
            attributes: parent
                .attributes
                .iter()
                .map(|attribute| attribute.attached_to(code))
                .collect(),
            attribute_as_label: parent.attribute_as_label.clone(),
            attribute_as_identifier: parent.attribute_as_identifier.clone(),
            instantiable: true,
            singleton: false,
            data_class: parent.data_class.clone(),
            value_class: parent.value_class.clone(),
            default_context: parent.default_context.clone(),
        }
    }

    /// Attaches `attribute` to this family, replacing any entry with the same code.
    fn add_attribute(&mut self, attribute: Attribute) {
        let attribute = attribute.attached_to(&self.code);
        match self
            .attributes
            .iter_mut()
            .find(|existing| existing.code() == attribute.code())
        {
            Some(slot) => *slot = attribute,
            None => self.attributes.push(attribute),
        }
    }

    fn validate_identifier(&self) -> Result<(), ConfigError> {
        let Some(code) = &self.attribute_as_identifier else {
            return Ok(());
        };
        let attribute = self
            .attributes
            .iter()
            .find(|attribute| attribute.code() == code)
            .ok_or_else(|| ConfigError::UnknownIdentifierAttribute {
                family: self.code.clone(),
                attribute: code.clone(),
            })?;

        let violation = if !attribute.is_unique() {
            Some("must be unique")
        } else if !attribute.is_required() {
            Some("must be required")
        } else if attribute.is_collection() {
            Some("must not be a collection")
        } else if !attribute.context_mask().is_empty() {
            Some("must not vary by context")
        } else {
            None
        };
        match violation {
            Some(reason) => Err(ConfigError::InvalidIdentifier {
                family: self.code.clone(),
                attribute: code.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn validate_context_axes(&self) -> Result<(), ConfigError> {
        let axes = self
            .attributes
            .iter()
            .flat_map(|attribute| attribute.context_mask().iter())
            .chain(self.default_context.keys());
        for axis in axes {
            if !self.value_class.has_context_key(axis) {
                return Err(ConfigError::InvalidContextAxis {
                    family: self.code.clone(),
                    axis: axis.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn parent_code(&self) -> Option<&str> {
        self.parent_code.as_deref()
    }

    /// Attributes in declaration order, inherited ones first.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn has_attribute(&self, code: &str) -> bool {
        self.attributes.iter().any(|attribute| attribute.code() == code)
    }

    /// # Errors
    /// - `MissingAttribute` when `code` is not part of this family.
    pub fn get_attribute(&self, code: &str) -> EavResult<&Attribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.code() == code)
            .ok_or_else(|| EavError::missing_attribute(Some(&self.code), code))
    }

    pub fn attribute_as_label(&self) -> Option<&Attribute> {
        self.attribute_as_label
            .as_deref()
            .and_then(|code| self.get_attribute(code).ok())
    }

    pub fn attribute_as_identifier(&self) -> Option<&Attribute> {
        self.attribute_as_identifier
            .as_deref()
            .and_then(|code| self.get_attribute(code).ok())
    }

    pub fn is_instantiable(&self) -> bool {
        self.instantiable
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    pub fn data_class(&self) -> &DataClass {
        &self.data_class
    }

    pub fn value_class(&self) -> &ValueClass {
        &self.value_class
    }

    pub fn default_context(&self) -> &Context {
        &self.default_context
    }

    /// Creates a transient data instance with configured defaults materialized.
    ///
    /// # Errors
    /// - `NotInstantiable` for abstract families.
    pub fn create_data(self: &Arc<Self>) -> EavResult<Data> {
        if !self.instantiable {
            return Err(EavError::NotInstantiable(self.code.clone()));
        }
        let mut data = Data::new(Arc::clone(self));
        data.materialize_defaults()?;
        Ok(data)
    }

    /// Creates an empty value bound to `attribute` of this family.
    pub fn create_value(&self, attribute: &Attribute) -> Value {
        Value::new(
            attribute.code(),
            self.code.as_str(),
            self.value_class.name(),
            self.value_class.context_keys(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Family, FamilyConfig};
    use crate::error::{ConfigError, EavError};
    use crate::model::attribute::AttributeConfig;
    use crate::model::storage::StorageLayout;
    use crate::registry::{AttributeRegistry, FamilyRegistry, TypeRegistry};
    use std::sync::Arc;

    fn registries() -> (AttributeRegistry, FamilyRegistry, StorageLayout) {
        let mut attributes = AttributeRegistry::new(TypeRegistry::with_defaults());
        let shared = attributes
            .create_attribute("title", &AttributeConfig::of_type("string"))
            .unwrap();
        attributes.add_attribute(shared);
        (attributes, FamilyRegistry::new(), StorageLayout::default())
    }

    #[test]
    fn child_copies_parent_attributes_without_sharing_them() {
        let (attributes, mut families, storage) = registries();
        let item = FamilyConfig::new()
            .attribute("name", AttributeConfig::of_type("string"))
            .label("name");
        let item = Family::from_config("Item", &item, &attributes, &families, &storage).unwrap();
        families.add_family(item);

        let product = FamilyConfig::new()
            .parent("Item")
            .attribute("name", AttributeConfig::of_type("text").required());
        let product =
            Family::from_config("Product", &product, &attributes, &families, &storage).unwrap();

        let parent = families.get_family("Item").unwrap();
        assert!(!parent.get_attribute("name").unwrap().is_required());
        assert!(product.get_attribute("name").unwrap().is_required());
        assert_eq!(
            product.get_attribute("name").unwrap().family_code(),
            Some("Product")
        );
        assert_eq!(product.attribute_as_label().unwrap().code(), "name");
        assert_eq!(product.parent_code(), Some("Item"));
    }

    #[test]
    fn shared_attributes_are_cloned_and_merged() {
        let (attributes, families, storage) = registries();
        let config = FamilyConfig::new().attribute("title", AttributeConfig::default().required());
        let family = Family::from_config("Page", &config, &attributes, &families, &storage).unwrap();

        assert!(family.get_attribute("title").unwrap().is_required());
        assert!(!attributes.get_attribute("title").unwrap().is_required());
    }

    #[test]
    fn unknown_parent_is_missing_family() {
        let (attributes, families, storage) = registries();
        let config = FamilyConfig::new().parent("Ghost");
        let err = Family::from_config("Child", &config, &attributes, &families, &storage)
            .unwrap_err();
        assert_eq!(err, EavError::MissingFamily("Ghost".to_string()));
    }

    #[test]
    fn identifier_must_be_unique_and_required() {
        let (attributes, families, storage) = registries();
        let config = FamilyConfig::new()
            .attribute("sku", AttributeConfig::of_type("string").unique())
            .identifier("sku");
        let err = Family::from_config("Product", &config, &attributes, &families, &storage)
            .unwrap_err();
        assert!(matches!(
            err,
            EavError::Config(ConfigError::InvalidIdentifier {
                reason: "must be required",
                ..
            })
        ));
    }

    #[test]
    fn context_mask_must_fit_the_value_class() {
        let (attributes, families, storage) = registries();
        let config = FamilyConfig::new().attribute(
            "headline",
            AttributeConfig::of_type("string").context_mask(["language"]),
        );
        let err = Family::from_config("Page", &config, &attributes, &families, &storage)
            .unwrap_err();
        assert!(matches!(
            err,
            EavError::Config(ConfigError::InvalidContextAxis { .. })
        ));

        let config = config.value_class("contextual");
        assert!(Family::from_config("Page", &config, &attributes, &families, &storage).is_ok());
    }

    #[test]
    fn abstract_family_rejects_instances() {
        let (attributes, families, storage) = registries();
        let config = FamilyConfig::new().abstract_family();
        let family =
            Arc::new(Family::from_config("Base", &config, &attributes, &families, &storage).unwrap());
        assert_eq!(
            family.create_data().unwrap_err(),
            EavError::NotInstantiable("Base".to_string())
        );
    }
}
