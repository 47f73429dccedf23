//! Shared attribute registry.
//!
//! Attributes declared here are templates: families clone them and merge
//! local overrides, the registered instance is never attached to a family.

use crate::error::{EavError, EavResult};
use crate::model::attribute::{Attribute, AttributeConfig};
use crate::registry::TypeRegistry;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
    types: TypeRegistry,
    attributes: BTreeMap<String, Attribute>,
}

impl AttributeRegistry {
    pub fn new(types: TypeRegistry) -> Self {
        Self {
            types,
            attributes: BTreeMap::new(),
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Builds a standalone attribute against the registered types.
    ///
    /// The result is not registered; see [`AttributeRegistry::add_attribute`].
    pub fn create_attribute(&self, code: &str, config: &AttributeConfig) -> EavResult<Attribute> {
        Attribute::from_config(code, config, &self.types)
    }

    /// Registers a shared attribute; a later registration replaces it.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes
            .insert(attribute.code().to_string(), attribute);
    }

    /// # Errors
    /// - `MissingAttribute` (without family) for unknown codes.
    pub fn get_attribute(&self, code: &str) -> EavResult<&Attribute> {
        self.attributes
            .get(code)
            .ok_or_else(|| EavError::missing_attribute(None, code))
    }

    pub fn has_attribute(&self, code: &str) -> bool {
        self.attributes.contains_key(code)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}
