//! Attribute type registry.

use crate::error::{EavError, EavResult};
use crate::model::attribute_type::{default_types, AttributeType};
use std::collections::BTreeMap;

/// Attribute types keyed by code.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, AttributeType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with the built-in types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for attribute_type in default_types() {
            registry.add_type(attribute_type);
        }
        registry
    }

    /// Registers one type; a later registration with the same code replaces it.
    pub fn add_type(&mut self, attribute_type: AttributeType) {
        self.types
            .insert(attribute_type.code().to_string(), attribute_type);
    }

    /// # Errors
    /// - `MissingAttributeType` for unknown codes.
    pub fn get_type(&self, code: &str) -> EavResult<&AttributeType> {
        self.types
            .get(code)
            .ok_or_else(|| EavError::MissingAttributeType(code.to_string()))
    }

    pub fn has_type(&self, code: &str) -> bool {
        self.types.contains_key(code)
    }

    pub fn types(&self) -> impl Iterator<Item = &AttributeType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::TypeRegistry;
    use crate::error::EavError;
    use crate::model::attribute_type::{AttributeType, StorageColumn};

    #[test]
    fn last_registration_wins() {
        let mut registry = TypeRegistry::with_defaults();
        assert_eq!(
            registry.get_type("string").unwrap().column(),
            StorageColumn::String
        );

        registry.add_type(AttributeType::new("string", StorageColumn::Text, "textarea"));
        let string = registry.get_type("string").unwrap();
        assert_eq!(string.column(), StorageColumn::Text);
        assert_eq!(string.widget(), "textarea");
    }

    #[test]
    fn unknown_type_is_reported_with_its_code() {
        let registry = TypeRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(
            registry.get_type("money").unwrap_err(),
            EavError::MissingAttributeType("money".to_string())
        );
    }
}
