//! Family registry.

use crate::error::{EavError, EavResult};
use crate::model::family::Family;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Families keyed by code, shared read-only with data instances.
#[derive(Debug, Clone, Default)]
pub struct FamilyRegistry {
    families: BTreeMap<String, Arc<Family>>,
}

impl FamilyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one family and returns the shared handle.
    pub fn add_family(&mut self, family: Family) -> Arc<Family> {
        let family = Arc::new(family);
        self.families
            .insert(family.code().to_string(), Arc::clone(&family));
        family
    }

    /// # Errors
    /// - `MissingFamily` for unknown codes.
    pub fn get_family(&self, code: &str) -> EavResult<&Arc<Family>> {
        self.families
            .get(code)
            .ok_or_else(|| EavError::MissingFamily(code.to_string()))
    }

    pub fn has_family(&self, code: &str) -> bool {
        self.families.contains_key(code)
    }

    /// All families, sorted by code.
    pub fn families(&self) -> impl Iterator<Item = &Arc<Family>> {
        self.families.values()
    }

    pub fn codes(&self) -> Vec<String> {
        self.families.keys().cloned().collect()
    }

    /// Direct children of `parent_code`.
    pub fn get_by_parent(&self, parent_code: &str) -> Vec<&Arc<Family>> {
        self.families
            .values()
            .filter(|family| family.parent_code() == Some(parent_code))
            .collect()
    }

    /// `code` followed by every descendant family code.
    ///
    /// # Errors
    /// - `MissingFamily` when `code` itself is unknown.
    pub fn matching_codes(&self, code: &str) -> EavResult<Vec<String>> {
        let root = self.get_family(code)?;
        let mut codes = vec![root.code().to_string()];
        let mut cursor = 0;
        while cursor < codes.len() {
            let children: Vec<String> = self
                .get_by_parent(&codes[cursor])
                .into_iter()
                .map(|family| family.code().to_string())
                .filter(|child| !codes.contains(child))
                .collect();
            codes.extend(children);
            cursor += 1;
        }
        Ok(codes)
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::FamilyRegistry;
    use crate::error::EavError;
    use crate::model::family::{Family, FamilyConfig};
    use crate::model::storage::StorageLayout;
    use crate::registry::{AttributeRegistry, TypeRegistry};

    fn registry() -> FamilyRegistry {
        let attributes = AttributeRegistry::new(TypeRegistry::with_defaults());
        let storage = StorageLayout::default();
        let mut families = FamilyRegistry::new();
        for (code, parent) in [
            ("Item", None),
            ("Product", Some("Item")),
            ("Service", Some("Item")),
            ("Shirt", Some("Product")),
            ("Page", None),
        ] {
            let mut config = FamilyConfig::new();
            config.parent = parent.map(str::to_string);
            let family =
                Family::from_config(code, &config, &attributes, &families, &storage).unwrap();
            families.add_family(family);
        }
        families
    }

    #[test]
    fn matching_codes_walks_descendants() {
        let families = registry();
        let mut codes = families.matching_codes("Item").unwrap();
        assert_eq!(codes[0], "Item");
        codes.sort();
        assert_eq!(codes, vec!["Item", "Product", "Service", "Shirt"]);
        assert_eq!(families.matching_codes("Page").unwrap(), vec!["Page"]);
    }

    #[test]
    fn get_by_parent_returns_direct_children_only() {
        let families = registry();
        let children: Vec<&str> = families
            .get_by_parent("Item")
            .into_iter()
            .map(|family| family.code())
            .collect();
        assert_eq!(children, vec!["Product", "Service"]);
    }

    #[test]
    fn unknown_family_is_missing() {
        let families = registry();
        assert_eq!(
            families.get_family("Ghost").unwrap_err(),
            EavError::MissingFamily("Ghost".to_string())
        );
    }
}
