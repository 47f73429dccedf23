//! Boot-time registries for attribute types, shared attributes and families.
//!
//! # Responsibility
//! - Resolve codes to definitions for model, query and storage layers.
//!
//! # Invariants
//! - Registries are filled once while building a `Schema` and only read
//!   afterwards; lookups never mutate.
//! - Lookup failures carry the requested code.

mod attributes;
mod families;
mod types;

pub use attributes::AttributeRegistry;
pub use families::FamilyRegistry;
pub use types::TypeRegistry;
