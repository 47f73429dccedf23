//! EAV domain model.
//!
//! # Responsibility
//! - Define attribute types, attributes and families (the static model).
//! - Define data and value records (the runtime model).
//!
//! # Invariants
//! - The static model is immutable once a `Schema` is built.
//! - Data instances reference their family through a shared `Arc`.

pub mod attribute;
pub mod attribute_type;
pub mod context;
pub mod data;
pub mod family;
pub mod storage;
pub mod value;
