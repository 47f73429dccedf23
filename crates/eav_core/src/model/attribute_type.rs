//! Attribute storage types.
//!
//! # Responsibility
//! - Map a type code (`string`, `integer`, `relation`, ...) to the single
//!   typed column of the value tables that stores it.
//! - Carry relation/embedded capabilities used by queries and loading.
//!
//! # Invariants
//! - Relation and embedded types always store into `data_value_id`.
//! - Embedded types are relations.

use crate::error::ConfigError;
use serde::Deserialize;

/// Typed storage column of a value record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageColumn {
    Bool,
    Integer,
    Decimal,
    Date,
    DateTime,
    String,
    Text,
    /// Foreign key to another data row.
    Data,
}

impl StorageColumn {
    pub const ALL: [StorageColumn; 8] = [
        StorageColumn::Data,
        StorageColumn::Bool,
        StorageColumn::Integer,
        StorageColumn::Decimal,
        StorageColumn::Date,
        StorageColumn::DateTime,
        StorageColumn::String,
        StorageColumn::Text,
    ];

    /// Physical column name in every value table.
    pub fn column_name(self) -> &'static str {
        match self {
            Self::Bool => "bool_value",
            Self::Integer => "integer_value",
            Self::Decimal => "decimal_value",
            Self::Date => "date_value",
            Self::DateTime => "datetime_value",
            Self::String => "string_value",
            Self::Text => "text_value",
            Self::Data => "data_value_id",
        }
    }

    /// Accepts either the physical column name or its short form (`bool`, `data`).
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|column| {
            column.column_name() == normalized || column.short_name() == normalized
        })
    }

    fn short_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::String => "string",
            Self::Text => "text",
            Self::Data => "data",
        }
    }
}

/// Immutable storage kind registered at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeType {
    code: String,
    column: StorageColumn,
    widget: String,
    relation: bool,
    embedded: bool,
}

impl AttributeType {
    /// Creates a scalar type.
    pub fn new(code: impl Into<String>, column: StorageColumn, widget: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            column,
            widget: widget.into(),
            relation: false,
            embedded: false,
        }
    }

    /// Creates a relation type pointing at other data.
    pub fn relation(code: impl Into<String>, widget: impl Into<String>) -> Self {
        Self {
            relation: true,
            ..Self::new(code, StorageColumn::Data, widget)
        }
    }

    /// Creates an embedded relation type (owned data edited inline).
    pub fn embedded(code: impl Into<String>, widget: impl Into<String>) -> Self {
        Self {
            embedded: true,
            ..Self::relation(code, widget)
        }
    }

    /// Builds a type from its declaration.
    pub fn from_config(code: &str, config: &TypeConfig) -> Result<Self, ConfigError> {
        let column =
            StorageColumn::parse(&config.column).ok_or_else(|| ConfigError::InvalidType {
                code: code.to_string(),
                message: format!("unknown storage column `{}`", config.column),
            })?;
        let relation = config.relation || config.embedded;
        if relation && column != StorageColumn::Data {
            return Err(ConfigError::InvalidType {
                code: code.to_string(),
                message: "relation types must store into data_value_id".to_string(),
            });
        }
        if !relation && column == StorageColumn::Data {
            return Err(ConfigError::InvalidType {
                code: code.to_string(),
                message: "data_value_id is reserved for relation types".to_string(),
            });
        }

        Ok(Self {
            code: code.to_string(),
            column,
            widget: config.widget.clone().unwrap_or_else(|| code.to_string()),
            relation,
            embedded: config.embedded,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn column(&self) -> StorageColumn {
        self.column
    }

    /// Physical column name used in joins and predicates.
    pub fn column_name(&self) -> &'static str {
        self.column.column_name()
    }

    /// Default form widget hint. Not interpreted by the core.
    pub fn widget(&self) -> &str {
        &self.widget
    }

    pub fn is_relation(&self) -> bool {
        self.relation
    }

    pub fn is_embedded(&self) -> bool {
        self.embedded
    }
}

/// Declaration of an extra attribute type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeConfig {
    /// Storage column, e.g. `string_value` or `string`.
    pub column: String,
    #[serde(default)]
    pub widget: Option<String>,
    #[serde(default)]
    pub relation: bool,
    #[serde(default)]
    pub embedded: bool,
}

/// Built-in types available without declaration.
pub fn default_types() -> Vec<AttributeType> {
    vec![
        AttributeType::new("boolean", StorageColumn::Bool, "checkbox"),
        AttributeType::new("switch", StorageColumn::Bool, "switch"),
        AttributeType::new("integer", StorageColumn::Integer, "integer"),
        AttributeType::new("decimal", StorageColumn::Decimal, "number"),
        AttributeType::new("date", StorageColumn::Date, "date"),
        AttributeType::new("datetime", StorageColumn::DateTime, "datetime"),
        AttributeType::new("string", StorageColumn::String, "text"),
        AttributeType::new("email", StorageColumn::String, "email"),
        AttributeType::new("choice", StorageColumn::String, "choice"),
        AttributeType::new("text", StorageColumn::Text, "textarea"),
        AttributeType::new("html", StorageColumn::Text, "html"),
        AttributeType::relation("relation", "data_selector"),
        AttributeType::embedded("embed", "embed"),
    ]
}
