//! Error taxonomy for schema, model and query operations.
//!
//! # Responsibility
//! - Separate boot-time configuration failures from runtime lookup, logic,
//!   context and value-shape failures.
//! - Keep storage transport errors out of this layer (see `db` and `repo`).
//!
//! # Invariants
//! - Configuration errors are only produced while building a `Schema`.
//! - Lookup errors always carry the code that failed to resolve.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EavResult<T> = Result<T, EavError>;

/// Invalid static model detected while building registries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Declaration tree could not be parsed.
    Parse(String),
    /// Attribute or family code does not match the allowed code format.
    InvalidCode(String),
    /// Attribute code collides with a core data/value accessor.
    ReservedAttributeCode(String),
    /// `unique` cannot be combined with `collection`.
    UniqueCollection { attribute: String },
    /// `multiple` requires `collection`.
    MultipleWithoutCollection { attribute: String },
    /// Relation and embedded types cannot carry a default value.
    DefaultOnRelation { attribute: String },
    /// Default value does not fit the attribute storage column.
    InvalidDefault { attribute: String, message: String },
    /// Attribute type declaration is inconsistent.
    InvalidType { code: String, message: String },
    /// Label attribute code is not part of the family.
    UnknownLabelAttribute { family: String, attribute: String },
    /// Identifier attribute code is not part of the family.
    UnknownIdentifierAttribute { family: String, attribute: String },
    /// Identifier attribute must be unique, required, single-valued and context-free.
    InvalidIdentifier {
        family: String,
        attribute: String,
        reason: &'static str,
    },
    /// Family references a value storage class that is not declared.
    UnknownValueClass { family: String, value_class: String },
    /// Family references a data storage class that is not declared.
    UnknownDataClass { family: String, data_class: String },
    /// Context axis name is malformed or unknown to the family value class.
    InvalidContextAxis { family: String, axis: String },
    /// Parent chain loops back onto itself.
    ParentCycle(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid declaration tree: {message}"),
            Self::InvalidCode(code) => write!(f, "invalid code `{code}`"),
            Self::ReservedAttributeCode(code) => {
                write!(f, "attribute code `{code}` is reserved")
            }
            Self::UniqueCollection { attribute } => write!(
                f,
                "attribute `{attribute}` cannot be both unique and a collection"
            ),
            Self::MultipleWithoutCollection { attribute } => write!(
                f,
                "attribute `{attribute}` is multiple but not a collection"
            ),
            Self::DefaultOnRelation { attribute } => write!(
                f,
                "attribute `{attribute}` is a relation and cannot have a default value"
            ),
            Self::InvalidDefault { attribute, message } => {
                write!(f, "invalid default for attribute `{attribute}`: {message}")
            }
            Self::InvalidType { code, message } => {
                write!(f, "invalid attribute type `{code}`: {message}")
            }
            Self::UnknownLabelAttribute { family, attribute } => write!(
                f,
                "family `{family}` has no attribute `{attribute}` to use as label"
            ),
            Self::UnknownIdentifierAttribute { family, attribute } => write!(
                f,
                "family `{family}` has no attribute `{attribute}` to use as identifier"
            ),
            Self::InvalidIdentifier {
                family,
                attribute,
                reason,
            } => write!(
                f,
                "attribute `{attribute}` cannot identify family `{family}`: {reason}"
            ),
            Self::UnknownValueClass {
                family,
                value_class,
            } => write!(
                f,
                "family `{family}` uses unknown value class `{value_class}`"
            ),
            Self::UnknownDataClass { family, data_class } => {
                write!(f, "family `{family}` uses unknown data class `{data_class}`")
            }
            Self::InvalidContextAxis { family, axis } => {
                write!(f, "family `{family}` declares invalid context axis `{axis}`")
            }
            Self::ParentCycle(code) => write!(f, "family `{code}` inherits from itself"),
        }
    }
}

impl Error for ConfigError {}

/// Invalid context request against a value storage class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// Axis is not a column of the value storage class.
    UnknownAxis { axis: String, value_class: String },
    /// Context filtering requested on a class without context columns.
    NotContextual { value_class: String },
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAxis { axis, value_class } => write!(
                f,
                "context axis `{axis}` is not declared by value class `{value_class}`"
            ),
            Self::NotContextual { value_class } => write!(
                f,
                "value class `{value_class}` does not support context filtering"
            ),
        }
    }
}

impl Error for ContextError {}

/// Errors raised by registries, data/value access and query building.
#[derive(Debug, Clone, PartialEq)]
pub enum EavError {
    Config(ConfigError),
    MissingFamily(String),
    MissingAttribute {
        family: Option<String>,
        attribute: String,
    },
    MissingAttributeType(String),
    /// Caller misuse: reapplied join, double condition, composition after apply.
    Logic(String),
    Context(ContextError),
    /// Wrong input shape or a value that cannot be coerced to the attribute column.
    InvalidValueData(String),
    /// Family cannot produce data instances.
    NotInstantiable(String),
    /// Value collection was never hydrated from storage.
    ValuesNotLoaded,
}

impl EavError {
    pub(crate) fn logic(message: impl Into<String>) -> Self {
        Self::Logic(message.into())
    }

    pub(crate) fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValueData(message.into())
    }

    pub(crate) fn missing_attribute(family: Option<&str>, attribute: &str) -> Self {
        Self::MissingAttribute {
            family: family.map(str::to_string),
            attribute: attribute.to_string(),
        }
    }
}

impl Display for EavError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::MissingFamily(code) => write!(f, "missing family `{code}`"),
            Self::MissingAttribute {
                family: Some(family),
                attribute,
            } => write!(f, "missing attribute `{attribute}` in family `{family}`"),
            Self::MissingAttribute {
                family: None,
                attribute,
            } => write!(f, "missing attribute `{attribute}`"),
            Self::MissingAttributeType(code) => write!(f, "missing attribute type `{code}`"),
            Self::Logic(message) => write!(f, "logic error: {message}"),
            Self::Context(err) => write!(f, "{err}"),
            Self::InvalidValueData(message) => write!(f, "invalid value data: {message}"),
            Self::NotInstantiable(code) => write!(f, "family `{code}` is not instantiable"),
            Self::ValuesNotLoaded => write!(f, "data values have not been loaded"),
        }
    }
}

impl Error for EavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Context(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for EavError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<ContextError> for EavError {
    fn from(value: ContextError) -> Self {
        Self::Context(value)
    }
}
