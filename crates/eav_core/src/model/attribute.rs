//! Attribute definitions.
//!
//! # Responsibility
//! - Describe one dynamically typed field of a family.
//! - Validate flag combinations at configuration time.
//!
//! # Invariants
//! - `collection` defaults to `multiple` when not set explicitly.
//! - `multiple` requires `collection`; `unique` forbids `collection`.
//! - Relation/embedded attributes never carry a default value.
//! - The family back-reference is set when the attribute is attached.

use crate::error::{ConfigError, EavError, EavResult};
use crate::model::attribute_type::AttributeType;
use crate::model::value::ValueData;
use crate::registry::TypeRegistry;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Codes that collide with core data/value accessors.
pub const RESERVED_CODES: &[&str] = &[
    "id",
    "identifier",
    "parent",
    "children",
    "values",
    "value",
    "value_data",
    "family",
    "family_code",
    "current_context",
    "created_at",
    "updated_at",
    "label",
    "referers",
];

pub const OPTION_ALLOWED_FAMILIES: &str = "allowed_families";
pub const OPTION_AUTOLOAD: &str = "autoload";
pub const OPTION_ORPHAN_REMOVAL: &str = "orphan_removal";

const DEFAULT_TYPE: &str = "string";

static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid code regex"));

/// Returns whether `code` is usable as an attribute or family code.
pub fn is_valid_code(code: &str) -> bool {
    CODE_RE.is_match(code)
}

/// Returns whether `code` is reserved for core accessors (case-insensitive).
pub fn is_reserved_code(code: &str) -> bool {
    RESERVED_CODES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(code))
}

/// Attribute declaration; unset fields keep the current (or inherited) value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeConfig {
    #[serde(rename = "type", default)]
    pub attribute_type: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub unique: Option<bool>,
    #[serde(default)]
    pub multiple: Option<bool>,
    #[serde(default)]
    pub collection: Option<bool>,
    #[serde(default)]
    pub context_mask: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl AttributeConfig {
    /// Declaration with only a type code.
    pub fn of_type(attribute_type: impl Into<String>) -> Self {
        Self {
            attribute_type: Some(attribute_type.into()),
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = Some(true);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = Some(true);
        self
    }

    pub fn collection(mut self) -> Self {
        self.collection = Some(true);
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = Some(true);
        self
    }

    pub fn context_mask<S: Into<String>>(mut self, axes: impl IntoIterator<Item = S>) -> Self {
        self.context_mask = Some(axes.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// Named, typed field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    code: String,
    attribute_type: AttributeType,
    family_code: Option<String>,
    group: Option<String>,
    options: BTreeMap<String, serde_json::Value>,
    required: bool,
    unique: bool,
    multiple: bool,
    collection: Option<bool>,
    context_mask: Vec<String>,
    default: Option<serde_json::Value>,
    default_values: Vec<ValueData>,
}

impl Attribute {
    /// Builds and validates an attribute from its declaration.
    ///
    /// # Errors
    /// - `Config` for reserved/malformed codes and invalid flag combinations.
    /// - `MissingAttributeType` when the declared type is not registered.
    pub fn from_config(code: &str, config: &AttributeConfig, types: &TypeRegistry) -> EavResult<Self> {
        if !is_valid_code(code) {
            return Err(ConfigError::InvalidCode(code.to_string()).into());
        }
        if is_reserved_code(code) {
            return Err(ConfigError::ReservedAttributeCode(code.to_string()).into());
        }

        let type_code = config.attribute_type.as_deref().unwrap_or(DEFAULT_TYPE);
        let mut attribute = Self {
            code: code.to_string(),
            attribute_type: types.get_type(type_code)?.clone(),
            family_code: None,
            group: None,
            options: BTreeMap::new(),
            required: false,
            unique: false,
            multiple: false,
            collection: None,
            context_mask: Vec::new(),
            default: None,
            default_values: Vec::new(),
        };
        attribute.merge(config, types)?;
        Ok(attribute)
    }

    /// Overlays `config` onto this attribute and re-validates it.
    ///
    /// Options are merged key by key; every other set field replaces the
    /// current value.
    pub fn merge(&mut self, config: &AttributeConfig, types: &TypeRegistry) -> EavResult<()> {
        if let Some(type_code) = &config.attribute_type {
            self.attribute_type = types.get_type(type_code)?.clone();
        }
        if let Some(group) = &config.group {
            self.group = Some(group.clone());
        }
        for (key, value) in &config.options {
            self.options.insert(key.clone(), value.clone());
        }
        if let Some(required) = config.required {
            self.required = required;
        }
        if let Some(unique) = config.unique {
            self.unique = unique;
        }
        if let Some(multiple) = config.multiple {
            self.multiple = multiple;
        }
        if let Some(collection) = config.collection {
            self.collection = Some(collection);
        }
        if let Some(mask) = &config.context_mask {
            let mut mask = mask.clone();
            mask.sort();
            mask.dedup();
            self.context_mask = mask;
        }
        if let Some(default) = &config.default {
            self.default = Some(default.clone());
        }

        self.validate()?;
        Ok(())
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        let collection = self.is_collection();
        if self.multiple && !collection {
            return Err(ConfigError::MultipleWithoutCollection {
                attribute: self.code.clone(),
            });
        }
        if self.unique && collection {
            return Err(ConfigError::UniqueCollection {
                attribute: self.code.clone(),
            });
        }
        for axis in &self.context_mask {
            if !is_valid_code(axis) {
                return Err(ConfigError::InvalidCode(axis.clone()));
            }
        }

        self.default_values = match &self.default {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(_) if self.attribute_type.is_relation() => {
                return Err(ConfigError::DefaultOnRelation {
                    attribute: self.code.clone(),
                });
            }
            Some(default) => self.parse_default(default)?,
        };
        Ok(())
    }

    fn parse_default(&self, default: &serde_json::Value) -> Result<Vec<ValueData>, ConfigError> {
        let column = self.attribute_type.column();
        let items: Vec<&serde_json::Value> = match default {
            serde_json::Value::Array(items) => items.iter().collect(),
            scalar => vec![scalar],
        };
        if !self.is_collection() && items.len() > 1 {
            return Err(ConfigError::InvalidDefault {
                attribute: self.code.clone(),
                message: "single-valued attribute has several defaults".to_string(),
            });
        }
        items
            .into_iter()
            .map(|item| {
                ValueData::from_json(column, item).map_err(|message| ConfigError::InvalidDefault {
                    attribute: self.code.clone(),
                    message,
                })
            })
            .collect()
    }

    /// Deep copy attached to `family_code`.
    pub(crate) fn attached_to(&self, family_code: &str) -> Self {
        Self {
            family_code: Some(family_code.to_string()),
            ..self.clone()
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn attribute_type(&self) -> &AttributeType {
        &self.attribute_type
    }

    /// Code of the family this attribute is attached to.
    pub fn family_code(&self) -> Option<&str> {
        self.family_code.as_deref()
    }

    pub(crate) fn require_family_code(&self) -> EavResult<&str> {
        self.family_code().ok_or_else(|| {
            EavError::logic(format!("attribute `{}` is not attached to a family", self.code))
        })
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn options(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&serde_json::Value> {
        self.options.get(key)
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// UI hint: edited as several widgets.
    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    /// Holds 0..N values.
    pub fn is_collection(&self) -> bool {
        self.collection.unwrap_or(self.multiple)
    }

    pub fn context_mask(&self) -> &[String] {
        &self.context_mask
    }

    pub fn default_values(&self) -> &[ValueData] {
        &self.default_values
    }

    pub fn has_default(&self) -> bool {
        !self.default_values.is_empty()
    }

    pub fn is_relation(&self) -> bool {
        self.attribute_type.is_relation()
    }

    pub fn is_embedded(&self) -> bool {
        self.attribute_type.is_embedded()
    }

    /// Value column name for this attribute.
    pub fn column_name(&self) -> &'static str {
        self.attribute_type.column_name()
    }

    /// Family codes a relation may point at; empty means unrestricted.
    pub fn allowed_families(&self) -> Vec<String> {
        match self.option(OPTION_ALLOWED_FAMILIES) {
            Some(serde_json::Value::String(code)) => vec![code.clone()],
            Some(serde_json::Value::Array(codes)) => codes
                .iter()
                .filter_map(|code| code.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Related data is prefetched by the data loader.
    pub fn is_autoload(&self) -> bool {
        self.option(OPTION_AUTOLOAD)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Related data is removed with its owner. Defaults to true for embeds.
    pub fn has_orphan_removal(&self) -> bool {
        self.option(OPTION_ORPHAN_REMOVAL)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(self.is_embedded())
    }
}
