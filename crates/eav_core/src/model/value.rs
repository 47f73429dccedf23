//! Generic attribute value record.
//!
//! # Responsibility
//! - Hold one typed datum for one attribute of one data instance.
//! - Carry the context-axis columns declared by the value storage class.
//!
//! # Invariants
//! - Context keys match the storage class keys exactly (no missing, no extra).
//! - At most one typed column is populated; which one is decided by the
//!   attribute type, never by the caller.
//! - `string` column values are truncated to `MAX_STRING_CHARS`.

use crate::error::{ContextError, EavError, EavResult};
use crate::model::attribute::Attribute;
use crate::model::attribute_type::StorageColumn;
use crate::model::context::Context;
use crate::model::data::DataId;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value as SqlValue;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a persisted value row.
pub type ValueId = Uuid;

/// Maximum length kept for `string` column values.
pub const MAX_STRING_CHARS: usize = 255;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Typed payload of a value record.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ValueData {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    /// Stored as SQLite REAL.
    Decimal(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    String(String),
    Text(String),
    /// Reference to another data instance.
    Data(DataId),
}

impl ValueData {
    /// Column this payload would be written to, `None` for `Null`.
    pub fn column(&self) -> Option<StorageColumn> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(StorageColumn::Bool),
            Self::Integer(_) => Some(StorageColumn::Integer),
            Self::Decimal(_) => Some(StorageColumn::Decimal),
            Self::Date(_) => Some(StorageColumn::Date),
            Self::DateTime(_) => Some(StorageColumn::DateTime),
            Self::String(_) => Some(StorageColumn::String),
            Self::Text(_) => Some(StorageColumn::Text),
            Self::Data(_) => Some(StorageColumn::Data),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) | Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Decimal(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_data_id(&self) -> Option<DataId> {
        match self {
            Self::Data(id) => Some(*id),
            _ => None,
        }
    }

    /// Converts this payload to the given column.
    ///
    /// Explicit casts: integer to decimal, string and text into each other,
    /// date to datetime at midnight, and `string` truncation. Anything else
    /// is rejected.
    pub fn coerce(self, column: StorageColumn) -> EavResult<ValueData> {
        let coerced = match (self, column) {
            (Self::Null, _) => Self::Null,
            (Self::String(value), StorageColumn::String)
            | (Self::Text(value), StorageColumn::String) => {
                Self::String(truncate_chars(value, MAX_STRING_CHARS))
            }
            (Self::String(value), StorageColumn::Text) => Self::Text(value),
            (Self::Integer(value), StorageColumn::Decimal) => Self::Decimal(value as f64),
            (Self::Date(value), StorageColumn::DateTime) => {
                Self::DateTime(value.and_hms_opt(0, 0, 0).unwrap_or_default())
            }
            (value, column) if value.column() == Some(column) => value,
            (value, column) => {
                return Err(EavError::invalid_value(format!(
                    "cannot store {value:?} into {}",
                    column.column_name()
                )));
            }
        };
        Ok(coerced)
    }

    /// Parses a declaration-tree scalar for the given column.
    pub fn from_json(column: StorageColumn, json: &serde_json::Value) -> Result<Self, String> {
        use serde_json::Value as Json;

        if json.is_null() {
            return Ok(Self::Null);
        }
        let parsed = match column {
            StorageColumn::Bool => json.as_bool().map(Self::Bool),
            StorageColumn::Integer => json.as_i64().map(Self::Integer),
            StorageColumn::Decimal => json.as_f64().map(Self::Decimal),
            StorageColumn::Date => json
                .as_str()
                .and_then(|text| NaiveDate::parse_from_str(text, DATE_FORMAT).ok())
                .map(Self::Date),
            StorageColumn::DateTime => json
                .as_str()
                .and_then(|text| NaiveDateTime::parse_from_str(text, DATETIME_FORMAT).ok())
                .map(Self::DateTime),
            StorageColumn::String => match json {
                Json::String(text) => Some(Self::String(truncate_chars(
                    text.clone(),
                    MAX_STRING_CHARS,
                ))),
                Json::Number(number) => Some(Self::String(number.to_string())),
                _ => None,
            },
            StorageColumn::Text => json.as_str().map(|text| Self::Text(text.to_string())),
            StorageColumn::Data => json
                .as_str()
                .and_then(|text| Uuid::parse_str(text).ok())
                .map(Self::Data),
        };
        parsed.ok_or_else(|| format!("`{json}` does not fit {}", column.column_name()))
    }

    /// SQLite representation used for bound parameters and writes.
    pub fn to_sql(&self) -> SqlValue {
        match self {
            Self::Null => SqlValue::Null,
            Self::Bool(value) => SqlValue::Integer(i64::from(*value)),
            Self::Integer(value) => SqlValue::Integer(*value),
            Self::Decimal(value) => SqlValue::Real(*value),
            Self::Date(value) => SqlValue::Text(value.format(DATE_FORMAT).to_string()),
            Self::DateTime(value) => SqlValue::Text(value.format(DATETIME_FORMAT).to_string()),
            Self::String(value) | Self::Text(value) => SqlValue::Text(value.clone()),
            Self::Data(id) => SqlValue::Text(id.to_string()),
        }
    }
}

impl Display for ValueData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Decimal(value) => write!(f, "{value}"),
            Self::Date(value) => write!(f, "{}", value.format(DATE_FORMAT)),
            Self::DateTime(value) => write!(f, "{}", value.format(DATETIME_FORMAT)),
            Self::String(value) | Self::Text(value) => f.write_str(value),
            Self::Data(id) => write!(f, "{id}"),
        }
    }
}

impl From<bool> for ValueData {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ValueData {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ValueData {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for ValueData {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for ValueData {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ValueData {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<NaiveDate> for ValueData {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for ValueData {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<Uuid> for ValueData {
    fn from(value: DataId) -> Self {
        Self::Data(value)
    }
}

impl<T: Into<ValueData>> From<Option<T>> for ValueData {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One persisted (or pending) attribute value.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    id: Option<ValueId>,
    data_id: Option<DataId>,
    attribute_code: String,
    family_code: String,
    position: i64,
    value_class: String,
    context: BTreeMap<String, Option<String>>,
    data: ValueData,
}

impl Value {
    /// Creates an empty value bound to one attribute of one family.
    ///
    /// Every key of `context_keys` starts as `None`.
    pub fn new(
        attribute_code: impl Into<String>,
        family_code: impl Into<String>,
        value_class: impl Into<String>,
        context_keys: &[String],
    ) -> Self {
        Self {
            id: None,
            data_id: None,
            attribute_code: attribute_code.into(),
            family_code: family_code.into(),
            position: 0,
            value_class: value_class.into(),
            context: context_keys.iter().map(|key| (key.clone(), None)).collect(),
            data: ValueData::Null,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_storage(
        id: ValueId,
        data_id: DataId,
        attribute_code: String,
        family_code: String,
        position: i64,
        value_class: String,
        context: BTreeMap<String, Option<String>>,
        data: ValueData,
    ) -> Self {
        Self {
            id: Some(id),
            data_id: Some(data_id),
            attribute_code,
            family_code,
            position,
            value_class,
            context,
            data,
        }
    }

    pub fn id(&self) -> Option<ValueId> {
        self.id
    }

    pub fn data_id(&self) -> Option<DataId> {
        self.data_id
    }

    pub fn attribute_code(&self) -> &str {
        &self.attribute_code
    }

    pub fn family_code(&self) -> &str {
        &self.family_code
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn set_position(&mut self, position: i64) {
        self.position = position;
    }

    /// Name of the value storage class this record belongs to.
    pub fn value_class(&self) -> &str {
        &self.value_class
    }

    pub fn data(&self) -> &ValueData {
        &self.data
    }

    /// Stores `data` through the column declared by `attribute`'s type.
    ///
    /// # Errors
    /// - `InvalidValueData` when the value belongs to another attribute or
    ///   the payload cannot be coerced to the declared column.
    pub fn set_data(&mut self, attribute: &Attribute, data: impl Into<ValueData>) -> EavResult<()> {
        if attribute.code() != self.attribute_code {
            return Err(EavError::invalid_value(format!(
                "value of `{}` cannot be set through attribute `{}`",
                self.attribute_code,
                attribute.code()
            )));
        }
        self.data = data.into().coerce(attribute.attribute_type().column())?;
        Ok(())
    }

    /// Declared context keys, sorted.
    pub fn context_keys(&self) -> impl Iterator<Item = &str> {
        self.context.keys().map(String::as_str)
    }

    pub fn context(&self) -> &BTreeMap<String, Option<String>> {
        &self.context
    }

    pub fn context_value(&self, axis: &str) -> Result<Option<&str>, ContextError> {
        self.context
            .get(axis)
            .map(Option::as_deref)
            .ok_or_else(|| self.unknown_axis(axis))
    }

    pub fn set_context_value(
        &mut self,
        axis: &str,
        value: Option<String>,
    ) -> Result<(), ContextError> {
        let unknown = self.unknown_axis(axis);
        let slot = self.context.get_mut(axis).ok_or(unknown)?;
        *slot = value;
        Ok(())
    }

    /// Copies the axes of `mask` from `context` onto this value.
    ///
    /// Axes outside the mask are left `None`.
    pub fn apply_context(&mut self, context: &Context, mask: &[String]) -> Result<(), ContextError> {
        for axis in mask {
            if let Some(value) = context.get(axis) {
                self.set_context_value(axis, Some(value.clone()))?;
            }
        }
        Ok(())
    }

    /// Returns whether this value is visible under `context` for an attribute
    /// varying along `mask`.
    ///
    /// Axes not in the mask, or not present in the context, never exclude.
    pub fn matches_context(&self, context: &Context, mask: &[String]) -> bool {
        mask.iter().all(|axis| match context.get(axis) {
            Some(expected) => self
                .context
                .get(axis)
                .and_then(Option::as_deref)
                .is_some_and(|actual| actual == expected),
            None => true,
        })
    }

    /// Returns whether this value is stored under exactly `context` along `mask`.
    ///
    /// A mask axis absent from the context only matches an unset axis.
    pub fn is_stored_under(&self, context: &Context, mask: &[String]) -> bool {
        mask.iter().all(|axis| {
            self.context.get(axis).and_then(Option::as_deref)
                == context.get(axis).map(String::as_str)
        })
    }

    pub(crate) fn assign_identity(&mut self, id: ValueId, data_id: DataId) {
        self.id = Some(id);
        self.data_id = Some(data_id);
    }

    fn unknown_axis(&self, axis: &str) -> ContextError {
        if self.context.is_empty() {
            ContextError::NotContextual {
                value_class: self.value_class.clone(),
            }
        } else {
            ContextError::UnknownAxis {
                axis: axis.to_string(),
                value_class: self.value_class.clone(),
            }
        }
    }
}

fn truncate_chars(value: String, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value;
    }
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::{Value, ValueData, MAX_STRING_CHARS};
    use crate::error::ContextError;
    use crate::model::attribute_type::StorageColumn;
    use crate::model::context::Context;
    use chrono::NaiveDate;

    fn contextual_value() -> Value {
        Value::new(
            "title",
            "Page",
            "contextual",
            &["country".to_string(), "language".to_string()],
        )
    }

    #[test]
    fn coerce_applies_documented_casts_only() {
        assert_eq!(
            ValueData::Integer(10).coerce(StorageColumn::Decimal).unwrap(),
            ValueData::Decimal(10.0)
        );
        assert_eq!(
            ValueData::from("body").coerce(StorageColumn::Text).unwrap(),
            ValueData::Text("body".to_string())
        );
        assert!(ValueData::Bool(true)
            .coerce(StorageColumn::Integer)
            .is_err());
    }

    #[test]
    fn coerce_truncates_overlong_strings() {
        let long = "x".repeat(MAX_STRING_CHARS + 10);
        let coerced = ValueData::from(long).coerce(StorageColumn::String).unwrap();
        assert_eq!(coerced.as_str().unwrap().chars().count(), MAX_STRING_CHARS);
    }

    #[test]
    fn from_json_parses_dates_and_rejects_wrong_shapes() {
        let date = ValueData::from_json(StorageColumn::Date, &serde_json::json!("2024-02-29"));
        assert_eq!(
            date.unwrap(),
            ValueData::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert!(ValueData::from_json(StorageColumn::Bool, &serde_json::json!([true])).is_err());
    }

    #[test]
    fn unknown_axis_is_a_context_error() {
        let mut value = contextual_value();
        let err = value
            .set_context_value("channel", Some("web".to_string()))
            .unwrap_err();
        assert!(matches!(err, ContextError::UnknownAxis { .. }));

        let mut plain = Value::new("title", "Page", "default", &[]);
        let err = plain.context_value("language").unwrap_err();
        assert!(matches!(err, ContextError::NotContextual { .. }));
    }

    #[test]
    fn matches_context_ignores_axes_outside_mask() {
        let mut value = contextual_value();
        value
            .set_context_value("language", Some("en".to_string()))
            .unwrap();
        value
            .set_context_value("country", Some("FR".to_string()))
            .unwrap();

        let mut context = Context::new();
        context.insert("language".to_string(), "en".to_string());
        context.insert("country".to_string(), "US".to_string());

        assert!(value.matches_context(&context, &["language".to_string()]));
        assert!(!value.matches_context(
            &context,
            &["language".to_string(), "country".to_string()]
        ));
    }
}
