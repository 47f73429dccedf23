//! Generic entity instance and its attribute access semantics.
//!
//! # Responsibility
//! - Own the value records of one entity of a family.
//! - Resolve reads and writes by attribute code under an effective context.
//!
//! # Invariants
//! - Reads fail with `MissingAttribute` for codes outside the own family.
//! - Writes only replace values stored under the same mask axes; values of
//!   other contexts stay untouched.
//! - Values whose attribute left the family are pruned on mutable access.
//! - A value collection that was never hydrated is never read implicitly;
//!   access fails with `ValuesNotLoaded`.
//! - Removed persisted values are remembered until the next save.

use crate::error::{EavError, EavResult};
use crate::model::attribute::Attribute;
use crate::model::context::{merge_contexts, Context};
use crate::model::family::Family;
use crate::model::value::{Value, ValueData, ValueId};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Stable identifier of a persisted data row.
pub type DataId = Uuid;

/// Result of reading one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Current value of a single-valued attribute (`Null` when unset).
    Single(ValueData),
    /// All current values of a collection attribute, ordered by position.
    Collection(Vec<ValueData>),
}

impl AttributeValue {
    pub fn single(value: impl Into<ValueData>) -> Self {
        Self::Single(value.into())
    }

    pub fn collection<T: Into<ValueData>>(values: impl IntoIterator<Item = T>) -> Self {
        Self::Collection(values.into_iter().map(Into::into).collect())
    }

    pub fn as_single(&self) -> Option<&ValueData> {
        match self {
            Self::Single(value) => Some(value),
            Self::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[ValueData]> {
        match self {
            Self::Single(_) => None,
            Self::Collection(values) => Some(values),
        }
    }

    /// Returns whether nothing is set.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(value) => value.is_null(),
            Self::Collection(values) => values.is_empty(),
        }
    }
}

impl From<ValueData> for AttributeValue {
    fn from(value: ValueData) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<ValueData>> for AttributeValue {
    fn from(values: Vec<ValueData>) -> Self {
        Self::Collection(values)
    }
}

/// Data rejected by pre-write validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required attribute has no non-null value.
    MissingRequired { family: String, attribute: String },
    /// Single-valued attribute holds several values for one context.
    TooManyValues { attribute: String, count: usize },
    /// Relation points at data of a family outside `allowed_families`.
    ForbiddenRelationTarget { attribute: String, family: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { family, attribute } => {
                write!(f, "attribute `{attribute}` of family `{family}` is required")
            }
            Self::TooManyValues { attribute, count } => write!(
                f,
                "attribute `{attribute}` is single-valued but holds {count} values"
            ),
            Self::ForbiddenRelationTarget { attribute, family } => write!(
                f,
                "attribute `{attribute}` cannot point at data of family `{family}`"
            ),
        }
    }
}

impl Error for ValidationError {}

/// One entity of a family.
#[derive(Debug, Clone)]
pub struct Data {
    id: Option<DataId>,
    family: Arc<Family>,
    parent_id: Option<DataId>,
    values: Option<Vec<Value>>,
    removed_values: Vec<ValueId>,
    referers: Option<Vec<Value>>,
    created_at: Option<i64>,
    updated_at: Option<i64>,
    current_context: Context,
}

impl Data {
    /// Transient instance with an empty, loaded value collection.
    pub(crate) fn new(family: Arc<Family>) -> Self {
        Self {
            id: None,
            family,
            parent_id: None,
            values: Some(Vec::new()),
            removed_values: Vec::new(),
            referers: None,
            created_at: None,
            updated_at: None,
            current_context: Context::new(),
        }
    }

    /// Persisted instance whose values are not hydrated yet.
    pub(crate) fn from_storage(
        id: DataId,
        family: Arc<Family>,
        parent_id: Option<DataId>,
        created_at: i64,
        updated_at: i64,
    ) -> Self {
        Self {
            id: Some(id),
            family,
            parent_id,
            values: None,
            removed_values: Vec::new(),
            referers: None,
            created_at: Some(created_at),
            updated_at: Some(updated_at),
            current_context: Context::new(),
        }
    }

    /// Storage identity, `None` until saved.
    pub fn id(&self) -> Option<DataId> {
        self.id
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn family(&self) -> &Arc<Family> {
        &self.family
    }

    pub fn family_code(&self) -> &str {
        self.family.code()
    }

    pub fn parent_id(&self) -> Option<DataId> {
        self.parent_id
    }

    pub fn set_parent_id(&mut self, parent_id: Option<DataId>) {
        self.parent_id = parent_id;
    }

    /// Epoch milliseconds of the first save.
    pub fn created_at(&self) -> Option<i64> {
        self.created_at
    }

    /// Epoch milliseconds of the last save.
    pub fn updated_at(&self) -> Option<i64> {
        self.updated_at
    }

    pub fn current_context(&self) -> &Context {
        &self.current_context
    }

    /// Sets the runtime context used to pick visible values.
    pub fn set_current_context(&mut self, context: Context) {
        self.current_context = context;
    }

    /// Family default, then current context, then `explicit`; most specific wins.
    pub fn effective_context(&self, explicit: Option<&Context>) -> Context {
        let empty = Context::new();
        merge_contexts([
            self.family.default_context(),
            &self.current_context,
            explicit.unwrap_or(&empty),
        ])
    }

    pub fn has_loaded_values(&self) -> bool {
        self.values.is_some()
    }

    /// Every owned value, regardless of context.
    pub fn values(&self) -> EavResult<&[Value]> {
        self.values.as_deref().ok_or(EavError::ValuesNotLoaded)
    }

    /// Values elsewhere pointing at this data, once loaded.
    pub fn referers(&self) -> EavResult<&[Value]> {
        self.referers.as_deref().ok_or(EavError::ValuesNotLoaded)
    }

    /// Persisted values removed since the last save.
    pub fn removed_values(&self) -> &[ValueId] {
        &self.removed_values
    }

    /// Visible values of `code` under the effective context, ordered by position.
    ///
    /// Does not materialize defaults; see [`Data::get`].
    pub fn current_values(&self, code: &str, context: Option<&Context>) -> EavResult<Vec<&Value>> {
        let attribute = self.family.get_attribute(code)?;
        let values = self.values()?;
        let context = self.effective_context(context);
        let mut current: Vec<&Value> = values
            .iter()
            .filter(|value| {
                value.attribute_code() == attribute.code()
                    && value.matches_context(&context, attribute.context_mask())
            })
            .collect();
        current.sort_by_key(|value| value.position());
        Ok(current)
    }

    /// Reads an attribute under the effective context.
    ///
    /// Collection attributes return every current value; others return the
    /// first current value or `Null`. Required attributes with a default
    /// get that default materialized when nothing is set.
    ///
    /// # Errors
    /// - `MissingAttribute` when `code` is not part of this family.
    /// - `ValuesNotLoaded` for persisted data that was never hydrated.
    pub fn get(&mut self, code: &str, context: Option<&Context>) -> EavResult<AttributeValue> {
        let family = Arc::clone(&self.family);
        let attribute = family.get_attribute(code)?;
        self.prune_orphans()?;

        let effective = self.effective_context(context);
        if attribute.is_required()
            && attribute.has_default()
            && self.current_values(code, context)?.is_empty()
        {
            self.materialize_default(attribute, &effective)?;
        }

        let current = self.current_values(code, context)?;
        Ok(Self::project(attribute, &current))
    }

    /// Non-mutating read; never materializes defaults.
    pub fn peek(&self, code: &str, context: Option<&Context>) -> EavResult<AttributeValue> {
        let attribute = self.family.get_attribute(code)?;
        let current = self.current_values(code, context)?;
        Ok(Self::project(attribute, &current))
    }

    fn project(attribute: &Attribute, current: &[&Value]) -> AttributeValue {
        if attribute.is_collection() {
            AttributeValue::Collection(current.iter().map(|value| value.data().clone()).collect())
        } else {
            AttributeValue::Single(
                current
                    .first()
                    .map(|value| value.data().clone())
                    .unwrap_or(ValueData::Null),
            )
        }
    }

    /// Replaces the current value(s) of `code`.
    ///
    /// # Errors
    /// - `InvalidValueData` when a collection is given for a single-valued
    ///   attribute or a payload does not fit the attribute column.
    pub fn set(
        &mut self,
        code: &str,
        value: AttributeValue,
        context: Option<&Context>,
    ) -> EavResult<()> {
        match value {
            AttributeValue::Single(data) => {
                let attribute = self.family.get_attribute(code)?;
                if attribute.is_collection() {
                    let values = if data.is_null() { Vec::new() } else { vec![data] };
                    self.set_values(code, values, context)
                } else {
                    self.set_value(code, data, context)
                }
            }
            AttributeValue::Collection(values) => self.set_values(code, values, context),
        }
    }

    /// Sets the single current value of `code`; `Null` removes it.
    pub fn set_value(
        &mut self,
        code: &str,
        data: impl Into<ValueData>,
        context: Option<&Context>,
    ) -> EavResult<()> {
        let family = Arc::clone(&self.family);
        let attribute = family.get_attribute(code)?;
        let data = data.into();
        self.prune_orphans()?;

        let effective = self.effective_context(context);
        let indices = self.matching_indices(attribute, &effective)?;
        if data.is_null() {
            self.remove_indices(indices);
            return Ok(());
        }

        match indices.split_first() {
            Some((&first, rest)) => {
                let rest = rest.to_vec();
                let values = self.loaded_values_mut()?;
                values[first].set_data(attribute, data)?;
                values[first].set_position(0);
                self.remove_indices(rest);
            }
            None => {
                let value = self.new_value(attribute, data, 0, &effective)?;
                self.loaded_values_mut()?.push(value);
            }
        }
        Ok(())
    }

    /// Replaces the current values of a collection attribute.
    ///
    /// # Errors
    /// - `InvalidValueData` for single-valued attributes given more than one value.
    pub fn set_values(
        &mut self,
        code: &str,
        values: Vec<ValueData>,
        context: Option<&Context>,
    ) -> EavResult<()> {
        let family = Arc::clone(&self.family);
        let attribute = family.get_attribute(code)?;
        if !attribute.is_collection() {
            return match values.len() {
                0 => self.set_value(code, ValueData::Null, context),
                1 => self.set_value(code, values.into_iter().next().unwrap_or_default(), context),
                count => Err(EavError::invalid_value(format!(
                    "attribute `{code}` is single-valued, got {count} values"
                ))),
            };
        }
        self.prune_orphans()?;

        let effective = self.effective_context(context);
        let mut fresh = Vec::with_capacity(values.len());
        for (position, data) in values.into_iter().filter(|data| !data.is_null()).enumerate() {
            fresh.push(self.new_value(attribute, data, position as i64, &effective)?);
        }
        let indices = self.matching_indices(attribute, &effective)?;
        self.remove_indices(indices);
        self.loaded_values_mut()?.extend(fresh);
        Ok(())
    }

    /// Appends a value to a collection attribute.
    ///
    /// # Errors
    /// - `InvalidValueData` for single-valued attributes.
    pub fn add(
        &mut self,
        code: &str,
        data: impl Into<ValueData>,
        context: Option<&Context>,
    ) -> EavResult<()> {
        let family = Arc::clone(&self.family);
        let attribute = family.get_attribute(code)?;
        Self::require_collection(attribute, "add")?;
        self.prune_orphans()?;

        let effective = self.effective_context(context);
        let indices = self.matching_indices(attribute, &effective)?;
        let values = self.values()?;
        let next = indices
            .iter()
            .map(|&index| values[index].position() + 1)
            .max()
            .unwrap_or(0);
        let value = self.new_value(attribute, data.into(), next, &effective)?;
        self.loaded_values_mut()?.push(value);
        Ok(())
    }

    /// Removes the first current value equal to `data` from a collection attribute.
    ///
    /// Returns whether a value was removed.
    ///
    /// # Errors
    /// - `InvalidValueData` for single-valued attributes.
    pub fn remove(
        &mut self,
        code: &str,
        data: impl Into<ValueData>,
        context: Option<&Context>,
    ) -> EavResult<bool> {
        let family = Arc::clone(&self.family);
        let attribute = family.get_attribute(code)?;
        Self::require_collection(attribute, "remove")?;
        self.prune_orphans()?;

        let target = data.into().coerce(attribute.attribute_type().column())?;
        let effective = self.effective_context(context);
        let indices = self.matching_indices(attribute, &effective)?;
        let values = self.values()?;
        let found = indices
            .into_iter()
            .find(|&index| values[index].data() == &target);
        match found {
            Some(index) => {
                self.remove_indices(vec![index]);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes every current value of `code`.
    pub fn clear(&mut self, code: &str, context: Option<&Context>) -> EavResult<()> {
        let family = Arc::clone(&self.family);
        let attribute = family.get_attribute(code)?;
        self.prune_orphans()?;
        let effective = self.effective_context(context);
        let indices = self.matching_indices(attribute, &effective)?;
        self.remove_indices(indices);
        Ok(())
    }

    /// Display label: the label attribute value, or `[<id>]`.
    pub fn label(&self) -> String {
        self.family
            .attribute_as_label()
            .and_then(|attribute| self.current_values(attribute.code(), None).ok())
            .and_then(|values| values.first().map(|value| value.data().to_string()))
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| {
                format!(
                    "[{}]",
                    self.id.map(|id| id.to_string()).unwrap_or_default()
                )
            })
    }

    /// Value of the family identifier attribute, if configured and set.
    pub fn identifier(&self) -> Option<ValueData> {
        let attribute = self.family.attribute_as_identifier()?;
        let values = self.current_values(attribute.code(), None).ok()?;
        values
            .first()
            .map(|value| value.data().clone())
            .filter(|data| !data.is_null())
    }

    /// Checks required attributes and single-value cardinality.
    ///
    /// Data whose values were never hydrated passes; nothing about them
    /// will be written.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let Some(values) = &self.values else {
            return Ok(());
        };
        for attribute in self.family.attributes() {
            let owned: Vec<&Value> = values
                .iter()
                .filter(|value| value.attribute_code() == attribute.code())
                .filter(|value| !value.data().is_null())
                .collect();

            if attribute.is_required() && owned.is_empty() {
                return Err(ValidationError::MissingRequired {
                    family: self.family.code().to_string(),
                    attribute: attribute.code().to_string(),
                });
            }

            if !attribute.is_collection() {
                let mut per_context: BTreeMap<Vec<Option<&str>>, usize> = BTreeMap::new();
                for value in &owned {
                    let key = attribute
                        .context_mask()
                        .iter()
                        .map(|axis| value.context().get(axis).and_then(Option::as_deref))
                        .collect();
                    *per_context.entry(key).or_default() += 1;
                }
                if let Some(&count) = per_context.values().find(|&&count| count > 1) {
                    return Err(ValidationError::TooManyValues {
                        attribute: attribute.code().to_string(),
                        count,
                    });
                }
            }
        }
        Ok(())
    }

    /// Materializes every configured default that has no current value.
    pub(crate) fn materialize_defaults(&mut self) -> EavResult<()> {
        self.materialize_where(|_| true)
    }

    /// Prunes orphans and materializes missing required defaults.
    pub(crate) fn prepare_for_save(&mut self) -> EavResult<()> {
        if self.values.is_none() {
            return Ok(());
        }
        self.prune_orphans()?;
        self.materialize_where(Attribute::is_required)
    }

    fn materialize_where(&mut self, filter: impl Fn(&Attribute) -> bool) -> EavResult<()> {
        let family = Arc::clone(&self.family);
        let effective = self.effective_context(None);
        for attribute in family.attributes() {
            if attribute.has_default()
                && filter(attribute)
                && self.current_values(attribute.code(), None)?.is_empty()
            {
                self.materialize_default(attribute, &effective)?;
            }
        }
        Ok(())
    }

    fn materialize_default(&mut self, attribute: &Attribute, context: &Context) -> EavResult<()> {
        for (position, default) in attribute.default_values().iter().enumerate() {
            let value = self.new_value(attribute, default.clone(), position as i64, context)?;
            self.loaded_values_mut()?.push(value);
        }
        Ok(())
    }

    fn new_value(
        &self,
        attribute: &Attribute,
        data: ValueData,
        position: i64,
        context: &Context,
    ) -> EavResult<Value> {
        let mut value = self.family.create_value(attribute);
        value.set_data(attribute, data)?;
        value.set_position(position);
        value.apply_context(context, attribute.context_mask())?;
        Ok(value)
    }

    fn require_collection(attribute: &Attribute, operation: &str) -> EavResult<()> {
        if attribute.is_collection() {
            Ok(())
        } else {
            Err(EavError::invalid_value(format!(
                "cannot {operation} on single-valued attribute `{}`",
                attribute.code()
            )))
        }
    }

    /// Values a write under `context` replaces: reads treat a missing axis as
    /// a wildcard, writes only touch values stored under the same axes.
    fn matching_indices(&self, attribute: &Attribute, context: &Context) -> EavResult<Vec<usize>> {
        let values = self.values()?;
        let mut indices: Vec<usize> = values
            .iter()
            .enumerate()
            .filter(|(_, value)| {
                value.attribute_code() == attribute.code()
                    && value.is_stored_under(context, attribute.context_mask())
            })
            .map(|(index, _)| index)
            .collect();
        indices.sort_by_key(|&index| values[index].position());
        Ok(indices)
    }

    fn remove_indices(&mut self, mut indices: Vec<usize>) {
        let Some(values) = self.values.as_mut() else {
            return;
        };
        indices.sort_unstable();
        indices.dedup();
        for index in indices.into_iter().rev() {
            let removed = values.remove(index);
            if let Some(id) = removed.id() {
                self.removed_values.push(id);
            }
        }
    }

    fn prune_orphans(&mut self) -> EavResult<()> {
        let family = Arc::clone(&self.family);
        let orphans: Vec<usize> = self
            .values()?
            .iter()
            .enumerate()
            .filter(|(_, value)| !family.has_attribute(value.attribute_code()))
            .map(|(index, _)| index)
            .collect();
        self.remove_indices(orphans);
        Ok(())
    }

    fn loaded_values_mut(&mut self) -> EavResult<&mut Vec<Value>> {
        self.values.as_mut().ok_or(EavError::ValuesNotLoaded)
    }

    /// Marks the value collection as hydrated, keeping injected values.
    pub(crate) fn init_values(&mut self) {
        if self.values.is_none() {
            self.values = Some(Vec::new());
        }
    }

    /// Adds a value fetched from storage.
    pub(crate) fn inject_value(&mut self, value: Value) {
        self.values.get_or_insert_with(Vec::new).push(value);
    }

    pub(crate) fn set_referers(&mut self, referers: Vec<Value>) {
        self.referers = Some(referers);
    }

    /// Assigns identities after a successful save.
    pub(crate) fn mark_saved(&mut self, id: DataId, now_ms: i64) {
        self.id = Some(id);
        if self.created_at.is_none() {
            self.created_at = Some(now_ms);
        }
        self.updated_at = Some(now_ms);
        self.removed_values.clear();
    }

    pub(crate) fn values_mut_for_save(&mut self) -> Option<&mut Vec<Value>> {
        self.values.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeValue, Data, ValidationError};
    use crate::error::EavError;
    use crate::model::attribute::AttributeConfig;
    use crate::model::context::context_of;
    use crate::model::family::{Family, FamilyConfig};
    use crate::model::storage::StorageLayout;
    use crate::model::value::ValueData;
    use crate::registry::{AttributeRegistry, FamilyRegistry, TypeRegistry};
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    fn family(config: FamilyConfig) -> Arc<Family> {
        let attributes = AttributeRegistry::new(TypeRegistry::with_defaults());
        let families = FamilyRegistry::new();
        let storage = StorageLayout::default();
        Arc::new(Family::from_config("Page", &config, &attributes, &families, &storage).unwrap())
    }

    fn page() -> Arc<Family> {
        family(
            FamilyConfig::new()
                .attribute("title", AttributeConfig::of_type("string"))
                .attribute("tags", AttributeConfig::of_type("string").collection())
                .label("title"),
        )
    }

    #[test]
    fn required_default_is_materialized_once() {
        let page = family(FamilyConfig::new().attribute(
            "tags",
            AttributeConfig::of_type("string")
                .collection()
                .required()
                .default_value(json!(["x"])),
        ));
        let mut data = Data::new(Arc::clone(&page));

        for _ in 0..3 {
            assert_eq!(
                data.get("tags", None).unwrap(),
                AttributeValue::collection(["x"])
            );
        }
        assert_eq!(data.values().unwrap().len(), 1);

        data.set_values("tags", vec![ValueData::from("y")], None).unwrap();
        assert_eq!(
            data.get("tags", None).unwrap(),
            AttributeValue::collection(["y"])
        );
    }

    #[test]
    fn unknown_code_is_missing_attribute() {
        let mut data = Data::new(page());
        let err = data.get("price", None).unwrap_err();
        assert_eq!(
            err,
            EavError::MissingAttribute {
                family: Some("Page".to_string()),
                attribute: "price".to_string()
            }
        );
    }

    #[test]
    fn add_and_remove_require_collections() {
        let mut data = Data::new(page());
        assert!(matches!(
            data.add("title", "x", None).unwrap_err(),
            EavError::InvalidValueData(_)
        ));
        assert!(matches!(
            data.remove("title", "x", None).unwrap_err(),
            EavError::InvalidValueData(_)
        ));

        data.add("tags", "a", None).unwrap();
        data.add("tags", "b", None).unwrap();
        assert!(data.remove("tags", "a", None).unwrap());
        assert!(!data.remove("tags", "zzz", None).unwrap());
        assert_eq!(
            data.get("tags", None).unwrap(),
            AttributeValue::collection(["b"])
        );
    }

    #[test]
    fn collection_input_on_single_attribute_is_rejected() {
        let mut data = Data::new(page());
        let err = data
            .set("title", AttributeValue::collection(["a", "b"]), None)
            .unwrap_err();
        assert!(matches!(err, EavError::InvalidValueData(_)));
    }

    #[test]
    fn null_removes_single_value() {
        let mut data = Data::new(page());
        data.set_value("title", "Home", None).unwrap();
        assert_eq!(data.label(), "Home");
        data.set_value("title", ValueData::Null, None).unwrap();
        assert_eq!(data.get("title", None).unwrap(), AttributeValue::Single(ValueData::Null));
        assert_eq!(data.label(), "[]");
    }

    #[test]
    fn values_are_scoped_by_context_mask() {
        let page = family(
            FamilyConfig::new()
                .value_class("contextual")
                .attribute(
                    "title",
                    AttributeConfig::of_type("string").context_mask(["language"]),
                )
                .attribute("slug", AttributeConfig::of_type("string")),
        );
        let mut data = Data::new(page);
        let en = context_of([("language", "en"), ("channel", "web")]);
        let fr = context_of([("language", "fr")]);

        data.set_value("title", "Hello", Some(&en)).unwrap();
        data.set_value("title", "Bonjour", Some(&fr)).unwrap();
        data.set_value("slug", "home", Some(&en)).unwrap();

        assert_eq!(data.peek("title", Some(&en)).unwrap(), AttributeValue::single("Hello"));
        assert_eq!(data.peek("title", Some(&fr)).unwrap(), AttributeValue::single("Bonjour"));
        assert_eq!(data.peek("slug", Some(&fr)).unwrap(), AttributeValue::single("home"));

        let title = data.current_values("title", Some(&en)).unwrap();
        assert_eq!(title[0].context_value("channel").unwrap(), None);
        assert!(data.validate().is_ok());
    }

    #[test]
    fn writes_without_an_axis_keep_other_translations() {
        let page = family(
            FamilyConfig::new().value_class("contextual").attribute(
                "title",
                AttributeConfig::of_type("string").context_mask(["language"]),
            ),
        );
        let mut data = Data::new(page);
        let en = context_of([("language", "en")]);
        let fr = context_of([("language", "fr")]);

        data.set_value("title", "Hello", Some(&en)).unwrap();
        data.set_value("title", "Bonjour", Some(&fr)).unwrap();
        data.set_value("title", "Fallback", None).unwrap();

        assert_eq!(data.peek("title", Some(&en)).unwrap(), AttributeValue::single("Hello"));
        assert_eq!(data.peek("title", Some(&fr)).unwrap(), AttributeValue::single("Bonjour"));
        assert_eq!(data.values().unwrap().len(), 3);
        let unscoped = data
            .values()
            .unwrap()
            .iter()
            .find(|value| value.data() == &ValueData::from("Fallback"))
            .unwrap();
        assert_eq!(unscoped.context_value("language").unwrap(), None);

        data.clear("title", Some(&fr)).unwrap();
        assert_eq!(data.peek("title", Some(&fr)).unwrap(), AttributeValue::Single(ValueData::Null));
        assert_eq!(data.peek("title", Some(&en)).unwrap(), AttributeValue::single("Hello"));
        assert!(data.validate().is_ok());
    }

    #[test]
    fn unloaded_values_are_not_read_implicitly() {
        let data = Data::from_storage(Uuid::new_v4(), page(), None, 0, 0);
        assert_eq!(data.peek("title", None).unwrap_err(), EavError::ValuesNotLoaded);
        assert!(data.validate().is_ok());
    }

    #[test]
    fn validate_reports_missing_required() {
        let page = family(
            FamilyConfig::new().attribute("title", AttributeConfig::of_type("string").required()),
        );
        let data = Data::new(page);
        assert_eq!(
            data.validate().unwrap_err(),
            ValidationError::MissingRequired {
                family: "Page".to_string(),
                attribute: "title".to_string()
            }
        );
    }
}
