// crates/autoschema-core/src/item.rs
// ============================================================================
// Module: Item Capability
// Description: Field maps and the narrow capability every storable item implements.
// Purpose: Read field/value pairs from heterogeneous records without reflection.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! The store never owns items. It asks each one for a flat [`FieldMap`] via
//! the [`Item`] trait, either through a conversion method or a direct
//! attribute bag, and drops the map at the end of the call. [`Record`] and
//! [`JsonRecord`] are ready-made adapters for the two access paths.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::error::StoreError;
use crate::schema::fold_case;
use crate::value::FieldValue;

// ============================================================================
// SECTION: Field Map
// ============================================================================

/// Insertion-ordered field name to value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    /// Field entries in insertion order.
    entries: Vec<(String, FieldValue)>,
}

impl FieldMap {
    /// Creates an empty field map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts a field, replacing the value of an existing field with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Builder-style [`FieldMap::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns the value stored under `name` (exact case).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(existing, _)| existing == name).map(|(_, value)| value)
    }

    /// Returns the value for `name`, preferring an exact match over a case-insensitive one.
    #[must_use]
    pub fn get_ignore_case(&self, name: &str) -> Option<&FieldValue> {
        self.get(name).or_else(|| {
            self.entries
                .iter()
                .find(|(existing, _)| fold_case(existing) == fold_case(name))
                .map(|(_, value)| value)
        })
    }

    /// Iterates fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns the field names in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Returns the number of fields.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the map holds no fields.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

impl IntoIterator for FieldMap {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ============================================================================
// SECTION: Item Capability
// ============================================================================

/// A record that can be flattened into a [`FieldMap`].
///
/// Implementors provide at least one of [`Item::to_field_map`] (conversion)
/// or [`Item::field_map`] (attribute bag). Items offering neither fail
/// introspection and are skipped by the store.
pub trait Item {
    /// Logical type name; used as the default table name.
    fn type_name(&self) -> &str;

    /// Direct access to the item's attribute bag.
    fn field_map(&self) -> Option<&FieldMap> {
        None
    }

    /// Converts the item into a field map.
    fn to_field_map(&self) -> Option<FieldMap> {
        None
    }
}

impl<T: Item + ?Sized> Item for &T {
    fn type_name(&self) -> &str {
        (**self).type_name()
    }

    fn field_map(&self) -> Option<&FieldMap> {
        (**self).field_map()
    }

    fn to_field_map(&self) -> Option<FieldMap> {
        (**self).to_field_map()
    }
}

impl<T: Item + ?Sized> Item for Box<T> {
    fn type_name(&self) -> &str {
        (**self).type_name()
    }

    fn field_map(&self) -> Option<&FieldMap> {
        (**self).field_map()
    }

    fn to_field_map(&self) -> Option<FieldMap> {
        (**self).to_field_map()
    }
}

/// Flattens an item to its field map, trying conversion before the attribute bag.
///
/// # Errors
///
/// Returns [`StoreError::ItemIntrospection`] when the item exposes no field
/// mapping or the mapping is empty.
pub fn flatten_item(item: &dyn Item) -> Result<FieldMap, StoreError> {
    let fields = item
        .to_field_map()
        .or_else(|| item.field_map().cloned())
        .ok_or_else(|| {
            StoreError::ItemIntrospection(format!(
                "item of type {} exposes no field mapping",
                item.type_name()
            ))
        })?;
    if fields.is_empty() {
        return Err(StoreError::ItemIntrospection(format!(
            "item of type {} has no fields",
            item.type_name()
        )));
    }
    Ok(fields)
}

// ============================================================================
// SECTION: Adapters
// ============================================================================

/// Attribute-bag item: a type name plus a field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Logical type name.
    type_name: String,
    /// Item fields.
    fields: FieldMap,
}

impl Record {
    /// Creates a record with no fields.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: FieldMap::new(),
        }
    }

    /// Creates a record from an existing field map.
    #[must_use]
    pub fn from_fields(type_name: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    /// Adds or replaces a field.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name, value);
        self
    }

    /// Sets a field in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name, value);
    }
}

impl Item for Record {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field_map(&self) -> Option<&FieldMap> {
        Some(&self.fields)
    }
}

/// Conversion item over a JSON document; only objects flatten.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRecord {
    /// Logical type name.
    type_name: String,
    /// Source document.
    document: serde_json::Value,
}

impl JsonRecord {
    /// Wraps a JSON document.
    #[must_use]
    pub fn new(type_name: impl Into<String>, document: serde_json::Value) -> Self {
        Self {
            type_name: type_name.into(),
            document,
        }
    }
}

impl Item for JsonRecord {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn to_field_map(&self) -> Option<FieldMap> {
        let serde_json::Value::Object(object) = &self.document else {
            return None;
        };
        Some(object.iter().map(|(name, value)| (name.clone(), FieldValue::from(value.clone()))).collect())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
