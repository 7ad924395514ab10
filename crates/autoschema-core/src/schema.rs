// crates/autoschema-core/src/schema.rs
// ============================================================================
// Module: Schema Cache
// Description: Per-table column layouts with locked-in types and insert fragments.
// Purpose: Answer "is this field already a column" without touching the catalog.
// Dependencies: crate::{dialect, item, value}
// ============================================================================

//! ## Overview
//! [`TableSchema`] mirrors the live column list of one table, a case-folded
//! name set for membership checks, and the quoted column and placeholder
//! fragments used to render inserts. [`SchemaCache`] maps table names to
//! schemas under a single lock.
//!
//! Entries are only ever replaced with schemas re-read from the database;
//! the one piece of state carried across a refresh is the type each column
//! locked in from the first non-null value this process wrote to it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::dialect::Dialect;
use crate::error::DialectError;
use crate::error::StoreError;
use crate::item::FieldMap;
use crate::value::FieldValue;
use crate::value::PrimitiveType;
use crate::value::infer_type;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Case-folds a field or column name for membership checks.
#[must_use]
pub fn fold_case(name: &str) -> String {
    name.to_lowercase()
}

// ============================================================================
// SECTION: Table Schema
// ============================================================================

/// One column and the type locked in for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Column name as reported by the database.
    pub name: String,
    /// Type of the first non-null value written; unset until then.
    pub inferred_type: Option<PrimitiveType>,
}

/// Cached layout of one table.
///
/// # Invariants
/// - `lowercased_names` is exactly the case-folded name set of `fields`.
/// - `column_list` and `placeholder_list` follow `fields` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Columns in database order.
    fields: Vec<FieldDescriptor>,
    /// Case-folded column names.
    lowercased_names: BTreeSet<String>,
    /// Quoted, comma-separated column names.
    column_list: String,
    /// Comma-separated placeholders, one per column.
    placeholder_list: String,
}

impl TableSchema {
    /// Builds a schema from live column names.
    ///
    /// # Errors
    ///
    /// Returns [`DialectError`] when a column name cannot be quoted.
    pub fn from_columns(columns: Vec<String>, dialect: &dyn Dialect) -> Result<Self, DialectError> {
        let quoted =
            columns.iter().map(|name| dialect.quote_identifier(name)).collect::<Result<Vec<_>, _>>()?;
        let placeholders = vec![dialect.field_placeholder(); columns.len()];
        let lowercased_names = columns.iter().map(|name| fold_case(name)).collect();
        let fields = columns
            .into_iter()
            .map(|name| FieldDescriptor {
                name,
                inferred_type: None,
            })
            .collect();
        Ok(Self {
            fields,
            lowercased_names,
            column_list: quoted.join(", "),
            placeholder_list: placeholders.join(", "),
        })
    }

    /// Returns the columns in database order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Returns the column names in database order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    /// Returns the locked-in type for a column, matching case-insensitively.
    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<PrimitiveType> {
        let folded = fold_case(name);
        self.fields
            .iter()
            .find(|field| fold_case(&field.name) == folded)
            .and_then(|field| field.inferred_type)
    }

    /// Returns true when `name` is a column, ignoring case.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.lowercased_names.contains(&fold_case(name))
    }

    /// Returns the number of columns.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true when the schema has no columns.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Quoted column list for inserts.
    #[must_use]
    pub fn column_list(&self) -> &str {
        &self.column_list
    }

    /// Placeholder list for inserts.
    #[must_use]
    pub fn placeholder_list(&self) -> &str {
        &self.placeholder_list
    }

    /// Fields of `item` that are not columns yet, with the type each would be added as.
    ///
    /// Names differing only in case are reported once, keeping the first.
    #[must_use]
    pub fn missing_fields(&self, item: &FieldMap) -> Vec<(String, PrimitiveType)> {
        let mut seen = BTreeSet::new();
        item.iter()
            .filter(|(name, _)| !self.has_field(name))
            .filter(|(name, _)| seen.insert(fold_case(name)))
            .map(|(name, value)| (name.to_string(), infer_type(value)))
            .collect()
    }

    /// Copies locked-in types from a previous layout of the same table.
    fn carry_types_from(&mut self, previous: &Self) {
        for field in &mut self.fields {
            if field.inferred_type.is_none() {
                field.inferred_type = previous.field_type(&field.name);
            }
        }
    }

    /// Locks each unset column to the type of its first non-null value in `rows`.
    fn lock_types(&mut self, rows: &[&FieldMap]) {
        for field in &mut self.fields {
            if field.inferred_type.is_some() {
                continue;
            }
            field.inferred_type = rows
                .iter()
                .filter_map(|row| row.get_ignore_case(&field.name))
                .find(|value| !FieldValue::is_null(value))
                .map(infer_type);
        }
    }
}

// ============================================================================
// SECTION: Schema Cache
// ============================================================================

/// Cache entry: the table name as first seen plus its schema.
#[derive(Debug, Clone)]
struct CachedTable {
    /// Table name as created or discovered.
    name: String,
    /// Cached schema.
    schema: TableSchema,
}

/// Table name to [`TableSchema`] map shared by all callers.
///
/// Table names match case-insensitively, like column names, so logical
/// types differing only in case share one entry.
///
/// # Invariants
/// - An entry exists only for tables confirmed to exist in the database.
#[derive(Debug, Default)]
pub struct SchemaCache {
    /// Cached tables keyed by case-folded table name.
    tables: Mutex<BTreeMap<String, CachedTable>>,
}

impl SchemaCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the cache lock.
    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, CachedTable>>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Cache("schema cache mutex poisoned".to_string()))
    }

    /// Returns a snapshot of the cached schema for `table`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] when the lock is poisoned.
    pub fn get(&self, table: &str) -> Result<Option<TableSchema>, StoreError> {
        Ok(self.lock()?.get(&fold_case(table)).map(|entry| entry.schema.clone()))
    }

    /// Stores `schema` for `table`, replacing any previous entry as-is.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] when the lock is poisoned.
    pub fn put(&self, table: impl Into<String>, schema: TableSchema) -> Result<(), StoreError> {
        let name = table.into();
        self.lock()?.insert(fold_case(&name), CachedTable {
            name,
            schema,
        });
        Ok(())
    }

    /// Replaces the schema of `table` with a freshly read one, keeping
    /// locked-in types and the name the entry was first cached under.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] when the lock is poisoned.
    pub fn refresh(&self, table: &str, mut schema: TableSchema) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let key = fold_case(table);
        let name = match tables.get(&key) {
            Some(previous) => {
                schema.carry_types_from(&previous.schema);
                previous.name.clone()
            }
            None => table.to_string(),
        };
        tables.insert(key, CachedTable {
            name,
            schema,
        });
        Ok(())
    }

    /// Returns true when `table` is cached.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] when the lock is poisoned.
    pub fn contains(&self, table: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.contains_key(&fold_case(table)))
    }

    /// Returns true when `field` is a cached column of `table`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] when the lock is poisoned.
    pub fn has_field(&self, table: &str, field: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.get(&fold_case(table)).is_some_and(|entry| entry.schema.has_field(field)))
    }

    /// Fields of `item` missing from `table`; `None` when the table is not cached.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] when the lock is poisoned.
    pub fn missing_fields(
        &self,
        table: &str,
        item: &FieldMap,
    ) -> Result<Option<Vec<(String, PrimitiveType)>>, StoreError> {
        Ok(self.lock()?.get(&fold_case(table)).map(|entry| entry.schema.missing_fields(item)))
    }

    /// Locks unset column types from `rows` and returns the resulting snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] when the lock is poisoned.
    pub fn observe(
        &self,
        table: &str,
        rows: &[&FieldMap],
    ) -> Result<Option<TableSchema>, StoreError> {
        let mut tables = self.lock()?;
        Ok(tables.get_mut(&fold_case(table)).map(|entry| {
            entry.schema.lock_types(rows);
            entry.schema.clone()
        }))
    }

    /// Evicts `table`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] when the lock is poisoned.
    pub fn remove(&self, table: &str) -> Result<Option<TableSchema>, StoreError> {
        Ok(self.lock()?.remove(&fold_case(table)).map(|entry| entry.schema))
    }

    /// Returns every cached table name, ordered case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] when the lock is poisoned.
    pub fn table_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.values().map(|entry| entry.name.clone()).collect())
    }

    /// Drops every entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] when the lock is poisoned.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.lock()?.clear();
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::SchemaCache;
    use super::TableSchema;
    use crate::dialect::MySqlDialect;
    use crate::item::FieldMap;
    use crate::value::FieldValue;
    use crate::value::PrimitiveType;

    fn schema(columns: &[&str]) -> TableSchema {
        TableSchema::from_columns(columns.iter().map(ToString::to_string).collect(), &MySqlDialect)
            .unwrap()
    }

    #[test]
    fn membership_is_case_insensitive() {
        let cache = SchemaCache::new();
        cache.put("Type1", schema(&["Field1", "field2"])).unwrap();
        assert!(cache.has_field("Type1", "FIELD1").unwrap());
        assert!(cache.has_field("Type1", "Field2").unwrap());
        assert!(!cache.has_field("Type1", "field3").unwrap());
        assert!(!cache.has_field("Missing", "field1").unwrap());
    }

    #[test]
    fn missing_fields_dedupes_case_variants() {
        let table = schema(&["field1"]);
        let item = FieldMap::new().with("FIELD1", 1).with("extra", 2.5).with("EXTRA", 3.5);
        assert_eq!(table.missing_fields(&item), vec![("extra".to_string(), PrimitiveType::Float)]);
    }

    #[test]
    fn first_non_null_value_locks_the_type() {
        let cache = SchemaCache::new();
        cache.put("Type1", schema(&["value"])).unwrap();
        let first = FieldMap::new().with("value", FieldValue::Null);
        let second = FieldMap::new().with("value", 7);
        let observed = cache.observe("Type1", &[&first, &second]).unwrap().unwrap();
        assert_eq!(observed.field_type("value"), Some(PrimitiveType::Integer));

        let later = FieldMap::new().with("value", "text");
        let observed = cache.observe("Type1", &[&later]).unwrap().unwrap();
        assert_eq!(observed.field_type("value"), Some(PrimitiveType::Integer));
    }

    #[test]
    fn refresh_replaces_columns_but_keeps_locked_types() {
        let cache = SchemaCache::new();
        cache.put("Type1", schema(&["field1"])).unwrap();
        cache.observe("Type1", &[&FieldMap::new().with("field1", true)]).unwrap();
        cache.refresh("Type1", schema(&["field1", "field2"])).unwrap();
        let refreshed = cache.get("Type1").unwrap().unwrap();
        assert_eq!(refreshed.field_names(), vec!["field1", "field2"]);
        assert_eq!(refreshed.field_type("field1"), Some(PrimitiveType::Boolean));
        assert_eq!(refreshed.field_type("field2"), None);
        assert_eq!(refreshed.column_list(), "`field1`, `field2`");
        assert_eq!(refreshed.placeholder_list(), "?, ?");
    }

    #[test]
    fn remove_evicts_table() {
        let cache = SchemaCache::new();
        cache.put("Type1", schema(&["a"])).unwrap();
        assert!(cache.remove("Type1").unwrap().is_some());
        assert!(!cache.contains("Type1").unwrap());
        assert!(cache.table_names().unwrap().is_empty());
    }

    #[test]
    fn table_names_match_case_insensitively() {
        let cache = SchemaCache::new();
        cache.put("Type1", schema(&["a"])).unwrap();
        cache.refresh("type1", schema(&["a", "b"])).unwrap();
        assert!(cache.contains("TYPE1").unwrap());
        assert!(cache.has_field("type1", "B").unwrap());
        assert_eq!(cache.table_names().unwrap(), vec!["Type1"]);
        assert!(cache.remove("tYpE1").unwrap().is_some());
        assert!(cache.table_names().unwrap().is_empty());
    }
}
