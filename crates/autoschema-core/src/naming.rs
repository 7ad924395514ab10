// crates/autoschema-core/src/naming.rs
// ============================================================================
// Module: Table Naming
// Description: Maps items to destination table names.
// Purpose: Apply the caller naming function, reserved-name remaps, and prefix.
// Dependencies: crate::{item, log}
// ============================================================================

//! ## Overview
//! A table name starts as the result of the caller's naming function, or the
//! item's type name when there is none or it fails. Names colliding with
//! reserved words are then remapped, and the configured prefix prepended.
//! The result is stable for every item of the same logical type.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::item::Item;
use crate::log::StoreLogEvent;
use crate::log::StoreLogLevel;
use crate::log::StoreLogSink;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Caller-supplied naming function.
pub type NamingFn = dyn Fn(&dyn Item) -> Result<String, String> + Send + Sync;

/// Built-in remaps for type names that collide with SQL reserved words.
const RESERVED_TRANSLATIONS: &[(&str, &str)] = &[
    ("Signal", "StoredSignal"),
    ("Order", "OrderItem"),
    ("Group", "GroupItem"),
    ("Index", "IndexItem"),
    ("Key", "KeyItem"),
    ("Select", "SelectItem"),
    ("Table", "TableItem"),
];

/// Resolves destination table names for items.
#[derive(Clone)]
pub struct TableNamer {
    /// Optional caller naming function.
    naming: Option<Arc<NamingFn>>,
    /// Exact-match name remaps.
    translations: BTreeMap<String, String>,
    /// Prefix prepended after translation.
    prefix: String,
    /// Diagnostics sink.
    log: Arc<dyn StoreLogSink>,
}

impl fmt::Debug for TableNamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableNamer")
            .field("naming", &self.naming.is_some())
            .field("translations", &self.translations)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl TableNamer {
    /// Creates a namer with the built-in translations and no prefix.
    #[must_use]
    pub fn new(log: Arc<dyn StoreLogSink>) -> Self {
        Self {
            naming: None,
            translations: RESERVED_TRANSLATIONS
                .iter()
                .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
                .collect(),
            prefix: String::new(),
            log,
        }
    }

    /// Installs a naming function.
    #[must_use]
    pub fn with_naming_fn<F>(mut self, naming: F) -> Self
    where
        F: Fn(&dyn Item) -> Result<String, String> + Send + Sync + 'static,
    {
        self.naming = Some(Arc::new(naming));
        self
    }

    /// Adds translations; configured entries override built-in ones.
    #[must_use]
    pub fn with_translations<I>(mut self, translations: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.translations.extend(translations);
        self
    }

    /// Sets the table prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Returns the destination table for `item`.
    #[must_use]
    pub fn table_name(&self, item: &dyn Item) -> String {
        let base = self.base_name(item);
        let translated = self.translations.get(&base).cloned().unwrap_or(base);
        format!("{}{translated}", self.prefix)
    }

    /// Runs the naming function, falling back to the type name.
    fn base_name(&self, item: &dyn Item) -> String {
        let Some(naming) = &self.naming else {
            return item.type_name().to_string();
        };
        match naming(item) {
            Ok(name) if !name.trim().is_empty() => name,
            Ok(_) => {
                self.naming_failed(item, "naming function returned an empty name");
                item.type_name().to_string()
            }
            Err(message) => {
                self.naming_failed(item, &message);
                item.type_name().to_string()
            }
        }
    }

    /// Logs a naming function failure.
    fn naming_failed(&self, item: &dyn Item, message: &str) {
        self.log.record(
            &StoreLogEvent::new(
                StoreLogLevel::Warning,
                "table_naming_failed",
                format!("naming function failed, using type name {}", item.type_name()),
            )
            .with_detail(message),
        );
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

    use std::sync::Arc;
    use std::sync::Mutex;

    use super::TableNamer;
    use crate::item::Record;
    use crate::log::StoreLogEvent;
    use crate::log::StoreLogSink;

    #[derive(Default)]
    struct CapturingSink {
        events: Mutex<Vec<String>>,
    }

    impl StoreLogSink for CapturingSink {
        fn record(&self, event: &StoreLogEvent) {
            self.events.lock().unwrap().push(event.event.to_string());
        }
    }

    #[test]
    fn defaults_to_type_name() {
        let namer = TableNamer::new(Arc::new(CapturingSink::default()));
        assert_eq!(namer.table_name(&Record::new("Type1").with("a", 1)), "Type1");
    }

    #[test]
    fn reserved_names_are_remapped_then_prefixed() {
        let namer = TableNamer::new(Arc::new(CapturingSink::default())).with_prefix("nio_");
        assert_eq!(namer.table_name(&Record::new("Signal")), "nio_StoredSignal");
        assert_eq!(namer.table_name(&Record::new("Order")), "nio_OrderItem");
        assert_eq!(namer.table_name(&Record::new("signal")), "nio_signal");
    }

    #[test]
    fn configured_translations_override_built_ins() {
        let namer = TableNamer::new(Arc::new(CapturingSink::default()))
            .with_translations([("Signal".to_string(), "NioSignal".to_string())]);
        assert_eq!(namer.table_name(&Record::new("Signal")), "NioSignal");
    }

    #[test]
    fn naming_function_result_is_translated() {
        let namer = TableNamer::new(Arc::new(CapturingSink::default()))
            .with_naming_fn(|_| Ok("Group".to_string()));
        assert_eq!(namer.table_name(&Record::new("Type1")), "GroupItem");
    }

    #[test]
    fn failing_naming_function_falls_back_and_logs() {
        let sink = Arc::new(CapturingSink::default());
        let namer = TableNamer::new(sink.clone()).with_naming_fn(|_| Err("boom".to_string()));
        assert_eq!(namer.table_name(&Record::new("Type2")), "Type2");
        let empty = TableNamer::new(sink.clone()).with_naming_fn(|_| Ok(String::new()));
        assert_eq!(empty.table_name(&Record::new("Type3")), "Type3");
        assert_eq!(sink.events.lock().unwrap().len(), 2);
    }
}
