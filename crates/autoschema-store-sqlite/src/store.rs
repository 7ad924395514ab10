// crates/autoschema-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Store Construction
// Description: Builds and opens a DynamicStore over SQLite from configuration.
// Purpose: One call from a validated config file to an open store.
// Dependencies: autoschema-core, thiserror
// ============================================================================

//! ## Overview
//! [`open_sqlite_store`] wires the configured log sink, connector, and
//! dialect into a [`DynamicStore`] and opens it, creating the database file
//! on first use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use autoschema_core::ConfigError;
use autoschema_core::DynamicStore;
use autoschema_core::DynamicStoreBuilder;
use autoschema_core::StoreError;
use thiserror::Error;

use crate::config::SqliteStoreConfig;
use crate::dialect::SqliteDialect;
use crate::driver::SqliteConnector;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors opening a `SQLite`-backed store.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// The configuration is invalid or the log sink cannot be created.
    #[error("sqlite store config error: {0}")]
    Config(#[from] ConfigError),
    /// Opening the store failed.
    #[error("sqlite store error: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Construction
// ============================================================================

/// Returns a builder for a `SQLite`-backed store without opening it.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Config`] when validation fails or the log sink
/// cannot be created.
pub fn sqlite_store_builder(
    config: &SqliteStoreConfig,
) -> Result<DynamicStoreBuilder, SqliteStoreError> {
    config.validate()?;
    let log = config.log.build()?;
    let connector = Arc::new(SqliteConnector::new(config.sqlite.clone()));
    Ok(DynamicStore::builder(connector, Arc::new(SqliteDialect))
        .config(config.store.clone())
        .log_sink(log))
}

/// Builds and opens a `SQLite`-backed store.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when the config is invalid or the store
/// cannot be opened.
pub fn open_sqlite_store(config: &SqliteStoreConfig) -> Result<DynamicStore, SqliteStoreError> {
    let store = sqlite_store_builder(config)?.build();
    store.open()?;
    Ok(store)
}
