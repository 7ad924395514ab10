// crates/autoschema-store-sqlite/src/lib.rs
// ============================================================================
// Module: Autoschema SQLite Backend
// Description: SQLite dialect, driver, and configuration for the dynamic store.
// Purpose: Run the dynamic-schema item store on local SQLite files.
// Dependencies: autoschema-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate supplies the `SQLite` pieces the core schema manager drives
//! through its fixed interfaces: [`SqliteDialect`] for SQL text and
//! [`SqliteConnector`] for connections. [`open_sqlite_store`] turns a
//! validated [`SqliteStoreConfig`] into an open store. Security posture:
//! database names and table identifiers are validated before use.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod dialect;
pub mod driver;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::SqliteConnectorConfig;
pub use config::SqliteStoreConfig;
pub use config::SqliteStoreMode;
pub use config::SqliteSyncMode;
pub use dialect::SqliteDialect;
pub use driver::SqliteConnection;
pub use driver::SqliteConnector;
pub use store::SqliteStoreError;
pub use store::open_sqlite_store;
pub use store::sqlite_store_builder;
