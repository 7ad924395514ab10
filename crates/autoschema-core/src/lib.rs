// crates/autoschema-core/src/lib.rs
// ============================================================================
// Module: Autoschema Core Library
// Description: Public API surface for the dynamic-schema item store.
// Purpose: Expose items, coercion, schema cache, reconciler, writer, and facade.
// Dependencies: crate::{config, connection, dialect, driver, error, item, log, naming, reconcile, schema, store, value, writer}
// ============================================================================

//! ## Overview
//! Autoschema stores heterogeneous records in relational tables without any
//! declared schema. The first item of a logical type creates its table, and
//! later items with new fields widen it. Engine-specific SQL lives behind
//! [`Dialect`] and connections behind [`Connector`], so backends plug in
//! without touching the schema manager.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod connection;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod item;
pub mod log;
pub mod naming;
pub mod reconcile;
pub mod schema;
pub mod store;
pub mod value;
pub mod writer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::CommitPolicy;
pub use config::ConfigError;
pub use config::LogConfig;
pub use config::LogSinkKind;
pub use config::StoreConfig;
pub use connection::ConnectionManager;
pub use dialect::Dialect;
pub use dialect::MySqlDialect;
pub use driver::Connector;
pub use driver::DriverConnection;
pub use driver::QueryResult;
pub use driver::Statement;
pub use error::CoercionError;
pub use error::DialectError;
pub use error::DriverError;
pub use error::StoreError;
pub use item::FieldMap;
pub use item::Item;
pub use item::JsonRecord;
pub use item::Record;
pub use item::flatten_item;
pub use log::FileLogSink;
pub use log::NoopLogSink;
pub use log::StderrLogSink;
pub use log::StoreLogEvent;
pub use log::StoreLogLevel;
pub use log::StoreLogSink;
pub use naming::TableNamer;
pub use reconcile::ReconcileReport;
pub use reconcile::SchemaReconciler;
pub use schema::FieldDescriptor;
pub use schema::SchemaCache;
pub use schema::TableSchema;
pub use store::DynamicStore;
pub use store::DynamicStoreBuilder;
pub use value::FieldValue;
pub use value::PrimitiveType;
pub use value::SqlValue;
pub use value::coerce;
pub use value::infer_type;
pub use writer::BatchWriter;
pub use writer::CoercionFailure;
pub use writer::WriteReport;
