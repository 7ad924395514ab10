// crates/autoschema-core/src/store.rs
// ============================================================================
// Module: Dynamic Store
// Description: Facade tying the connection, cache, reconciler, and writer together.
// Purpose: One cloneable handle for storing heterogeneous items.
// Dependencies: crate::{config, connection, dialect, driver, naming, reconcile, schema, writer}
// ============================================================================

//! ## Overview
//! [`DynamicStore`] is the entry point. Build it with
//! [`DynamicStoreBuilder`], call [`DynamicStore::open`], then hand it batches
//! of items. Clones share the same connection and schema cache, so the handle
//! can be passed to as many threads as needed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::connection::ConnectionManager;
use crate::dialect::Dialect;
use crate::driver::Connector;
use crate::driver::QueryResult;
use crate::driver::Statement;
use crate::error::DriverError;
use crate::error::StoreError;
use crate::item::Item;
use crate::log::NoopLogSink;
use crate::log::StoreLogEvent;
use crate::log::StoreLogLevel;
use crate::log::StoreLogSink;
use crate::naming::TableNamer;
use crate::reconcile::ReconcileReport;
use crate::reconcile::SchemaReconciler;
use crate::schema::SchemaCache;
use crate::schema::TableSchema;
use crate::writer::BatchWriter;
use crate::writer::WriteReport;

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for [`DynamicStore`].
pub struct DynamicStoreBuilder {
    /// Connection factory.
    connector: Arc<dyn Connector>,
    /// SQL text generator.
    dialect: Arc<dyn Dialect>,
    /// Store settings.
    config: StoreConfig,
    /// Diagnostics sink.
    log: Arc<dyn StoreLogSink>,
    /// Optional caller naming function.
    naming: Option<Box<dyn FnOnce(TableNamer) -> TableNamer + Send>>,
}

impl fmt::Debug for DynamicStoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicStoreBuilder")
            .field("dialect", &self.dialect.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DynamicStoreBuilder {
    /// Starts a builder with default settings and no logging.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, dialect: Arc<dyn Dialect>) -> Self {
        Self {
            connector,
            dialect,
            config: StoreConfig::default(),
            log: Arc::new(NoopLogSink),
            naming: None,
        }
    }

    /// Replaces the store settings.
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the diagnostics sink.
    #[must_use]
    pub fn log_sink(mut self, log: Arc<dyn StoreLogSink>) -> Self {
        self.log = log;
        self
    }

    /// Installs a table naming function.
    #[must_use]
    pub fn naming_fn<F>(mut self, naming: F) -> Self
    where
        F: Fn(&dyn Item) -> Result<String, String> + Send + Sync + 'static,
    {
        self.naming = Some(Box::new(move |namer: TableNamer| namer.with_naming_fn(naming)));
        self
    }

    /// Builds a disconnected store.
    #[must_use]
    pub fn build(self) -> DynamicStore {
        let mut namer = TableNamer::new(Arc::clone(&self.log))
            .with_translations(self.config.table_name_translations.clone())
            .with_prefix(self.config.table_prefix.clone());
        if let Some(install) = self.naming {
            namer = install(namer);
        }
        let connection = Arc::new(ConnectionManager::new(
            self.config.database.clone(),
            self.connector,
            Arc::clone(&self.log),
        ));
        let cache = Arc::new(SchemaCache::new());
        let reconciler = Arc::new(SchemaReconciler::new(
            Arc::clone(&connection),
            Arc::clone(&cache),
            Arc::clone(&self.dialect),
            namer,
            Arc::clone(&self.log),
        ));
        let writer = Arc::new(BatchWriter::new(
            Arc::clone(&connection),
            Arc::clone(&cache),
            Arc::clone(&self.dialect),
            Arc::clone(&reconciler),
            self.config.commit_policy,
            self.config.commit_interval,
            Arc::clone(&self.log),
        ));
        DynamicStore {
            connection,
            cache,
            dialect: self.dialect,
            reconciler,
            writer,
            log: self.log,
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Dynamic-schema item store.
///
/// # Invariants
/// - A table is cached only while it is known to exist in the database.
#[derive(Clone)]
pub struct DynamicStore {
    /// Shared connection.
    connection: Arc<ConnectionManager>,
    /// Shared schema cache.
    cache: Arc<SchemaCache>,
    /// SQL text generator.
    dialect: Arc<dyn Dialect>,
    /// Schema migrations.
    reconciler: Arc<SchemaReconciler>,
    /// Inserts and commits.
    writer: Arc<BatchWriter>,
    /// Diagnostics sink.
    log: Arc<dyn StoreLogSink>,
}

impl fmt::Debug for DynamicStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicStore")
            .field("connection", &self.connection)
            .field("dialect", &self.dialect.name())
            .finish_non_exhaustive()
    }
}

impl DynamicStore {
    /// Starts a [`DynamicStoreBuilder`].
    #[must_use]
    pub fn builder(connector: Arc<dyn Connector>, dialect: Arc<dyn Dialect>) -> DynamicStoreBuilder {
        DynamicStoreBuilder::new(connector, dialect)
    }

    /// Connects (creating the database when needed) and loads every existing table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when connecting fails and catalog
    /// errors from loading the tables.
    pub fn open(&self) -> Result<(), StoreError> {
        self.connection.open()?;
        self.cache.clear()?;
        let tables = self.reconciler.load_existing_tables()?;
        self.log.record(
            &StoreLogEvent::new(
                StoreLogLevel::Info,
                "schema_loaded",
                format!("loaded {} existing tables", tables.len()),
            )
            .with_detail(tables.join(", ")),
        );
        Ok(())
    }

    /// Commits and disconnects. Safe to call when already closed.
    pub fn close(&self) {
        self.connection.close();
    }

    /// Closes and reopens, reloading the schema cache.
    ///
    /// # Errors
    ///
    /// See [`DynamicStore::open`].
    pub fn reconnect(&self) -> Result<(), StoreError> {
        self.close();
        self.open()
    }

    /// Returns true while connected.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.connection.connected()
    }

    /// Commits pending rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the commit fails.
    pub fn commit(&self) -> Result<(), StoreError> {
        self.connection.commit()
    }

    /// Rows written since the last commit.
    #[must_use]
    pub fn uncommitted(&self) -> u64 {
        self.connection.uncommitted()
    }

    /// Migrates tables so they can hold `items` without writing them.
    ///
    /// # Errors
    ///
    /// See [`SchemaReconciler::reconcile`].
    pub fn reconcile<I: Item>(&self, items: &[I]) -> Result<ReconcileReport, StoreError> {
        self.reconciler.reconcile(items)
    }

    /// Writes `items` and returns how many rows were staged.
    ///
    /// # Errors
    ///
    /// See [`BatchWriter::write_report`].
    pub fn write<I: Item>(&self, items: &[I]) -> Result<usize, StoreError> {
        self.writer.write(items)
    }

    /// Writes `items` and returns the full report.
    ///
    /// # Errors
    ///
    /// See [`BatchWriter::write_report`].
    pub fn write_report<I: Item>(&self, items: &[I]) -> Result<WriteReport, StoreError> {
        self.writer.write_report(items)
    }

    /// Destination table for `item`.
    #[must_use]
    pub fn table_name(&self, item: &dyn Item) -> String {
        self.reconciler.table_name(item)
    }

    /// Cached schema of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] when the cache lock is poisoned.
    pub fn schema(&self, table: &str) -> Result<Option<TableSchema>, StoreError> {
        self.cache.get(table)
    }

    /// Cached table names.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] when the cache lock is poisoned.
    pub fn tables(&self) -> Result<Vec<String>, StoreError> {
        self.cache.table_names()
    }

    /// Commits, then reads the rows of every cached table.
    ///
    /// # Errors
    ///
    /// Returns connection or statement errors.
    pub fn dump(
        &self,
        rows_per_table: Option<usize>,
    ) -> Result<BTreeMap<String, QueryResult>, StoreError> {
        self.commit()?;
        let mut dump = BTreeMap::new();
        for table in self.cache.table_names()? {
            let statement = self.dialect.select_rows_statement(&table, rows_per_table)?;
            dump.insert(table, self.query(&statement)?);
        }
        Ok(dump)
    }

    /// Deletes every row of `table` and commits.
    ///
    /// # Errors
    ///
    /// Returns connection or statement errors.
    pub fn clean_table(&self, table: &str) -> Result<usize, StoreError> {
        let statement = self.dialect.delete_rows_statement(table)?;
        let deleted = self.execute(&statement)?;
        self.commit()?;
        self.log.record(
            &StoreLogEvent::new(StoreLogLevel::Info, "table_cleaned", "deleted all rows")
                .with_table(table)
                .with_detail(format!("rows={deleted}")),
        );
        Ok(deleted)
    }

    /// Drops `table` if it exists, evicts it from the cache, and commits.
    ///
    /// # Errors
    ///
    /// Returns connection or statement errors.
    pub fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        let statement = self.dialect.drop_table_statement(table)?;
        self.connection.with_connection(|conn| {
            run(conn.execute(&statement), &statement)?;
            self.cache.remove(table)?;
            Ok(())
        })?;
        self.commit()?;
        self.log.record(
            &StoreLogEvent::new(StoreLogLevel::Info, "table_deleted", "dropped table")
                .with_table(table),
        );
        Ok(())
    }

    /// Runs a caller statement and returns its rows with column names.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when disconnected and
    /// [`StoreError::StatementExecution`] when the query fails.
    pub fn query(&self, statement: &Statement) -> Result<QueryResult, StoreError> {
        self.connection.with_connection(|conn| run(conn.query(statement), statement))
    }

    /// Runs a caller statement and returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when disconnected and
    /// [`StoreError::StatementExecution`] when execution fails.
    pub fn execute(&self, statement: &Statement) -> Result<usize, StoreError> {
        self.connection.with_connection(|conn| run(conn.execute(statement), statement))
    }
}

/// Maps a driver result onto [`StoreError::StatementExecution`].
fn run<T>(
    result: Result<T, DriverError>,
    statement: &Statement,
) -> Result<T, StoreError> {
    result.map_err(|err| StoreError::StatementExecution {
        statement: statement.sql.clone(),
        message: err.to_string(),
    })
}
