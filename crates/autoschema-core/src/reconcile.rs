// crates/autoschema-core/src/reconcile.rs
// ============================================================================
// Module: Schema Reconciler
// Description: Creates and widens tables so they can hold a batch of items.
// Purpose: Keep the database schema a superset of what incoming items need.
// Dependencies: crate::{connection, dialect, item, naming, schema}
// ============================================================================

//! ## Overview
//! Reconciliation walks a batch item by item. Each item whose table or
//! columns are not in the cache gets one critical section under the
//! connection lock: confirm or create the table, diff the item against the
//! cache, add the missing columns, and re-read the live column list. Because
//! the diff is taken inside the lock, a writer always sees the columns added
//! by the previous lock holder before deciding what it still needs.
//!
//! A failed CREATE or ALTER means the cache disagrees with the database,
//! usually because another process changed the table. The reconciler then
//! re-reads that table and retries the rest of the batch once in recovery
//! mode. A second failure is returned to the caller.
//!
//! Security posture: every identifier reaching SQL text is quoted by the
//! dialect, which rejects names it cannot represent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::connection::ConnectionManager;
use crate::dialect::Dialect;
use crate::driver::DriverConnection;
use crate::error::StoreError;
use crate::item::FieldMap;
use crate::item::Item;
use crate::item::flatten_item;
use crate::log::StoreLogEvent;
use crate::log::StoreLogLevel;
use crate::log::StoreLogSink;
use crate::naming::TableNamer;
use crate::schema::SchemaCache;
use crate::schema::TableSchema;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Schema changes and skipped items from one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Tables created, in creation order.
    pub tables_created: Vec<String>,
    /// `(table, column)` pairs added, in order.
    pub columns_added: Vec<(String, String)>,
    /// Items skipped because they exposed no fields.
    pub items_skipped: usize,
    /// True when the out-of-sync recovery path ran.
    pub recovered: bool,
}

/// An item flattened and routed to its table.
#[derive(Debug, Clone)]
pub(crate) struct PreparedItem {
    /// Destination table.
    pub(crate) table: String,
    /// Flattened fields.
    pub(crate) fields: FieldMap,
}

/// Which schema mutation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    /// CREATE TABLE.
    Create,
    /// ALTER TABLE ADD COLUMN.
    Alter,
}

/// A schema mutation the database rejected.
#[derive(Debug, Clone)]
struct MutationFailure {
    /// Failed mutation kind.
    mutation: Mutation,
    /// Target table.
    table: String,
    /// Columns being created or added.
    fields: Vec<String>,
    /// Driver message.
    message: String,
}

impl MutationFailure {
    /// Converts the failure into the error surfaced to callers.
    fn into_error(self) -> StoreError {
        match self.mutation {
            Mutation::Create => StoreError::SchemaCreate {
                table: self.table,
                message: self.message,
            },
            Mutation::Alter => StoreError::SchemaAlter {
                table: self.table,
                fields: self.fields,
                message: self.message,
            },
        }
    }
}

/// Result of reconciling one item inside the connection lock.
enum ItemOutcome {
    /// Table and columns are in place.
    Applied {
        /// Whether the table was created.
        created: bool,
        /// Columns added.
        added: Vec<String>,
    },
    /// The database rejected a mutation.
    Rejected(MutationFailure),
}

/// Failure position within the pending slice.
struct BatchFailure {
    /// Offset of the failing item in the slice passed to the pass.
    offset: usize,
    /// What failed.
    failure: MutationFailure,
}

// ============================================================================
// SECTION: Reconciler
// ============================================================================

/// Migrates tables forward to fit incoming items.
pub struct SchemaReconciler {
    /// Shared connection.
    connection: Arc<ConnectionManager>,
    /// Shared schema cache.
    cache: Arc<SchemaCache>,
    /// SQL text generator.
    dialect: Arc<dyn Dialect>,
    /// Item to table mapping.
    namer: TableNamer,
    /// Diagnostics sink.
    log: Arc<dyn StoreLogSink>,
}

impl fmt::Debug for SchemaReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaReconciler")
            .field("dialect", &self.dialect.name())
            .field("namer", &self.namer)
            .finish_non_exhaustive()
    }
}

impl SchemaReconciler {
    /// Creates a reconciler over shared state.
    #[must_use]
    pub fn new(
        connection: Arc<ConnectionManager>,
        cache: Arc<SchemaCache>,
        dialect: Arc<dyn Dialect>,
        namer: TableNamer,
        log: Arc<dyn StoreLogSink>,
    ) -> Self {
        Self {
            connection,
            cache,
            dialect,
            namer,
            log,
        }
    }

    /// Returns the table an item is written to.
    #[must_use]
    pub fn table_name(&self, item: &dyn Item) -> String {
        self.namer.table_name(item)
    }

    /// Ensures every table the batch needs exists with every needed column.
    ///
    /// Items without fields are skipped and counted in the report.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaCreate`] or [`StoreError::SchemaAlter`] when
    /// a mutation fails again after recovery, and connection or statement
    /// errors from catalog lookups.
    pub fn reconcile<I: Item>(&self, items: &[I]) -> Result<ReconcileReport, StoreError> {
        let mut report = ReconcileReport::default();
        let prepared = self.prepare(items, &mut report);
        self.reconcile_prepared(&prepared, &mut report)?;
        Ok(report)
    }

    /// Flattens and routes items, skipping those that fail introspection.
    pub(crate) fn prepare<I: Item>(
        &self,
        items: &[I],
        report: &mut ReconcileReport,
    ) -> Vec<PreparedItem> {
        let mut prepared = Vec::with_capacity(items.len());
        for item in items {
            match flatten_item(item) {
                Ok(fields) => prepared.push(PreparedItem {
                    table: self.namer.table_name(item),
                    fields,
                }),
                Err(err) => {
                    report.items_skipped += 1;
                    self.log.record(
                        &StoreLogEvent::new(
                            StoreLogLevel::Warning,
                            "item_skipped",
                            format!("skipping item of type {}", item.type_name()),
                        )
                        .with_detail(err.to_string()),
                    );
                }
            }
        }
        prepared
    }

    /// Runs the bounded recovery loop over prepared items.
    pub(crate) fn reconcile_prepared(
        &self,
        prepared: &[PreparedItem],
        report: &mut ReconcileReport,
    ) -> Result<(), StoreError> {
        let mut start = 0;
        let mut recovery = false;
        loop {
            let pending = prepared.get(start..).unwrap_or_default();
            let Err(BatchFailure {
                offset,
                failure,
            }) = self.reconcile_pass(pending, report)?
            else {
                if recovery {
                    report.recovered = true;
                    self.log.record(&StoreLogEvent::new(
                        StoreLogLevel::Info,
                        "schema_recovered",
                        "schema reconciled after refreshing the cache",
                    ));
                }
                return Ok(());
            };
            if recovery {
                self.log.record(
                    &StoreLogEvent::new(
                        StoreLogLevel::Error,
                        "schema_mutation_failed",
                        format!(
                            "schema change for fields {} failed after recovery",
                            failure.fields.join(", ")
                        ),
                    )
                    .with_table(failure.table.clone())
                    .with_detail(failure.message.clone()),
                );
                return Err(failure.into_error());
            }
            self.log.record(
                &StoreLogEvent::new(
                    StoreLogLevel::Warning,
                    "table_out_of_sync",
                    format!(
                        "schema change for fields {} failed, refreshing table",
                        failure.fields.join(", ")
                    ),
                )
                .with_table(failure.table.clone())
                .with_detail(failure.message.clone()),
            );
            self.refresh_table(&failure.table)?;
            start += offset;
            recovery = true;
        }
    }

    /// One pass over `pending`; stops at the first rejected mutation.
    fn reconcile_pass(
        &self,
        pending: &[PreparedItem],
        report: &mut ReconcileReport,
    ) -> Result<Result<(), BatchFailure>, StoreError> {
        for (offset, item) in pending.iter().enumerate() {
            if self.is_satisfied(item)? {
                continue;
            }
            let outcome =
                self.connection.with_connection(|conn| self.apply_item(conn, item))?;
            match outcome {
                ItemOutcome::Applied {
                    created,
                    added,
                } => {
                    if created {
                        report.tables_created.push(item.table.clone());
                    }
                    report
                        .columns_added
                        .extend(added.into_iter().map(|column| (item.table.clone(), column)));
                }
                ItemOutcome::Rejected(failure) => {
                    return Ok(Err(BatchFailure {
                        offset,
                        failure,
                    }));
                }
            }
        }
        Ok(Ok(()))
    }

    /// True when the cache already covers the item.
    fn is_satisfied(&self, item: &PreparedItem) -> Result<bool, StoreError> {
        Ok(self
            .cache
            .missing_fields(&item.table, &item.fields)?
            .is_some_and(|missing| missing.is_empty()))
    }

    /// Creates the table if needed, then adds missing columns; lock held.
    fn apply_item(
        &self,
        conn: &mut dyn DriverConnection,
        item: &PreparedItem,
    ) -> Result<ItemOutcome, StoreError> {
        let created = match self.ensure_table(conn, item)? {
            Ok(created) => created,
            Err(failure) => return Ok(ItemOutcome::Rejected(failure)),
        };
        let missing = self.cache.missing_fields(&item.table, &item.fields)?.unwrap_or_default();
        if missing.is_empty() {
            return Ok(ItemOutcome::Applied {
                created,
                added: Vec::new(),
            });
        }
        let names: Vec<String> = missing.iter().map(|(name, _)| name.clone()).collect();
        for (name, primitive) in &missing {
            let statement = self.dialect.add_column_statement(&item.table, name, *primitive)?;
            if let Err(err) = conn.execute(&statement) {
                return Ok(ItemOutcome::Rejected(MutationFailure {
                    mutation: Mutation::Alter,
                    table: item.table.clone(),
                    fields: names,
                    message: err.to_string(),
                }));
            }
        }
        self.log.record(
            &StoreLogEvent::new(
                StoreLogLevel::Info,
                "columns_added",
                format!("added columns {}", names.join(", ")),
            )
            .with_table(item.table.clone()),
        );
        self.refresh_locked(conn, &item.table)?;
        Ok(ItemOutcome::Applied {
            created,
            added: names,
        })
    }

    /// Makes sure the item's table exists and is cached; lock held.
    ///
    /// The inner result is `Ok(true)` when this call created the table.
    fn ensure_table(
        &self,
        conn: &mut dyn DriverConnection,
        item: &PreparedItem,
    ) -> Result<Result<bool, MutationFailure>, StoreError> {
        if self.cache.contains(&item.table)? {
            return Ok(Ok(false));
        }
        let exists = {
            let statement =
                self.dialect.table_exists_statement(self.connection.database(), &item.table);
            let raw = conn.query(&statement).map_err(|err| StoreError::StatementExecution {
                statement: statement.sql.clone(),
                message: err.to_string(),
            })?;
            self.dialect.parse_count(&raw) > 0
        };
        let mut created = false;
        if !exists {
            let columns = TableSchema::from_columns(Vec::new(), self.dialect.as_ref())?
                .missing_fields(&item.fields);
            let statement =
                self.dialect.create_table_statement(&item.table, &columns).map_err(|err| {
                    StoreError::SchemaCreate {
                        table: item.table.clone(),
                        message: err.to_string(),
                    }
                })?;
            if let Err(err) = conn.execute(&statement) {
                return Ok(Err(MutationFailure {
                    mutation: Mutation::Create,
                    table: item.table.clone(),
                    fields: columns.into_iter().map(|(name, _)| name).collect(),
                    message: err.to_string(),
                }));
            }
            created = true;
            self.log.record(
                &StoreLogEvent::new(StoreLogLevel::Info, "table_created", "created table")
                    .with_table(item.table.clone())
                    .with_detail(statement.sql),
            );
        }
        self.refresh_locked(conn, &item.table)?;
        Ok(Ok(created))
    }

    /// Re-reads one table's columns into the cache.
    ///
    /// # Errors
    ///
    /// Returns connection, statement, or identifier errors from the lookup.
    pub fn refresh_table(&self, table: &str) -> Result<(), StoreError> {
        self.connection.with_connection(|conn| self.refresh_locked(conn, table))
    }

    /// Loads every existing table into the cache.
    ///
    /// # Errors
    ///
    /// Returns connection, statement, or identifier errors from the lookups.
    pub fn load_existing_tables(&self) -> Result<Vec<String>, StoreError> {
        self.connection.with_connection(|conn| {
            let statement = self.dialect.list_tables_statement(self.connection.database());
            let raw = conn.query(&statement).map_err(|err| StoreError::StatementExecution {
                statement: statement.sql.clone(),
                message: err.to_string(),
            })?;
            let tables = self.dialect.parse_table_names(&raw);
            for table in &tables {
                self.refresh_locked(conn, table)?;
            }
            Ok(tables)
        })
    }

    /// Replaces the cache entry for `table` from the live catalog; lock held.
    ///
    /// A table with no columns no longer exists and is evicted.
    fn refresh_locked(&self, conn: &mut dyn DriverConnection, table: &str) -> Result<(), StoreError> {
        let statement = self.dialect.columns_statement(self.connection.database(), table)?;
        let raw = conn.query(&statement).map_err(|err| StoreError::StatementExecution {
            statement: statement.sql.clone(),
            message: err.to_string(),
        })?;
        let columns = self.dialect.parse_column_names(&raw);
        if columns.is_empty() {
            self.cache.remove(table)?;
            return Ok(());
        }
        let schema = TableSchema::from_columns(columns, self.dialect.as_ref())?;
        self.cache.refresh(table, schema)
    }
}
