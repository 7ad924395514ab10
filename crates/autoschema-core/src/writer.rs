// crates/autoschema-core/src/writer.rs
// ============================================================================
// Module: Batch Writer
// Description: Grouped parameterized inserts over reconciled tables.
// Purpose: Stage item rows per table and drive the commit policy.
// Dependencies: crate::{connection, dialect, reconcile, schema, value}
// ============================================================================

//! ## Overview
//! A write reconciles the whole batch before the first insert, then issues
//! one prepared multi-row insert per destination table. Values are coerced
//! to each column's locked-in type; a value that cannot be coerced is stored
//! as NULL and reported, while the rest of its row is still inserted.
//! Insert failures are logged with the statement and values, then returned.
//! Rows count toward the commit threshold table by table, as soon as their
//! insert succeeds, so a later failure never hides rows already written.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::CommitPolicy;
use crate::connection::ConnectionManager;
use crate::dialect::Dialect;
use crate::error::CoercionError;
use crate::error::StoreError;
use crate::item::FieldMap;
use crate::item::Item;
use crate::log::StoreLogEvent;
use crate::log::StoreLogLevel;
use crate::log::StoreLogSink;
use crate::reconcile::ReconcileReport;
use crate::reconcile::SchemaReconciler;
use crate::schema::SchemaCache;
use crate::schema::TableSchema;
use crate::value::SqlValue;
use crate::value::coerce;
use crate::value::infer_type;

// ============================================================================
// SECTION: Reports
// ============================================================================

/// A field value dropped from its row.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionFailure {
    /// Destination table.
    pub table: String,
    /// Why the value was dropped.
    pub error: CoercionError,
}

/// Outcome of one write call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteReport {
    /// Rows staged for insertion.
    pub staged: usize,
    /// Items skipped because they exposed no fields.
    pub skipped: usize,
    /// Values stored as NULL because they did not fit their column.
    pub coercion_failures: Vec<CoercionFailure>,
    /// Whether this write triggered a commit.
    pub committed: bool,
    /// Schema changes made before inserting.
    pub schema: ReconcileReport,
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Groups items by table and inserts them.
pub struct BatchWriter {
    /// Shared connection.
    connection: Arc<ConnectionManager>,
    /// Shared schema cache.
    cache: Arc<SchemaCache>,
    /// SQL text generator.
    dialect: Arc<dyn Dialect>,
    /// Runs before every insert.
    reconciler: Arc<SchemaReconciler>,
    /// Commit policy.
    policy: CommitPolicy,
    /// Row threshold for [`CommitPolicy::Interval`].
    commit_interval: u64,
    /// Diagnostics sink.
    log: Arc<dyn StoreLogSink>,
}

impl fmt::Debug for BatchWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchWriter")
            .field("policy", &self.policy)
            .field("commit_interval", &self.commit_interval)
            .finish_non_exhaustive()
    }
}

impl BatchWriter {
    /// Creates a writer over shared state.
    #[must_use]
    pub fn new(
        connection: Arc<ConnectionManager>,
        cache: Arc<SchemaCache>,
        dialect: Arc<dyn Dialect>,
        reconciler: Arc<SchemaReconciler>,
        policy: CommitPolicy,
        commit_interval: u64,
        log: Arc<dyn StoreLogSink>,
    ) -> Self {
        Self {
            connection,
            cache,
            dialect,
            reconciler,
            policy,
            commit_interval,
            log,
        }
    }

    /// Writes a batch and returns the number of staged rows.
    ///
    /// # Errors
    ///
    /// See [`BatchWriter::write_report`].
    pub fn write<I: Item>(&self, items: &[I]) -> Result<usize, StoreError> {
        self.write_report(items).map(|report| report.staged)
    }

    /// Writes a batch and reports staged rows, skips, and dropped values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when disconnected or an automatic
    /// commit fails, schema errors from reconciliation, and
    /// [`StoreError::StatementExecution`] when an insert fails.
    pub fn write_report<I: Item>(&self, items: &[I]) -> Result<WriteReport, StoreError> {
        if !self.connection.connected() {
            return Err(StoreError::Connection("not connected".to_string()));
        }
        let mut report = WriteReport::default();
        let prepared = self.reconciler.prepare(items, &mut report.schema);
        report.skipped = report.schema.items_skipped;
        self.reconciler.reconcile_prepared(&prepared, &mut report.schema)?;

        let mut tables: BTreeMap<&str, Vec<&FieldMap>> = BTreeMap::new();
        for item in &prepared {
            tables.entry(item.table.as_str()).or_default().push(&item.fields);
        }
        for (table, rows) in tables {
            let schema = self.cache.observe(table, &rows)?.ok_or_else(|| {
                StoreError::Cache(format!("table {table} missing from cache after reconciliation"))
            })?;
            let sql = self.dialect.insert_statement(table, &schema)?;
            let params: Vec<Vec<SqlValue>> = rows
                .iter()
                .map(|row| self.row_values(table, &schema, row, &mut report.coercion_failures))
                .collect();
            self.connection.with_connection(|conn| {
                conn.execute_many(&sql, &params).map_err(|err| {
                    self.insert_failed(table, &sql, &params, &err.to_string());
                    StoreError::StatementExecution {
                        statement: sql.clone(),
                        message: err.to_string(),
                    }
                })
            })?;
            self.connection.count_rows(u64::try_from(rows.len()).unwrap_or(u64::MAX))?;
            report.staged += rows.len();
        }

        report.committed = self.connection.apply_commit_policy(self.policy, self.commit_interval)?;
        Ok(report)
    }

    /// Builds one parameter row in schema column order.
    fn row_values(
        &self,
        table: &str,
        schema: &TableSchema,
        row: &FieldMap,
        failures: &mut Vec<CoercionFailure>,
    ) -> Vec<SqlValue> {
        schema
            .fields()
            .iter()
            .map(|field| {
                let Some(value) = row.get_ignore_case(&field.name) else {
                    return SqlValue::Null;
                };
                let target = field.inferred_type.unwrap_or_else(|| infer_type(value));
                coerce(value, target).unwrap_or_else(|err| {
                    let error = err.for_field(field.name.clone());
                    self.log.record(
                        &StoreLogEvent::new(
                            StoreLogLevel::Warning,
                            "coercion_failed",
                            format!("dropping value of field {}", field.name),
                        )
                        .with_table(table)
                        .with_detail(error.to_string()),
                    );
                    failures.push(CoercionFailure {
                        table: table.to_string(),
                        error,
                    });
                    SqlValue::Null
                })
            })
            .collect()
    }

    /// Logs a failed insert with its statement and values.
    fn insert_failed(&self, table: &str, sql: &str, params: &[Vec<SqlValue>], message: &str) {
        let values = params
            .iter()
            .map(|row| {
                let rendered: Vec<String> = row.iter().map(ToString::to_string).collect();
                format!("({})", rendered.join(", "))
            })
            .collect::<Vec<_>>()
            .join(", ");
        self.log.record(
            &StoreLogEvent::new(StoreLogLevel::Error, "insert_failed", message)
                .with_table(table)
                .with_detail(format!("statement: {sql}; values: {values}")),
        );
    }
}
