// crates/autoschema-store-sqlite/tests/drift_recovery.rs
// ============================================================================
// Module: Schema Drift Recovery Tests
// Description: Cache staleness, external schema changes, and failed ALTERs.
// Purpose: Verify the bounded refresh-and-retry path and its failure mode.
// Dependencies: autoschema-core, autoschema-store-sqlite, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! A counting connector wraps the real `SQLite` connector so tests can see
//! how many `ALTER TABLE` statements were issued and inject failures into
//! them. External drift is produced by the `sqlite_schema_mutator` binary or
//! a second rusqlite connection while the store holds a stale cache.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use autoschema_core::Connector;
use autoschema_core::DriverConnection;
use autoschema_core::DriverError;
use autoschema_core::DynamicStore;
use autoschema_core::QueryResult;
use autoschema_core::Record;
use autoschema_core::SqlValue;
use autoschema_core::Statement;
use autoschema_core::StoreError;
use autoschema_core::StoreLogEvent;
use autoschema_core::StoreLogSink;
use autoschema_store_sqlite::SqliteConnectorConfig;
use autoschema_store_sqlite::SqliteConnector;
use autoschema_store_sqlite::SqliteDialect;
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// SECTION: Counting Connector
// ============================================================================

#[derive(Default)]
struct AlterCounters {
    issued: AtomicUsize,
    failures_left: AtomicUsize,
}

struct CountingConnector {
    inner: SqliteConnector,
    counters: Arc<AlterCounters>,
}

impl Connector for CountingConnector {
    fn connect(&self, database: Option<&str>) -> Result<Box<dyn DriverConnection>, DriverError> {
        let inner = self.inner.connect(database)?;
        Ok(Box::new(CountingConnection {
            inner,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct CountingConnection {
    inner: Box<dyn DriverConnection>,
    counters: Arc<AlterCounters>,
}

impl DriverConnection for CountingConnection {
    fn execute(&mut self, statement: &Statement) -> Result<usize, DriverError> {
        if statement.sql.starts_with("ALTER TABLE") {
            self.counters.issued.fetch_add(1, Ordering::SeqCst);
            let injected = self
                .counters
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if injected {
                return Err(DriverError::Statement("injected alter failure".to_string()));
            }
        }
        self.inner.execute(statement)
    }

    fn execute_many(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<usize, DriverError> {
        self.inner.execute_many(sql, rows)
    }

    fn query(&mut self, statement: &Statement) -> Result<QueryResult, DriverError> {
        self.inner.query(statement)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.inner.commit()
    }

    fn create_database(&mut self, database: &str) -> Result<(), DriverError> {
        self.inner.create_database(database)
    }

    fn select_database(&mut self, database: &str) -> Result<(), DriverError> {
        self.inner.select_database(database)
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.inner.close()
    }
}

// ============================================================================
// SECTION: Capturing Sink
// ============================================================================

#[derive(Default)]
struct CapturingSink {
    events: Mutex<Vec<&'static str>>,
}

impl CapturingSink {
    fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl StoreLogSink for CapturingSink {
    fn record(&self, event: &StoreLogEvent) {
        self.events.lock().unwrap().push(event.event);
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

struct Harness {
    temp: TempDir,
    store: DynamicStore,
    counters: Arc<AlterCounters>,
    log: Arc<CapturingSink>,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let counters = Arc::new(AlterCounters::default());
        let log = Arc::new(CapturingSink::default());
        let connector = CountingConnector {
            inner: SqliteConnector::new(SqliteConnectorConfig::new(temp.path())),
            counters: Arc::clone(&counters),
        };
        let store = DynamicStore::builder(Arc::new(connector), Arc::new(SqliteDialect))
            .log_sink(Arc::clone(&log) as Arc<dyn StoreLogSink>)
            .build();
        store.open().unwrap();
        Self {
            temp,
            store,
            counters,
            log,
        }
    }

    fn database_file(&self) -> PathBuf {
        self.temp.path().join("signals.sqlite3")
    }

    fn alters_issued(&self) -> usize {
        self.counters.issued.load(Ordering::SeqCst)
    }

    fn fail_next_alters(&self, count: usize) {
        self.counters.failures_left.store(count, Ordering::SeqCst);
    }

    fn columns(&self, table: &str) -> Vec<String> {
        let conn = Connection::open(self.database_file()).unwrap();
        let mut statement =
            conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid").unwrap();
        let names: Vec<String> = statement
            .query_map([table], |row| row.get::<_, String>(0))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        names
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn repeated_reconcile_issues_no_alters() {
    let harness = Harness::new();
    let batch = [
        Record::new("Type1").with("a", 1),
        Record::new("Type1").with("a", 2).with("b", "x"),
    ];
    harness.store.reconcile(&batch).unwrap();
    assert_eq!(harness.alters_issued(), 1);
    for _ in 0..3 {
        let report = harness.store.reconcile(&batch).unwrap();
        assert!(report.columns_added.is_empty());
    }
    harness.store.write(&batch).unwrap();
    assert_eq!(harness.alters_issued(), 1);
}

#[test]
fn external_column_from_mutator_binary_is_recovered() {
    let harness = Harness::new();
    harness.store.write(&[Record::new("Type1").with("field1", 1)]).unwrap();
    harness.store.commit().unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_sqlite_schema_mutator"))
        .arg(harness.database_file())
        .args(["Type1", "field2", "text"])
        .status()
        .unwrap();
    assert!(status.success());

    let report = harness
        .store
        .write_report(&[Record::new("Type1").with("field1", 2).with("field2", "late")])
        .unwrap();
    assert!(report.schema.recovered);
    assert!(report.schema.columns_added.is_empty());
    assert_eq!(report.staged, 1);
    assert_eq!(harness.log.events().iter().filter(|e| **e == "table_out_of_sync").count(), 1);
    assert!(harness.log.events().contains(&"schema_recovered"));

    harness.store.commit().unwrap();
    assert_eq!(harness.columns("Type1"), vec!["field1", "field2"]);
    let conn = Connection::open(harness.database_file()).unwrap();
    let late: String =
        conn.query_row("SELECT field2 FROM \"Type1\" WHERE field1 = 2", [], |row| row.get(0)).unwrap();
    assert_eq!(late, "late");
}

#[test]
fn externally_dropped_table_is_recreated() {
    let harness = Harness::new();
    harness.store.write(&[Record::new("Type1").with("a", 1)]).unwrap();
    harness.store.write(&[Record::new("Type2").with("b", 1)]).unwrap();
    harness.store.commit().unwrap();

    let conn = Connection::open(harness.database_file()).unwrap();
    conn.execute_batch("DROP TABLE \"Type1\"").unwrap();
    drop(conn);

    let report = harness
        .store
        .write_report(&[
            Record::new("Type2").with("b", 2),
            Record::new("Type1").with("a", 2).with("c", 3),
        ])
        .unwrap();
    assert!(report.schema.recovered);
    assert_eq!(report.schema.tables_created, vec!["Type1"]);
    assert_eq!(report.staged, 2);
    harness.store.commit().unwrap();
    assert_eq!(harness.columns("Type1"), vec!["a", "c"]);
}

#[test]
fn single_failed_alter_is_retried() {
    let harness = Harness::new();
    harness.store.write(&[Record::new("Type1").with("a", 1)]).unwrap();
    harness.fail_next_alters(1);
    let report = harness
        .store
        .write_report(&[Record::new("Type1").with("a", 2).with("b", true)])
        .unwrap();
    assert!(report.schema.recovered);
    assert_eq!(report.schema.columns_added, vec![("Type1".to_string(), "b".to_string())]);
    assert_eq!(harness.alters_issued(), 2);
}

#[test]
fn failure_after_recovery_is_fatal() {
    let harness = Harness::new();
    harness.store.write(&[Record::new("Type1").with("a", 1)]).unwrap();
    harness.fail_next_alters(2);
    let result = harness.store.write(&[Record::new("Type1").with("a", 2).with("b", 1.5)]);
    match result {
        Err(StoreError::SchemaAlter {
            table,
            fields,
            message,
        }) => {
            assert_eq!(table, "Type1");
            assert_eq!(fields, vec!["b".to_string()]);
            assert!(message.contains("injected"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(harness.alters_issued(), 2);
    assert!(harness.log.events().contains(&"schema_mutation_failed"));

    harness.store.commit().unwrap();
    assert_eq!(harness.columns("Type1"), vec!["a"]);
    let report = harness.store.write_report(&[Record::new("Type1").with("a", 3).with("b", 1.5)]);
    assert_eq!(report.unwrap().schema.columns_added.len(), 1);
}

#[test]
fn recovery_resumes_from_the_failing_item() {
    let harness = Harness::new();
    harness.store.write(&[Record::new("Type1").with("a", 1)]).unwrap();
    harness.fail_next_alters(1);
    let report = harness
        .store
        .write_report(&[
            Record::new("Type1").with("a", 2).with("b", 1),
            Record::new("Type1").with("a", 3).with("c", 1),
        ])
        .unwrap();
    assert!(report.schema.recovered);
    assert_eq!(report.schema.columns_added, vec![
        ("Type1".to_string(), "b".to_string()),
        ("Type1".to_string(), "c".to_string()),
    ]);
    assert_eq!(harness.alters_issued(), 3);
}
