// crates/autoschema-store-sqlite/src/driver.rs
// ============================================================================
// Module: SQLite Driver
// Description: rusqlite-backed connector and connection.
// Purpose: Map database names to files and run statements for the core.
// Dependencies: autoschema-core, rusqlite, time
// ============================================================================

//! ## Overview
//! Each database is a file `<data_dir>/<name>.sqlite3`. Connecting with a
//! database opens its file and fails when it is missing; connecting without
//! one opens an in-memory session that can create and then select a file.
//! Writes open a transaction lazily, which stays open until
//! [`DriverConnection::commit`]. Security posture: database names are
//! restricted to a safe character set before they touch the filesystem.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use autoschema_core::DriverConnection;
use autoschema_core::DriverError;
use autoschema_core::QueryResult;
use autoschema_core::SqlValue;
use autoschema_core::Statement;
use autoschema_core::driver::Connector;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use rusqlite::types::ValueRef;
use time::format_description::well_known::Rfc3339;

use crate::config::SqliteConnectorConfig;
use crate::config::validate_data_dir;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File extension of database files.
const DATABASE_FILE_EXTENSION: &str = "sqlite3";
/// Longest accepted database name.
const MAX_DATABASE_NAME_LENGTH: usize = 64;
/// Savepoint wrapping one multi-row insert.
const BATCH_SAVEPOINT: &str = "autoschema_batch";

// ============================================================================
// SECTION: Connector
// ============================================================================

/// Opens [`SqliteConnection`]s under a data directory.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    /// Connector settings.
    config: SqliteConnectorConfig,
}

impl SqliteConnector {
    /// Creates a connector.
    #[must_use]
    pub const fn new(config: SqliteConnectorConfig) -> Self {
        Self {
            config,
        }
    }

    /// Returns the file backing `database`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connect`] for names outside `[A-Za-z0-9_-]` or
    /// longer than 64 characters.
    pub fn database_path(&self, database: &str) -> Result<PathBuf, DriverError> {
        database_path(&self.config, database)
    }
}

impl Connector for SqliteConnector {
    fn connect(&self, database: Option<&str>) -> Result<Box<dyn DriverConnection>, DriverError> {
        let connection = match database {
            Some(database) => open_file(&self.config, database, false)?,
            None => {
                let connection = Connection::open_in_memory()
                    .map_err(|err| DriverError::Connect(err.to_string()))?;
                connection
                    .busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))
                    .map_err(|err| DriverError::Connect(err.to_string()))?;
                connection
            }
        };
        Ok(Box::new(SqliteConnection {
            config: self.config.clone(),
            connection,
        }))
    }
}

// ============================================================================
// SECTION: Connection
// ============================================================================

/// One `SQLite` session.
#[derive(Debug)]
pub struct SqliteConnection {
    /// Connector settings used when switching databases.
    config: SqliteConnectorConfig,
    /// Underlying rusqlite connection.
    connection: Connection,
}

impl SqliteConnection {
    /// Starts a transaction unless one is open.
    fn begin_if_needed(&self) -> Result<(), DriverError> {
        if self.connection.is_autocommit() {
            self.connection
                .execute_batch("BEGIN")
                .map_err(|err| DriverError::Statement(err.to_string()))?;
        }
        Ok(())
    }

    /// Runs every parameter row through one prepared statement.
    fn insert_rows(&self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<usize, DriverError> {
        let mut statement =
            self.connection.prepare(sql).map_err(|err| DriverError::Statement(err.to_string()))?;
        let mut affected = 0;
        for row in rows {
            let values = to_sqlite_values(row)?;
            affected += statement
                .execute(params_from_iter(values.iter()))
                .map_err(|err| DriverError::Statement(err.to_string()))?;
        }
        Ok(affected)
    }
}

impl DriverConnection for SqliteConnection {
    fn execute(&mut self, statement: &Statement) -> Result<usize, DriverError> {
        self.begin_if_needed()?;
        let values = to_sqlite_values(&statement.params)?;
        self.connection
            .execute(&statement.sql, params_from_iter(values.iter()))
            .map_err(|err| DriverError::Statement(err.to_string()))
    }

    fn execute_many(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<usize, DriverError> {
        self.begin_if_needed()?;
        self.connection
            .execute_batch(&format!("SAVEPOINT {BATCH_SAVEPOINT}"))
            .map_err(|err| DriverError::Statement(err.to_string()))?;
        match self.insert_rows(sql, rows) {
            Ok(affected) => {
                self.connection
                    .execute_batch(&format!("RELEASE {BATCH_SAVEPOINT}"))
                    .map_err(|err| DriverError::Statement(err.to_string()))?;
                Ok(affected)
            }
            Err(err) => {
                let rollback = self.connection.execute_batch(&format!(
                    "ROLLBACK TO {BATCH_SAVEPOINT}; RELEASE {BATCH_SAVEPOINT}"
                ));
                match rollback {
                    Ok(()) => Err(err),
                    Err(rollback) => {
                        Err(DriverError::Statement(format!("{err}; rollback failed: {rollback}")))
                    }
                }
            }
        }
    }

    fn query(&mut self, statement: &Statement) -> Result<QueryResult, DriverError> {
        let values = to_sqlite_values(&statement.params)?;
        let mut prepared = self
            .connection
            .prepare(&statement.sql)
            .map_err(|err| DriverError::Statement(err.to_string()))?;
        let columns: Vec<String> =
            prepared.column_names().into_iter().map(str::to_string).collect();
        let column_count = columns.len();
        let mut rows = prepared
            .query(params_from_iter(values.iter()))
            .map_err(|err| DriverError::Statement(err.to_string()))?;
        let mut result = QueryResult {
            columns,
            rows: Vec::new(),
        };
        while let Some(row) = rows.next().map_err(|err| DriverError::Statement(err.to_string()))? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                let value =
                    row.get_ref(index).map_err(|err| DriverError::Statement(err.to_string()))?;
                values.push(from_sqlite_value(value));
            }
            result.rows.push(values);
        }
        Ok(result)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        if self.connection.is_autocommit() {
            return Ok(());
        }
        self.connection.execute_batch("COMMIT").map_err(|err| DriverError::Commit(err.to_string()))
    }

    fn create_database(&mut self, database: &str) -> Result<(), DriverError> {
        let created = open_file(&self.config, database, true)?;
        created.close().map_err(|(_, err)| DriverError::Close(err.to_string()))
    }

    fn select_database(&mut self, database: &str) -> Result<(), DriverError> {
        self.commit()?;
        self.connection = open_file(&self.config, database, false)?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.connection.close().map_err(|(_, err)| DriverError::Close(err.to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves and validates the file for `database`.
fn database_path(config: &SqliteConnectorConfig, database: &str) -> Result<PathBuf, DriverError> {
    if database.is_empty() || database.len() > MAX_DATABASE_NAME_LENGTH {
        return Err(DriverError::Connect(format!("invalid database name length: {database}")));
    }
    if !database.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
        return Err(DriverError::Connect(format!("invalid database name: {database}")));
    }
    validate_data_dir(&config.data_dir).map_err(DriverError::Connect)?;
    Ok(config.data_dir.join(format!("{database}.{DATABASE_FILE_EXTENSION}")))
}

/// Opens the file for `database`, creating it (and the data directory) when asked.
fn open_file(
    config: &SqliteConnectorConfig,
    database: &str,
    create: bool,
) -> Result<Connection, DriverError> {
    let path = database_path(config, database)?;
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    if create {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|err| DriverError::Connect(err.to_string()))?;
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }
    let connection = Connection::open_with_flags(&path, flags)
        .map_err(|err| DriverError::Connect(format!("{}: {err}", path.display())))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies journal, sync, and busy-timeout settings.
fn apply_pragmas(connection: &Connection, config: &SqliteConnectorConfig) -> Result<(), DriverError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| DriverError::Connect(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| DriverError::Connect(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| DriverError::Connect(err.to_string()))?;
    Ok(())
}

/// Converts bound parameters into rusqlite values.
fn to_sqlite_values(values: &[SqlValue]) -> Result<Vec<Value>, DriverError> {
    values.iter().map(to_sqlite_value).collect()
}

/// Converts one bound parameter; booleans become 0/1 and timestamps RFC 3339 text.
fn to_sqlite_value(value: &SqlValue) -> Result<Value, DriverError> {
    Ok(match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(integer) => Value::Integer(*integer),
        SqlValue::Real(real) => Value::Real(*real),
        SqlValue::Boolean(flag) => Value::Integer(i64::from(*flag)),
        SqlValue::Text(text) => Value::Text(text.clone()),
        SqlValue::DateTime(timestamp) => Value::Text(
            timestamp.format(&Rfc3339).map_err(|err| DriverError::Statement(err.to_string()))?,
        ),
        SqlValue::Blob(bytes) => Value::Blob(bytes.clone()),
    })
}

/// Converts a result cell.
fn from_sqlite_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(integer) => SqlValue::Integer(integer),
        ValueRef::Real(real) => SqlValue::Real(real),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
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

    use autoschema_core::DriverError;
    use autoschema_core::SqlValue;
    use autoschema_core::Statement;
    use autoschema_core::driver::Connector;
    use tempfile::TempDir;

    use super::SqliteConnector;
    use crate::config::SqliteConnectorConfig;

    fn connector(temp: &TempDir) -> SqliteConnector {
        SqliteConnector::new(SqliteConnectorConfig::new(temp.path().join("data")))
    }

    #[test]
    fn selecting_a_missing_database_fails() {
        let temp = TempDir::new().unwrap();
        let result = connector(&temp).connect(Some("signals"));
        assert!(matches!(result, Err(DriverError::Connect(_))));
    }

    #[test]
    fn create_then_select_opens_the_file() {
        let temp = TempDir::new().unwrap();
        let connector = connector(&temp);
        let mut connection = connector.connect(None).unwrap();
        connection.create_database("signals").unwrap();
        connection.select_database("signals").unwrap();
        assert!(connector.database_path("signals").unwrap().exists());
        assert!(connector.connect(Some("signals")).is_ok());
    }

    #[test]
    fn unsafe_database_names_are_rejected() {
        let temp = TempDir::new().unwrap();
        let connector = connector(&temp);
        assert!(connector.database_path("../escape").is_err());
        assert!(connector.database_path("").is_err());
        assert!(connector.database_path(&"a".repeat(65)).is_err());
    }

    #[test]
    fn writes_are_visible_to_other_connections_only_after_commit() {
        let temp = TempDir::new().unwrap();
        let connector = connector(&temp);
        let mut writer = connector.connect(None).unwrap();
        writer.create_database("signals").unwrap();
        writer.select_database("signals").unwrap();
        writer.execute(&Statement::new("CREATE TABLE t (v INTEGER)")).unwrap();
        writer
            .execute_many("INSERT INTO t (v) VALUES (?)", &[
                vec![SqlValue::Integer(1)],
                vec![SqlValue::Boolean(true)],
            ])
            .unwrap();
        writer.commit().unwrap();

        let mut reader = connector.connect(Some("signals")).unwrap();
        let result = reader.query(&Statement::new("SELECT v FROM t ORDER BY rowid")).unwrap();
        assert_eq!(result.columns, vec!["v"]);
        assert_eq!(result.rows, vec![vec![SqlValue::Integer(1)], vec![SqlValue::Integer(1)]]);
    }

    #[test]
    fn failed_batch_inserts_nothing() {
        let temp = TempDir::new().unwrap();
        let connector = connector(&temp);
        let mut connection = connector.connect(None).unwrap();
        connection.create_database("signals").unwrap();
        connection.select_database("signals").unwrap();
        connection.execute(&Statement::new("CREATE TABLE t (v INTEGER NOT NULL)")).unwrap();
        let result = connection.execute_many("INSERT INTO t (v) VALUES (?)", &[
            vec![SqlValue::Integer(1)],
            vec![SqlValue::Null],
        ]);
        assert!(matches!(result, Err(DriverError::Statement(_))));
        let count = connection.query(&Statement::new("SELECT COUNT(*) FROM t")).unwrap();
        assert_eq!(count.rows, vec![vec![SqlValue::Integer(0)]]);
    }

    #[test]
    fn failed_rollback_is_reported_with_the_batch_error() {
        let temp = TempDir::new().unwrap();
        let connector = connector(&temp);
        let mut connection = connector.connect(None).unwrap();
        connection.create_database("signals").unwrap();
        connection.select_database("signals").unwrap();
        let result = connection.execute_many("RELEASE autoschema_batch", &[vec![], vec![]]);
        match result {
            Err(DriverError::Statement(message)) => {
                assert!(message.contains("no such savepoint"), "{message}");
                assert!(message.contains("rollback failed"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
