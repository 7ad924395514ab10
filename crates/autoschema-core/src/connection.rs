// crates/autoschema-core/src/connection.rs
// ============================================================================
// Module: Connection Manager
// Description: Single shared driver connection with commit bookkeeping.
// Purpose: Serialize every database call and own transaction boundaries.
// Dependencies: crate::{config, driver, error, log}
// ============================================================================

//! ## Overview
//! [`ConnectionManager`] holds the only connection behind one mutex. Every
//! statement, commit, and catalog lookup runs inside
//! [`ConnectionManager::with_connection`], which releases the lock on all exit
//! paths because the guard is scoped to the call. The same lock protects the
//! uncommitted row counter, so a commit and its counter reset are atomic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::config::CommitPolicy;
use crate::driver::Connector;
use crate::driver::DriverConnection;
use crate::error::DriverError;
use crate::error::StoreError;
use crate::log::StoreLogEvent;
use crate::log::StoreLogLevel;
use crate::log::StoreLogSink;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Connection state guarded by the connection lock.
struct ConnectionState {
    /// Open connection, if any.
    connection: Option<Box<dyn DriverConnection>>,
    /// Rows written since the last commit.
    uncommitted: u64,
}

/// Owns the database connection and commit boundaries.
pub struct ConnectionManager {
    /// Database selected on open.
    database: String,
    /// Connection factory.
    connector: Arc<dyn Connector>,
    /// Connection lock.
    state: Mutex<ConnectionState>,
    /// Diagnostics sink.
    log: Arc<dyn StoreLogSink>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager").field("database", &self.database).finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a disconnected manager.
    #[must_use]
    pub fn new(
        database: impl Into<String>,
        connector: Arc<dyn Connector>,
        log: Arc<dyn StoreLogSink>,
    ) -> Self {
        Self {
            database: database.into(),
            connector,
            state: Mutex::new(ConnectionState {
                connection: None,
                uncommitted: 0,
            }),
            log,
        }
    }

    /// Returns the configured database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Acquires the connection lock.
    fn lock(&self) -> Result<MutexGuard<'_, ConnectionState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Connection("connection mutex poisoned".to_string()))
    }

    /// Opens the connection, creating the database when it cannot be selected.
    ///
    /// Opening an already open manager is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when neither path yields a connection.
    pub fn open(&self) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.connection.is_some() {
            return Ok(());
        }
        let connection = match self.connector.connect(Some(&self.database)) {
            Ok(connection) => connection,
            Err(err) => {
                self.log.record(
                    &StoreLogEvent::new(
                        StoreLogLevel::Warning,
                        "database_select_failed",
                        format!("cannot select database {}, creating it", self.database),
                    )
                    .with_detail(err.to_string()),
                );
                self.create_and_select().map_err(|err| self.connection_failed("open", &err))?
            }
        };
        state.connection = Some(connection);
        state.uncommitted = 0;
        self.log.record(&StoreLogEvent::new(
            StoreLogLevel::Info,
            "connection_opened",
            format!("connected to database {}", self.database),
        ));
        Ok(())
    }

    /// Connects without a database, creates it, then selects it.
    fn create_and_select(&self) -> Result<Box<dyn DriverConnection>, DriverError> {
        let mut connection = self.connector.connect(None)?;
        connection.create_database(&self.database)?;
        connection.select_database(&self.database)?;
        Ok(connection)
    }

    /// Logs a connection failure and converts it.
    fn connection_failed(&self, action: &str, err: &DriverError) -> StoreError {
        self.log.record(
            &StoreLogEvent::new(
                StoreLogLevel::Error,
                "connection_failed",
                format!("connection {action} failed for database {}", self.database),
            )
            .with_detail(err.to_string()),
        );
        StoreError::Connection(err.to_string())
    }

    /// Commits then closes the connection. Never fails; problems are logged.
    pub fn close(&self) {
        let Ok(mut state) = self.lock() else {
            self.log.record(&StoreLogEvent::new(
                StoreLogLevel::Error,
                "connection_close_failed",
                "connection mutex poisoned",
            ));
            return;
        };
        let Some(mut connection) = state.connection.take() else {
            return;
        };
        if let Err(err) = connection.commit() {
            self.log.record(
                &StoreLogEvent::new(StoreLogLevel::Warning, "commit_failed", "commit on close failed")
                    .with_detail(err.to_string()),
            );
        }
        state.uncommitted = 0;
        if let Err(err) = connection.close() {
            self.log.record(
                &StoreLogEvent::new(
                    StoreLogLevel::Warning,
                    "connection_close_failed",
                    "closing the connection failed",
                )
                .with_detail(err.to_string()),
            );
        }
    }

    /// Closes and reopens the connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when reopening fails.
    pub fn reconnect(&self) -> Result<(), StoreError> {
        self.close();
        self.open()
    }

    /// Returns true while a connection is open.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.lock().is_ok_and(|state| state.connection.is_some())
    }

    /// Returns the number of rows written since the last commit.
    #[must_use]
    pub fn uncommitted(&self) -> u64 {
        self.lock().map_or(0, |state| state.uncommitted)
    }

    /// Commits pending writes and resets the uncommitted counter.
    ///
    /// Committing while disconnected is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the driver commit fails.
    pub fn commit(&self) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        self.commit_locked(&mut state)
    }

    /// Commits while the lock is held.
    fn commit_locked(&self, state: &mut ConnectionState) -> Result<(), StoreError> {
        let Some(connection) = state.connection.as_mut() else {
            return Ok(());
        };
        connection.commit().map_err(|err| self.connection_failed("commit", &err))?;
        self.log.record(
            &StoreLogEvent::new(StoreLogLevel::Debug, "committed", "committed pending rows")
                .with_detail(format!("rows={}", state.uncommitted)),
        );
        state.uncommitted = 0;
        Ok(())
    }

    /// Runs `action` with the connection while holding the lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when disconnected, otherwise whatever
    /// `action` returns.
    pub fn with_connection<T, F>(&self, action: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn DriverConnection) -> Result<T, StoreError>,
    {
        let mut state = self.lock()?;
        let connection = state
            .connection
            .as_mut()
            .ok_or_else(|| StoreError::Connection("not connected".to_string()))?;
        action(connection.as_mut())
    }

    /// Adds `rows` to the uncommitted counter and commits when the policy says so.
    ///
    /// Returns true when a commit happened.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the automatic commit fails.
    pub fn record_rows(
        &self,
        rows: u64,
        policy: CommitPolicy,
        interval: u64,
    ) -> Result<bool, StoreError> {
        self.count_rows(rows)?;
        self.apply_commit_policy(policy, interval)
    }

    /// Adds `rows` to the uncommitted counter without committing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the state lock is poisoned.
    pub fn count_rows(&self, rows: u64) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.uncommitted = state.uncommitted.saturating_add(rows);
        Ok(())
    }

    /// Commits when the policy says the counted rows are due.
    ///
    /// Returns true when a commit happened.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the automatic commit fails.
    pub fn apply_commit_policy(
        &self,
        policy: CommitPolicy,
        interval: u64,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let due = match policy {
            CommitPolicy::EveryWrite => true,
            CommitPolicy::Interval => state.uncommitted >= interval,
        };
        if !due {
            return Ok(false);
        }
        self.commit_locked(&mut state)?;
        Ok(true)
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

    use super::ConnectionManager;
    use crate::config::CommitPolicy;
    use crate::driver::Connector;
    use crate::driver::DriverConnection;
    use crate::driver::QueryResult;
    use crate::driver::Statement;
    use crate::error::DriverError;
    use crate::error::StoreError;
    use crate::log::NoopLogSink;
    use crate::value::SqlValue;

    #[derive(Default)]
    struct Journal {
        calls: Mutex<Vec<String>>,
        existing: Mutex<Vec<String>>,
    }

    impl Journal {
        fn push(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct ScriptedConnection {
        journal: Arc<Journal>,
    }

    impl DriverConnection for ScriptedConnection {
        fn execute(&mut self, statement: &Statement) -> Result<usize, DriverError> {
            self.journal.push(statement.sql.clone());
            Ok(0)
        }

        fn execute_many(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<usize, DriverError> {
            self.journal.push(sql);
            Ok(rows.len())
        }

        fn query(&mut self, _statement: &Statement) -> Result<QueryResult, DriverError> {
            Ok(QueryResult::default())
        }

        fn commit(&mut self) -> Result<(), DriverError> {
            self.journal.push("commit");
            Ok(())
        }

        fn create_database(&mut self, database: &str) -> Result<(), DriverError> {
            self.journal.push(format!("create {database}"));
            self.journal.existing.lock().unwrap().push(database.to_string());
            Ok(())
        }

        fn select_database(&mut self, database: &str) -> Result<(), DriverError> {
            self.journal.push(format!("select {database}"));
            Ok(())
        }

        fn close(self: Box<Self>) -> Result<(), DriverError> {
            self.journal.push("close");
            Ok(())
        }
    }

    struct ScriptedConnector {
        journal: Arc<Journal>,
    }

    impl Connector for ScriptedConnector {
        fn connect(&self, database: Option<&str>) -> Result<Box<dyn DriverConnection>, DriverError> {
            if let Some(database) = database
                && !self.journal.existing.lock().unwrap().iter().any(|name| name == database)
            {
                return Err(DriverError::Connect(format!("unknown database {database}")));
            }
            self.journal.push(format!("connect {}", database.unwrap_or("-")));
            Ok(Box::new(ScriptedConnection {
                journal: Arc::clone(&self.journal),
            }))
        }
    }

    fn manager() -> (ConnectionManager, Arc<Journal>) {
        let journal = Arc::new(Journal::default());
        let connector = Arc::new(ScriptedConnector {
            journal: Arc::clone(&journal),
        });
        (ConnectionManager::new("signals", connector, Arc::new(NoopLogSink)), journal)
    }

    #[test]
    fn open_creates_missing_database_then_selects_it() {
        let (manager, journal) = manager();
        manager.open().unwrap();
        assert!(manager.connected());
        assert_eq!(journal.calls(), vec!["connect -", "create signals", "select signals"]);
    }

    #[test]
    fn close_commits_first_and_is_idempotent() {
        let (manager, journal) = manager();
        manager.open().unwrap();
        manager.close();
        manager.close();
        assert!(!manager.connected());
        let calls = journal.calls();
        assert_eq!(&calls[calls.len() - 2..], ["commit", "close"]);
    }

    #[test]
    fn with_connection_requires_open_connection() {
        let (manager, _journal) = manager();
        let result = manager.with_connection(|_| Ok(()));
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }

    #[test]
    fn interval_policy_commits_at_threshold() {
        let (manager, _journal) = manager();
        manager.open().unwrap();
        for _ in 0..49 {
            assert!(!manager.record_rows(1, CommitPolicy::Interval, 50).unwrap());
        }
        assert_eq!(manager.uncommitted(), 49);
        assert!(manager.record_rows(1, CommitPolicy::Interval, 50).unwrap());
        assert_eq!(manager.uncommitted(), 0);
    }

    #[test]
    fn every_write_policy_commits_each_call() {
        let (manager, _journal) = manager();
        manager.open().unwrap();
        assert!(manager.record_rows(1, CommitPolicy::EveryWrite, 50).unwrap());
        assert_eq!(manager.uncommitted(), 0);
    }

    #[test]
    fn counted_rows_wait_for_the_policy_check() {
        let (manager, journal) = manager();
        manager.open().unwrap();
        manager.count_rows(30).unwrap();
        manager.count_rows(30).unwrap();
        assert_eq!(manager.uncommitted(), 60);
        assert!(!journal.calls().contains(&"commit".to_string()));
        assert!(manager.apply_commit_policy(CommitPolicy::Interval, 50).unwrap());
        assert_eq!(manager.uncommitted(), 0);
    }
}
