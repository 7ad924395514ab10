// crates/autoschema-core/src/driver.rs
// ============================================================================
// Module: Database Driver Interface
// Description: Connection primitives the core drives through a fixed interface.
// Purpose: Keep engine-specific connection code out of the schema manager.
// Dependencies: crate::value, crate::error
// ============================================================================

//! ## Overview
//! A [`Connector`] opens [`DriverConnection`]s, optionally with a database
//! selected. The core only ever holds one connection at a time, behind the
//! connection manager's lock, so connections need to be [`Send`] but not
//! [`Sync`]. All SQL text handed to a connection comes from a dialect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use crate::error::DriverError;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Statements
// ============================================================================

/// SQL text plus bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Statement text using the dialect's placeholder syntax.
    pub sql: String,
    /// Parameters bound in placeholder order.
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// Creates a statement without parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Appends a bound parameter.
    #[must_use]
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Rows returned by a query, with column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Row values in column order.
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResult {
    /// Returns the number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the query produced no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the value of `column` in row `row`, matching names case-insensitively.
    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let index = self.columns.iter().position(|name| name.eq_ignore_ascii_case(column))?;
        self.rows.get(row).and_then(|values| values.get(index))
    }
}

// ============================================================================
// SECTION: Driver Traits
// ============================================================================

/// An open database connection.
pub trait DriverConnection: Send {
    /// Executes a single statement and returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Statement`] when execution fails.
    fn execute(&mut self, statement: &Statement) -> Result<usize, DriverError>;

    /// Prepares `sql` once and executes it for every parameter row.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Statement`] when any row fails.
    fn execute_many(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<usize, DriverError>;

    /// Runs a query and collects every row.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Statement`] when the query fails.
    fn query(&mut self, statement: &Statement) -> Result<QueryResult, DriverError>;

    /// Commits pending writes.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Commit`] when the commit fails.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Creates `database` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the database cannot be created.
    fn create_database(&mut self, database: &str) -> Result<(), DriverError>;

    /// Switches the connection to `database`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connect`] when the database cannot be selected.
    fn select_database(&mut self, database: &str) -> Result<(), DriverError>;

    /// Terminates the connection.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Close`] when the engine reports a close failure.
    fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// Factory for driver connections.
pub trait Connector: Send + Sync {
    /// Connects, selecting `database` when provided.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connect`] when the connection or database
    /// selection fails.
    fn connect(&self, database: Option<&str>) -> Result<Box<dyn DriverConnection>, DriverError>;
}
