// crates/autoschema-core/src/error.rs
// ============================================================================
// Module: Autoschema Errors
// Description: Error taxonomy shared by the schema manager and its drivers.
// Purpose: Give callers stable variants for connection, schema, and row failures.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Errors are split by the layer that raises them. Drivers and dialects raise
//! [`DriverError`] and [`DialectError`]; the connection manager, reconciler,
//! and batch writer translate those into [`StoreError`] variants that tell the
//! caller which step failed. [`CoercionError`] is the only error that is
//! handled locally: the writer drops the offending field and keeps the row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::value::PrimitiveType;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Errors surfaced by the dynamic-schema store.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening, committing, or using the connection failed.
    #[error("connection error: {0}")]
    Connection(String),
    /// A value could not be converted to its column's locked type.
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    /// A table could not be created.
    #[error("cannot create table {table}: {message}")]
    SchemaCreate {
        /// Target table name.
        table: String,
        /// Failure details.
        message: String,
    },
    /// Columns could not be added after the bounded recovery attempt.
    #[error("cannot add columns {} to table {table}: {message}", .fields.join(", "))]
    SchemaAlter {
        /// Target table name.
        table: String,
        /// Fields that were being added.
        fields: Vec<String>,
        /// Failure details.
        message: String,
    },
    /// An item exposes no readable field mapping.
    #[error("item introspection failed: {0}")]
    ItemIntrospection(String),
    /// A statement failed for reasons other than schema drift.
    #[error("statement failed: {message} (statement: {statement})")]
    StatementExecution {
        /// Statement text.
        statement: String,
        /// Failure details.
        message: String,
    },
    /// A table or column name was rejected by the dialect.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// The schema cache lock was poisoned.
    #[error("schema cache error: {0}")]
    Cache(String),
}

impl From<DialectError> for StoreError {
    fn from(error: DialectError) -> Self {
        match error {
            DialectError::InvalidIdentifier(message) => Self::InvalidIdentifier(message),
        }
    }
}

// ============================================================================
// SECTION: Coercion Errors
// ============================================================================

/// Raised when a value cannot be cast to a column's locked-in type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot coerce {value} to {target}: {reason}")]
pub struct CoercionError {
    /// Field name, when known.
    pub field: Option<String>,
    /// Locked-in target type.
    pub target: PrimitiveType,
    /// Display form of the rejected value.
    pub value: String,
    /// Why the conversion failed.
    pub reason: String,
}

impl CoercionError {
    /// Attaches the field name to the error.
    #[must_use]
    pub fn for_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

// ============================================================================
// SECTION: Driver Errors
// ============================================================================

/// Errors raised by database driver implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Connecting or selecting a database failed.
    #[error("driver connect error: {0}")]
    Connect(String),
    /// Executing a statement failed.
    #[error("driver statement error: {0}")]
    Statement(String),
    /// Committing the open transaction failed.
    #[error("driver commit error: {0}")]
    Commit(String),
    /// Closing the connection failed.
    #[error("driver close error: {0}")]
    Close(String),
}

// ============================================================================
// SECTION: Dialect Errors
// ============================================================================

/// Errors raised while rendering dialect-specific SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialectError {
    /// Identifier is empty, too long, or contains forbidden characters.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}
