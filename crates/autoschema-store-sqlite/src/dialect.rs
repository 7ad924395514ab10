// crates/autoschema-store-sqlite/src/dialect.rs
// ============================================================================
// Module: SQLite Dialect
// Description: SQL text for SQLite catalogs, types, and identifiers.
// Purpose: Plug SQLite into the engine-agnostic schema manager.
// Dependencies: autoschema-core
// ============================================================================

//! ## Overview
//! `SQLite` has no server-side database namespace: one file is one database,
//! so catalog statements ignore the database name. Table names compare
//! case-insensitively, matching the cache's column membership rules.

// ============================================================================
// SECTION: Imports
// ============================================================================

use autoschema_core::Dialect;
use autoschema_core::DialectError;
use autoschema_core::PrimitiveType;
use autoschema_core::QueryResult;
use autoschema_core::SqlValue;
use autoschema_core::Statement;

// ============================================================================
// SECTION: Dialect
// ============================================================================

/// Longest identifier accepted for tables and columns.
const SQLITE_MAX_IDENTIFIER_LENGTH: usize = 255;

/// `SQLite` dialect adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn field_placeholder(&self) -> &'static str {
        "?"
    }

    fn type_name_for(&self, primitive: PrimitiveType) -> &'static str {
        match primitive {
            PrimitiveType::Integer => "INTEGER",
            PrimitiveType::Boolean => "BOOLEAN",
            PrimitiveType::Float => "REAL",
            PrimitiveType::DateTime => "DATETIME",
            PrimitiveType::Text => "TEXT",
        }
    }

    fn identifier_quote(&self) -> char {
        '"'
    }

    fn max_identifier_length(&self) -> usize {
        SQLITE_MAX_IDENTIFIER_LENGTH
    }

    fn list_tables_statement(&self, _database: &str) -> Statement {
        Statement::new(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
    }

    fn table_exists_statement(&self, _database: &str, table: &str) -> Statement {
        Statement::new(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
        )
        .bind(table)
    }

    fn columns_statement(&self, _database: &str, table: &str) -> Result<Statement, DialectError> {
        Ok(Statement::new("SELECT name FROM pragma_table_info(?1) ORDER BY cid").bind(table))
    }

    fn parse_column_names(&self, raw: &QueryResult) -> Vec<String> {
        raw.rows
            .iter()
            .filter_map(|row| row.first().and_then(SqlValue::as_text))
            .map(str::to_string)
            .collect()
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

    use autoschema_core::Dialect;
    use autoschema_core::PrimitiveType;
    use autoschema_core::SqlValue;

    use super::SqliteDialect;

    #[test]
    fn floats_are_real_columns() {
        assert_eq!(SqliteDialect.type_name_for(PrimitiveType::Float), "REAL");
    }

    #[test]
    fn identifiers_use_double_quotes() {
        let statement = SqliteDialect.add_column_statement("Type1", "a\"b", PrimitiveType::Text).unwrap();
        assert_eq!(statement.sql, "ALTER TABLE \"Type1\" ADD COLUMN \"a\"\"b\" TEXT");
    }

    #[test]
    fn catalog_lookups_bind_the_table_name() {
        let statement = SqliteDialect.columns_statement("ignored", "Robert'); DROP TABLE x;--").unwrap();
        assert_eq!(statement.params, vec![SqlValue::from("Robert'); DROP TABLE x;--")]);
        assert!(!statement.sql.contains("DROP"));
    }

    #[test]
    fn overlong_identifiers_are_rejected() {
        assert!(SqliteDialect.quote_identifier(&"x".repeat(256)).is_err());
        assert!(SqliteDialect.quote_identifier(&"x".repeat(255)).is_ok());
    }
}
