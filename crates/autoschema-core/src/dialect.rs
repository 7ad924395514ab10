// crates/autoschema-core/src/dialect.rs
// ============================================================================
// Module: SQL Dialects
// Description: Dialect adapter interface and the MySQL adapter.
// Purpose: Centralize every piece of engine-specific SQL text.
// Dependencies: crate::{driver, schema, value}
// ============================================================================

//! ## Overview
//! The reconciler and writer never format SQL themselves. They ask a
//! [`Dialect`] for statements, and the dialect quotes every identifier it
//! emits. Catalog lookups bind names as parameters where the engine allows.
//! Required methods cover the engine-specific parts; provided methods build
//! the DDL and DML that only differ in identifier quoting and type names.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::driver::QueryResult;
use crate::driver::Statement;
use crate::error::DialectError;
use crate::schema::TableSchema;
use crate::value::PrimitiveType;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Dialect Trait
// ============================================================================

/// Engine-specific SQL text generation.
pub trait Dialect: Send + Sync {
    /// Short engine label used in diagnostics.
    fn name(&self) -> &'static str;

    /// Placeholder emitted once per bound parameter.
    fn field_placeholder(&self) -> &'static str;

    /// Column type name for an inferred type.
    fn type_name_for(&self, primitive: PrimitiveType) -> &'static str;

    /// Character used to quote identifiers.
    fn identifier_quote(&self) -> char;

    /// Longest identifier the engine accepts.
    fn max_identifier_length(&self) -> usize;

    /// Lists every table in `database`.
    fn list_tables_statement(&self, database: &str) -> Statement;

    /// Counts tables named `table` in `database`.
    fn table_exists_statement(&self, database: &str, table: &str) -> Statement;

    /// Lists the columns of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`DialectError`] when the table name cannot be quoted.
    fn columns_statement(&self, database: &str, table: &str) -> Result<Statement, DialectError>;

    /// Extracts column names from a [`Dialect::columns_statement`] result.
    fn parse_column_names(&self, raw: &QueryResult) -> Vec<String>;

    /// Validates and quotes an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DialectError::InvalidIdentifier`] for empty, overlong, or
    /// NUL-containing names.
    fn quote_identifier(&self, name: &str) -> Result<String, DialectError> {
        if name.trim().is_empty() {
            return Err(DialectError::InvalidIdentifier("identifier must be non-empty".to_string()));
        }
        if name.contains('\0') {
            return Err(DialectError::InvalidIdentifier(format!(
                "identifier contains NUL: {}",
                name.escape_debug()
            )));
        }
        if name.chars().count() > self.max_identifier_length() {
            return Err(DialectError::InvalidIdentifier(format!(
                "identifier exceeds {} characters: {name}",
                self.max_identifier_length()
            )));
        }
        let quote = self.identifier_quote();
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push(quote);
        for ch in name.chars() {
            if ch == quote {
                quoted.push(quote);
            }
            quoted.push(ch);
        }
        quoted.push(quote);
        Ok(quoted)
    }

    /// Extracts table names from a [`Dialect::list_tables_statement`] result.
    fn parse_table_names(&self, raw: &QueryResult) -> Vec<String> {
        raw.rows
            .iter()
            .filter_map(|row| row.first().and_then(SqlValue::as_text).map(str::to_string))
            .collect()
    }

    /// Extracts the count from a [`Dialect::table_exists_statement`] result.
    fn parse_count(&self, raw: &QueryResult) -> i64 {
        raw.rows.first().and_then(|row| row.first()).and_then(SqlValue::as_integer).unwrap_or(0)
    }

    /// Creates `table` with the given typed columns.
    ///
    /// # Errors
    ///
    /// Returns [`DialectError`] when an identifier is invalid or no columns are given.
    fn create_table_statement(
        &self,
        table: &str,
        columns: &[(String, PrimitiveType)],
    ) -> Result<Statement, DialectError> {
        if columns.is_empty() {
            return Err(DialectError::InvalidIdentifier(format!(
                "table {table} needs at least one column"
            )));
        }
        let definitions = columns
            .iter()
            .map(|(name, primitive)| {
                Ok(format!("{} {}", self.quote_identifier(name)?, self.type_name_for(*primitive)))
            })
            .collect::<Result<Vec<_>, DialectError>>()?;
        Ok(Statement::new(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote_identifier(table)?,
            definitions.join(", ")
        )))
    }

    /// Adds one column to `table`.
    ///
    /// # Errors
    ///
    /// Returns [`DialectError`] when an identifier is invalid.
    fn add_column_statement(
        &self,
        table: &str,
        column: &str,
        primitive: PrimitiveType,
    ) -> Result<Statement, DialectError> {
        Ok(Statement::new(format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.quote_identifier(table)?,
            self.quote_identifier(column)?,
            self.type_name_for(primitive)
        )))
    }

    /// Renders the insert statement for `table` from its cached fragments.
    ///
    /// # Errors
    ///
    /// Returns [`DialectError`] when the table name is invalid.
    fn insert_statement(&self, table: &str, schema: &TableSchema) -> Result<String, DialectError> {
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_identifier(table)?,
            schema.column_list(),
            schema.placeholder_list()
        ))
    }

    /// Selects every row of `table`, optionally limited.
    ///
    /// # Errors
    ///
    /// Returns [`DialectError`] when the table name is invalid.
    fn select_rows_statement(
        &self,
        table: &str,
        limit: Option<usize>,
    ) -> Result<Statement, DialectError> {
        let quoted = self.quote_identifier(table)?;
        Ok(match limit {
            Some(limit) => Statement::new(format!("SELECT * FROM {quoted} LIMIT {limit}")),
            None => Statement::new(format!("SELECT * FROM {quoted}")),
        })
    }

    /// Deletes every row of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`DialectError`] when the table name is invalid.
    fn delete_rows_statement(&self, table: &str) -> Result<Statement, DialectError> {
        Ok(Statement::new(format!("DELETE FROM {}", self.quote_identifier(table)?)))
    }

    /// Drops `table` when it exists.
    ///
    /// # Errors
    ///
    /// Returns [`DialectError`] when the table name is invalid.
    fn drop_table_statement(&self, table: &str) -> Result<Statement, DialectError> {
        Ok(Statement::new(format!("DROP TABLE IF EXISTS {}", self.quote_identifier(table)?)))
    }
}

// ============================================================================
// SECTION: MySQL
// ============================================================================

/// MySQL dialect adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

/// MySQL identifier length limit.
const MYSQL_MAX_IDENTIFIER_LENGTH: usize = 64;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn field_placeholder(&self) -> &'static str {
        "?"
    }

    fn type_name_for(&self, primitive: PrimitiveType) -> &'static str {
        match primitive {
            PrimitiveType::Integer => "INTEGER",
            PrimitiveType::Boolean => "BOOLEAN",
            PrimitiveType::Float => "FLOAT",
            PrimitiveType::DateTime => "DATETIME",
            PrimitiveType::Text => "TEXT",
        }
    }

    fn identifier_quote(&self) -> char {
        '`'
    }

    fn max_identifier_length(&self) -> usize {
        MYSQL_MAX_IDENTIFIER_LENGTH
    }

    fn list_tables_statement(&self, database: &str) -> Statement {
        Statement::new("SELECT table_name FROM information_schema.tables WHERE table_schema = ?")
            .bind(database)
    }

    fn table_exists_statement(&self, database: &str, table: &str) -> Statement {
        Statement::new(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND \
             table_name = ?",
        )
        .bind(database)
        .bind(table)
    }

    fn columns_statement(&self, _database: &str, table: &str) -> Result<Statement, DialectError> {
        Ok(Statement::new(format!("SHOW COLUMNS FROM {}", self.quote_identifier(table)?)))
    }

    fn parse_column_names(&self, raw: &QueryResult) -> Vec<String> {
        raw.rows
            .iter()
            .filter_map(|row| row.first().and_then(SqlValue::as_text))
            .map(|name| name.replace('`', ""))
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

    use proptest::prelude::*;

    use super::Dialect;
    use super::MySqlDialect;
    use crate::driver::QueryResult;
    use crate::error::DialectError;
    use crate::schema::TableSchema;
    use crate::value::PrimitiveType;
    use crate::value::SqlValue;

    #[test]
    fn mysql_type_names_match_inferred_types() {
        let dialect = MySqlDialect;
        assert_eq!(dialect.type_name_for(PrimitiveType::Integer), "INTEGER");
        assert_eq!(dialect.type_name_for(PrimitiveType::Boolean), "BOOLEAN");
        assert_eq!(dialect.type_name_for(PrimitiveType::Float), "FLOAT");
        assert_eq!(dialect.type_name_for(PrimitiveType::DateTime), "DATETIME");
        assert_eq!(dialect.type_name_for(PrimitiveType::Text), "TEXT");
    }

    #[test]
    fn create_table_quotes_every_identifier() {
        let statement = MySqlDialect
            .create_table_statement(
                "Type1",
                &[
                    ("field1".to_string(), PrimitiveType::Integer),
                    ("we`ird".to_string(), PrimitiveType::Text),
                ],
            )
            .unwrap();
        assert_eq!(
            statement.sql,
            "CREATE TABLE IF NOT EXISTS `Type1` (`field1` INTEGER, `we``ird` TEXT)"
        );
    }

    #[test]
    fn create_table_requires_columns() {
        assert!(MySqlDialect.create_table_statement("Empty", &[]).is_err());
    }

    #[test]
    fn catalog_statements_bind_names() {
        let statement = MySqlDialect.table_exists_statement("signals", "Type1");
        assert_eq!(
            statement.params,
            vec![SqlValue::from("signals"), SqlValue::from("Type1")]
        );
        assert!(!statement.sql.contains("Type1"));
    }

    #[test]
    fn insert_statement_uses_cached_fragments() {
        let schema = TableSchema::from_columns(
            vec!["field1".to_string(), "field2".to_string()],
            &MySqlDialect,
        )
        .unwrap();
        let sql = MySqlDialect.insert_statement("Type1", &schema).unwrap();
        assert_eq!(sql, "INSERT INTO `Type1` (`field1`, `field2`) VALUES (?, ?)");
    }

    #[test]
    fn show_columns_rows_parse_to_names() {
        let raw = QueryResult {
            columns: vec!["Field".to_string(), "Type".to_string()],
            rows: vec![
                vec![SqlValue::from("`id`"), SqlValue::from("int")],
                vec![SqlValue::from("name"), SqlValue::from("text")],
            ],
        };
        assert_eq!(MySqlDialect.parse_column_names(&raw), vec!["id", "name"]);
    }

    #[test]
    fn identifiers_are_validated() {
        assert!(matches!(
            MySqlDialect.quote_identifier(""),
            Err(DialectError::InvalidIdentifier(_))
        ));
        assert!(MySqlDialect.quote_identifier("a\0b").is_err());
        assert!(MySqlDialect.quote_identifier(&"x".repeat(65)).is_err());
        assert_eq!(MySqlDialect.quote_identifier("x".repeat(64).as_str()).unwrap().len(), 66);
    }

    proptest! {
        #[test]
        fn quoted_identifiers_round_trip(name in "[a-zA-Z0-9_` ]{1,32}") {
            prop_assume!(!name.trim().is_empty());
            let quoted = MySqlDialect.quote_identifier(&name).unwrap();
            let inner = &quoted[1..quoted.len() - 1];
            prop_assert_eq!(inner.replace("``", "`"), name);
        }
    }
}
