//! `SQLite` schema mutator for drift-recovery tests.
// crates/autoschema-store-sqlite/src/bin/sqlite_schema_mutator.rs
// ============================================================================
// Binary: SQLite Schema Mutator
// Description: Adds a column to a table from a separate process.
// Purpose: Simulate schema changes the store did not make itself.
// Dependencies: autoschema-core, autoschema-store-sqlite, rusqlite
// ============================================================================

use std::env;
use std::path::PathBuf;

use autoschema_core::Dialect;
use autoschema_core::PrimitiveType;
use autoschema_store_sqlite::SqliteDialect;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let path = args.next().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing sqlite path")
    })?;
    let table = args
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing table"))?;
    let column = args
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing column"))?;
    let primitive = match args.next().as_deref() {
        None | Some("text") => PrimitiveType::Text,
        Some("integer") => PrimitiveType::Integer,
        Some("boolean") => PrimitiveType::Boolean,
        Some("float") => PrimitiveType::Float,
        Some("datetime") => PrimitiveType::DateTime,
        Some(other) => {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unknown column type: {other}"),
            )));
        }
    };

    let statement = SqliteDialect.add_column_statement(&table, &column, primitive)?;
    let conn = rusqlite::Connection::open(PathBuf::from(path))?;
    conn.busy_timeout(std::time::Duration::from_millis(5_000))?;
    conn.execute_batch(&statement.sql)?;
    Ok(())
}
