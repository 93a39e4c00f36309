//! DDL generation and catalog inspection.
//!
//! Statements come from the [`TableDescriptor`]s of a
//! [`SchemaDescriptor`]; nothing here invents column definitions. Tables
//! are created in declaration order and dropped in reverse.
//!
//! The schema version is tracked in SQLite's `user_version` pragma, where
//! `0` means no schema has been created yet.

use record_store_core::{SchemaDescriptor, TableDescriptor};
use rusqlite::Connection;

use crate::error::Result;

/// Generates `CREATE TABLE` statements for every table, in declaration
/// order.
pub fn generate_schema_sql(schema: &SchemaDescriptor) -> String {
    schema
        .tables()
        .iter()
        .map(|t| format!("{};\n", t.create_sql()))
        .collect()
}

/// Generates `DROP TABLE IF EXISTS` statements for every table, in reverse
/// declaration order.
pub fn generate_drop_sql(schema: &SchemaDescriptor) -> String {
    schema
        .tables()
        .iter()
        .rev()
        .map(|t| format!("{};\n", t.drop_sql()))
        .collect()
}

/// Checks whether a table exists.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let mut stmt =
        conn.prepare_cached("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1")?;
    let count: i64 = stmt.query_row([table], |row| row.get(0))?;
    Ok(count > 0)
}

/// Counts rows in a table.
pub fn count_rows(conn: &Connection, table: &TableDescriptor) -> Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

/// Column names of a table as stored on disk, in on-disk order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let names = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

/// Reads the stored schema version.
pub fn user_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version.max(0) as u32)
}

/// Stamps the stored schema version.
pub fn set_user_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version}"))?;
    Ok(())
}
