//! Identifier validation for table, column, and database names.
//!
//! Names end up interpolated into DDL and into backup file names, so they
//! are restricted to plain SQL identifiers that are not SQLite keywords.
//!
//! # Examples
//!
//! ```
//! use record_store_core::{validate_database_name, validate_identifier};
//!
//! assert!(validate_identifier("simple_entity").is_ok());
//! assert!(validate_identifier("1st").is_err());
//! assert!(validate_identifier("order").is_err());
//! assert!(validate_database_name("app-data").is_ok());
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CoreError, Result};

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex must compile"));

static DATABASE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").expect("static regex must compile"));

/// SQLite keywords, upper case and sorted for binary search.
const SQLITE_KEYWORDS: &[&str] = &[
    "ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ALWAYS", "ANALYZE", "AND", "AS", "ASC",
    "ATTACH", "AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN", "BY", "CASCADE", "CASE", "CAST",
    "CHECK", "COLLATE", "COLUMN", "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS",
    "CURRENT", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE", "DEFAULT",
    "DEFERRABLE", "DEFERRED", "DELETE", "DESC", "DETACH", "DISTINCT", "DO", "DROP", "EACH",
    "ELSE", "END", "ESCAPE", "EXCEPT", "EXCLUDE", "EXCLUSIVE", "EXISTS", "EXPLAIN", "FAIL",
    "FILTER", "FIRST", "FOLLOWING", "FOR", "FOREIGN", "FROM", "FULL", "GENERATED", "GLOB",
    "GROUP", "GROUPS", "HAVING", "IF", "IGNORE", "IMMEDIATE", "IN", "INDEX", "INDEXED",
    "INITIALLY", "INNER", "INSERT", "INSTEAD", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN",
    "KEY", "LAST", "LEFT", "LIKE", "LIMIT", "MATCH", "MATERIALIZED", "NATURAL", "NO", "NOT",
    "NOTHING", "NOTNULL", "NULL", "NULLS", "OF", "OFFSET", "ON", "OR", "ORDER", "OTHERS",
    "OUTER", "OVER", "PARTITION", "PLAN", "PRAGMA", "PRECEDING", "PRIMARY", "QUERY", "RAISE",
    "RANGE", "RECURSIVE", "REFERENCES", "REGEXP", "REINDEX", "RELEASE", "RENAME", "REPLACE",
    "RESTRICT", "RETURNING", "RIGHT", "ROLLBACK", "ROW", "ROWS", "SAVEPOINT", "SELECT", "SET",
    "TABLE", "TEMP", "TEMPORARY", "THEN", "TIES", "TO", "TRANSACTION", "TRIGGER", "UNBOUNDED",
    "UNION", "UNIQUE", "UPDATE", "USING", "VACUUM", "VALUES", "VIEW", "VIRTUAL", "WHEN", "WHERE",
    "WINDOW", "WITH", "WITHOUT",
];

/// Whether `name` is an SQLite keyword, ignoring case.
fn is_sqlite_keyword(name: &str) -> bool {
    SQLITE_KEYWORDS
        .binary_search(&name.to_ascii_uppercase().as_str())
        .is_ok()
}

/// Checks that `name` is a plain SQL identifier.
///
/// # Errors
///
/// Returns [`CoreError::InvalidIdentifier`] for empty names, names starting
/// with a digit, names containing anything but ASCII alphanumerics and
/// underscores, and SQLite keywords such as `order` or `group`.
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER_RE.is_match(name) && !is_sqlite_keyword(name) {
        Ok(())
    } else {
        Err(CoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Checks that `name` is usable as the database part of a backup file name.
///
/// Dots and dashes are allowed, path separators are not.
pub fn validate_database_name(name: &str) -> Result<()> {
    if DATABASE_NAME_RE.is_match(name) && !name.contains("..") {
        Ok(())
    } else {
        Err(CoreError::InvalidSchema(format!(
            "invalid database name '{name}': use letters, digits, '_', '-' or '.'"
        )))
    }
}
