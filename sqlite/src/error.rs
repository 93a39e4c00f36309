//! Error types for SQLite record store operations.
//!
//! Provides a unified error type covering database access, descriptor and
//! conversion failures from the core crate, interchange file I/O, and
//! schema lifecycle problems.

use std::path::PathBuf;

use record_store_core::CoreError;
use thiserror::Error;

/// Errors that can occur during SQLite record store operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Descriptor, conversion, or predicate failure.
    #[error(transparent)]
    CoreError(#[from] CoreError),

    /// Reading or writing interchange text failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A single-row lookup matched more than one row.
    #[error("too many results from table '{table}': expected at most 1, found {count}")]
    TooManyResults {
        /// Queried table.
        table: String,
        /// Number of matching rows.
        count: usize,
    },

    /// An interchange file could not be opened or created.
    #[error("migration file {}: {source}", .path.display())]
    MigrationIo {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A batch insert or import failed and was rolled back.
    #[error("batch into '{table}' failed at row {row}: {source}")]
    BatchFailed {
        /// Target table.
        table: String,
        /// Zero-based index of the failing row.
        row: usize,
        /// Cause of the failure.
        #[source]
        source: Box<SqliteError>,
    },

    /// Query construction failure.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Schema lifecycle operation failure.
    #[error("migration error: {0}")]
    MigrationError(String),

    /// The database was written by a newer schema version.
    #[error("database version {found} is newer than declared version {declared}")]
    Downgrade {
        /// Version stored in the database.
        found: u32,
        /// Version declared by the schema.
        declared: u32,
    },
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
