//! Error types for descriptor construction, type conversion, and predicates.
//!
//! Setup-time failures ([`CoreError::TypeNotSupported`],
//! [`CoreError::DuplicateConverter`], [`CoreError::InvalidSchema`]) are
//! expected to stop the host application. The remaining variants describe
//! per-call problems that callers can handle.

use thiserror::Error;

use crate::types::StorageClass;

/// Errors that can occur while describing tables or converting values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No converter is registered for the requested semantic type.
    #[error("type not supported: no converter registered for {0}")]
    TypeNotSupported(String),

    /// A different converter is already registered for the semantic type.
    #[error("duplicate converter for {field_type}: {existing} is already registered, refusing {replacement}")]
    DuplicateConverter {
        /// The semantic type being registered.
        field_type: String,
        /// Converter already present in the registry.
        existing: String,
        /// Converter that was rejected.
        replacement: String,
    },

    /// Table or column name is not a plain SQL identifier, or is a keyword.
    #[error("invalid identifier '{0}': must start with a letter or underscore, contain only alphanumeric characters and underscores, and not be an SQLite keyword")]
    InvalidIdentifier(String),

    /// Structural problem in a table or schema declaration.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Column is not declared by the table it was used with.
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn {
        /// Table that was searched.
        table: String,
        /// Column name that was not found.
        column: String,
    },

    /// A value's type does not match the column's declared semantic type.
    #[error("type mismatch for column '{column}': declared {declared}, got {actual}")]
    TypeMismatch {
        /// Column name.
        column: String,
        /// Declared semantic type of the column.
        declared: String,
        /// Type of the supplied value.
        actual: String,
    },

    /// Exact-match comparison requested on a REAL or BLOB column.
    #[error("equality predicate not supported on {class} column '{column}'")]
    UnsupportedPredicate {
        /// Column name.
        column: String,
        /// Storage class of the column.
        class: StorageClass,
    },

    /// Stored or interchange value could not be converted.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// Schema configuration file is inconsistent.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Convenience alias for results with [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
