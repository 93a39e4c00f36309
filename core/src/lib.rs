//! Core types for mapping typed records to relational tables.
//!
//! This crate holds everything that does not touch a database connection:
//!
//! - [`ConverterRegistry`] and [`TypeConverter`]: per-type conversions
//!   between values, stored values and interchange text.
//! - [`TableDescriptor`] and [`SchemaDescriptor`]: validated table
//!   declarations, their DDL and declared defaults.
//! - [`interchange`]: the line-oriented backup text format.
//! - [`Entity`]: glue between application records and stored rows.
//! - [`SchemaConfig`]: YAML schema declarations for tooling.
//!
//! # Example
//!
//! ```
//! use record_store_core::*;
//!
//! let registry = ConverterRegistry::with_builtins();
//! let table = TableDescriptor::builder("reading", &registry)
//!     .id("id")
//!     .field::<f64>("value")
//!     .field::<chrono::DateTime<chrono::Utc>>("taken_at")
//!     .build()
//!     .unwrap();
//!
//! let value = table.field("value").unwrap();
//! assert_eq!(value.storage_class(), StorageClass::Real);
//! let text = value.to_text(&SqlValue::Real(-0.0)).unwrap();
//! assert_eq!(text.as_deref(), Some("8000000000000000"));
//! ```

mod config;
mod convert;
mod entity;
mod error;
pub mod interchange;
mod predicate;
mod table;
mod types;
mod validate;

pub use config::{AlterConfig, FieldConfig, FieldKind, SchemaConfig, TableConfig};
pub use convert::*;
pub use entity::{Entity, RowReader, RowWriter};
pub use error::{CoreError, Result};
pub use predicate::{Operator, Predicate};
pub use table::{AlterSql, Column, FieldDescriptor, SchemaDescriptor, TableBuilder, TableDescriptor};
pub use types::*;
pub use validate::{validate_database_name, validate_identifier};
