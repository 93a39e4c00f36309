//! SQLite record store with versioned schema management.
//!
//! This crate persists [`Entity`](record_store_core::Entity) records in
//! tables described by [`TableDescriptor`](record_store_core::TableDescriptor)s
//! and keeps those tables in line with a versioned
//! [`SchemaDescriptor`](record_store_core::SchemaDescriptor).
//!
//! # Architecture
//!
//! The crate is organized into five modules:
//!
//! - **`schema`**: DDL generation and catalog inspection
//! - **`manager`**: lifecycle operations (create/drop/upgrade/backup/restore/status)
//! - **`codec`**: table export and import in the interchange text format
//! - **`store`**: typed CRUD and scoped cursors
//! - **`query`**: type-checked `=` / `IN` predicates and ordering
//!
//! # Quick start: schema lifecycle
//!
//! ```no_run
//! use record_store_core::{ConverterRegistry, SchemaDescriptor, TableDescriptor, UpgradeStrategy};
//! use record_store_sqlite::{MigrationCodec, SchemaManager};
//! use rusqlite::Connection;
//!
//! let registry = ConverterRegistry::with_builtins();
//! let mut schema = SchemaDescriptor::new("notes", 1).unwrap();
//! schema
//!     .add_table(
//!         TableDescriptor::builder("note", &registry)
//!             .id("id")
//!             .field::<String>("title")
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let conn = Connection::open("notes.db").unwrap();
//! let codec = MigrationCodec::new("backups", schema.name());
//! let mut manager = SchemaManager::new(conn, schema, codec)
//!     .unwrap()
//!     .with_strategy(UpgradeStrategy::BackupRestore);
//! manager.open().unwrap();
//!
//! let status = manager.status().unwrap();
//! println!("note rows: {}", status.tables[0].row_count);
//! ```
//!
//! # Upgrades
//!
//! When the stored version is older than the declared one, every table is
//! exported to `{database}.v{old}.{table}.csv`, recreated from its current
//! descriptor, and imported back with columns matched by name. Columns
//! added since take their declared defaults; removed columns are ignored.

mod codec;
mod convert;
mod error;
mod manager;
mod query;
mod schema;
mod store;

pub use codec::{DEFAULT_SUFFIX, MigrationCodec, export_to_writer, import_from_reader};
pub use error::{Result, SqliteError};
pub use manager::{
    DefaultHooks, OpenOutcome, SchemaManager, SchemaStatus, TableHooks, TableReport, TableStatus,
    UpgradeReport,
};
pub use query::QueryBuilder;
pub use schema::{
    count_rows, generate_drop_sql, generate_schema_sql, set_user_version, table_columns,
    table_exists, user_version,
};
pub use store::{Cursor, RecordStore};
