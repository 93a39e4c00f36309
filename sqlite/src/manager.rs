//! Schema lifecycle: create, drop, upgrade, backup and restore.
//!
//! [`SchemaManager`] owns a connection and a [`SchemaDescriptor`] and keeps
//! the on-disk tables in line with it. The stored schema version lives in
//! SQLite's `user_version`; [`open`](SchemaManager::open) creates a fresh
//! database, upgrades an older one with the configured
//! [`UpgradeStrategy`], and refuses a newer one.
//!
//! Upgrades are per table. With [`UpgradeStrategy::BackupRestore`] each
//! table is exported to the interchange format, dropped, recreated from its
//! current descriptor and imported back, matching columns by name. A
//! failure in one table is logged and recorded in the [`UpgradeReport`];
//! the remaining tables still upgrade. There is no transaction spanning
//! tables.
//!
//! # Example
//!
//! ```no_run
//! use record_store_core::{ConverterRegistry, SchemaDescriptor, TableDescriptor};
//! use record_store_sqlite::{MigrationCodec, OpenOutcome, SchemaManager};
//! use rusqlite::Connection;
//!
//! let registry = ConverterRegistry::with_builtins();
//! let mut schema = SchemaDescriptor::new("notes", 2).unwrap();
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
//! let mut manager = SchemaManager::new(conn, schema, codec).unwrap();
//!
//! match manager.open().unwrap() {
//!     OpenOutcome::Created => println!("created"),
//!     OpenOutcome::Upgraded(report) => println!("upgraded {} tables", report.tables.len()),
//!     OpenOutcome::Current => {}
//! }
//! ```

use std::sync::Arc;

use record_store_core::{SchemaDescriptor, TableDescriptor, UpgradeStrategy};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::MigrationCodec;
use crate::error::{Result, SqliteError};
use crate::schema::{count_rows, set_user_version, table_exists, user_version};

/// Per-table lifecycle hooks.
///
/// The defaults run the descriptor's DDL; override a method to customize
/// one step for one table.
pub trait TableHooks: Send + Sync {
    /// Creates the table. Fails if it already exists.
    fn on_create(&self, conn: &Connection, table: &TableDescriptor) -> Result<()> {
        debug!(table = table.name(), "creating table");
        conn.execute_batch(&table.create_sql())?;
        Ok(())
    }

    /// Drops the table if it exists.
    fn on_drop(&self, conn: &Connection, table: &TableDescriptor) -> Result<()> {
        debug!(table = table.name(), "dropping table");
        conn.execute_batch(&table.drop_sql())?;
        Ok(())
    }

    /// Moves the table from `old_version` to `new_version` in place. Used
    /// by [`UpgradeStrategy::Custom`]; runs the descriptor's alter
    /// statements by default.
    fn on_upgrade(&self, conn: &Connection, table: &TableDescriptor, old_version: u32, new_version: u32) -> Result<()> {
        for statement in table.alter_sql(old_version, new_version) {
            debug!(table = table.name(), %statement, "altering table");
            conn.execute_batch(&statement)?;
        }
        Ok(())
    }
}

/// Hooks that only run the descriptor's own DDL.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl TableHooks for DefaultHooks {}

struct ManagedTable {
    table: Arc<TableDescriptor>,
    hooks: Arc<dyn TableHooks>,
}

/// What [`SchemaManager::open`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    /// The database was empty; every table was created.
    Created,
    /// The database held an older version and was upgraded.
    Upgraded(UpgradeReport),
    /// The database already matched the declared version.
    Current,
}

/// Result of an upgrade, one entry per table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpgradeReport {
    /// Strategy that ran.
    pub strategy: UpgradeStrategy,
    /// Version before the upgrade.
    pub from: u32,
    /// Version after the upgrade.
    pub to: u32,
    /// Per-table outcomes in declaration order.
    pub tables: Vec<TableReport>,
}

impl UpgradeReport {
    /// Entries that recorded an error.
    pub fn failures(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|t| t.error.is_some())
    }

    /// Whether every table completed without error.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Outcome of one table during an upgrade, backup or restore.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    /// Table name.
    pub table: String,
    /// Rows exported, if an export ran.
    pub exported: Option<usize>,
    /// Rows imported, if an import ran.
    pub imported: Option<usize>,
    /// Error message when the table failed.
    pub error: Option<String>,
}

impl TableReport {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            exported: None,
            imported: None,
            error: None,
        }
    }

    fn fail(&mut self, error: &SqliteError) {
        self.error = Some(error.to_string());
    }
}

/// Existence and size of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStatus {
    /// Table name.
    pub name: String,
    /// Whether the table exists.
    pub exists: bool,
    /// Number of rows, `0` when absent.
    pub row_count: usize,
}

/// Snapshot of a managed database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaStatus {
    /// Database name.
    pub database: String,
    /// Version declared by the schema.
    pub declared_version: u32,
    /// Version stored in the database, `0` when never created.
    pub stored_version: u32,
    /// Declared tables in order.
    pub tables: Vec<TableStatus>,
}

impl SchemaStatus {
    /// Whether the stored version matches the declared one.
    pub fn is_current(&self) -> bool {
        self.stored_version == self.declared_version
    }
}

/// Keeps a database in line with a [`SchemaDescriptor`].
pub struct SchemaManager {
    conn: Connection,
    schema: SchemaDescriptor,
    tables: Vec<ManagedTable>,
    strategy: UpgradeStrategy,
    codec: MigrationCodec,
}

impl SchemaManager {
    /// Creates a manager using [`DefaultHooks`] and
    /// [`UpgradeStrategy::BackupRestore`].
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::MigrationError`] if the schema declares no
    /// tables.
    pub fn new(conn: Connection, schema: SchemaDescriptor, codec: MigrationCodec) -> Result<Self> {
        if schema.tables().is_empty() {
            return Err(SqliteError::MigrationError(format!(
                "schema '{}' declares no tables",
                schema.name()
            )));
        }
        let hooks: Arc<dyn TableHooks> = Arc::new(DefaultHooks);
        let tables = schema
            .tables()
            .iter()
            .map(|table| ManagedTable {
                table: Arc::clone(table),
                hooks: Arc::clone(&hooks),
            })
            .collect();
        Ok(Self {
            conn,
            schema,
            tables,
            strategy: UpgradeStrategy::default(),
            codec,
        })
    }

    /// Sets the upgrade strategy.
    pub fn with_strategy(mut self, strategy: UpgradeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replaces the hooks of one table.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::MigrationError`] if the schema has no such
    /// table.
    pub fn with_hooks(mut self, table: &str, hooks: impl TableHooks + 'static) -> Result<Self> {
        let managed = self
            .tables
            .iter_mut()
            .find(|m| m.table.name() == table)
            .ok_or_else(|| SqliteError::MigrationError(format!("unknown table '{table}'")))?;
        managed.hooks = Arc::new(hooks);
        Ok(self)
    }

    /// Creates, upgrades, or accepts the database depending on its stored
    /// version, then stamps the declared version.
    ///
    /// An upgrade with failed tables leaves the stored version unchanged so
    /// the next `open` retries it. Tables that already upgraded go through
    /// the same steps again without losing rows.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::Downgrade`] if the database is newer than the
    /// schema, and creation errors (including "table already exists" for a
    /// database with unversioned tables).
    pub fn open(&mut self) -> Result<OpenOutcome> {
        let stored = self.stored_version()?;
        let declared = self.schema.version();
        if stored == 0 {
            self.on_create()?;
            set_user_version(&self.conn, declared)?;
            info!(database = self.schema.name(), version = declared, "created schema");
            Ok(OpenOutcome::Created)
        } else if stored < declared {
            let report = self.on_upgrade(stored, declared)?;
            if report.is_clean() {
                set_user_version(&self.conn, declared)?;
                info!(database = self.schema.name(), from = stored, to = declared, "upgraded schema");
            } else {
                warn!(
                    database = self.schema.name(),
                    failed = report.failures().count(),
                    version = stored,
                    "upgrade incomplete, stored version left unchanged"
                );
            }
            Ok(OpenOutcome::Upgraded(report))
        } else if stored == declared {
            Ok(OpenOutcome::Current)
        } else {
            Err(SqliteError::Downgrade {
                found: stored,
                declared,
            })
        }
    }

    /// Creates every table in declaration order, in one transaction.
    pub fn on_create(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        for managed in &self.tables {
            managed
                .hooks
                .on_create(&tx, &managed.table)
                .map_err(|e| SqliteError::MigrationError(format!(
                    "failed to create table '{}': {e}",
                    managed.table.name()
                )))?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Drops every table in reverse declaration order and clears the
    /// stored version, in one transaction.
    pub fn on_drop(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        for managed in self.tables.iter().rev() {
            managed.hooks.on_drop(&tx, &managed.table)?;
        }
        set_user_version(&tx, 0)?;
        tx.commit()?;
        info!(database = self.schema.name(), "dropped schema");
        Ok(())
    }

    /// Drops and recreates every table, discarding their rows.
    pub fn drop_and_create(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        for managed in self.tables.iter().rev() {
            managed.hooks.on_drop(&tx, &managed.table)?;
        }
        for managed in &self.tables {
            managed.hooks.on_create(&tx, &managed.table)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Runs the configured strategy to move every table from `old_version`
    /// to `new_version`. Does not stamp the stored version.
    ///
    /// Per-table failures are recorded in the report, not returned.
    pub fn on_upgrade(&mut self, old_version: u32, new_version: u32) -> Result<UpgradeReport> {
        info!(
            database = self.schema.name(),
            from = old_version,
            to = new_version,
            strategy = ?self.strategy,
            "upgrading schema"
        );
        let mut report = UpgradeReport {
            strategy: self.strategy,
            from: old_version,
            to: new_version,
            tables: Vec::with_capacity(self.tables.len()),
        };
        match self.strategy {
            UpgradeStrategy::RecreateEmpty => {
                self.drop_and_create()?;
                report.tables = self
                    .tables
                    .iter()
                    .map(|m| TableReport::new(m.table.name()))
                    .collect();
            }
            UpgradeStrategy::BackupRestore => {
                for managed in &self.tables {
                    let mut entry = TableReport::new(managed.table.name());
                    if let Err(e) = self.backup_restore_table(managed, old_version, &mut entry) {
                        warn!(table = managed.table.name(), error = %e, "table upgrade failed");
                        entry.fail(&e);
                    }
                    report.tables.push(entry);
                }
            }
            UpgradeStrategy::Custom => {
                for managed in &self.tables {
                    let mut entry = TableReport::new(managed.table.name());
                    if let Err(e) = self.custom_upgrade_table(managed, old_version, new_version) {
                        warn!(table = managed.table.name(), error = %e, "table upgrade failed");
                        entry.fail(&e);
                    }
                    report.tables.push(entry);
                }
            }
        }
        Ok(report)
    }

    fn backup_restore_table(&self, managed: &ManagedTable, old_version: u32, entry: &mut TableReport) -> Result<()> {
        let table = &managed.table;
        if !table_exists(&self.conn, table.name())? {
            debug!(table = table.name(), "table absent before upgrade, creating");
            return managed.hooks.on_create(&self.conn, table);
        }

        // A pending marker with an empty table means an earlier upgrade
        // dropped it and never finished the import; the backup holds the rows.
        let resume = self.codec.upgrade_pending(old_version, table.name())
            && self.codec.has_backup(old_version, table.name())
            && count_rows(&self.conn, table)? == 0;
        if resume {
            info!(table = table.name(), "resuming interrupted upgrade from backup");
        } else {
            entry.exported = Some(self.codec.export_table(&self.conn, table, old_version)?);
            self.codec.mark_upgrade_pending(old_version, table.name())?;
        }

        managed.hooks.on_drop(&self.conn, table)?;
        managed.hooks.on_create(&self.conn, table)?;
        entry.imported = Some(self.codec.import_table(&self.conn, table, old_version)?);
        self.codec.clear_upgrade_pending(old_version, table.name())
    }

    fn custom_upgrade_table(&self, managed: &ManagedTable, old_version: u32, new_version: u32) -> Result<()> {
        if table_exists(&self.conn, managed.table.name())? {
            managed
                .hooks
                .on_upgrade(&self.conn, &managed.table, old_version, new_version)
        } else {
            managed.hooks.on_create(&self.conn, &managed.table)
        }
    }

    /// Exports every existing table to its file for `version`.
    pub fn backup_all_tables(&self, version: u32) -> Vec<TableReport> {
        self.tables
            .iter()
            .map(|managed| {
                let table = &managed.table;
                let mut entry = TableReport::new(table.name());
                let result = table_exists(&self.conn, table.name()).and_then(|exists| {
                    if exists {
                        entry.exported = Some(self.codec.export_table(&self.conn, table, version)?);
                    }
                    Ok(())
                });
                if let Err(e) = result {
                    warn!(table = table.name(), error = %e, "table backup failed");
                    entry.fail(&e);
                }
                entry
            })
            .collect()
    }

    /// Imports every table that has a file for `version`, appending to
    /// whatever rows the table already holds.
    pub fn restore_all_tables(&self, version: u32) -> Vec<TableReport> {
        self.tables
            .iter()
            .map(|managed| {
                let table = &managed.table;
                let mut entry = TableReport::new(table.name());
                if self.codec.has_backup(version, table.name()) {
                    match self.codec.import_table(&self.conn, table, version) {
                        Ok(n) => entry.imported = Some(n),
                        Err(e) => {
                            warn!(table = table.name(), error = %e, "table restore failed");
                            entry.fail(&e);
                        }
                    }
                } else {
                    debug!(table = table.name(), version, "no backup to restore");
                }
                entry
            })
            .collect()
    }

    /// Reports stored version and per-table existence and row counts.
    pub fn status(&self) -> Result<SchemaStatus> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for managed in &self.tables {
            let exists = table_exists(&self.conn, managed.table.name())?;
            let row_count = if exists {
                count_rows(&self.conn, &managed.table)?
            } else {
                0
            };
            tables.push(TableStatus {
                name: managed.table.name().to_string(),
                exists,
                row_count,
            });
        }
        Ok(SchemaStatus {
            database: self.schema.name().to_string(),
            declared_version: self.schema.version(),
            stored_version: self.stored_version()?,
            tables,
        })
    }

    /// Version stored in the database, `0` when never created.
    pub fn stored_version(&self) -> Result<u32> {
        user_version(&self.conn)
    }

    /// The managed schema.
    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Looks up a managed table.
    pub fn table(&self, name: &str) -> Option<&Arc<TableDescriptor>> {
        self.schema.table(name)
    }

    /// The backup codec.
    pub fn codec(&self) -> &MigrationCodec {
        &self.codec
    }

    /// Configured upgrade strategy.
    pub fn strategy(&self) -> UpgradeStrategy {
        self.strategy
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the manager and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_store_core::ConverterRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn schema(version: u32, with_extra: bool) -> SchemaDescriptor {
        let registry = ConverterRegistry::with_builtins();
        let mut builder = TableDescriptor::builder("item", &registry)
            .id("id")
            .field::<String>("name");
        if with_extra {
            builder = builder.field::<i32>("qty").with_default("qty", 3i64);
        }
        let item = builder
            .alter(|old, new| {
                if old < 2 && new >= 2 {
                    vec!["ALTER TABLE item ADD COLUMN qty INTEGER NOT NULL DEFAULT 3".to_string()]
                } else {
                    Vec::new()
                }
            })
            .build()
            .unwrap();
        let mut schema = SchemaDescriptor::new("shop", version).unwrap();
        schema.add_table(item).unwrap();
        schema
    }

    fn manager(conn: Connection, version: u32, dir: &std::path::Path) -> SchemaManager {
        let schema = schema(version, version >= 2);
        let codec = MigrationCodec::new(dir, schema.name());
        SchemaManager::new(conn, schema, codec).unwrap()
    }

    #[test]
    fn test_open_creates_then_is_current() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(Connection::open_in_memory().unwrap(), 1, dir.path());
        assert_eq!(m.open().unwrap(), OpenOutcome::Created);
        assert_eq!(m.stored_version().unwrap(), 1);
        assert_eq!(m.open().unwrap(), OpenOutcome::Current);
    }

    #[test]
    fn test_open_refuses_downgrade() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open_in_memory().unwrap();
        set_user_version(&conn, 5).unwrap();
        let mut m = manager(conn, 2, dir.path());
        assert!(matches!(
            m.open(),
            Err(SqliteError::Downgrade { found: 5, declared: 2 })
        ));
    }

    #[test]
    fn test_on_create_twice_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(Connection::open_in_memory().unwrap(), 1, dir.path());
        m.on_create().unwrap();
        assert!(matches!(m.on_create(), Err(SqliteError::MigrationError(_))));
    }

    #[test]
    fn test_backup_restore_upgrade_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut v1 = manager(Connection::open_in_memory().unwrap(), 1, dir.path());
        v1.open().unwrap();
        v1.connection()
            .execute_batch("INSERT INTO item (name) VALUES ('a'); INSERT INTO item (name) VALUES ('b');")
            .unwrap();

        let mut v2 = manager(v1.into_connection(), 2, dir.path());
        let OpenOutcome::Upgraded(report) = v2.open().unwrap() else {
            panic!("expected an upgrade");
        };
        assert!(report.is_clean());
        assert_eq!(report.tables[0].exported, Some(2));
        assert_eq!(report.tables[0].imported, Some(2));
        assert!(dir.path().join("shop.v1.item.csv").is_file());

        let qty: Vec<i64> = v2
            .connection()
            .prepare("SELECT qty FROM item ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(qty, vec![3, 3]);
    }

    #[test]
    fn test_upgrade_ignores_stale_manual_backup() {
        let dir = tempfile::tempdir().unwrap();
        let mut v1 = manager(Connection::open_in_memory().unwrap(), 1, dir.path());
        v1.open().unwrap();
        v1.connection()
            .execute_batch("INSERT INTO item (name) VALUES ('a'); INSERT INTO item (name) VALUES ('b');")
            .unwrap();
        assert_eq!(v1.backup_all_tables(1)[0].exported, Some(2));
        v1.connection().execute("DELETE FROM item", []).unwrap();

        let mut v2 = manager(v1.into_connection(), 2, dir.path());
        let OpenOutcome::Upgraded(report) = v2.open().unwrap() else {
            panic!("expected an upgrade");
        };
        assert!(report.is_clean());
        assert_eq!(report.tables[0].exported, Some(0));
        assert_eq!(report.tables[0].imported, Some(0));
        assert_eq!(v2.status().unwrap().tables[0].row_count, 0);
        assert!(!v2.codec().upgrade_pending(1, "item"));
    }

    #[test]
    fn test_interrupted_upgrade_resumes_from_backup() {
        let dir = tempfile::tempdir().unwrap();
        let mut v1 = manager(Connection::open_in_memory().unwrap(), 1, dir.path());
        v1.open().unwrap();
        v1.connection()
            .execute_batch("INSERT INTO item (name) VALUES ('a'); INSERT INTO item (name) VALUES ('b');")
            .unwrap();
        v1.backup_all_tables(1);
        // State left behind by a run that dropped and recreated the table.
        v1.codec().mark_upgrade_pending(1, "item").unwrap();
        v1.connection().execute("DELETE FROM item", []).unwrap();

        let mut v2 = manager(v1.into_connection(), 2, dir.path());
        let OpenOutcome::Upgraded(report) = v2.open().unwrap() else {
            panic!("expected an upgrade");
        };
        assert!(report.is_clean());
        assert_eq!(report.tables[0].exported, None);
        assert_eq!(report.tables[0].imported, Some(2));
        assert_eq!(v2.status().unwrap().tables[0].row_count, 2);
        assert!(!v2.codec().upgrade_pending(1, "item"));
    }

    fn two_tables(version: u32) -> SchemaDescriptor {
        let registry = ConverterRegistry::with_builtins();
        let item = if version >= 2 {
            TableDescriptor::builder("item", &registry)
                .id("id")
                .field::<String>("name")
                .field::<i32>("qty")
                .build()
        } else {
            TableDescriptor::builder("item", &registry)
                .id("id")
                .field::<String>("name")
                .field::<String>("qty")
                .build()
        };
        let tag = TableDescriptor::builder("tag", &registry)
            .id("id")
            .field::<String>("label")
            .build()
            .unwrap();
        let mut schema = SchemaDescriptor::new("shop", version).unwrap();
        schema.add_table(item.unwrap()).unwrap();
        schema.add_table(tag).unwrap();
        schema
    }

    #[test]
    fn test_failed_table_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let codec = MigrationCodec::new(dir.path(), "shop");
        let mut v1 = SchemaManager::new(Connection::open_in_memory().unwrap(), two_tables(1), codec.clone()).unwrap();
        v1.open().unwrap();
        v1.connection()
            .execute_batch(
                "INSERT INTO item (name, qty) VALUES ('bolt', 'lots');
                 INSERT INTO tag (label) VALUES ('x'); INSERT INTO tag (label) VALUES ('y');",
            )
            .unwrap();

        let mut v2 = SchemaManager::new(v1.into_connection(), two_tables(2), codec).unwrap();
        let OpenOutcome::Upgraded(report) = v2.open().unwrap() else {
            panic!("expected an upgrade");
        };
        let failures: Vec<_> = report.failures().map(|t| t.table.as_str()).collect();
        assert_eq!(failures, vec!["item"]);
        assert_eq!(report.tables[1].exported, Some(2));
        assert_eq!(report.tables[1].imported, Some(2));
        assert_eq!(v2.stored_version().unwrap(), 1);

        let status = v2.status().unwrap();
        assert_eq!(status.tables[1].row_count, 2);
        assert_eq!(status.tables[0].row_count, 0);
        assert!(v2.codec().upgrade_pending(1, "item"));
        assert!(!v2.codec().upgrade_pending(1, "tag"));

        // The retry reads the kept backup instead of exporting the empty table.
        let OpenOutcome::Upgraded(retry) = v2.open().unwrap() else {
            panic!("expected an upgrade");
        };
        assert_eq!(retry.tables[0].exported, None);
        assert!(retry.tables[0].error.is_some());
        assert_eq!(retry.tables[1].imported, Some(2));
        assert_eq!(v2.stored_version().unwrap(), 1);
    }

    #[test]
    fn test_upgrade_creates_table_new_in_this_version() {
        let dir = tempfile::tempdir().unwrap();
        let codec = MigrationCodec::new(dir.path(), "shop");
        let mut v1 = manager(Connection::open_in_memory().unwrap(), 1, dir.path());
        v1.open().unwrap();
        v1.connection()
            .execute_batch("INSERT INTO item (name) VALUES ('a')")
            .unwrap();

        let mut v2 = SchemaManager::new(v1.into_connection(), two_tables(2), codec).unwrap();
        let OpenOutcome::Upgraded(report) = v2.open().unwrap() else {
            panic!("expected an upgrade");
        };
        assert!(report.is_clean());
        assert_eq!(report.tables[0].imported, Some(1));
        assert_eq!(report.tables[1].exported, None);
        assert_eq!(v2.stored_version().unwrap(), 2);

        let status = v2.status().unwrap();
        assert!(status.tables[1].exists);
        assert_eq!(status.tables[1].row_count, 0);
        let qty: i64 = v2
            .connection()
            .query_row("SELECT qty FROM item", [], |r| r.get(0))
            .unwrap();
        assert_eq!(qty, 0);
    }

    #[test]
    fn test_recreate_empty_discards_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut v1 = manager(Connection::open_in_memory().unwrap(), 1, dir.path());
        v1.open().unwrap();
        v1.connection()
            .execute_batch("INSERT INTO item (name) VALUES ('a')")
            .unwrap();

        let mut v2 = manager(v1.into_connection(), 2, dir.path()).with_strategy(UpgradeStrategy::RecreateEmpty);
        v2.open().unwrap();
        assert_eq!(v2.status().unwrap().tables[0].row_count, 0);
    }

    #[test]
    fn test_custom_strategy_runs_alter_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let mut v1 = manager(Connection::open_in_memory().unwrap(), 1, dir.path());
        v1.open().unwrap();
        v1.connection()
            .execute_batch("INSERT INTO item (name) VALUES ('a')")
            .unwrap();

        let mut v2 = manager(v1.into_connection(), 2, dir.path()).with_strategy(UpgradeStrategy::Custom);
        let OpenOutcome::Upgraded(report) = v2.open().unwrap() else {
            panic!("expected an upgrade");
        };
        assert!(report.is_clean());
        let qty: i64 = v2
            .connection()
            .query_row("SELECT qty FROM item", [], |r| r.get(0))
            .unwrap();
        assert_eq!(qty, 3);
        assert!(!dir.path().join("shop.v1.item.csv").exists());
    }

    struct CountingHooks(Arc<AtomicUsize>);

    impl TableHooks for CountingHooks {
        fn on_create(&self, conn: &Connection, table: &TableDescriptor) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            DefaultHooks.on_create(conn, table)
        }
    }

    #[test]
    fn test_custom_hooks_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut m = manager(Connection::open_in_memory().unwrap(), 1, dir.path())
            .with_hooks("item", CountingHooks(Arc::clone(&calls)))
            .unwrap();
        m.open().unwrap();
        m.drop_and_create().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let unknown = manager(Connection::open_in_memory().unwrap(), 1, dir.path())
            .with_hooks("nope", DefaultHooks);
        assert!(unknown.is_err());
    }

    #[test]
    fn test_status_and_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(Connection::open_in_memory().unwrap(), 1, dir.path());
        let before = m.status().unwrap();
        assert_eq!(before.stored_version, 0);
        assert!(!before.tables[0].exists);

        m.open().unwrap();
        let after = m.status().unwrap();
        assert!(after.is_current());
        assert!(after.tables[0].exists);

        m.on_drop().unwrap();
        assert_eq!(m.stored_version().unwrap(), 0);
        assert!(!m.status().unwrap().tables[0].exists);
    }

    #[test]
    fn test_backup_and_restore_all() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(Connection::open_in_memory().unwrap(), 1, dir.path());
        m.open().unwrap();
        m.connection()
            .execute_batch("INSERT INTO item (name) VALUES ('x')")
            .unwrap();

        let backup = m.backup_all_tables(1);
        assert_eq!(backup[0].exported, Some(1));

        m.drop_and_create().unwrap();
        let restore = m.restore_all_tables(1);
        assert_eq!(restore[0].imported, Some(1));
        assert!(m.restore_all_tables(9)[0].imported.is_none());
    }
}
