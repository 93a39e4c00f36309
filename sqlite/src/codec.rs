//! Table export and import in the interchange text format.
//!
//! [`MigrationCodec`] names backup files and moves whole tables between a
//! connection and those files. Export writes the header in on-disk column
//! order and encodes each value with the converter of the same-named field
//! in the current descriptor. Import matches source columns to declared
//! fields by exact name, so columns may be added, removed, or reordered
//! between the version that wrote a file and the version reading it.
//!
//! # Example
//!
//! ```no_run
//! use record_store_core::{ConverterRegistry, TableDescriptor};
//! use record_store_sqlite::MigrationCodec;
//! use rusqlite::Connection;
//!
//! let registry = ConverterRegistry::with_builtins();
//! let table = TableDescriptor::builder("note", &registry)
//!     .id("id")
//!     .field::<String>("title")
//!     .build()
//!     .unwrap();
//!
//! let conn = Connection::open("notes.db").unwrap();
//! let codec = MigrationCodec::new("backups", "notes");
//! let written = codec.export_table(&conn, &table, 1).unwrap();
//! conn.execute_batch(&format!("{}; {}", table.drop_sql(), table.create_sql())).unwrap();
//! let read = codec.import_table(&conn, &table, 1).unwrap();
//! assert_eq!(written, read);
//! ```

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use record_store_core::interchange::{RecordReader, encode_stored, join_row, split_record};
use record_store_core::{FieldDescriptor, SqlValue, TableDescriptor};
use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::convert::{Bind, read_row};
use crate::error::{Result, SqliteError};

/// Default interchange file suffix.
pub const DEFAULT_SUFFIX: &str = ".csv";

/// Reads and writes table backups under one directory.
#[derive(Debug, Clone)]
pub struct MigrationCodec {
    dir: PathBuf,
    database: String,
    suffix: String,
}

impl MigrationCodec {
    /// Creates a codec storing files for `database` in `dir`.
    pub fn new(dir: impl Into<PathBuf>, database: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            database: database.into(),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }

    /// Replaces the file suffix.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Backup directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a table at a schema version:
    /// `{database}.v{version}.{table}{suffix}`.
    pub fn file_name(&self, version: u32, table: &str) -> String {
        format!("{}.v{version}.{table}{}", self.database, self.suffix)
    }

    /// Full path for a table at a schema version.
    pub fn path_for(&self, version: u32, table: &str) -> PathBuf {
        self.dir.join(self.file_name(version, table))
    }

    /// Temporary file an export writes before renaming into place.
    fn partial_path(&self, version: u32, table: &str) -> PathBuf {
        with_appended_extension(&self.path_for(version, table), "partial")
    }

    /// Marker present while an upgrade of `table` from `version` has
    /// dropped the table but not yet re-imported its backup.
    fn pending_path(&self, version: u32, table: &str) -> PathBuf {
        with_appended_extension(&self.path_for(version, table), "pending")
    }

    /// Exports every row of `table` to its file for `version`.
    ///
    /// The file is written next to its final name and renamed into place,
    /// so an interrupted export never replaces an earlier complete one.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::MigrationIo`] if the directory or file cannot
    /// be created, and query or conversion errors otherwise.
    pub fn export_table(&self, conn: &Connection, table: &TableDescriptor, version: u32) -> Result<usize> {
        let path = self.path_for(version, table.name());
        fs::create_dir_all(&self.dir).map_err(|source| SqliteError::MigrationIo {
            path: self.dir.clone(),
            source,
        })?;

        let partial = self.partial_path(version, table.name());
        let file = File::create(&partial).map_err(|source| SqliteError::MigrationIo {
            path: partial.clone(),
            source,
        })?;
        let written = match export_to_writer(conn, table, BufWriter::new(file)) {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };
        fs::rename(&partial, &path).map_err(|source| SqliteError::MigrationIo {
            path: path.clone(),
            source,
        })?;

        debug!(table = table.name(), rows = written, path = %path.display(), "exported table");
        Ok(written)
    }

    /// Imports the file for `version` into `table`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::MigrationIo`] if the file cannot be opened and
    /// [`SqliteError::BatchFailed`] if any row fails; nothing is inserted in
    /// that case.
    pub fn import_table(&self, conn: &Connection, table: &TableDescriptor, version: u32) -> Result<usize> {
        let path = self.path_for(version, table.name());
        let file = File::open(&path).map_err(|source| SqliteError::MigrationIo {
            path: path.clone(),
            source,
        })?;
        let read = import_from_reader(conn, table, BufReader::new(file))?;
        debug!(table = table.name(), rows = read, path = %path.display(), "imported table");
        Ok(read)
    }

    /// Whether a backup file exists for the table at `version`.
    pub fn has_backup(&self, version: u32, table: &str) -> bool {
        self.path_for(version, table).is_file()
    }

    /// Records that the upgrade of `table` from `version` is about to drop
    /// it; its backup is then the only copy of its rows.
    pub fn mark_upgrade_pending(&self, version: u32, table: &str) -> Result<()> {
        let path = self.pending_path(version, table);
        File::create(&path).map_err(|source| SqliteError::MigrationIo { path, source })?;
        Ok(())
    }

    /// Removes the marker written by [`mark_upgrade_pending`](Self::mark_upgrade_pending).
    pub fn clear_upgrade_pending(&self, version: u32, table: &str) -> Result<()> {
        let path = self.pending_path(version, table);
        match fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(SqliteError::MigrationIo { path, source: e })
            }
            _ => Ok(()),
        }
    }

    /// Whether an earlier upgrade of `table` from `version` stopped between
    /// dropping the table and re-importing its backup.
    pub fn upgrade_pending(&self, version: u32, table: &str) -> bool {
        self.pending_path(version, table).is_file()
    }
}

fn with_appended_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Writes the header and every row of `table` to `writer`.
///
/// Returns the number of rows written.
pub fn export_to_writer<W: Write>(conn: &Connection, table: &TableDescriptor, mut writer: W) -> Result<usize> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", table.name()))?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let fields: Vec<Option<&FieldDescriptor>> = names.iter().map(|n| table.field(n)).collect();

    let header: Vec<Option<String>> = names.iter().cloned().map(Some).collect();
    writeln!(writer, "{}", join_row(&header))?;

    let mut rows = stmt.query([])?;
    let mut written = 0;
    while let Some(row) = rows.next()? {
        let values = read_row(row, names.len())?;
        let mut texts = Vec::with_capacity(values.len());
        for (value, field) in values.iter().zip(&fields) {
            texts.push(match field {
                Some(field) => field.to_text(value)?,
                None => encode_stored(value),
            });
        }
        writeln!(writer, "{}", join_row(&texts))?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Inserts every record read from `reader` into `table`.
///
/// Runs in one transaction with one prepared statement. Returns the number
/// of rows inserted; an empty input inserts nothing.
///
/// # Errors
///
/// Returns [`SqliteError::BatchFailed`] with the zero-based data row index
/// of the first failing record. The transaction is rolled back.
pub fn import_from_reader<R: BufRead>(conn: &Connection, table: &TableDescriptor, reader: R) -> Result<usize> {
    let mut records = RecordReader::new(reader);
    let header = match records.next_record()? {
        Some(header) if !header.trim().is_empty() => header,
        _ => return Ok(0),
    };
    let source: Vec<String> = split_record(&header)
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect();
    let mapping: Vec<Option<usize>> = table
        .fields()
        .iter()
        .map(|f| source.iter().position(|s| s == f.name()))
        .collect();
    for name in source.iter().filter(|s| table.field(s).is_none()) {
        debug!(table = table.name(), column = %name, "ignoring column absent from descriptor");
    }
    let defaults = table.defaults();

    let columns = table.column_names().join(", ");
    let marks = vec!["?"; table.fields().len()].join(", ");
    let sql = format!("INSERT INTO {} ({columns}) VALUES ({marks})", table.name());

    let batch_failed = |row: usize, source: SqliteError| SqliteError::BatchFailed {
        table: table.name().to_string(),
        row,
        source: Box::new(source),
    };

    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(&sql)?;
        loop {
            let record = match records.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => return Err(batch_failed(inserted, e.into())),
            };
            if record.is_empty() {
                continue;
            }
            let tokens = split_record(&record);
            let values = decode_record(table, &mapping, &defaults, &tokens)
                .map_err(|e| batch_failed(inserted, e))?;
            stmt.execute(params_from_iter(values.iter().map(Bind)))
                .map_err(|e| batch_failed(inserted, e.into()))?;
            inserted += 1;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

fn decode_record(
    table: &TableDescriptor,
    mapping: &[Option<usize>],
    defaults: &[SqlValue],
    tokens: &[Option<String>],
) -> Result<Vec<SqlValue>> {
    let mut values = Vec::with_capacity(mapping.len());
    for ((field, source), default) in table.fields().iter().zip(mapping).zip(defaults) {
        let value = match source {
            Some(i) => field.from_text(tokens.get(*i).and_then(|t| t.as_deref()))?,
            None => default.clone(),
        };
        values.push(value);
    }
    Ok(values)
}
