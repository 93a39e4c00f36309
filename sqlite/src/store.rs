//! Typed CRUD over one table.
//!
//! [`RecordStore`] borrows a connection, a registry, and a descriptor, and
//! moves [`Entity`] values in and out of the table. Reads go through
//! [`RecordStore::query`], which confines the open statement to a closure
//! so it is released on every exit path.
//!
//! # Example
//!
//! ```no_run
//! # use record_store_core::*;
//! # #[derive(Default)]
//! # struct Note { id: i64, title: String }
//! # impl Entity for Note {
//! #     fn describe(r: &ConverterRegistry) -> Result<TableDescriptor> {
//! #         TableDescriptor::builder("note", r).id("id").field::<String>("title").build()
//! #     }
//! #     fn id(&self) -> i64 { self.id }
//! #     fn set_id(&mut self, id: i64) { self.id = id }
//! #     fn to_row(&self, r: &ConverterRegistry) -> Result<Vec<SqlValue>> {
//! #         let mut w = RowWriter::new(r); w.push(&self.id)?.push(&self.title)?; Ok(w.finish())
//! #     }
//! #     fn from_row(r: &ConverterRegistry, row: &[SqlValue]) -> Result<Self> {
//! #         let mut rd = RowReader::new(r, row); Ok(Note { id: rd.next()?, title: rd.next()? })
//! #     }
//! # }
//! use record_store_sqlite::RecordStore;
//! use rusqlite::Connection;
//!
//! let registry = ConverterRegistry::with_builtins();
//! let table = Note::table_descriptor(&registry).unwrap();
//! let conn = Connection::open("notes.db").unwrap();
//! let notes = RecordStore::<Note>::new(&conn, &registry, &table);
//!
//! let mut note = Note { id: 0, title: "first".into() };
//! notes.insert(&mut note).unwrap();
//! assert_ne!(note.id, 0);
//!
//! let title = notes.column("title").unwrap();
//! let found = notes.filter().eq(&title, &"first".to_string()).unwrap().list().unwrap();
//! assert_eq!(found.len(), 1);
//! ```

use std::marker::PhantomData;

use record_store_core::{Column, ConverterRegistry, CoreError, Entity, SqlValue, TableDescriptor};
use rusqlite::{Connection, Rows, params_from_iter};

use crate::convert::{Bind, read_row};
use crate::error::{Result, SqliteError};
use crate::query::QueryBuilder;
use crate::schema::count_rows;

/// Typed access to the table described by `table`.
pub struct RecordStore<'a, E> {
    conn: &'a Connection,
    registry: &'a ConverterRegistry,
    table: &'a TableDescriptor,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Clone for RecordStore<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for RecordStore<'_, E> {}

impl<'a, E: Entity> RecordStore<'a, E> {
    /// Creates a store over an existing table.
    pub fn new(conn: &'a Connection, registry: &'a ConverterRegistry, table: &'a TableDescriptor) -> Self {
        Self {
            conn,
            registry,
            table,
            _marker: PhantomData,
        }
    }

    /// The table descriptor.
    pub fn table(&self) -> &'a TableDescriptor {
        self.table
    }

    /// The converter registry.
    pub fn registry(&self) -> &'a ConverterRegistry {
        self.registry
    }

    /// The connection.
    pub fn connection(&self) -> &'a Connection {
        self.conn
    }

    /// Column reference for a declared field.
    pub fn column(&self, name: &str) -> Result<Column> {
        Ok(self.table.column(name)?)
    }

    /// Starts a filtered query.
    pub fn filter(&self) -> QueryBuilder<'a, E> {
        QueryBuilder::new(*self)
    }

    fn row_of(&self, record: &E) -> Result<Vec<SqlValue>> {
        let row = record.to_row(self.registry)?;
        if row.len() != self.table.fields().len() {
            return Err(CoreError::ConversionError(format!(
                "record produced {} values for {} fields of table '{}'",
                row.len(),
                self.table.fields().len(),
                self.table.name()
            ))
            .into());
        }
        Ok(row)
    }

    /// Inserts on `conn` and returns the row id. An identity of `0` is left
    /// out so the database assigns one.
    fn insert_row(&self, conn: &Connection, record: &E) -> Result<i64> {
        let row = self.row_of(record)?;
        let identity = self.table.identity_index();
        let omit_identity = record.id() == 0;
        let (columns, values): (Vec<&str>, Vec<&SqlValue>) = self
            .table
            .fields()
            .iter()
            .zip(&row)
            .enumerate()
            .filter(|(i, _)| !(omit_identity && *i == identity))
            .map(|(_, (field, value))| (field.name(), value))
            .unzip();
        let marks = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({marks})",
            self.table.name(),
            columns.join(", ")
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(values.into_iter().map(Bind)))?;
        Ok(conn.last_insert_rowid())
    }

    /// Inserts a record and writes the assigned identity back into it.
    pub fn insert(&self, record: &mut E) -> Result<i64> {
        let id = self.insert_row(self.conn, record)?;
        record.set_id(id);
        Ok(id)
    }

    /// Inserts all records in one transaction.
    ///
    /// Identities are written back only after the transaction commits.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::BatchFailed`] with the index of the first
    /// failing record; nothing is inserted in that case.
    pub fn insert_many(&self, records: &mut [E]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut ids = Vec::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            let id = self
                .insert_row(&tx, record)
                .map_err(|e| SqliteError::BatchFailed {
                    table: self.table.name().to_string(),
                    row,
                    source: Box::new(e),
                })?;
            ids.push(id);
        }
        tx.commit()?;
        for (record, id) in records.iter_mut().zip(ids) {
            record.set_id(id);
        }
        Ok(records.len())
    }

    /// Updates every non-identity column of the row with the record's
    /// identity. Returns rows affected.
    pub fn update(&self, record: &E) -> Result<usize> {
        let row = self.row_of(record)?;
        let identity = self.table.identity_index();
        let mut assignments = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (i, (field, value)) in self.table.fields().iter().zip(&row).enumerate() {
            if i != identity {
                assignments.push(format!("{} = ?", field.name()));
                values.push(value);
            }
        }
        values.push(&row[identity]);
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.table.name(),
            assignments.join(", "),
            self.table.identity().name()
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        Ok(stmt.execute(params_from_iter(values.into_iter().map(Bind)))?)
    }

    /// Inserts records with identity `0` and updates the others. A record
    /// whose identity matches no row is inserted with that identity.
    pub fn save(&self, record: &mut E) -> Result<i64> {
        if record.id() == 0 {
            return self.insert(record);
        }
        if self.update(record)? == 0 {
            self.insert_row(self.conn, record)?;
        }
        Ok(record.id())
    }

    /// Deletes the row with the given identity. `None` deletes nothing.
    pub fn delete(&self, id: Option<i64>) -> Result<usize> {
        let Some(id) = id else {
            return Ok(0);
        };
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            self.table.name(),
            self.table.identity().name()
        );
        Ok(self.conn.prepare_cached(&sql)?.execute([id])?)
    }

    /// Deletes every row. Returns rows affected.
    pub fn delete_all(&self) -> Result<usize> {
        Ok(self
            .conn
            .execute(&format!("DELETE FROM {}", self.table.name()), [])?)
    }

    /// Number of rows in the table.
    pub fn count(&self) -> Result<usize> {
        count_rows(self.conn, self.table)
    }

    /// Loads the record with the given identity.
    pub fn get(&self, id: i64) -> Result<Option<E>> {
        let clause = format!("{} = ?", self.table.identity().name());
        self.query(Some(&clause), &[id.to_string()], None, |cursor| cursor.as_object())
    }

    /// Loads every record in identity order.
    pub fn list_all(&self) -> Result<Vec<E>> {
        let order = self.table.identity().name().to_string();
        self.query(None, &[], Some(&order), |cursor| cursor.as_list())
    }

    /// Loads the single record matching the example's non-default fields.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::TooManyResults`] if several rows match, and
    /// [`CoreError::UnsupportedPredicate`] if a non-default field is stored
    /// as REAL or BLOB.
    pub fn get_by_example(&self, example: &E) -> Result<Option<E>> {
        self.filter().by_example(example)?.get()
    }

    /// Loads every record matching the example's non-default fields.
    pub fn list_by_example(&self, example: &E) -> Result<Vec<E>> {
        self.filter().by_example(example)?.list()
    }

    /// Runs a `SELECT` of the descriptor's columns and hands the cursor to
    /// `f`. The statement lives only for the duration of the call.
    ///
    /// `where_clause` and `order_by` are inserted verbatim; `params` bind
    /// the `?` placeholders of `where_clause` in order.
    pub fn query<T, F>(&self, where_clause: Option<&str>, params: &[String], order_by: Option<&str>, f: F) -> Result<T>
    where
        F: FnOnce(&mut Cursor<'_, E>) -> Result<T>,
    {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.table.column_names().join(", "),
            self.table.name()
        );
        if let Some(clause) = where_clause.filter(|c| !c.trim().is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
        if let Some(order) = order_by.filter(|o| !o.trim().is_empty()) {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query(params_from_iter(params.iter()))?;
        let mut cursor = Cursor {
            rows,
            registry: self.registry,
            table: self.table,
            _marker: PhantomData,
        };
        f(&mut cursor)
    }
}

/// Rows of a running query, converted on demand.
pub struct Cursor<'s, E> {
    rows: Rows<'s>,
    registry: &'s ConverterRegistry,
    table: &'s TableDescriptor,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Cursor<'_, E> {
    /// Next row in stored form.
    pub fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>> {
        match self.rows.next()? {
            Some(row) => Ok(Some(read_row(row, self.table.fields().len())?)),
            None => Ok(None),
        }
    }

    /// Next row as a record.
    pub fn next_record(&mut self) -> Result<Option<E>> {
        match self.next_row()? {
            Some(row) => Ok(Some(E::from_row(self.registry, &row)?)),
            None => Ok(None),
        }
    }

    /// Collects the remaining rows.
    pub fn as_list(&mut self) -> Result<Vec<E>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    /// Returns the only remaining row, or `None` when there is none.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::TooManyResults`] with the total row count when
    /// more than one row remains.
    pub fn as_object(&mut self) -> Result<Option<E>> {
        let Some(first) = self.next_record()? else {
            return Ok(None);
        };
        let mut count = 1;
        while self.rows.next()?.is_some() {
            count += 1;
        }
        if count > 1 {
            return Err(SqliteError::TooManyResults {
                table: self.table.name().to_string(),
                count,
            });
        }
        Ok(Some(first))
    }
}

impl<E: Entity> Iterator for Cursor<'_, E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
