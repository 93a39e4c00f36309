//! Glue between application records and stored rows.
//!
//! An [`Entity`] describes its table and moves its fields in and out of a
//! row of [`SqlValue`]s in the descriptor's field order. [`RowWriter`] and
//! [`RowReader`] do the per-field conversion through the registry.
//!
//! # Examples
//!
//! ```
//! use record_store_core::*;
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Note {
//!     id: i64,
//!     title: String,
//!     stars: Option<i32>,
//! }
//!
//! impl Entity for Note {
//!     fn describe(registry: &ConverterRegistry) -> Result<TableDescriptor> {
//!         TableDescriptor::builder("note", registry)
//!             .id("id")
//!             .field::<String>("title")
//!             .nullable::<i32>("stars")
//!             .build()
//!     }
//!
//!     fn id(&self) -> i64 {
//!         self.id
//!     }
//!
//!     fn set_id(&mut self, id: i64) {
//!         self.id = id;
//!     }
//!
//!     fn to_row(&self, registry: &ConverterRegistry) -> Result<Vec<SqlValue>> {
//!         let mut row = RowWriter::new(registry);
//!         row.push(&self.id)?.push(&self.title)?.push_opt(self.stars.as_ref())?;
//!         Ok(row.finish())
//!     }
//!
//!     fn from_row(registry: &ConverterRegistry, row: &[SqlValue]) -> Result<Self> {
//!         let mut row = RowReader::new(registry, row);
//!         Ok(Note {
//!             id: row.next()?,
//!             title: row.next()?,
//!             stars: row.next_opt()?,
//!         })
//!     }
//! }
//!
//! let registry = ConverterRegistry::with_builtins();
//! let note = Note { id: 3, title: "hi".into(), stars: None };
//! let row = note.to_row(&registry).unwrap();
//! assert_eq!(row[2], SqlValue::Null);
//! assert_eq!(Note::from_row(&registry, &row).unwrap(), note);
//! ```

use crate::convert::ConverterRegistry;
use crate::error::{CoreError, Result};
use crate::table::TableDescriptor;
use crate::types::SqlValue;

/// An application record persisted in one table.
///
/// `Default` must produce the freshly constructed, unpopulated record: its
/// field values become the table's declared defaults, and by-example
/// queries ignore fields still holding them.
pub trait Entity: Default + Sized {
    /// Describes the table without defaults applied.
    fn describe(registry: &ConverterRegistry) -> Result<TableDescriptor>;

    /// Current identity. `0` means not yet stored.
    fn id(&self) -> i64;

    /// Writes back an assigned identity.
    fn set_id(&mut self, id: i64);

    /// Stored values in descriptor field order.
    fn to_row(&self, registry: &ConverterRegistry) -> Result<Vec<SqlValue>>;

    /// Rebuilds a record from stored values in descriptor field order.
    fn from_row(registry: &ConverterRegistry, row: &[SqlValue]) -> Result<Self>;

    /// Describes the table with defaults taken from `Self::default()`.
    fn table_descriptor(registry: &ConverterRegistry) -> Result<TableDescriptor> {
        let table = Self::describe(registry)?;
        let defaults = Self::default().to_row(registry)?;
        table.with_defaults(defaults)
    }
}

/// Accumulates stored values for [`Entity::to_row`].
pub struct RowWriter<'r> {
    registry: &'r ConverterRegistry,
    values: Vec<SqlValue>,
}

impl<'r> RowWriter<'r> {
    /// Starts an empty row.
    pub fn new(registry: &'r ConverterRegistry) -> Self {
        Self {
            registry,
            values: Vec::new(),
        }
    }

    /// Appends a value converted by the registered converter for `T`.
    pub fn push<T: 'static>(&mut self, value: &T) -> Result<&mut Self> {
        let stored = self.registry.converter::<T>()?.to_sql(value)?;
        self.values.push(stored);
        Ok(self)
    }

    /// Appends an optional value, `None` as `NULL`.
    pub fn push_opt<T: 'static>(&mut self, value: Option<&T>) -> Result<&mut Self> {
        let stored = self.registry.converter::<T>()?.to_sql_opt(value)?;
        self.values.push(stored);
        Ok(self)
    }

    /// Returns the accumulated values.
    pub fn finish(self) -> Vec<SqlValue> {
        self.values
    }
}

/// Reads stored values in order for [`Entity::from_row`].
pub struct RowReader<'r, 'a> {
    registry: &'r ConverterRegistry,
    row: &'a [SqlValue],
    pos: usize,
}

impl<'r, 'a> RowReader<'r, 'a> {
    /// Starts reading at the first value.
    pub fn new(registry: &'r ConverterRegistry, row: &'a [SqlValue]) -> Self {
        Self { registry, row, pos: 0 }
    }

    fn take(&mut self) -> Result<&'a SqlValue> {
        let value = self.row.get(self.pos).ok_or_else(|| {
            CoreError::ConversionError(format!("row has only {} values", self.row.len()))
        })?;
        self.pos += 1;
        Ok(value)
    }

    /// Converts the next value into `T`.
    pub fn next<T: 'static>(&mut self) -> Result<T> {
        let value = self.take()?;
        self.registry.converter::<T>()?.from_sql(value)
    }

    /// Converts the next value into `Option<T>`, `NULL` as `None`.
    pub fn next_opt<T: 'static>(&mut self) -> Result<Option<T>> {
        let value = self.take()?;
        self.registry.converter::<T>()?.from_sql_opt(value)
    }
}
