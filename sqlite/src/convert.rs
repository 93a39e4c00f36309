//! Conversion between [`SqlValue`] and rusqlite values.
//!
//! Statements bind values through [`Bind`] and rows are read back into
//! [`SqlValue`]s by [`read_row`]; nothing above this module touches
//! rusqlite's value types directly.

use record_store_core::{CoreError, SqlValue};
use rusqlite::Row;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

use crate::error::Result;

/// Borrows a stored value as a bindable rusqlite value.
pub(crate) fn as_value_ref(value: &SqlValue) -> ValueRef<'_> {
    match value {
        SqlValue::Null => ValueRef::Null,
        SqlValue::Integer(v) => ValueRef::Integer(*v),
        SqlValue::Real(v) => ValueRef::Real(*v),
        SqlValue::Text(v) => ValueRef::Text(v.as_bytes()),
        SqlValue::Blob(v) => ValueRef::Blob(v),
    }
}

/// Binds a borrowed [`SqlValue`] as a statement parameter.
pub(crate) struct Bind<'v>(pub(crate) &'v SqlValue);

impl ToSql for Bind<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(as_value_ref(self.0)))
    }
}

/// Copies a rusqlite value into a [`SqlValue`].
///
/// # Errors
///
/// Returns [`CoreError::ConversionError`] for text that is not valid UTF-8.
pub(crate) fn from_value_ref(value: ValueRef<'_>) -> Result<SqlValue> {
    Ok(match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(bytes) => SqlValue::Text(
            String::from_utf8(bytes.to_vec())
                .map_err(|e| CoreError::ConversionError(format!("stored text is not UTF-8: {e}")))?,
        ),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    })
}

/// Reads the first `width` columns of a row.
pub(crate) fn read_row(row: &Row<'_>, width: usize) -> Result<Vec<SqlValue>> {
    (0..width)
        .map(|i| from_value_ref(row.get_ref(i)?))
        .collect()
}
