//! Value and type primitives shared by every layer of the store.
//!
//! [`SqlValue`] is the storage-level representation of a single column
//! value, [`StorageClass`] names the four column representations SQLite
//! supports natively, and [`FieldType`] is the semantic type tag that keys
//! the [`ConverterRegistry`](crate::ConverterRegistry).

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Column representation in the underlying store.
///
/// # Examples
///
/// ```
/// use record_store_core::StorageClass;
///
/// assert_eq!(StorageClass::Real.sql_name(), "REAL");
/// assert!(StorageClass::Integer.supports_equality());
/// assert!(!StorageClass::Blob.supports_equality());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageClass {
    /// Signed 64-bit integer.
    Integer,
    /// IEEE-754 double.
    Real,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
}

impl StorageClass {
    /// Returns the SQL type name used in `CREATE TABLE` statements.
    pub fn sql_name(self) -> &'static str {
        match self {
            StorageClass::Integer => "INTEGER",
            StorageClass::Real => "REAL",
            StorageClass::Text => "TEXT",
            StorageClass::Blob => "BLOB",
        }
    }

    /// Whether exact-match predicates are accepted for this class. Only
    /// `INTEGER` and `TEXT` columns qualify.
    pub fn supports_equality(self) -> bool {
        matches!(self, StorageClass::Integer | StorageClass::Text)
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// A single stored column value.
///
/// Equality compares `Real` values by bit pattern, so `NaN == NaN` and
/// `0.0 != -0.0`. This is the comparison used to decide whether a record
/// field still holds its declared default.
#[derive(Debug, Clone, Default)]
pub enum SqlValue {
    /// SQL `NULL`.
    #[default]
    Null,
    /// Integer storage class.
    Integer(i64),
    /// Real storage class.
    Real(f64),
    /// Text storage class.
    Text(String),
    /// Blob storage class.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns `true` for [`SqlValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Storage class of the value, or `None` for `NULL`.
    pub fn storage_class(&self) -> Option<StorageClass> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(_) => Some(StorageClass::Integer),
            SqlValue::Real(_) => Some(StorageClass::Real),
            SqlValue::Text(_) => Some(StorageClass::Text),
            SqlValue::Blob(_) => Some(StorageClass::Blob),
        }
    }

    /// Returns the integer payload, if any.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the real payload, widening integers the way SQLite does.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            SqlValue::Real(v) => Some(*v),
            SqlValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the blob payload, if any.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Blob(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => true,
            (SqlValue::Integer(a), SqlValue::Integer(b)) => a == b,
            (SqlValue::Real(a), SqlValue::Real(b)) => a.to_bits() == b.to_bits(),
            (SqlValue::Text(a), SqlValue::Text(b)) => a == b,
            (SqlValue::Blob(a), SqlValue::Blob(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Semantic type tag of a record field.
///
/// Two tags are equal when they name the same Rust type. The readable name
/// is kept for error messages only.
///
/// # Examples
///
/// ```
/// use record_store_core::FieldType;
///
/// assert_eq!(FieldType::of::<i32>(), FieldType::of::<i32>());
/// assert_ne!(FieldType::of::<i32>(), FieldType::of::<i64>());
/// assert_eq!(FieldType::of::<f64>().name(), "f64");
/// ```
#[derive(Clone, Copy)]
pub struct FieldType {
    id: TypeId,
    name: &'static str,
}

impl FieldType {
    /// Returns the tag for the Rust type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Fully qualified Rust type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Underlying [`TypeId`].
    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for FieldType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FieldType {}

impl Hash for FieldType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldType({})", self.name)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Policy for reconciling on-disk tables with a newer declared schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStrategy {
    /// Drop and recreate every table. Existing rows are discarded.
    RecreateEmpty,
    /// Export every table to the interchange format, recreate it, and
    /// import the rows back, matching columns by name (the default).
    #[default]
    BackupRestore,
    /// Run each table's upgrade hook (alter statements by default).
    Custom,
}
