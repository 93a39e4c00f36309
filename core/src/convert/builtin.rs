use std::marker::PhantomData;

use chrono::{DateTime, Utc};

use super::TypeConverter;
use crate::error::{CoreError, Result};
use crate::interchange::{decode_f32, decode_f64, encode_f32, encode_f64};
use crate::types::{SqlValue, StorageClass};

fn unexpected(expected: StorageClass, value: &SqlValue) -> CoreError {
    match value.storage_class() {
        Some(actual) => {
            CoreError::ConversionError(format!("expected {expected} value, found {actual}"))
        }
        None => CoreError::ConversionError(format!("expected {expected} value, found NULL")),
    }
}

fn integer(value: &SqlValue) -> Result<i64> {
    value
        .as_integer()
        .ok_or_else(|| unexpected(StorageClass::Integer, value))
}

fn parse_integer(text: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|e| CoreError::ConversionError(format!("invalid integer '{text}': {e}")))
}

/// `bool` stored as `0`/`1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolConverter;

impl TypeConverter for BoolConverter {
    type Value = bool;

    fn storage_class(&self) -> StorageClass {
        StorageClass::Integer
    }

    fn to_sql(&self, value: &bool) -> Result<SqlValue> {
        Ok(SqlValue::Integer(i64::from(*value)))
    }

    fn from_sql(&self, value: &SqlValue) -> Result<bool> {
        Ok(integer(value)? != 0)
    }

    fn from_text(&self, text: &str) -> Result<SqlValue> {
        match text.trim() {
            "1" | "true" => Ok(SqlValue::Integer(1)),
            "0" | "false" => Ok(SqlValue::Integer(0)),
            other => Err(CoreError::ConversionError(format!(
                "invalid boolean '{other}'"
            ))),
        }
    }
}

macro_rules! integer_converter {
    ($(#[$doc:meta])* $name:ident, $ty:ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl TypeConverter for $name {
            type Value = $ty;

            fn storage_class(&self) -> StorageClass {
                StorageClass::Integer
            }

            fn to_sql(&self, value: &$ty) -> Result<SqlValue> {
                Ok(SqlValue::Integer(i64::from(*value)))
            }

            fn from_sql(&self, value: &SqlValue) -> Result<$ty> {
                let raw = integer(value)?;
                <$ty>::try_from(raw).map_err(|_| {
                    CoreError::ConversionError(format!(
                        "{raw} out of range for {}",
                        stringify!($ty)
                    ))
                })
            }

            fn from_text(&self, text: &str) -> Result<SqlValue> {
                let stored = SqlValue::Integer(parse_integer(text)?);
                self.from_sql(&stored)?;
                Ok(stored)
            }
        }
    };
}

integer_converter!(
    /// `i8` (byte) stored as an integer.
    I8Converter,
    i8
);
integer_converter!(
    /// `i16` (short) stored as an integer.
    I16Converter,
    i16
);
integer_converter!(
    /// `i32` (int) stored as an integer.
    I32Converter,
    i32
);
integer_converter!(
    /// `i64` (long) stored as an integer.
    I64Converter,
    i64
);

/// `char` stored as its code point.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharConverter;

impl TypeConverter for CharConverter {
    type Value = char;

    fn storage_class(&self) -> StorageClass {
        StorageClass::Integer
    }

    fn to_sql(&self, value: &char) -> Result<SqlValue> {
        Ok(SqlValue::Integer(i64::from(u32::from(*value))))
    }

    fn from_sql(&self, value: &SqlValue) -> Result<char> {
        let raw = integer(value)?;
        u32::try_from(raw)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| CoreError::ConversionError(format!("{raw} is not a valid code point")))
    }
}

/// `f32` stored as a real; interchange text is the 8 hex digits of its bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct F32Converter;

impl TypeConverter for F32Converter {
    type Value = f32;

    fn storage_class(&self) -> StorageClass {
        StorageClass::Real
    }

    fn to_sql(&self, value: &f32) -> Result<SqlValue> {
        Ok(SqlValue::Real(f64::from(*value)))
    }

    fn from_sql(&self, value: &SqlValue) -> Result<f32> {
        value
            .as_real()
            .map(|v| v as f32)
            .ok_or_else(|| unexpected(StorageClass::Real, value))
    }

    fn to_text(&self, stored: &SqlValue) -> Result<Option<String>> {
        match stored {
            SqlValue::Null => Ok(None),
            other => Ok(Some(encode_f32(self.from_sql(other)?))),
        }
    }

    fn from_text(&self, text: &str) -> Result<SqlValue> {
        Ok(SqlValue::Real(f64::from(decode_f32(text)?)))
    }
}

/// `f64` stored as a real; interchange text is the 16 hex digits of its bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct F64Converter;

impl TypeConverter for F64Converter {
    type Value = f64;

    fn storage_class(&self) -> StorageClass {
        StorageClass::Real
    }

    fn to_sql(&self, value: &f64) -> Result<SqlValue> {
        Ok(SqlValue::Real(*value))
    }

    fn from_sql(&self, value: &SqlValue) -> Result<f64> {
        value
            .as_real()
            .ok_or_else(|| unexpected(StorageClass::Real, value))
    }

    fn to_text(&self, stored: &SqlValue) -> Result<Option<String>> {
        match stored {
            SqlValue::Null => Ok(None),
            other => Ok(Some(encode_f64(self.from_sql(other)?))),
        }
    }

    fn from_text(&self, text: &str) -> Result<SqlValue> {
        Ok(SqlValue::Real(decode_f64(text)?))
    }
}

/// `String` stored verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter;

impl TypeConverter for StringConverter {
    type Value = String;

    fn storage_class(&self) -> StorageClass {
        StorageClass::Text
    }

    fn to_sql(&self, value: &String) -> Result<SqlValue> {
        Ok(SqlValue::Text(value.clone()))
    }

    fn from_sql(&self, value: &SqlValue) -> Result<String> {
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| unexpected(StorageClass::Text, value))
    }
}

/// `Vec<u8>` stored as a blob; interchange text is base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobConverter;

impl TypeConverter for BlobConverter {
    type Value = Vec<u8>;

    fn storage_class(&self) -> StorageClass {
        StorageClass::Blob
    }

    fn to_sql(&self, value: &Vec<u8>) -> Result<SqlValue> {
        Ok(SqlValue::Blob(value.clone()))
    }

    fn from_sql(&self, value: &SqlValue) -> Result<Vec<u8>> {
        value
            .as_blob()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| unexpected(StorageClass::Blob, value))
    }
}

/// `DateTime<Utc>` stored as milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateConverter;

impl TypeConverter for DateConverter {
    type Value = DateTime<Utc>;

    fn storage_class(&self) -> StorageClass {
        StorageClass::Integer
    }

    fn to_sql(&self, value: &DateTime<Utc>) -> Result<SqlValue> {
        Ok(SqlValue::Integer(value.timestamp_millis()))
    }

    fn from_sql(&self, value: &SqlValue) -> Result<DateTime<Utc>> {
        let millis = integer(value)?;
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| CoreError::ConversionError(format!("{millis} ms is out of range")))
    }
}

/// Enum types stored and exchanged by variant name.
///
/// # Examples
///
/// ```
/// use record_store_core::{ConverterRegistry, EnumValue, SqlValue};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Default)]
/// enum Mood { #[default] Calm, Loud }
///
/// impl EnumValue for Mood {
///     fn name(&self) -> &'static str {
///         match self { Mood::Calm => "CALM", Mood::Loud => "LOUD" }
///     }
///     fn from_name(name: &str) -> Option<Self> {
///         match name { "CALM" => Some(Mood::Calm), "LOUD" => Some(Mood::Loud), _ => None }
///     }
/// }
///
/// let mut registry = ConverterRegistry::with_builtins();
/// registry.register_enum::<Mood>().unwrap();
/// let moods = registry.converter::<Mood>().unwrap();
/// assert_eq!(moods.to_sql(&Mood::Loud).unwrap(), SqlValue::Text("LOUD".into()));
/// assert_eq!(moods.to_param(&Mood::Loud).unwrap(), "LOUD");
/// ```
pub trait EnumValue: Sized + 'static {
    /// Stable name of the variant.
    fn name(&self) -> &'static str;

    /// Parses a name produced by [`name`](Self::name).
    fn from_name(name: &str) -> Option<Self>;
}

/// Name-based converter for any [`EnumValue`].
pub struct EnumConverter<E> {
    _marker: PhantomData<fn() -> E>,
}

impl<E> EnumConverter<E> {
    /// Creates the converter.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E> Default for EnumConverter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EnumValue> TypeConverter for EnumConverter<E> {
    type Value = E;

    fn storage_class(&self) -> StorageClass {
        StorageClass::Text
    }

    fn to_sql(&self, value: &E) -> Result<SqlValue> {
        Ok(SqlValue::Text(value.name().to_string()))
    }

    fn from_sql(&self, value: &SqlValue) -> Result<E> {
        let name = value
            .as_text()
            .ok_or_else(|| unexpected(StorageClass::Text, value))?;
        E::from_name(name).ok_or_else(|| {
            CoreError::ConversionError(format!(
                "'{name}' is not a variant of {}",
                std::any::type_name::<E>()
            ))
        })
    }

    fn from_text(&self, text: &str) -> Result<SqlValue> {
        let stored = SqlValue::Text(text.to_string());
        self.from_sql(&stored)?;
        Ok(stored)
    }
}
