//! Type converters and the registry that maps semantic types to them.
//!
//! A [`TypeConverter`] owns four conversions for one Rust type: value to
//! stored form, stored form to value, stored form to interchange text, and
//! interchange text to stored form. It also encodes predicate parameters.
//! The [`ConverterRegistry`] is built once at startup and passed explicitly
//! to everything that needs it.
//!
//! # Examples
//!
//! ```
//! use record_store_core::{ConverterRegistry, FieldType, SqlValue, StorageClass};
//!
//! let registry = ConverterRegistry::with_builtins();
//! let codec = registry.lookup(FieldType::of::<f64>()).unwrap();
//! assert_eq!(codec.class(), StorageClass::Real);
//!
//! let doubles = registry.converter::<f64>().unwrap();
//! let stored = doubles.to_sql(&1.0).unwrap();
//! assert_eq!(stored, SqlValue::Real(1.0));
//! assert_eq!(doubles.to_text(&stored).unwrap().as_deref(), Some("3ff0000000000000"));
//! ```

mod builtin;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

pub use builtin::{
    BlobConverter, BoolConverter, CharConverter, DateConverter, EnumConverter, EnumValue,
    F32Converter, F64Converter, I8Converter, I16Converter, I32Converter, I64Converter,
    StringConverter,
};

use crate::error::{CoreError, Result};
use crate::interchange::{decode_stored, encode_stored};
use crate::types::{FieldType, SqlValue, StorageClass};

/// Conversions between a Rust value type and its stored and textual forms.
///
/// Implementations must be stateless or immutable; a registry shares them
/// across threads.
pub trait TypeConverter: Send + Sync + 'static {
    /// The semantic type handled by this converter.
    type Value: 'static;

    /// Storage class every stored value of this type uses.
    fn storage_class(&self) -> StorageClass;

    /// Converts a value into its stored form.
    fn to_sql(&self, value: &Self::Value) -> Result<SqlValue>;

    /// Converts a stored value back. `NULL` is an error here; use
    /// [`from_sql_opt`](Self::from_sql_opt) for nullable fields.
    fn from_sql(&self, value: &SqlValue) -> Result<Self::Value>;

    /// Encodes a stored value as interchange text. `NULL` yields `None`.
    fn to_text(&self, stored: &SqlValue) -> Result<Option<String>> {
        Ok(encode_stored(stored))
    }

    /// Decodes interchange text into the stored form.
    fn from_text(&self, text: &str) -> Result<SqlValue> {
        decode_stored(self.storage_class(), text)
    }

    /// Encodes a value as a bound predicate parameter.
    fn to_param(&self, value: &Self::Value) -> Result<String> {
        let stored = self.to_sql(value)?;
        self.to_text(&stored)?.ok_or_else(|| {
            CoreError::ConversionError("cannot bind NULL as a predicate parameter".to_string())
        })
    }

    /// Converts an optional value, mapping `None` to `NULL`.
    fn to_sql_opt(&self, value: Option<&Self::Value>) -> Result<SqlValue> {
        match value {
            Some(v) => self.to_sql(v),
            None => Ok(SqlValue::Null),
        }
    }

    /// Converts a stored value that may be `NULL`.
    fn from_sql_opt(&self, value: &SqlValue) -> Result<Option<Self::Value>> {
        if value.is_null() {
            Ok(None)
        } else {
            self.from_sql(value).map(Some)
        }
    }
}

/// Type-erased view of a converter, enough to move stored values in and out
/// of interchange text without knowing the Rust value type.
pub trait StorageCodec: Send + Sync {
    /// Storage class of the column.
    fn class(&self) -> StorageClass;

    /// Name of the concrete converter type.
    fn converter_name(&self) -> &'static str;

    /// See [`TypeConverter::to_text`].
    fn encode_text(&self, stored: &SqlValue) -> Result<Option<String>>;

    /// See [`TypeConverter::from_text`].
    fn decode_text(&self, text: &str) -> Result<SqlValue>;
}

impl<C: TypeConverter> StorageCodec for C {
    fn class(&self) -> StorageClass {
        self.storage_class()
    }

    fn converter_name(&self) -> &'static str {
        std::any::type_name::<C>()
    }

    fn encode_text(&self, stored: &SqlValue) -> Result<Option<String>> {
        self.to_text(stored)
    }

    fn decode_text(&self, text: &str) -> Result<SqlValue> {
        self.from_text(text)
    }
}

struct Entry {
    converter_id: TypeId,
    converter_name: &'static str,
    codec: Arc<dyn StorageCodec>,
    // Holds an `Arc<dyn TypeConverter<Value = T>>` for the entry's type.
    typed: Box<dyn Any + Send + Sync>,
}

/// Maps each semantic [`FieldType`] to exactly one converter.
#[derive(Default)]
pub struct ConverterRegistry {
    entries: HashMap<FieldType, Entry>,
}

impl ConverterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in converters: `bool`, `i8`,
    /// `i16`, `i32`, `i64`, `char`, `f32`, `f64`, `String`, `Vec<u8>` and
    /// `chrono::DateTime<Utc>`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert(BoolConverter);
        registry.insert(I8Converter);
        registry.insert(I16Converter);
        registry.insert(I32Converter);
        registry.insert(I64Converter);
        registry.insert(CharConverter);
        registry.insert(F32Converter);
        registry.insert(F64Converter);
        registry.insert(StringConverter);
        registry.insert(BlobConverter);
        registry.insert(DateConverter);
        registry
    }

    /// Registers a converter for `C::Value`.
    ///
    /// Registering another instance of the same converter type again is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateConverter`] if a different converter
    /// type already handles `C::Value`.
    pub fn register<C: TypeConverter>(&mut self, converter: C) -> Result<()> {
        let field_type = FieldType::of::<C::Value>();
        if let Some(existing) = self.entries.get(&field_type) {
            if existing.converter_id == TypeId::of::<C>() {
                return Ok(());
            }
            return Err(CoreError::DuplicateConverter {
                field_type: field_type.name().to_string(),
                existing: existing.converter_name.to_string(),
                replacement: std::any::type_name::<C>().to_string(),
            });
        }
        self.insert(converter);
        Ok(())
    }

    /// Registers the name-based converter for an enum type.
    pub fn register_enum<E: EnumValue>(&mut self) -> Result<()> {
        self.register(EnumConverter::<E>::new())
    }

    fn insert<C: TypeConverter>(&mut self, converter: C) {
        let converter = Arc::new(converter);
        let codec: Arc<dyn StorageCodec> = converter.clone();
        let typed: Arc<dyn TypeConverter<Value = C::Value>> = converter;
        self.entries.insert(
            FieldType::of::<C::Value>(),
            Entry {
                converter_id: TypeId::of::<C>(),
                converter_name: std::any::type_name::<C>(),
                codec,
                typed: Box::new(typed),
            },
        );
    }

    /// Returns the type-erased codec for a semantic type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotSupported`] if nothing is registered.
    pub fn lookup(&self, field_type: FieldType) -> Result<Arc<dyn StorageCodec>> {
        self.entries
            .get(&field_type)
            .map(|e| Arc::clone(&e.codec))
            .ok_or_else(|| CoreError::TypeNotSupported(field_type.name().to_string()))
    }

    /// Returns the typed converter for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeNotSupported`] if nothing is registered.
    pub fn converter<T: 'static>(&self) -> Result<Arc<dyn TypeConverter<Value = T>>> {
        let field_type = FieldType::of::<T>();
        self.entries
            .get(&field_type)
            .and_then(|e| e.typed.downcast_ref::<Arc<dyn TypeConverter<Value = T>>>())
            .cloned()
            .ok_or_else(|| CoreError::TypeNotSupported(field_type.name().to_string()))
    }

    /// Whether a converter is registered for the type.
    pub fn contains(&self, field_type: FieldType) -> bool {
        self.entries.contains_key(&field_type)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.entries.keys().map(FieldType::name).collect();
        types.sort_unstable();
        f.debug_struct("ConverterRegistry").field("types", &types).finish()
    }
}
