//! Table and schema descriptors.
//!
//! A [`TableDescriptor`] is the single source of truth for one table: its
//! validated name, its ordered fields, the DDL that creates and drops it,
//! the alter statements that move it between versions, and the declared
//! default of every field. Descriptors are built once at startup through
//! [`TableDescriptor::builder`] and shared behind an `Arc` afterwards.
//!
//! # Examples
//!
//! ```
//! use record_store_core::{ConverterRegistry, SchemaDescriptor, TableDescriptor};
//!
//! let registry = ConverterRegistry::with_builtins();
//! let notes = TableDescriptor::builder("notes", &registry)
//!     .id("id")
//!     .field::<String>("title")
//!     .nullable::<String>("body")
//!     .field::<bool>("pinned")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(
//!     notes.create_sql(),
//!     "CREATE TABLE notes (id INTEGER PRIMARY KEY AUTOINCREMENT, \
//!      title TEXT NOT NULL, body TEXT, pinned INTEGER NOT NULL)"
//! );
//!
//! let mut schema = SchemaDescriptor::new("app", 1).unwrap();
//! schema.add_table(notes).unwrap();
//! assert_eq!(schema.tables().len(), 1);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::convert::{ConverterRegistry, StorageCodec};
use crate::error::{CoreError, Result};
use crate::types::{FieldType, SqlValue, StorageClass};
use crate::validate::{validate_database_name, validate_identifier};

/// Generates alter statements for a `(old_version, new_version)` pair.
pub type AlterSql = Arc<dyn Fn(u32, u32) -> Vec<String> + Send + Sync>;

/// One declared column of a table.
#[derive(Clone)]
pub struct FieldDescriptor {
    name: String,
    field_type: FieldType,
    codec: Arc<dyn StorageCodec>,
    nullable: bool,
    identity: bool,
    default: SqlValue,
}

impl FieldDescriptor {
    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Semantic type of the column.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Storage class fixed by the field's converter.
    pub fn storage_class(&self) -> StorageClass {
        self.codec.class()
    }

    /// Type-erased converter of the field.
    pub fn codec(&self) -> &Arc<dyn StorageCodec> {
        &self.codec
    }

    /// Whether the column accepts `NULL`.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether this is the row id column.
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Declared default in stored form. Always `NULL` for the identity so
    /// that restored rows without an id get a fresh one.
    pub fn default_value(&self) -> &SqlValue {
        &self.default
    }

    /// Encodes a stored value of this field as interchange text.
    pub fn to_text(&self, stored: &SqlValue) -> Result<Option<String>> {
        self.codec.encode_text(stored)
    }

    /// Decodes an interchange field.
    ///
    /// A missing value is `NULL`, except for non-nullable text columns where
    /// it is read as the empty string.
    pub fn from_text(&self, text: Option<&str>) -> Result<SqlValue> {
        match text {
            Some(text) => self.codec.decode_text(text),
            None if !self.nullable
                && !self.identity
                && self.storage_class() == StorageClass::Text =>
            {
                Ok(SqlValue::Text(String::new()))
            }
            None => Ok(SqlValue::Null),
        }
    }

    fn column_sql(&self) -> String {
        let class = self.storage_class().sql_name();
        if self.identity {
            format!("{} {class} PRIMARY KEY AUTOINCREMENT", self.name)
        } else if self.nullable {
            format!("{} {class}", self.name)
        } else {
            format!("{} {class} NOT NULL", self.name)
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("storage_class", &self.storage_class())
            .field("nullable", &self.nullable)
            .field("identity", &self.identity)
            .field("default", &self.default)
            .finish()
    }
}

/// A column reference usable in predicates and ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    /// Owning table.
    pub table: String,
    /// Column name.
    pub name: String,
    /// Declared semantic type.
    pub field_type: FieldType,
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

/// Describes one table: name, ordered fields, DDL and defaults.
#[derive(Clone)]
pub struct TableDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
    identity: usize,
    alter: Option<AlterSql>,
}

impl TableDescriptor {
    /// Starts describing a table named `name`.
    pub fn builder<'r>(name: impl Into<String>, registry: &'r ConverterRegistry) -> TableBuilder<'r> {
        TableBuilder {
            registry,
            name: name.into(),
            fields: Vec::new(),
            alter: None,
            error: None,
        }
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by exact name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of a field in declaration order.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// The identity field.
    pub fn identity(&self) -> &FieldDescriptor {
        &self.fields[self.identity]
    }

    /// Position of the identity field.
    pub fn identity_index(&self) -> usize {
        self.identity
    }

    /// Column reference for the identity field.
    pub fn identity_column(&self) -> Column {
        self.column_of(self.identity())
    }

    /// Column reference for the named field.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownColumn`] if the table has no such field.
    pub fn column(&self, name: &str) -> Result<Column> {
        self.field(name)
            .map(|f| self.column_of(f))
            .ok_or_else(|| CoreError::UnknownColumn {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    fn column_of(&self, field: &FieldDescriptor) -> Column {
        Column {
            table: self.name.clone(),
            name: field.name.clone(),
            field_type: field.field_type,
        }
    }

    /// Field names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Declared defaults in declaration order.
    pub fn defaults(&self) -> Vec<SqlValue> {
        self.fields.iter().map(|f| f.default.clone()).collect()
    }

    /// `CREATE TABLE` statement.
    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self.fields.iter().map(FieldDescriptor::column_sql).collect();
        format!("CREATE TABLE {} ({})", self.name, columns.join(", "))
    }

    /// `DROP TABLE IF EXISTS` statement.
    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.name)
    }

    /// Alter statements moving the table from `old_version` to
    /// `new_version`. Empty when no generator was declared.
    pub fn alter_sql(&self, old_version: u32, new_version: u32) -> Vec<String> {
        self.alter
            .as_ref()
            .map(|f| f(old_version, new_version))
            .unwrap_or_default()
    }

    /// Replaces the declared defaults with a full stored row.
    ///
    /// The identity keeps its `NULL` default.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSchema`] if the row length differs from
    /// the field count, or a value's class does not fit its field.
    pub fn with_defaults(mut self, row: Vec<SqlValue>) -> Result<Self> {
        if row.len() != self.fields.len() {
            return Err(CoreError::InvalidSchema(format!(
                "table '{}' has {} fields but the default row has {} values",
                self.name,
                self.fields.len(),
                row.len()
            )));
        }
        for (field, value) in self.fields.iter_mut().zip(row) {
            if field.identity {
                continue;
            }
            check_default(&self.name, field, &value)?;
            field.default = value;
        }
        Ok(self)
    }
}

fn check_default(table: &str, field: &FieldDescriptor, value: &SqlValue) -> Result<()> {
    match value.storage_class() {
        None if !field.nullable => Err(CoreError::InvalidSchema(format!(
            "default of non-nullable field '{table}.{}' is NULL",
            field.name
        ))),
        Some(class) if class != field.storage_class() => Err(CoreError::InvalidSchema(format!(
            "default of field '{table}.{}' is {class}, expected {}",
            field.name,
            field.storage_class()
        ))),
        _ => Ok(()),
    }
}

impl fmt::Debug for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDescriptor")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("identity", &self.identity)
            .field("alter", &self.alter.is_some())
            .finish()
    }
}

/// Builder for [`TableDescriptor`]. Errors are reported by [`build`](Self::build).
pub struct TableBuilder<'r> {
    registry: &'r ConverterRegistry,
    name: String,
    fields: Vec<FieldDescriptor>,
    alter: Option<AlterSql>,
    error: Option<CoreError>,
}

impl TableBuilder<'_> {
    /// Declares the identity column, an `i64` row id.
    pub fn id(mut self, name: impl Into<String>) -> Self {
        self.push(name.into(), FieldType::of::<i64>(), false, true, SqlValue::Null);
        self
    }

    /// Declares a non-nullable field whose default is `T::default()`.
    pub fn field<T: Default + 'static>(mut self, name: impl Into<String>) -> Self {
        let default = self
            .registry
            .converter::<T>()
            .and_then(|c| c.to_sql(&T::default()));
        match default {
            Ok(default) => self.push(name.into(), FieldType::of::<T>(), false, false, default),
            Err(e) => self.fail(e),
        }
        self
    }

    /// Declares a nullable field defaulting to `NULL`.
    pub fn nullable<T: 'static>(mut self, name: impl Into<String>) -> Self {
        self.push(name.into(), FieldType::of::<T>(), true, false, SqlValue::Null);
        self
    }

    /// Declares a field by semantic type tag, defaulting to `NULL`.
    pub fn field_of_type(mut self, name: impl Into<String>, field_type: FieldType, nullable: bool) -> Self {
        self.push(name.into(), field_type, nullable, false, SqlValue::Null);
        self
    }

    /// Overrides the declared default of an already declared field.
    pub fn with_default(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => match check_default(&self.name, field, &value) {
                Ok(()) => field.default = value,
                Err(e) => self.error = self.error.take().or(Some(e)),
            },
            None => {
                let table = self.name.clone();
                self.fail(CoreError::UnknownColumn {
                    table,
                    column: name.to_string(),
                });
            }
        }
        self
    }

    /// Sets the alter statement generator.
    pub fn alter<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, u32) -> Vec<String> + Send + Sync + 'static,
    {
        self.alter = Some(Arc::new(f));
        self
    }

    fn push(&mut self, name: String, field_type: FieldType, nullable: bool, identity: bool, default: SqlValue) {
        match self.registry.lookup(field_type) {
            Ok(codec) => self.fields.push(FieldDescriptor {
                name,
                field_type,
                codec,
                nullable,
                identity,
                default,
            }),
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: CoreError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Validates and finishes the descriptor.
    ///
    /// # Errors
    ///
    /// - [`CoreError::TypeNotSupported`] if a field type has no converter.
    /// - [`CoreError::InvalidIdentifier`] for bad table or column names.
    /// - [`CoreError::InvalidSchema`] for duplicate columns, a missing or
    ///   repeated identity, or an empty field list.
    pub fn build(self) -> Result<TableDescriptor> {
        if let Some(error) = self.error {
            return Err(error);
        }
        validate_identifier(&self.name)?;
        if self.fields.is_empty() {
            return Err(CoreError::InvalidSchema(format!(
                "table '{}' declares no fields",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            validate_identifier(&field.name)?;
            if !seen.insert(field.name.to_ascii_lowercase()) {
                return Err(CoreError::InvalidSchema(format!(
                    "duplicate column '{}' in table '{}'",
                    field.name, self.name
                )));
            }
        }

        let identities: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.identity)
            .map(|(i, _)| i)
            .collect();
        let identity = match identities.as_slice() {
            [single] => *single,
            [] => {
                return Err(CoreError::InvalidSchema(format!(
                    "table '{}' has no identity field",
                    self.name
                )));
            }
            _ => {
                return Err(CoreError::InvalidSchema(format!(
                    "table '{}' has more than one identity field",
                    self.name
                )));
            }
        };
        if self.fields[identity].storage_class() != StorageClass::Integer {
            return Err(CoreError::InvalidSchema(format!(
                "identity of table '{}' must be stored as INTEGER",
                self.name
            )));
        }

        Ok(TableDescriptor {
            name: self.name,
            fields: self.fields,
            identity,
            alter: self.alter,
        })
    }
}

/// A named, versioned set of tables.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    name: String,
    version: u32,
    tables: Vec<Arc<TableDescriptor>>,
}

impl SchemaDescriptor {
    /// Creates an empty schema.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSchema`] for a version of `0` (reserved
    /// for "no schema yet") or an unusable database name.
    pub fn new(name: impl Into<String>, version: u32) -> Result<Self> {
        let name = name.into();
        validate_database_name(&name)?;
        if version == 0 {
            return Err(CoreError::InvalidSchema(
                "schema version must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            name,
            version,
            tables: Vec::new(),
        })
    }

    /// Appends a table, keeping declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSchema`] if a table with the same name
    /// was already added.
    pub fn add_table(&mut self, table: impl Into<Arc<TableDescriptor>>) -> Result<()> {
        let table = table.into();
        if self
            .tables
            .iter()
            .any(|t| t.name().eq_ignore_ascii_case(table.name()))
        {
            return Err(CoreError::InvalidSchema(format!(
                "duplicate table '{}' in schema '{}'",
                table.name(),
                self.name
            )));
        }
        self.tables.push(table);
        Ok(())
    }

    /// Database name, used in backup file names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared schema version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> &[Arc<TableDescriptor>] {
        &self.tables
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&Arc<TableDescriptor>> {
        self.tables.iter().find(|t| t.name() == name)
    }
}
