//! YAML schema configuration.
//!
//! Describes a database and its tables declaratively so that tools can
//! create, upgrade, and back up a store without compiled record types.
//!
//! # Example YAML
//!
//! ```yaml
//! database: notes
//! version: 2
//! strategy: backup_restore
//! backup_dir: backups
//! suffix: .csv
//! tables:
//!   - name: note
//!     fields:
//!       - { name: id, id: true }
//!       - { name: title, type: string }
//!       - { name: body, type: string, nullable: true }
//!       - { name: score, type: double }
//!     alter:
//!       - version: 2
//!         statements:
//!           - ALTER TABLE note ADD COLUMN score REAL NOT NULL DEFAULT 0
//! ```

use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::convert::ConverterRegistry;
use crate::error::{CoreError, Result};
use crate::table::{SchemaDescriptor, TableDescriptor};
use crate::types::{FieldType, SqlValue, UpgradeStrategy};

/// Field type names accepted in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// `bool`
    Boolean,
    /// `i8`
    Byte,
    /// `i16`
    Short,
    /// `i32`
    Int,
    /// `i64`
    #[default]
    Long,
    /// `char`
    Char,
    /// `f32`
    Float,
    /// `f64`
    Double,
    /// `String`
    String,
    /// `Vec<u8>`
    Blob,
    /// `DateTime<Utc>`
    Date,
}

impl FieldKind {
    /// Semantic type handled by the built-in converter for this kind.
    pub fn field_type(self) -> FieldType {
        match self {
            FieldKind::Boolean => FieldType::of::<bool>(),
            FieldKind::Byte => FieldType::of::<i8>(),
            FieldKind::Short => FieldType::of::<i16>(),
            FieldKind::Int => FieldType::of::<i32>(),
            FieldKind::Long => FieldType::of::<i64>(),
            FieldKind::Char => FieldType::of::<char>(),
            FieldKind::Float => FieldType::of::<f32>(),
            FieldKind::Double => FieldType::of::<f64>(),
            FieldKind::String => FieldType::of::<String>(),
            FieldKind::Blob => FieldType::of::<Vec<u8>>(),
            FieldKind::Date => FieldType::of::<DateTime<Utc>>(),
        }
    }

    /// Stored form of the type's zero value.
    pub fn default_value(self) -> SqlValue {
        match self {
            FieldKind::Float | FieldKind::Double => SqlValue::Real(0.0),
            FieldKind::String => SqlValue::Text(String::new()),
            FieldKind::Blob => SqlValue::Blob(Vec::new()),
            _ => SqlValue::Integer(0),
        }
    }
}

/// One column of a configured table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Column name.
    pub name: String,
    /// Column type, `long` when omitted.
    #[serde(rename = "type", default)]
    pub kind: FieldKind,
    /// Whether the column accepts `NULL`.
    #[serde(default)]
    pub nullable: bool,
    /// Marks the identity column.
    #[serde(default)]
    pub id: bool,
}

/// Statements that move a table to `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlterConfig {
    /// Version reached after the statements ran.
    pub version: u32,
    /// SQL statements, executed in order.
    pub statements: Vec<String>,
}

/// One configured table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub fields: Vec<FieldConfig>,
    /// Alter statements per target version.
    #[serde(default)]
    pub alter: Vec<AlterConfig>,
}

impl TableConfig {
    /// Alter statements for every step with `old < version <= new`, in
    /// version order.
    pub fn alter_sql(&self, old_version: u32, new_version: u32) -> Vec<String> {
        alter_statements(&self.alter, old_version, new_version)
    }
}

fn alter_statements(steps: &[AlterConfig], old_version: u32, new_version: u32) -> Vec<String> {
    let mut steps: Vec<&AlterConfig> = steps
        .iter()
        .filter(|a| a.version > old_version && a.version <= new_version)
        .collect();
    steps.sort_by_key(|a| a.version);
    steps
        .into_iter()
        .flat_map(|a| a.statements.iter().cloned())
        .collect()
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_suffix() -> String {
    ".csv".to_string()
}

/// Top-level schema configuration.
///
/// # Examples
///
/// ```
/// use record_store_core::{ConverterRegistry, SchemaConfig, UpgradeStrategy};
///
/// let config = SchemaConfig::from_yaml_str(r#"
/// database: shop
/// version: 1
/// tables:
///   - name: item
///     fields:
///       - { name: id, id: true }
///       - { name: label, type: string }
/// "#).unwrap();
/// assert_eq!(config.strategy, UpgradeStrategy::BackupRestore);
///
/// let schema = config.build(&ConverterRegistry::with_builtins()).unwrap();
/// assert_eq!(schema.tables()[0].column_names(), vec!["id", "label"]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Database name, used in backup file names.
    pub database: String,
    /// Declared schema version.
    pub version: u32,
    /// Upgrade strategy.
    #[serde(default)]
    pub strategy: UpgradeStrategy,
    /// Directory holding interchange files.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    /// Interchange file suffix.
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Tables in declaration order.
    pub tables: Vec<TableConfig>,
}

impl SchemaConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IoError`] if the file cannot be read, or
    /// [`CoreError::YamlError`] if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Builds the schema descriptor against a registry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigError`] when an identity field is not of
    /// type `long`, and the descriptor errors of
    /// [`TableBuilder::build`](crate::TableBuilder::build) otherwise.
    pub fn build(&self, registry: &ConverterRegistry) -> Result<SchemaDescriptor> {
        let mut schema = SchemaDescriptor::new(&self.database, self.version)?;
        for table in &self.tables {
            schema.add_table(build_table(table, registry)?)?;
        }
        Ok(schema)
    }
}

fn build_table(config: &TableConfig, registry: &ConverterRegistry) -> Result<TableDescriptor> {
    let mut builder = TableDescriptor::builder(&config.name, registry);
    for field in &config.fields {
        if field.id {
            if field.kind != FieldKind::Long {
                return Err(CoreError::ConfigError(format!(
                    "identity '{}.{}' must be of type long",
                    config.name, field.name
                )));
            }
            builder = builder.id(&field.name);
        } else {
            builder = builder.field_of_type(&field.name, field.kind.field_type(), field.nullable);
            if !field.nullable {
                builder = builder.with_default(&field.name, field.kind.default_value());
            }
        }
    }
    if !config.alter.is_empty() {
        let steps = config.alter.clone();
        builder = builder.alter(move |old, new| alter_statements(&steps, old, new));
    }
    builder.build()
}
