//! Type-checked predicates over one table.
//!
//! [`QueryBuilder`] collects `=` and `IN` conditions on declared columns
//! plus one `ORDER BY` list, then runs them through
//! [`RecordStore::query`]. Every condition is validated when it is added:
//! the column must belong to the store's table, the value's Rust type must
//! be the column's declared type, and exact matches are refused on REAL and
//! BLOB columns.

use record_store_core::{Column, CoreError, Entity, FieldDescriptor, FieldType, Predicate};

use crate::error::{Result, SqliteError};
use crate::store::{Cursor, RecordStore};

/// Accumulates conditions for one query.
pub struct QueryBuilder<'a, E> {
    store: RecordStore<'a, E>,
    predicates: Vec<Predicate>,
    order_by: Option<String>,
}

impl<'a, E: Entity> QueryBuilder<'a, E> {
    /// Starts an unfiltered query over the store's table.
    pub fn new(store: RecordStore<'a, E>) -> Self {
        Self {
            store,
            predicates: Vec::new(),
            order_by: None,
        }
    }

    fn field_for(&self, column: &Column) -> Result<&'a FieldDescriptor> {
        let table = self.store.table();
        if column.table != table.name() {
            return Err(SqliteError::InvalidQuery(format!(
                "column {column} does not belong to table '{}'",
                table.name()
            )));
        }
        let field = table.field(&column.name).ok_or_else(|| CoreError::UnknownColumn {
            table: table.name().to_string(),
            column: column.name.clone(),
        })?;
        if field.field_type() != column.field_type {
            return Err(CoreError::TypeMismatch {
                column: column.name.clone(),
                declared: field.field_type().name().to_string(),
                actual: column.field_type.name().to_string(),
            }
            .into());
        }
        Ok(field)
    }

    fn comparable_field<T: 'static>(&self, column: &Column) -> Result<&'a FieldDescriptor> {
        let field = self.field_for(column)?;
        let actual = FieldType::of::<T>();
        if field.field_type() != actual {
            return Err(CoreError::TypeMismatch {
                column: column.name.clone(),
                declared: field.field_type().name().to_string(),
                actual: actual.name().to_string(),
            }
            .into());
        }
        check_equality(field)?;
        Ok(field)
    }

    /// Adds `column = value`.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::InvalidQuery`] if the column is from another table.
    /// - [`CoreError::TypeMismatch`] if `T` is not the column's type.
    /// - [`CoreError::UnsupportedPredicate`] on REAL or BLOB columns.
    pub fn eq<T: 'static>(mut self, column: &Column, value: &T) -> Result<Self> {
        let field = self.comparable_field::<T>(column)?;
        let param = self.store.registry().converter::<T>()?.to_param(value)?;
        self.predicates.push(Predicate::eq(field.name(), param));
        Ok(self)
    }

    /// Adds `column IN (values...)`. An empty slice adds nothing.
    pub fn in_values<T: 'static>(mut self, column: &Column, values: &[T]) -> Result<Self> {
        let field = self.comparable_field::<T>(column)?;
        if values.is_empty() {
            return Ok(self);
        }
        let converter = self.store.registry().converter::<T>()?;
        let params = values
            .iter()
            .map(|v| converter.to_param(v))
            .collect::<record_store_core::Result<Vec<_>>>()?;
        self.predicates.push(Predicate::in_list(field.name(), params));
        Ok(self)
    }

    /// Adds `column IN (values...)` with already-encoded parameters. An
    /// empty slice adds nothing.
    pub fn in_list<S: AsRef<str>>(mut self, column: &Column, values: &[S]) -> Result<Self> {
        let field = self.field_for(column)?;
        check_equality(field)?;
        if values.is_empty() {
            return Ok(self);
        }
        let params = values.iter().map(|v| v.as_ref().to_string()).collect();
        self.predicates.push(Predicate::in_list(field.name(), params));
        Ok(self)
    }

    /// Sets the ordering. Each entry is a declared column name, optionally
    /// followed by `ASC` or `DESC`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidQuery`] for an empty list or a bad
    /// direction, and [`CoreError::UnknownColumn`] for undeclared columns.
    pub fn order(mut self, columns: &[&str]) -> Result<Self> {
        if columns.is_empty() {
            return Err(SqliteError::InvalidQuery(
                "order requires at least one column".to_string(),
            ));
        }
        let table = self.store.table();
        let mut terms = Vec::with_capacity(columns.len());
        for entry in columns {
            let mut parts = entry.split_whitespace();
            let name = parts.next().unwrap_or_default();
            let direction = parts.next();
            if parts.next().is_some() {
                return Err(SqliteError::InvalidQuery(format!("bad order term '{entry}'")));
            }
            table.column(name)?;
            match direction {
                None => terms.push(name.to_string()),
                Some(d) if d.eq_ignore_ascii_case("asc") => terms.push(format!("{name} ASC")),
                Some(d) if d.eq_ignore_ascii_case("desc") => terms.push(format!("{name} DESC")),
                Some(d) => {
                    return Err(SqliteError::InvalidQuery(format!(
                        "bad order direction '{d}' for column '{name}'"
                    )));
                }
            }
        }
        self.order_by = Some(terms.join(", "));
        Ok(self)
    }

    /// Adds `=` for every field of `example` that differs from the same
    /// field of `E::default()`. Fields still holding their default, and
    /// `NULL` fields, do not filter.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedPredicate`] if a differing field is
    /// stored as REAL or BLOB.
    pub fn by_example(mut self, example: &E) -> Result<Self> {
        let registry = self.store.registry();
        let table = self.store.table();
        let values = example.to_row(registry)?;
        let defaults = E::default().to_row(registry)?;
        for ((field, value), default) in table.fields().iter().zip(&values).zip(&defaults) {
            if value == default || value.is_null() {
                continue;
            }
            check_equality(field)?;
            let param = field.to_text(value)?.unwrap_or_default();
            self.predicates.push(Predicate::eq(field.name(), param));
        }
        Ok(self)
    }

    /// The conditions joined with `AND`, or `None` when unfiltered.
    pub fn where_clause(&self) -> Option<String> {
        if self.predicates.is_empty() {
            return None;
        }
        Some(
            self.predicates
                .iter()
                .map(Predicate::sql)
                .collect::<Vec<_>>()
                .join(" AND "),
        )
    }

    /// Bound parameters in placeholder order.
    pub fn params(&self) -> Vec<String> {
        self.predicates
            .iter()
            .flat_map(|p| p.params.iter().cloned())
            .collect()
    }

    /// The collected predicates.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Runs the query and hands the cursor to `f`.
    pub fn exec<T, F>(self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Cursor<'_, E>) -> Result<T>,
    {
        let clause = self.where_clause();
        let params = self.params();
        self.store
            .query(clause.as_deref(), &params, self.order_by.as_deref(), f)
    }

    /// Runs the query expecting at most one row.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::TooManyResults`] if several rows match.
    pub fn get(self) -> Result<Option<E>> {
        self.exec(|cursor| cursor.as_object())
    }

    /// Runs the query and collects every row.
    pub fn list(self) -> Result<Vec<E>> {
        self.exec(|cursor| cursor.as_list())
    }

    /// Counts matching rows.
    pub fn count(self) -> Result<usize> {
        self.exec(|cursor| {
            let mut n = 0;
            while cursor.next_row()?.is_some() {
                n += 1;
            }
            Ok(n)
        })
    }
}

fn check_equality(field: &FieldDescriptor) -> Result<()> {
    let class = field.storage_class();
    if class.supports_equality() {
        Ok(())
    } else {
        Err(CoreError::UnsupportedPredicate {
            column: field.name().to_string(),
            class,
        }
        .into())
    }
}
