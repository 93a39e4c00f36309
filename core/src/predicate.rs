//! Bound WHERE conditions.

use std::fmt;

/// Comparison operator of a [`Predicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `column = ?`
    Eq,
    /// `column IN (?, ...)`
    In,
}

/// One condition over a declared column with its already-encoded
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Column name.
    pub column: String,
    /// Operator.
    pub operator: Operator,
    /// Storage-encoded parameters, one per placeholder.
    pub params: Vec<String>,
}

impl Predicate {
    /// `column = param`.
    pub fn eq(column: impl Into<String>, param: String) -> Self {
        Self {
            column: column.into(),
            operator: Operator::Eq,
            params: vec![param],
        }
    }

    /// `column IN (params...)`.
    pub fn in_list(column: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            column: column.into(),
            operator: Operator::In,
            params,
        }
    }

    /// SQL fragment with `?` placeholders.
    ///
    /// ```
    /// use record_store_core::Predicate;
    ///
    /// let p = Predicate::in_list("kind", vec!["A".into(), "B".into()]);
    /// assert_eq!(p.sql(), "kind IN (?, ?)");
    /// ```
    pub fn sql(&self) -> String {
        match self.operator {
            Operator::Eq => format!("{} = ?", self.column),
            Operator::In => {
                let marks = vec!["?"; self.params.len()].join(", ");
                format!("{} IN ({marks})", self.column)
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql())
    }
}
