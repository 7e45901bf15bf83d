//! Values, result sets, and row snapshots
//!
//! A store returns a [`RowSet`] of loosely typed [`SqlValue`] cells. The
//! harness narrows each row into a fixture [`Row`] and collects them into a
//! [`Snapshot`], which is what scenarios assert on. Snapshot equality is
//! positional: both row content and row order must match.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SqlValue
// ============================================================================

/// A single SQL cell or statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit float
    Real(f64),
    /// UTF-8 text
    Text(String),
}

impl SqlValue {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(i) => write!(f, "{i}"),
            SqlValue::Real(r) => write!(f, "{r}"),
            SqlValue::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

// ============================================================================
// RowSet
// ============================================================================

/// Raw result of executing one statement.
///
/// Statements without result columns report `affected` and leave `rows`
/// empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Result column names, in select-list order
    pub columns: Vec<String>,
    /// Result rows, in the order the store returned them
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows changed by a DML statement
    pub affected: usize,
}

impl RowSet {
    /// Result of a statement that returned no columns.
    pub fn affected(count: usize) -> Self {
        RowSet {
            columns: Vec::new(),
            rows: Vec::new(),
            affected: count,
        }
    }

    /// Narrow every row into a fixture [`Row`].
    ///
    /// # Errors
    ///
    /// Returns a description of the first row that is not
    /// `(integer, text, integer)`.
    pub fn to_snapshot(&self) -> Result<Snapshot, String> {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(position, values)| {
                Row::from_values(values).map_err(|e| format!("row {}: {}", position, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Snapshot::new(rows))
    }
}

// ============================================================================
// Row
// ============================================================================

/// One fixture row: `(id, name, score)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Row {
    /// Row identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Score
    pub score: i64,
}

impl Row {
    /// Create a row.
    pub fn new(id: i64, name: impl Into<String>, score: i64) -> Self {
        Row {
            id,
            name: name.into(),
            score,
        }
    }

    /// Build a row from three result cells.
    ///
    /// # Errors
    ///
    /// Fails unless `values` is exactly `(integer, text, integer)`.
    pub fn from_values(values: &[SqlValue]) -> Result<Self, String> {
        match values {
            [SqlValue::Integer(id), SqlValue::Text(name), SqlValue::Integer(score)] => {
                Ok(Row::new(*id, name.clone(), *score))
            }
            _ => Err(format!(
                "expected (integer, text, integer), got ({})",
                values
                    .iter()
                    .map(SqlValue::type_name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }

    /// The row as insert parameters, in column order.
    pub fn to_params(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(self.id),
            SqlValue::Text(self.name.clone()),
            SqlValue::Integer(self.score),
        ]
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.name, self.score)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Ordered rows observed by one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Vec<Row>);

impl Snapshot {
    /// Wrap an ordered list of rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Snapshot(rows)
    }

    /// Rows in order.
    pub fn rows(&self) -> &[Row] {
        &self.0
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no rows were observed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this snapshot with `row` appended.
    pub fn with_row(&self, row: Row) -> Self {
        let mut rows = self.0.clone();
        rows.push(row);
        Snapshot(rows)
    }

    /// Copy of this snapshot with the row at `id` replaced by `f(row)`.
    pub fn map_row(&self, id: i64, f: impl Fn(&Row) -> Row) -> Self {
        Snapshot(
            self.0
                .iter()
                .map(|row| if row.id == id { f(row) } else { row.clone() })
                .collect(),
        )
    }

    /// Positional row-level differences between `self` (expected) and
    /// `actual`. Empty if and only if the snapshots are equal.
    pub fn diff(&self, actual: &Snapshot) -> Vec<RowDiff> {
        let longest = self.0.len().max(actual.0.len());
        (0..longest)
            .filter_map(|position| match (self.0.get(position), actual.0.get(position)) {
                (Some(e), Some(a)) if e == a => None,
                (Some(e), Some(a)) => Some(RowDiff::Changed {
                    position,
                    expected: e.clone(),
                    actual: a.clone(),
                }),
                (Some(e), None) => Some(RowDiff::Missing {
                    position,
                    expected: e.clone(),
                }),
                (None, Some(a)) => Some(RowDiff::Unexpected {
                    position,
                    actual: a.clone(),
                }),
                (None, None) => None,
            })
            .collect()
    }
}

impl From<Vec<Row>> for Snapshot {
    fn from(rows: Vec<Row>) -> Self {
        Snapshot(rows)
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, row) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{row}")?;
        }
        write!(f, "]")
    }
}

/// One row-level difference between an expected and an observed snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "diff", rename_all = "snake_case")]
pub enum RowDiff {
    /// Both snapshots have a row at `position` but they differ
    Changed {
        /// Zero-based row position
        position: usize,
        /// Expected row
        expected: Row,
        /// Observed row
        actual: Row,
    },
    /// The expected row at `position` was not observed
    Missing {
        /// Zero-based row position
        position: usize,
        /// Expected row
        expected: Row,
    },
    /// A row was observed at `position` beyond the expected rows
    Unexpected {
        /// Zero-based row position
        position: usize,
        /// Observed row
        actual: Row,
    },
}

impl fmt::Display for RowDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowDiff::Changed {
                position,
                expected,
                actual,
            } => write!(f, "row {position}: expected {expected}, got {actual}"),
            RowDiff::Missing { position, expected } => {
                write!(f, "row {position}: missing {expected}")
            }
            RowDiff::Unexpected { position, actual } => {
                write!(f, "row {position}: unexpected {actual}")
            }
        }
    }
}
