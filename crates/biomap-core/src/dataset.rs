//! Ordered record collections stored in the execution context

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row: column name to value, in insertion order
pub type Record = IndexMap<String, Value>;

/// Ordered collection of records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    rows: Vec<Record>,
}

impl Dataset {
    /// Create empty dataset
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create dataset from rows
    #[inline]
    #[must_use]
    pub fn from_rows(rows: Vec<Record>) -> Self {
        Self { rows }
    }

    /// Single-column dataset, one row per value
    #[must_use]
    pub fn from_column<I, S>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = values
            .into_iter()
            .map(|v| {
                let mut row = Record::new();
                row.insert(column.to_string(), Value::String(v.into()));
                row
            })
            .collect();
        Self { rows }
    }

    /// Append one row
    #[inline]
    pub fn push(&mut self, row: Record) {
        self.rows.push(row);
    }

    /// Rows in insertion order
    #[inline]
    #[must_use]
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// No rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate rows in insertion order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter()
    }

    /// Values of a column; rows missing the column are skipped
    pub fn column(&self, column: &str) -> impl Iterator<Item = &Value> + '_ {
        let column = column.to_string();
        self.rows.iter().filter_map(move |row| row.get(&column))
    }

    /// String values of a column; non-string values are rendered as text,
    /// nulls are skipped
    #[must_use]
    pub fn column_strings(&self, column: &str) -> Vec<String> {
        self.column(column)
            .filter_map(|value| match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect()
    }

    /// Whether any row carries the column
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.rows.iter().any(|row| row.contains_key(column))
    }

    /// Take the rows
    #[inline]
    #[must_use]
    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }
}

impl FromIterator<Record> for Dataset {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}
