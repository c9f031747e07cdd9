//! Normalized tabular results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One result row: column name -> value. A column missing from the row is
/// absent, which is different from being `null`.
pub type ResultRow = Map<String, Value>;

/// Ordered rows with a column set inferred from the rows themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultTable {
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new(rows: Vec<ResultRow>) -> Self {
        Self { rows }
    }

    /// Build from JSON values; anything that is not an object becomes a
    /// single-column row under `value`.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let rows = values
            .into_iter()
            .map(|v| match v {
                Value::Object(row) => row,
                other => {
                    let mut row = ResultRow::new();
                    row.insert("value".to_string(), other);
                    row
                }
            })
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ResultRow> {
        self.rows
    }

    pub fn push(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    /// Union of all row keys, in first-appearance order.
    pub fn columns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for row in &self.rows {
            for key in row.keys() {
                if seen.insert(key.as_str()) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.rows.iter().any(|r| r.contains_key(column))
    }

    /// Values of `column`, one entry per row (`None` where absent).
    pub fn column<'a>(&'a self, column: &'a str) -> impl Iterator<Item = Option<&'a Value>> + 'a {
        self.rows.iter().map(move |r| r.get(column))
    }

    /// Present, non-null values of `column` in row order.
    pub fn values(&self, column: &str) -> Vec<Value> {
        self.column(column)
            .flatten()
            .filter(|v| !v.is_null())
            .cloned()
            .collect()
    }

    /// Present, non-null values of `column`, first occurrence only.
    pub fn distinct_values(&self, column: &str) -> Vec<Value> {
        let mut out: Vec<Value> = Vec::new();
        for value in self.column(column).flatten() {
            if value.is_null() || out.contains(value) {
                continue;
            }
            out.push(value.clone());
        }
        out
    }

    /// Numeric values of `column`; absent, null and non-numeric cells are
    /// skipped.
    pub fn numbers(&self, column: &str) -> Vec<f64> {
        self.column(column)
            .flatten()
            .filter_map(Value::as_f64)
            .collect()
    }

    /// True when the column holds at least one value and every present,
    /// non-null value is a number.
    pub fn is_numeric_column(&self, column: &str) -> bool {
        let mut any = false;
        for value in self.column(column).flatten() {
            match value {
                Value::Null => {}
                Value::Number(_) => any = true,
                _ => return false,
            }
        }
        any
    }

    /// Keep only the columns `keep` accepts.
    pub fn retain_columns(&mut self, mut keep: impl FnMut(&str) -> bool) {
        for row in &mut self.rows {
            row.retain(|k, _| keep(k));
        }
    }

    /// Append a computed column; rows for which `compute` returns `None` are
    /// left without it.
    pub fn add_column(&mut self, name: &str, mut compute: impl FnMut(&ResultRow) -> Option<Value>) {
        for row in &mut self.rows {
            if let Some(value) = compute(row) {
                row.insert(name.to_string(), value);
            }
        }
    }
}

impl FromIterator<ResultRow> for ResultTable {
    fn from_iter<T: IntoIterator<Item = ResultRow>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for ResultTable {
    type Item = ResultRow;
    type IntoIter = std::vec::IntoIter<ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultTable {
    type Item = &'a ResultRow;
    type IntoIter = std::slice::Iter<'a, ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
