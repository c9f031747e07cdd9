//! Relational merge of two result tables on declared key columns.
//!
//! - `inner`: one output row per matching (left, right) pair.
//! - `left`: every left row at least once; unmatched rows carry no right
//!   columns.
//! - Several right matches fan out, in right-table order.
//! - Null or missing key values never match. Numbers compare by value, so a
//!   document-side `1` joins a graph-side `1.0`.
//! - A right key column with the same name as its left key is not repeated.
//!   Any other right column already present on the left row is an extra
//!   equality constraint: equal values are not repeated, a different value
//!   means the pair does not match.
//! - A left row that already carries everything a matching right row holds is
//!   emitted once for all such rows, so merging a merge result again with the
//!   same right table gives the same rows.

use crate::error::{JoinSide, QueryError};
use crate::table::{ResultRow, ResultTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinHow {
    Inner,
    Left,
}

impl FromStr for JoinHow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinHow::Inner),
            "left" => Ok(JoinHow::Left),
            other => Err(format!("unknown join `{other}` (expected `inner` or `left`)")),
        }
    }
}

/// Key columns and join type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    left_keys: Vec<String>,
    right_keys: Vec<String>,
    how: JoinHow,
}

impl JoinSpec {
    /// Pairwise key columns; both sides need the same, non-zero number.
    pub fn new<L, R>(left_keys: L, right_keys: R, how: JoinHow) -> Result<Self, QueryError>
    where
        L: IntoIterator,
        L::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        let left_keys: Vec<String> = left_keys.into_iter().map(Into::into).collect();
        let right_keys: Vec<String> = right_keys.into_iter().map(Into::into).collect();
        if left_keys.is_empty() || left_keys.len() != right_keys.len() {
            return Err(QueryError::InvalidParameters(format!(
                "join needs the same non-zero number of keys on both sides (left {}, right {})",
                left_keys.len(),
                right_keys.len()
            )));
        }
        Ok(Self {
            left_keys,
            right_keys,
            how,
        })
    }

    /// Join on one column that has the same name on both sides.
    pub fn on(column: impl Into<String>, how: JoinHow) -> Self {
        let column = column.into();
        Self {
            left_keys: vec![column.clone()],
            right_keys: vec![column],
            how,
        }
    }

    pub fn left_keys(&self) -> &[String] {
        &self.left_keys
    }

    pub fn right_keys(&self) -> &[String] {
        &self.right_keys
    }

    pub fn how(&self) -> JoinHow {
        self.how
    }
}

/// Merge `left` and `right` per `spec`.
///
/// Fails with `MergeKeyMismatch` when a non-empty table has no column for one
/// of its declared keys. An empty table contributes no rows and is not
/// checked.
pub fn merge(
    left: &ResultTable,
    right: &ResultTable,
    spec: &JoinSpec,
) -> Result<ResultTable, QueryError> {
    check_keys(left, &spec.left_keys, JoinSide::Left)?;
    check_keys(right, &spec.right_keys, JoinSide::Right)?;

    let mut index: HashMap<Vec<String>, Vec<&ResultRow>> = HashMap::new();
    for row in right {
        if let Some(key) = key_of(row, &spec.right_keys) {
            index.entry(key).or_default().push(row);
        }
    }

    let shared: HashSet<&str> = spec
        .left_keys
        .iter()
        .zip(&spec.right_keys)
        .filter(|(l, r)| l == r)
        .map(|(_, r)| r.as_str())
        .collect();

    let mut merged = ResultTable::default();
    for row in left {
        let candidates = key_of(row, &spec.left_keys)
            .and_then(|key| index.get(&key))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut matched = false;
        let mut subsumed = false;
        for right_row in candidates {
            if !agrees(row, right_row, &shared) {
                continue;
            }
            matched = true;
            if contributes(row, right_row, &shared) {
                merged.push(combine(row, right_row, &shared));
            } else if !subsumed {
                subsumed = true;
                merged.push(row.clone());
            }
        }
        if !matched && spec.how == JoinHow::Left {
            merged.push(row.clone());
        }
    }
    Ok(merged)
}

fn check_keys(table: &ResultTable, keys: &[String], side: JoinSide) -> Result<(), QueryError> {
    if table.is_empty() {
        return Ok(());
    }
    let missing: Vec<String> = keys
        .iter()
        .filter(|k| !table.has_column(k))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(QueryError::MergeKeyMismatch { side, missing })
    }
}

/// Right columns, other than shared-name keys, that the left row also has
/// must hold the same value.
fn agrees(left: &ResultRow, right: &ResultRow, shared_keys: &HashSet<&str>) -> bool {
    right
        .iter()
        .filter(|(column, _)| !shared_keys.contains(column.as_str()))
        .all(|(column, value)| {
            left.get(column)
                .map_or(true, |existing| same_value(existing, value))
        })
}

/// Whether the right row adds a column the left row does not have yet.
fn contributes(left: &ResultRow, right: &ResultRow, shared_keys: &HashSet<&str>) -> bool {
    right
        .keys()
        .any(|column| !shared_keys.contains(column.as_str()) && !left.contains_key(column))
}

fn combine(left: &ResultRow, right: &ResultRow, shared_keys: &HashSet<&str>) -> ResultRow {
    let mut row = left.clone();
    for (column, value) in right {
        if !shared_keys.contains(column.as_str()) && !row.contains_key(column) {
            row.insert(column.clone(), value.clone());
        }
    }
    row
}

fn same_value(a: &Value, b: &Value) -> bool {
    a == b || matches!((key_atom(a), key_atom(b)), (Some(x), Some(y)) if x == y)
}

/// Canonical key tuple, `None` when any component is null or absent.
pub(crate) fn key_of(row: &ResultRow, keys: &[String]) -> Option<Vec<String>> {
    keys.iter()
        .map(|k| row.get(k).and_then(key_atom))
        .collect()
}

pub(crate) fn key_atom(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(format!("b:{b}")),
        Value::String(s) => Some(format!("s:{s}")),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(format!("n:{i}"))
            } else if let Some(u) = n.as_u64() {
                Some(format!("n:{u}"))
            } else {
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Some(format!("n:{}", f as i64))
                } else {
                    Some(format!("n:{f}"))
                }
            }
        }
        other => Some(format!("j:{other}")),
    }
}
