//! Post-merge summary arithmetic: derived columns, whole-table metrics and
//! grouped top-N breakdowns. Pure functions over a [`ResultTable`].

use crate::join::key_of;
use crate::table::{ResultRow, ResultTable};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::{HashMap, HashSet};

/// Aggregate over the rows of a table or group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "column", rename_all = "snake_case")]
pub enum Aggregate {
    /// Number of rows.
    Count,
    Sum(String),
    Mean(String),
    Min(String),
    Max(String),
    /// Number of distinct non-null values.
    Distinct(String),
}

impl Aggregate {
    pub fn column(&self) -> Option<&str> {
        match self {
            Aggregate::Count => None,
            Aggregate::Sum(c)
            | Aggregate::Mean(c)
            | Aggregate::Min(c)
            | Aggregate::Max(c)
            | Aggregate::Distinct(c) => Some(c),
        }
    }

    /// Evaluate over `rows`. Non-numeric cells are skipped by the numeric
    /// aggregates; an empty input gives `0` for sums and `null` for
    /// mean/min/max.
    pub fn evaluate(&self, rows: &[&ResultRow]) -> Value {
        let column = match self {
            Aggregate::Count => return Value::from(rows.len()),
            other => other.column().unwrap_or_default(),
        };
        let cells = rows.iter().filter_map(|r| r.get(column));
        match self {
            Aggregate::Count => Value::from(rows.len()),
            Aggregate::Sum(_) => sum(cells),
            Aggregate::Mean(_) => {
                let nums: Vec<f64> = cells.filter_map(Value::as_f64).collect();
                if nums.is_empty() {
                    Value::Null
                } else {
                    float(nums.iter().sum::<f64>() / nums.len() as f64)
                }
            }
            Aggregate::Min(_) => extreme(cells, |a, b| a < b),
            Aggregate::Max(_) => extreme(cells, |a, b| a > b),
            Aggregate::Distinct(_) => {
                let distinct: HashSet<String> =
                    cells.filter_map(crate::join::key_atom).collect();
                Value::from(distinct.len())
            }
        }
    }
}

fn sum<'a>(cells: impl Iterator<Item = &'a Value>) -> Value {
    let mut int_total: i64 = 0;
    let mut float_total = 0.0;
    let mut all_int = true;
    for cell in cells {
        if let Some(i) = cell.as_i64() {
            match int_total.checked_add(i) {
                Some(t) => int_total = t,
                None => all_int = false,
            }
            float_total += i as f64;
        } else if let Some(f) = cell.as_f64() {
            all_int = false;
            float_total += f;
        }
    }
    if all_int {
        Value::from(int_total)
    } else {
        float(float_total)
    }
}

fn extreme<'a>(cells: impl Iterator<Item = &'a Value>, better: impl Fn(f64, f64) -> bool) -> Value {
    let mut best: Option<(f64, &Value)> = None;
    for cell in cells {
        let Some(x) = cell.as_f64() else { continue };
        match best {
            Some((b, _)) if !better(x, b) => {}
            _ => best = Some((x, cell)),
        }
    }
    best.map_or(Value::Null, |(_, v)| v.clone())
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

/// A named aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub aggregate: Aggregate,
}

/// How a derived column is computed from two numeric columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Derivation {
    Product { left: String, right: String },
    Ratio { numerator: String, denominator: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    pub derivation: Derivation,
}

impl DerivedColumn {
    /// Value for one row; `None` when an operand is missing or not numeric,
    /// or the denominator is zero.
    pub fn compute(&self, row: &ResultRow) -> Option<Value> {
        let num = |c: &str| row.get(c).and_then(Value::as_f64);
        match &self.derivation {
            Derivation::Product { left, right } => {
                let (a, b) = (row.get(left)?, row.get(right)?);
                match (a.as_i64(), b.as_i64()) {
                    (Some(x), Some(y)) => x.checked_mul(y).map(Value::from),
                    _ => Some(float(a.as_f64()? * b.as_f64()?)),
                }
            }
            Derivation::Ratio {
                numerator,
                denominator,
            } => {
                let d = num(denominator)?;
                if d == 0.0 {
                    return None;
                }
                Some(float(num(numerator)? / d))
            }
        }
    }
}

/// Per-group metrics, optionally sorted (descending) by one metric and cut to
/// the first `limit` groups. Rows with a null or missing group column are not
/// grouped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub name: String,
    pub by: Vec<String>,
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl GroupSummary {
    pub fn new<I, S>(name: impl Into<String>, by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            by: by.into_iter().map(Into::into).collect(),
            metrics: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn metric(mut self, name: impl Into<String>, aggregate: Aggregate) -> Self {
        self.metrics.push(Metric {
            name: name.into(),
            aggregate,
        });
        self
    }

    pub fn top(mut self, order_by: impl Into<String>, limit: usize) -> Self {
        self.order_by = Some(order_by.into());
        self.limit = Some(limit);
        self
    }

    fn evaluate(&self, table: &ResultTable) -> Value {
        let mut order: Vec<Vec<String>> = Vec::new();
        let mut groups: HashMap<Vec<String>, Vec<&ResultRow>> = HashMap::new();
        for row in table {
            let Some(key) = key_of(row, &self.by) else {
                continue;
            };
            let members = groups.entry(key.clone()).or_default();
            if members.is_empty() {
                order.push(key);
            }
            members.push(row);
        }

        let mut out: Vec<ResultRow> = order
            .iter()
            .map(|key| {
                let members = &groups[key];
                let mut row = ResultRow::new();
                for column in &self.by {
                    if let Some(v) = members[0].get(column) {
                        row.insert(column.clone(), v.clone());
                    }
                }
                for metric in &self.metrics {
                    row.insert(metric.name.clone(), metric.aggregate.evaluate(members));
                }
                row
            })
            .collect();

        if let Some(order_by) = &self.order_by {
            let score = |r: &ResultRow| r.get(order_by).and_then(Value::as_f64);
            out.sort_by(|a, b| match (score(a), score(b)) {
                (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        Value::Array(out.into_iter().map(Value::Object).collect())
    }
}

/// Everything computed after a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarySpec {
    #[serde(default)]
    pub derived: Vec<DerivedColumn>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub groups: Vec<GroupSummary>,
}

impl SummarySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn derive(mut self, name: impl Into<String>, derivation: Derivation) -> Self {
        self.derived.push(DerivedColumn {
            name: name.into(),
            derivation,
        });
        self
    }

    pub fn metric(mut self, name: impl Into<String>, aggregate: Aggregate) -> Self {
        self.metrics.push(Metric {
            name: name.into(),
            aggregate,
        });
        self
    }

    pub fn group(mut self, group: GroupSummary) -> Self {
        self.groups.push(group);
        self
    }

    /// Add the derived columns to `table`.
    pub fn apply_derived(&self, table: &mut ResultTable) {
        for derived in &self.derived {
            table.add_column(&derived.name, |row| derived.compute(row));
        }
    }

    /// Evaluate metrics and groups over `table`. Returns the summary mapping
    /// and one warning per metric or group whose column is absent.
    pub fn compute(&self, table: &ResultTable) -> (Map<String, Value>, Vec<String>) {
        let mut summary = Map::new();
        let mut warnings = Vec::new();
        let rows: Vec<&ResultRow> = table.rows().iter().collect();

        for metric in &self.metrics {
            if let Some(column) = metric.aggregate.column() {
                if !table.is_empty() && !table.has_column(column) {
                    warnings.push(absent(&metric.name, column));
                    summary.insert(metric.name.clone(), Value::Null);
                    continue;
                }
            }
            summary.insert(metric.name.clone(), metric.aggregate.evaluate(&rows));
        }

        for group in &self.groups {
            let needed = group
                .by
                .iter()
                .map(String::as_str)
                .chain(group.metrics.iter().filter_map(|m| m.aggregate.column()));
            let missing: Vec<&str> = needed.filter(|c| !table.has_column(c)).collect();
            if !table.is_empty() && !missing.is_empty() {
                warnings.push(absent(&group.name, &missing.join(", ")));
                continue;
            }
            summary.insert(group.name.clone(), group.evaluate(table));
        }

        (summary, warnings)
    }
}

fn absent(name: &str, column: &str) -> String {
    tracing::warn!(summary = %name, column = %column, "summary column absent");
    format!("summary `{name}` skipped: column `{column}` is absent")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn table(value: Value) -> ResultTable {
        ResultTable::from_values(value.as_array().cloned().unwrap_or_default())
    }

    #[test]
    fn integer_sums_stay_integers() {
        let t = table(json!([{"total_sales": 42}, {"total_sales": 7}, {}]));
        let (summary, warnings) = SummarySpec::new()
            .metric("total_sales", Aggregate::Sum("total_sales".into()))
            .metric("franchises", Aggregate::Count)
            .compute(&t);
        assert!(warnings.is_empty());
        assert_eq!(summary["total_sales"], json!(49));
        assert_eq!(summary["franchises"], json!(3));
    }

    #[test]
    fn mean_min_max_and_distinct() {
        let t = table(json!([
            {"q": 1, "cat": "Coffee"},
            {"q": 2.5, "cat": "Tea"},
            {"q": "n/a", "cat": "Coffee"},
            {"q": null}
        ]));
        let rows: Vec<&ResultRow> = t.rows().iter().collect();
        assert_relative_eq!(
            Aggregate::Mean("q".into()).evaluate(&rows).as_f64().unwrap(),
            1.75
        );
        assert_eq!(Aggregate::Min("q".into()).evaluate(&rows), json!(1));
        assert_eq!(Aggregate::Max("q".into()).evaluate(&rows), json!(2.5));
        assert_eq!(Aggregate::Distinct("cat".into()).evaluate(&rows), json!(2));
        assert_eq!(Aggregate::Mean("zzz".into()).evaluate(&rows), Value::Null);
    }

    #[test]
    fn derived_product_and_ratio() {
        let mut t = table(json!([
            {"total_quantity": 3, "price": 2.5, "n": 0},
            {"total_quantity": 4, "price": 2},
            {"total_quantity": 4}
        ]));
        SummarySpec::new()
            .derive(
                "total_revenue",
                Derivation::Product {
                    left: "total_quantity".into(),
                    right: "price".into(),
                },
            )
            .derive(
                "per_n",
                Derivation::Ratio {
                    numerator: "total_quantity".into(),
                    denominator: "n".into(),
                },
            )
            .apply_derived(&mut t);
        assert_eq!(t.values("total_revenue"), vec![json!(7.5), json!(8)]);
        assert!(!t.has_column("per_n"));
    }

    #[test]
    fn grouped_top_n_sorted_descending() {
        let t = table(json!([
            {"kota": "Jakarta", "total_sales": 10},
            {"kota": "Bandung", "total_sales": 30},
            {"kota": "Jakarta", "total_sales": 25},
            {"kota": null, "total_sales": 100},
            {"kota": "Depok", "total_sales": 1}
        ]));
        let spec = SummarySpec::new().group(
            GroupSummary::new("top_cities", ["kota"])
                .metric("total_sales", Aggregate::Sum("total_sales".into()))
                .top("total_sales", 2),
        );
        let (summary, _) = spec.compute(&t);
        assert_eq!(
            summary["top_cities"],
            json!([
                {"kota": "Jakarta", "total_sales": 35},
                {"kota": "Bandung", "total_sales": 30}
            ])
        );
    }

    #[test]
    fn absent_columns_are_warned_not_fatal() {
        let t = table(json!([{"total_sales": 1}]));
        let (summary, warnings) = SummarySpec::new()
            .metric("revenue", Aggregate::Sum("total_revenue".into()))
            .group(GroupSummary::new("by_city", ["kota"]).metric("n", Aggregate::Count))
            .compute(&t);
        assert_eq!(summary["revenue"], Value::Null);
        assert!(!summary.contains_key("by_city"));
        assert_eq!(warnings.len(), 2);
    }
}
