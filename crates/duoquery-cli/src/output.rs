//! Plain-text rendering of tables, summaries and statistics.

use duoquery_core::{
    ColumnStats, CombinedResult, CorrelationOutcome, ModeComparison, ResultTable, TimingSample,
};
use serde_json::{Map, Value};
use std::fmt::Write;

const MAX_CELL_WIDTH: usize = 40;

/// Render `table` as aligned columns with a header and a rule.
pub fn render_table(table: &ResultTable) -> String {
    let columns = table.columns();
    if columns.is_empty() {
        return "(no rows)\n".to_string();
    }
    let cells: Vec<Vec<String>> = table
        .rows()
        .iter()
        .map(|row| columns.iter().map(|c| cell(row.get(c))).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    push_line(&mut out, columns.iter().map(String::as_str), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, rule.iter().map(String::as_str), &widths);
    for row in &cells {
        push_line(&mut out, row.iter().map(String::as_str), &widths);
    }
    let _ = writeln!(out, "({} rows)", table.len());
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let line: Vec<String> = cells
        .zip(widths.iter().copied())
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    let _ = writeln!(out, "{}", line.join("  ").trim_end());
}

fn cell(value: Option<&Value>) -> String {
    let text = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if text.chars().count() > MAX_CELL_WIDTH {
        let short: String = text.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{short}...")
    } else {
        text
    }
}

/// Scalars as `key: value`; arrays of objects as nested tables.
pub fn render_summary(summary: &Map<String, Value>) -> String {
    let mut out = String::new();
    for (key, value) in summary {
        match value {
            Value::Array(items) if items.iter().all(Value::is_object) => {
                let _ = writeln!(out, "{key}:");
                out.push_str(&render_table(&ResultTable::from_values(items.clone())));
            }
            Value::Number(n) => {
                let text = match (n.as_i64(), n.as_f64()) {
                    (Some(i), _) => i.to_string(),
                    (None, Some(f)) => format!("{f:.2}"),
                    _ => n.to_string(),
                };
                let _ = writeln!(out, "{key}: {text}");
            }
            other => {
                let _ = writeln!(out, "{key}: {}", cell(Some(other)));
            }
        }
    }
    out
}

/// Both result tables, the merge and the summary of one correlation.
pub fn render_combined(result: &CombinedResult) -> String {
    if result.outcome == CorrelationOutcome::NoData {
        return "document query returned no data; graph query skipped\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "Document result");
    out.push_str(&render_table(&result.left));
    let _ = writeln!(out, "Graph result");
    out.push_str(&render_table(&result.right));
    match &result.merged {
        Some(merged) => {
            let _ = writeln!(out, "Merged");
            out.push_str(&render_table(merged));
        }
        None => {
            let _ = writeln!(out, "results could not be merged (see warnings)");
        }
    }
    if !result.summary.is_empty() {
        let _ = writeln!(out, "Summary");
        out.push_str(&render_summary(&result.summary));
    }
    out
}

pub fn render_stats(stats: &[ColumnStats]) -> String {
    let fmt = |x: f64| format!("{x:.4}");
    let rows = stats.iter().map(|s| {
        serde_json::json!({
            "column": s.column,
            "count": s.count,
            "mean": fmt(s.mean),
            "std": s.std.map(fmt),
            "min": fmt(s.min),
            "25%": fmt(s.p25),
            "50%": fmt(s.p50),
            "75%": fmt(s.p75),
            "max": fmt(s.max),
        })
    });
    render_table(&ResultTable::from_values(rows))
}

pub fn format_seconds(seconds: f64) -> String {
    format!("{seconds:.4} s")
}

pub fn render_timing(sample: &TimingSample) -> String {
    format!(
        "{} [{}] {}",
        sample.operation_label,
        sample.mode,
        format_seconds(sample.elapsed_seconds)
    )
}

pub fn render_comparison(cmp: &ModeComparison) -> String {
    let improvement = cmp
        .improvement_percent
        .map_or_else(|| "n/a".to_string(), |p| format!("{p:.2}%"));
    format!(
        "baseline:  {}\noptimized: {}\nimprovement: {}\n",
        format_seconds(cmp.baseline_seconds),
        format_seconds(cmp.optimized_seconds),
        improvement
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tables_are_aligned_and_absent_cells_blank() {
        let table = ResultTable::from_values(vec![
            json!({"_id": 1, "kota": "Jakarta"}),
            json!({"_id": 22}),
        ]);
        assert_eq!(
            render_table(&table),
            "_id  kota\n---  -------\n1    Jakarta\n22\n(2 rows)\n"
        );
        assert_eq!(render_table(&ResultTable::default()), "(no rows)\n");
    }

    #[test]
    fn long_cells_are_shortened() {
        let table = ResultTable::from_values(vec![json!({"q": "x".repeat(100)})]);
        let rendered = render_table(&table);
        assert!(rendered.lines().nth(2).unwrap().ends_with("..."));
        assert_eq!(rendered.lines().nth(2).unwrap().chars().count(), MAX_CELL_WIDTH);
    }

    #[test]
    fn summary_renders_scalars_and_groups() {
        let summary = json!({
            "total_sales": 49,
            "avg": 24.5,
            "sales_per_city": [{"kota": "Jakarta", "total_sales": 42}]
        });
        let text = render_summary(summary.as_object().unwrap());
        assert!(text.starts_with("total_sales: 49\navg: 24.50\nsales_per_city:\n"));
        assert!(text.contains("Jakarta"));
    }

    fn combined(outcome: CorrelationOutcome, merged: Option<ResultTable>) -> CombinedResult {
        CombinedResult {
            outcome,
            left: ResultTable::from_values(vec![json!({"_id": 1, "total_sales": 42})]),
            right: ResultTable::default(),
            merged,
            summary: Map::new(),
            warnings: Vec::new(),
            timings: Vec::new(),
        }
    }

    #[test]
    fn no_data_outcome_is_explained() {
        let mut result = combined(CorrelationOutcome::NoData, Some(ResultTable::default()));
        result.left = ResultTable::default();
        assert_eq!(
            render_combined(&result),
            "document query returned no data; graph query skipped\n"
        );
    }

    #[test]
    fn unmerged_outcome_keeps_both_tables() {
        let text = render_combined(&combined(CorrelationOutcome::Unmerged, None));
        assert!(text.starts_with("Document result\n_id  total_sales\n"));
        assert!(text.contains("Graph result\n(no rows)\n"));
        assert!(text.contains("results could not be merged"));
        assert!(!text.contains("Merged"));
    }

    #[test]
    fn comparison_without_baseline_has_no_percentage() {
        let cmp = ModeComparison {
            baseline_seconds: 0.0,
            optimized_seconds: 0.5,
            improvement_percent: None,
        };
        assert!(render_comparison(&cmp).ends_with("improvement: n/a\n"));
    }
}
