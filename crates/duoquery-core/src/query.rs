//! Query descriptions accepted by the document executor.
//!
//! Input from the operator is untrusted: it is parsed as JSON and validated
//! into a [`QuerySpec`], never evaluated.

use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A JSON object as exchanged with the document store.
pub type Document = Map<String, Value>;

/// Which physical resource backs a logical query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Unindexed collection / unoptimized query text.
    Baseline,
    /// Pre-indexed collection / optimized query text.
    Optimized,
}

impl ExecutionMode {
    pub const ALL: [ExecutionMode; 2] = [ExecutionMode::Baseline, ExecutionMode::Optimized];

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Baseline => "baseline",
            ExecutionMode::Optimized => "optimized",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" | "unoptimized" | "without-index" => Ok(ExecutionMode::Baseline),
            "optimized" | "with-index" => Ok(ExecutionMode::Optimized),
            other => Err(format!(
                "unknown mode `{other}` (expected `baseline` or `optimized`)"
            )),
        }
    }
}

/// Query tag, used when parsing raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Filter,
    Pipeline,
}

impl FromStr for QueryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filter" | "find" => Ok(QueryKind::Filter),
            "pipeline" | "aggregate" => Ok(QueryKind::Pipeline),
            other => Err(format!(
                "unknown query kind `{other}` (expected `find` or `aggregate`)"
            )),
        }
    }
}

/// A document-store query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum QuerySpec {
    /// Point/range lookup: a single predicate document.
    Filter(Document),
    /// Ordered transform stages (`$match`, `$group`, `$project`, `$sort`,
    /// `$unwind`, ...), applied by the backend.
    Pipeline(Vec<Document>),
}

impl QuerySpec {
    /// Match-everything filter.
    pub fn all() -> Self {
        QuerySpec::Filter(Document::new())
    }

    pub fn kind(&self) -> QueryKind {
        match self {
            QuerySpec::Filter(_) => QueryKind::Filter,
            QuerySpec::Pipeline(_) => QueryKind::Pipeline,
        }
    }

    /// Build from an already-parsed JSON value, checking the shape against
    /// the tag. An empty filter input (`null`) means "match everything".
    pub fn from_value(kind: QueryKind, value: Value) -> Result<Self, QueryError> {
        let spec = match (kind, value) {
            (QueryKind::Filter, Value::Null) => QuerySpec::all(),
            (QueryKind::Filter, Value::Object(predicate)) => QuerySpec::Filter(predicate),
            (QueryKind::Filter, other) => {
                return Err(QueryError::InvalidQueryShape(format!(
                    "filter must be a mapping, got {}",
                    json_type_name(&other)
                )))
            }
            (QueryKind::Pipeline, Value::Array(items)) => {
                let mut stages = Vec::with_capacity(items.len());
                for (idx, item) in items.into_iter().enumerate() {
                    match item {
                        Value::Object(stage) => stages.push(stage),
                        other => {
                            return Err(QueryError::InvalidQueryShape(format!(
                                "pipeline stage {idx} must be a mapping, got {}",
                                json_type_name(&other)
                            )))
                        }
                    }
                }
                QuerySpec::Pipeline(stages)
            }
            (QueryKind::Pipeline, other) => {
                return Err(QueryError::InvalidQueryShape(format!(
                    "pipeline must be a sequence of stage mappings, got {}",
                    json_type_name(&other)
                )))
            }
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Parse operator-entered JSON text.
    pub fn parse(kind: QueryKind, text: &str) -> Result<Self, QueryError> {
        if text.trim().is_empty() {
            return Self::from_value(kind, Value::Null);
        }
        let value: Value = serde_json::from_str(text)
            .map_err(|e| QueryError::InvalidQueryShape(format!("not valid JSON: {e}")))?;
        Self::from_value(kind, value)
    }

    /// Check the structural invariants. Every pipeline stage is a mapping with
    /// exactly one `$`-prefixed operator key.
    pub fn validate(&self) -> Result<(), QueryError> {
        match self {
            QuerySpec::Filter(_) => Ok(()),
            QuerySpec::Pipeline(stages) => {
                for (idx, stage) in stages.iter().enumerate() {
                    let mut keys = stage.keys();
                    let (Some(op), None) = (keys.next(), keys.next()) else {
                        return Err(QueryError::InvalidQueryShape(format!(
                            "pipeline stage {idx} must hold exactly one operator, found {}",
                            stage.len()
                        )));
                    };
                    if !op.starts_with('$') || op.len() < 2 {
                        return Err(QueryError::InvalidQueryShape(format!(
                            "pipeline stage {idx} has operator `{op}`; stage operators start with `$`"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Columns to keep or drop from returned documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    Include(BTreeSet<String>),
    Exclude(BTreeSet<String>),
}

impl Projection {
    pub fn include<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Include(columns.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Exclude(columns.into_iter().map(Into::into).collect())
    }

    /// Backend projection document (`{col: 1}` / `{col: 0}`).
    pub fn to_document(&self) -> Document {
        let (columns, flag) = match self {
            Projection::Include(columns) => (columns, 1),
            Projection::Exclude(columns) => (columns, 0),
        };
        columns
            .iter()
            .map(|c| (c.clone(), Value::from(flag)))
            .collect()
    }

    pub fn keeps(&self, column: &str) -> bool {
        match self {
            Projection::Include(columns) => columns.contains(column),
            Projection::Exclude(columns) => !columns.contains(column),
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_filter_and_pipeline() {
        let filter = QuerySpec::parse(QueryKind::Filter, r#"{"name": "Michael Smith"}"#).unwrap();
        assert_eq!(filter.kind(), QueryKind::Filter);

        let pipeline = QuerySpec::parse(
            QueryKind::Pipeline,
            r#"[{"$match": {"name": "Michael Smith"}}, {"$sort": {"_id": 1}}]"#,
        )
        .unwrap();
        match pipeline {
            QuerySpec::Pipeline(stages) => assert_eq!(stages.len(), 2),
            other => panic!("expected pipeline, got {other:?}"),
        }
    }

    #[test]
    fn blank_filter_matches_everything() {
        assert_eq!(QuerySpec::parse(QueryKind::Filter, "  ").unwrap(), QuerySpec::all());
    }

    #[test]
    fn rejects_shape_mismatches() {
        let err = QuerySpec::from_value(QueryKind::Pipeline, json!({"$match": {}})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidQueryShape(_)));

        let err = QuerySpec::from_value(QueryKind::Filter, json!([{"$match": {}}])).unwrap_err();
        assert!(matches!(err, QueryError::InvalidQueryShape(_)));

        let err = QuerySpec::from_value(QueryKind::Pipeline, json!([{"$match": {}}, 3])).unwrap_err();
        assert_eq!(
            err,
            QueryError::InvalidQueryShape("pipeline stage 1 must be a mapping, got number".into())
        );
    }

    #[test]
    fn rejects_stages_without_single_operator() {
        let empty = QuerySpec::Pipeline(vec![Document::new()]);
        assert!(empty.validate().is_err());

        let two = QuerySpec::from_value(
            QueryKind::Pipeline,
            json!([{"$match": {}, "$sort": {"a": 1}}]),
        );
        assert!(two.is_err());

        let bare = QuerySpec::from_value(QueryKind::Pipeline, json!([{"match": {}}]));
        assert!(bare.is_err());
    }

    #[test]
    fn python_style_input_is_not_evaluated() {
        let err = QuerySpec::parse(QueryKind::Filter, "{'name': __import__('os')}").unwrap_err();
        assert!(err.to_string().starts_with("invalid query shape: not valid JSON"));
    }

    #[test]
    fn projection_documents() {
        let p = Projection::exclude(["_id"]);
        assert_eq!(Value::Object(p.to_document()), json!({"_id": 0}));
        assert!(!p.keeps("_id"));
        assert!(p.keeps("name"));

        let p = Projection::include(["name", "total"]);
        assert_eq!(Value::Object(p.to_document()), json!({"name": 1, "total": 1}));
        assert!(!p.keeps("_id"));
    }

    #[test]
    fn modes_parse_from_cli_spellings() {
        assert_eq!("With-Index".parse::<ExecutionMode>().unwrap(), ExecutionMode::Optimized);
        assert_eq!("baseline".parse::<ExecutionMode>().unwrap(), ExecutionMode::Baseline);
        assert!("fast".parse::<ExecutionMode>().is_err());
    }
}
