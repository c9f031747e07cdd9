//! Graph store over the Neo4j HTTP transaction endpoint.
//!
//! Each query is one auto-commit transaction. Rows are requested in both
//! `row` and `graph` form: `row` carries property maps and `meta` says which
//! fields are nodes or relationships, `graph` supplies their labels and types.

use crate::client::{base_url, build_client, endpoint, send_json};
use duoquery_core::{
    BackendError, EntityKind, GraphBackend, GraphConnectionInfo, GraphEntity, GraphRecord,
    GraphSession, GraphValue,
};
use reqwest::blocking::Client;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone, Copy, Default)]
pub struct Neo4jHttpBackend;

impl GraphBackend for Neo4jHttpBackend {
    type Session = Neo4jHttpSession;

    fn open_session(&self, info: &GraphConnectionInfo) -> Result<Self::Session, BackendError> {
        let base = base_url(&info.address)?;
        Ok(Neo4jHttpSession {
            client: build_client(info.timeout_secs)?,
            commit_url: endpoint(&base, &format!("db/{}/tx/commit", info.database))?,
            username: info.username.clone(),
            password: info.password.clone(),
        })
    }
}

pub struct Neo4jHttpSession {
    client: Client,
    commit_url: Url,
    username: String,
    password: String,
}

impl GraphSession for Neo4jHttpSession {
    fn run(
        &mut self,
        query: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Vec<GraphRecord>, BackendError> {
        let request = self
            .client
            .post(self.commit_url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .json(&statement_body(query, parameters));
        parse_records(send_json(request, &self.commit_url)?)
    }

    fn close(&mut self) {
        tracing::trace!(url = %self.commit_url, "neo4j session released");
    }
}

pub fn statement_body(query: &str, parameters: &Map<String, Value>) -> Value {
    json!({
        "statements": [{
            "statement": query,
            "parameters": parameters,
            "resultDataContents": ["row", "graph"],
        }]
    })
}

/// Decode the first statement result of a commit response.
pub fn parse_records(body: Value) -> Result<Vec<GraphRecord>, BackendError> {
    if let Some(err) = body
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
    {
        return Err(BackendError::Engine {
            code: err
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("Neo.DatabaseError.General.UnknownError")
                .to_string(),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    let result = body
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .ok_or_else(|| BackendError::Response("missing `results`".to_string()))?;
    let columns: Vec<String> = result
        .get("columns")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Response("missing `columns`".to_string()))?
        .iter()
        .map(|c| c.as_str().unwrap_or_default().to_string())
        .collect();
    let data = result
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Response("missing `data`".to_string()))?;

    data.iter().map(|entry| record(&columns, entry)).collect()
}

fn record(columns: &[String], entry: &Value) -> Result<GraphRecord, BackendError> {
    let row = entry
        .get("row")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Response("data entry without `row`".to_string()))?;
    let meta = entry.get("meta").and_then(Value::as_array);
    let labels = labels_by_id(entry.get("graph"));

    let mut record = GraphRecord::new();
    for (i, column) in columns.iter().enumerate() {
        let value = row.get(i).cloned().unwrap_or(Value::Null);
        let meta = meta.and_then(|m| m.get(i)).unwrap_or(&Value::Null);
        record.push(column.clone(), graph_value(value, meta, &labels));
    }
    Ok(record)
}

/// Node labels and relationship types from the `graph` section, keyed by
/// element id and by legacy numeric id.
fn labels_by_id(graph: Option<&Value>) -> HashMap<String, Vec<String>> {
    let mut out = HashMap::new();
    let Some(graph) = graph else {
        return out;
    };
    let entries = |key: &str| {
        graph
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    };
    for node in entries("nodes") {
        let labels: Vec<String> = node
            .get("labels")
            .and_then(Value::as_array)
            .map(|ls| ls.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        for id in ids(node) {
            out.insert(id, labels.clone());
        }
    }
    for rel in entries("relationships") {
        let rel_type: Vec<String> = rel
            .get("type")
            .and_then(Value::as_str)
            .map(|t| vec![t.to_string()])
            .unwrap_or_default();
        for id in ids(rel) {
            out.insert(id, rel_type.clone());
        }
    }
    out
}

fn ids(value: &Value) -> Vec<String> {
    ["elementId", "id"]
        .iter()
        .filter_map(|key| value.get(*key))
        .map(|id| id.as_str().map_or_else(|| id.to_string(), str::to_string))
        .collect()
}

fn graph_value(value: Value, meta: &Value, labels: &HashMap<String, Vec<String>>) -> GraphValue {
    match meta {
        Value::Object(m) => {
            let kind = match m.get("type").and_then(Value::as_str) {
                Some("node") => EntityKind::Node,
                Some("relationship") => EntityKind::Relationship,
                Some(_) => return GraphValue::Opaque(value.to_string()),
                None => return GraphValue::Scalar(value),
            };
            let id = ids(meta).into_iter().next().unwrap_or_default();
            let properties = match value {
                Value::Object(properties) => properties,
                _ => Map::new(),
            };
            GraphValue::Entity(GraphEntity {
                kind,
                labels: labels.get(&id).cloned().unwrap_or_default(),
                id,
                properties,
            })
        }
        Value::Array(metas) => match value {
            Value::Array(items) if items.len() == metas.len() => GraphValue::List(
                items
                    .into_iter()
                    .zip(metas)
                    .map(|(item, meta)| graph_value(item, meta, labels))
                    .collect(),
            ),
            other => GraphValue::Scalar(other),
        },
        _ => GraphValue::Scalar(value),
    }
}
