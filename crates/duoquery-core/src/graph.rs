//! Graph-store execution and record normalization.
//!
//! Graph backends return records whose fields may be plain scalars, nodes,
//! relationships or identity-bearing values without properties (paths,
//! points). Each field is resolved once into a [`NormalizedField`] and then
//! flattened, so rows mixing scalars and entities come out as plain mappings.

use crate::connection::GraphConnectionInfo;
use crate::error::{BackendError, BackendKind, QueryError};
use crate::query::{json_type_name, ExecutionMode};
use crate::table::{ResultRow, ResultTable};
use crate::timing::{time_round_trip, Execution, TimingSample};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Node,
    Relationship,
}

/// A node or relationship as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEntity {
    pub kind: EntityKind,
    /// Backend identity (element id).
    pub id: String,
    /// Node labels, or the single relationship type.
    pub labels: Vec<String>,
    pub properties: Map<String, Value>,
}

impl GraphEntity {
    pub fn node(id: impl Into<String>, labels: &[&str], properties: Map<String, Value>) -> Self {
        Self {
            kind: EntityKind::Node,
            id: id.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties,
        }
    }

    pub fn relationship(id: impl Into<String>, rel_type: &str, properties: Map<String, Value>) -> Self {
        Self {
            kind: EntityKind::Relationship,
            id: id.into(),
            labels: vec![rel_type.to_string()],
            properties,
        }
    }
}

impl fmt::Display for GraphEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (open, close) = match self.kind {
            EntityKind::Node => ('(', ')'),
            EntityKind::Relationship => ('[', ']'),
        };
        write!(f, "{open}{}", self.id)?;
        for label in &self.labels {
            write!(f, ":{label}")?;
        }
        write!(f, "{close}")
    }
}

/// One field value of a graph record.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphValue {
    Scalar(Value),
    Entity(GraphEntity),
    List(Vec<GraphValue>),
    /// Identity-bearing value with no enumerable properties, kept as its
    /// display string.
    Opaque(String),
}

impl From<Value> for GraphValue {
    fn from(value: Value) -> Self {
        GraphValue::Scalar(value)
    }
}

impl From<GraphEntity> for GraphValue {
    fn from(entity: GraphEntity) -> Self {
        GraphValue::Entity(entity)
    }
}

/// A graph record: ordered `(key, value)` fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphRecord {
    fields: Vec<(String, GraphValue)>,
}

impl GraphRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<GraphValue>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<GraphValue>) {
        self.fields.push((key.into(), value.into()));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&GraphValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A field after shape resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedField {
    Scalar(Value),
    Entity(Map<String, Value>),
    Opaque(String),
}

impl NormalizedField {
    pub fn resolve(value: GraphValue) -> Self {
        match value {
            GraphValue::Scalar(v) => NormalizedField::Scalar(v),
            GraphValue::Entity(entity) if !entity.properties.is_empty() => {
                NormalizedField::Entity(entity.properties)
            }
            GraphValue::Entity(entity) => NormalizedField::Opaque(entity.to_string()),
            GraphValue::List(items) => NormalizedField::Scalar(Value::Array(
                items
                    .into_iter()
                    .map(|item| NormalizedField::resolve(item).into_value())
                    .collect(),
            )),
            GraphValue::Opaque(display) => NormalizedField::Opaque(display),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            NormalizedField::Scalar(v) => v,
            NormalizedField::Entity(properties) => Value::Object(properties),
            NormalizedField::Opaque(display) => Value::String(display),
        }
    }
}

/// Flatten a record field by field.
pub fn normalize_record(record: GraphRecord) -> ResultRow {
    record
        .fields
        .into_iter()
        .map(|(key, value)| (key, NormalizedField::resolve(value).into_value()))
        .collect()
}

/// An open session against a graph store.
pub trait GraphSession {
    /// Run `query` with bound `parameters`, returning every record.
    fn run(
        &mut self,
        query: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Vec<GraphRecord>, BackendError>;

    /// Release the session. Called exactly once by the executor.
    fn close(&mut self);
}

/// Factory for graph sessions.
pub trait GraphBackend {
    type Session: GraphSession;

    fn open_session(&self, info: &GraphConnectionInfo) -> Result<Self::Session, BackendError>;
}

struct SessionGuard<S: GraphSession> {
    session: S,
}

impl<S: GraphSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: GraphSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: GraphSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.close();
    }
}

/// Labels and relationship types known to the graph store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
}

pub const LABELS_QUERY: &str = "CALL db.labels() YIELD label RETURN label ORDER BY label";
pub const RELATIONSHIP_TYPES_QUERY: &str = "CALL db.relationshipTypes() YIELD relationshipType \
     RETURN relationshipType ORDER BY relationshipType";

/// Runs parameterized graph queries. The executor is mode-agnostic: `mode`
/// only labels the timing sample, the query text carries any optimization.
pub struct GraphQueryExecutor<B> {
    backend: B,
}

impl<B: GraphBackend> GraphQueryExecutor<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Execute `query_text` with `parameters` bound by the backend.
    ///
    /// `parameters` must be a mapping when present (`InvalidParameters`), and
    /// the query text must not be blank (`InvalidQueryShape`); both are
    /// checked before a session is opened. Backend failures come back as
    /// `Ok` with an empty table, zero timing and `error` set.
    pub fn execute(
        &self,
        info: &GraphConnectionInfo,
        query_text: &str,
        parameters: Option<&Value>,
        mode: ExecutionMode,
    ) -> Result<Execution, QueryError> {
        let parameters = match parameters {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(QueryError::InvalidParameters(format!(
                    "parameters must be a mapping, got {}",
                    json_type_name(other)
                )))
            }
        };
        if query_text.trim().is_empty() {
            return Err(QueryError::InvalidQueryShape(
                "graph query text is empty".to_string(),
            ));
        }

        let label = operation_label(query_text);
        let mut session = match self.backend.open_session(info) {
            Ok(session) => SessionGuard { session },
            Err(err) => return Ok(unavailable(label, mode, err)),
        };

        let (result, elapsed) = time_round_trip(|| session.run(query_text, &parameters));
        drop(session);

        let records = match result {
            Ok(records) => records,
            Err(err) => return Ok(unavailable(label, mode, err)),
        };
        let table: ResultTable = records.into_iter().map(normalize_record).collect();

        tracing::debug!(
            backend = "graph",
            operation = %label,
            mode = %mode,
            rows = table.len(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "graph query executed"
        );

        Ok(Execution::succeeded(
            table,
            TimingSample::new(label, mode, elapsed),
        ))
    }

    /// List node labels and relationship types (also a connection check).
    pub fn database_info(&self, info: &GraphConnectionInfo) -> Result<DatabaseInfo, QueryError> {
        let labels = self.single_column(info, LABELS_QUERY, "label")?;
        let relationship_types =
            self.single_column(info, RELATIONSHIP_TYPES_QUERY, "relationshipType")?;
        Ok(DatabaseInfo {
            labels,
            relationship_types,
        })
    }

    fn single_column(
        &self,
        info: &GraphConnectionInfo,
        query: &str,
        column: &str,
    ) -> Result<Vec<String>, QueryError> {
        let run = self.execute(info, query, None, ExecutionMode::Baseline)?;
        if let Some(err) = run.error {
            return Err(err);
        }
        Ok(run
            .table
            .values(column)
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect())
    }
}

/// First non-blank line of the query, shortened for log and timing labels.
fn operation_label(query_text: &str) -> String {
    const MAX: usize = 60;
    let line = query_text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    if line.chars().count() > MAX {
        let short: String = line.chars().take(MAX).collect();
        format!("graph {short}...")
    } else {
        format!("graph {line}")
    }
}

fn unavailable(label: String, mode: ExecutionMode, err: BackendError) -> Execution {
    let err = err.into_query_error(BackendKind::Graph);
    tracing::warn!(operation = %label, mode = %mode, error = %err, "graph query failed");
    Execution::failed(label, mode, err)
}
