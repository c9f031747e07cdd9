//! Scripted in-memory backends with call counters.
//!
//! The document backend applies top-level equality filters, projections and
//! limits; pipelines return a scripted result per collection (or the raw
//! collection). The graph backend answers from scripted record sets. Both
//! record connects, round trips and closes.

use crate::connection::{DocumentConnectionInfo, GraphConnectionInfo};
use crate::document::{DocumentBackend, DocumentConnection};
use crate::error::BackendError;
use crate::graph::{GraphBackend, GraphRecord, GraphSession};
use crate::query::Document;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Counters shared by a scripted backend and its connections.
#[derive(Debug, Clone, Default)]
pub struct CallStats {
    connects: usize,
    round_trips: usize,
    closes: usize,
    targets: Vec<String>,
    last_parameters: Option<Value>,
}

impl CallStats {
    pub fn connects(&self) -> usize {
        self.connects
    }

    pub fn round_trips(&self) -> usize {
        self.round_trips
    }

    pub fn closes(&self) -> usize {
        self.closes
    }

    /// Collections read, in call order.
    pub fn collections_touched(&self) -> Vec<&str> {
        self.targets.iter().map(String::as_str).collect()
    }

    /// Graph query texts run, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.targets.clone()
    }

    pub fn last_parameters(&self) -> Option<Value> {
        self.last_parameters.clone()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Failure {
    #[default]
    None,
    Connect,
    RoundTrip,
}

/// In-memory document store.
#[derive(Debug, Default)]
pub struct ScriptedDocumentBackend {
    collections: HashMap<String, Vec<Document>>,
    pipeline_results: HashMap<String, Vec<Document>>,
    failure: Failure,
    stats: Rc<RefCell<CallStats>>,
}

impl ScriptedDocumentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, name: &str, documents: Vec<Document>) -> Self {
        self.collections.insert(name.to_string(), documents);
        self
    }

    /// Result returned by any pipeline over `collection`.
    pub fn with_pipeline_result(mut self, collection: &str, documents: Vec<Document>) -> Self {
        self.pipeline_results.insert(collection.to_string(), documents);
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.failure = Failure::Connect;
        self
    }

    pub fn failing_round_trip(mut self) -> Self {
        self.failure = Failure::RoundTrip;
        self
    }

    pub fn stats(&self) -> CallStats {
        self.stats.borrow().clone()
    }
}

pub struct ScriptedDocumentConnection {
    collections: HashMap<String, Vec<Document>>,
    pipeline_results: HashMap<String, Vec<Document>>,
    failure: Failure,
    stats: Rc<RefCell<CallStats>>,
}

impl DocumentBackend for ScriptedDocumentBackend {
    type Connection = ScriptedDocumentConnection;

    fn connect(&self, _info: &DocumentConnectionInfo) -> Result<Self::Connection, BackendError> {
        if self.failure == Failure::Connect {
            return Err(BackendError::Connect("scripted connect failure".to_string()));
        }
        self.stats.borrow_mut().connects += 1;
        Ok(ScriptedDocumentConnection {
            collections: self.collections.clone(),
            pipeline_results: self.pipeline_results.clone(),
            failure: self.failure,
            stats: Rc::clone(&self.stats),
        })
    }
}

impl ScriptedDocumentConnection {
    fn begin(&self, collection: &str) -> Result<(), BackendError> {
        let mut stats = self.stats.borrow_mut();
        stats.round_trips += 1;
        stats.targets.push(collection.to_string());
        if self.failure == Failure::RoundTrip {
            return Err(BackendError::Request("scripted round-trip failure".to_string()));
        }
        Ok(())
    }
}

impl DocumentConnection for ScriptedDocumentConnection {
    fn find(
        &mut self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
        limit: Option<u64>,
    ) -> Result<Vec<Document>, BackendError> {
        self.begin(collection)?;
        let docs = self.collections.get(collection).cloned().unwrap_or_default();
        let limit = limit.map_or(usize::MAX, |l| l as usize);
        Ok(docs
            .into_iter()
            .filter(|doc| filter.iter().all(|(k, v)| doc.get(k) == Some(v)))
            .take(limit)
            .map(|doc| project(doc, projection))
            .collect())
    }

    fn aggregate(
        &mut self,
        collection: &str,
        _pipeline: &[Document],
    ) -> Result<Vec<Document>, BackendError> {
        self.begin(collection)?;
        Ok(self
            .pipeline_results
            .get(collection)
            .or_else(|| self.collections.get(collection))
            .cloned()
            .unwrap_or_default())
    }

    fn close(&mut self) {
        self.stats.borrow_mut().closes += 1;
    }
}

fn project(mut doc: Document, projection: Option<&Document>) -> Document {
    let Some(projection) = projection else {
        return doc;
    };
    let including = projection.values().any(|v| v.as_i64() == Some(1));
    if including {
        doc.retain(|k, _| projection.get(k).and_then(Value::as_i64) == Some(1));
    } else {
        doc.retain(|k, _| !projection.contains_key(k));
    }
    doc
}

/// In-memory graph store answering from scripted records.
#[derive(Debug, Default)]
pub struct ScriptedGraphBackend {
    default_records: Vec<GraphRecord>,
    routes: Vec<(String, Vec<GraphRecord>)>,
    failure: Failure,
    stats: Rc<RefCell<CallStats>>,
}

impl ScriptedGraphBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records returned for any query without a more specific route.
    pub fn with_records(mut self, records: Vec<GraphRecord>) -> Self {
        self.default_records = records;
        self
    }

    /// Records returned for queries containing `needle`.
    pub fn respond_to(mut self, needle: &str, records: Vec<GraphRecord>) -> Self {
        self.routes.push((needle.to_string(), records));
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.failure = Failure::Connect;
        self
    }

    pub fn failing_round_trip(mut self) -> Self {
        self.failure = Failure::RoundTrip;
        self
    }

    pub fn stats(&self) -> CallStats {
        self.stats.borrow().clone()
    }
}

pub struct ScriptedGraphSession {
    default_records: Vec<GraphRecord>,
    routes: Vec<(String, Vec<GraphRecord>)>,
    failure: Failure,
    stats: Rc<RefCell<CallStats>>,
}

impl GraphBackend for ScriptedGraphBackend {
    type Session = ScriptedGraphSession;

    fn open_session(&self, _info: &GraphConnectionInfo) -> Result<Self::Session, BackendError> {
        if self.failure == Failure::Connect {
            return Err(BackendError::Connect("scripted session failure".to_string()));
        }
        self.stats.borrow_mut().connects += 1;
        Ok(ScriptedGraphSession {
            default_records: self.default_records.clone(),
            routes: self.routes.clone(),
            failure: self.failure,
            stats: Rc::clone(&self.stats),
        })
    }
}

impl GraphSession for ScriptedGraphSession {
    fn run(
        &mut self,
        query: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Vec<GraphRecord>, BackendError> {
        {
            let mut stats = self.stats.borrow_mut();
            stats.round_trips += 1;
            stats.targets.push(query.to_string());
            stats.last_parameters = Some(Value::Object(parameters.clone()));
        }
        if self.failure == Failure::RoundTrip {
            return Err(BackendError::Engine {
                code: "Neo.ClientError.Statement.SyntaxError".to_string(),
                message: "scripted failure".to_string(),
            });
        }
        let records = self
            .routes
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, records)| records)
            .unwrap_or(&self.default_records);
        Ok(records.clone())
    }

    fn close(&mut self) {
        self.stats.borrow_mut().closes += 1;
    }
}
