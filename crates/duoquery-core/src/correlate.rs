//! Document-then-graph correlation.
//!
//! One analytical run goes through four stages, strictly in order:
//!
//! 1. the document query runs; an empty result ends the run as
//!    [`CorrelationOutcome::NoData`] without touching the graph store,
//! 2. key values are extracted from the document rows and bound as graph
//!    query parameters,
//! 3. both tables are merged per [`JoinSpec`],
//! 4. summary aggregates are computed over the merged table.
//!
//! Backend failures and merge key mismatches do not abort the run: they are
//! recorded in [`CombinedResult::warnings`] and the run continues with the
//! data it has. Caller errors (malformed query or parameters) are returned as
//! `Err` before any connection is opened.

use crate::connection::{DocumentConnectionInfo, GraphConnectionInfo};
use crate::document::{DocumentBackend, DocumentQueryExecutor};
use crate::error::QueryError;
use crate::graph::{GraphBackend, GraphQueryExecutor};
use crate::join::{merge, JoinSpec};
use crate::query::{ExecutionMode, Projection, QuerySpec};
use crate::summary::SummarySpec;
use crate::table::ResultTable;
use crate::tasks::AnalyticalTask;
use crate::timing::TimingSample;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Graph query parameters derived from document rows: name -> key values.
pub type KeyParameters = BTreeMap<String, Vec<Value>>;

/// Declarative key extraction from one document column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum KeyExtraction {
    /// Distinct non-null values, in first-seen order.
    Distinct { column: String, parameter: String },
    /// One value per row, nulls included (missing cells become null).
    All { column: String, parameter: String },
}

impl KeyExtraction {
    pub fn distinct(column: impl Into<String>, parameter: impl Into<String>) -> Self {
        KeyExtraction::Distinct {
            column: column.into(),
            parameter: parameter.into(),
        }
    }

    pub fn all(column: impl Into<String>, parameter: impl Into<String>) -> Self {
        KeyExtraction::All {
            column: column.into(),
            parameter: parameter.into(),
        }
    }

    pub fn extract(&self, table: &ResultTable) -> KeyParameters {
        let (parameter, values) = match self {
            KeyExtraction::Distinct { column, parameter } => {
                (parameter, table.distinct_values(column))
            }
            KeyExtraction::All { column, parameter } => (
                parameter,
                table
                    .column(column)
                    .map(|v| v.cloned().unwrap_or(Value::Null))
                    .collect(),
            ),
        };
        KeyParameters::from([(parameter.clone(), values)])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub connection: DocumentConnectionInfo,
    pub collection: String,
    pub query: QuerySpec,
    #[serde(default)]
    pub projection: Option<Projection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRequest {
    pub connection: GraphConnectionInfo,
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationOutcome {
    /// The document query returned no rows; the graph store was not queried.
    NoData,
    Merged,
    /// The join keys were missing; both tables are returned unmerged.
    Unmerged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    pub outcome: CorrelationOutcome,
    pub left: ResultTable,
    pub right: ResultTable,
    pub merged: Option<ResultTable>,
    pub summary: Map<String, Value>,
    pub warnings: Vec<String>,
    pub timings: Vec<TimingSample>,
}

impl CombinedResult {
    fn no_data(left: ResultTable, warnings: Vec<String>, timings: Vec<TimingSample>) -> Self {
        Self {
            outcome: CorrelationOutcome::NoData,
            left,
            right: ResultTable::default(),
            merged: Some(ResultTable::default()),
            summary: Map::new(),
            warnings,
            timings,
        }
    }

    /// Sum of the round-trip timings of this run, in seconds.
    pub fn total_seconds(&self) -> f64 {
        self.timings.iter().map(|t| t.elapsed_seconds).sum()
    }
}

/// Drives a document executor and a graph executor through one run.
pub struct ResultCorrelator<D, G> {
    documents: DocumentQueryExecutor<D>,
    graph: GraphQueryExecutor<G>,
}

impl<D: DocumentBackend, G: GraphBackend> ResultCorrelator<D, G> {
    pub fn new(documents: DocumentQueryExecutor<D>, graph: GraphQueryExecutor<G>) -> Self {
        Self { documents, graph }
    }

    pub fn documents(&self) -> &DocumentQueryExecutor<D> {
        &self.documents
    }

    pub fn graph(&self) -> &GraphQueryExecutor<G> {
        &self.graph
    }

    pub fn correlate<K>(
        &self,
        document: &DocumentRequest,
        graph: &GraphRequest,
        mode: ExecutionMode,
        key_extraction: K,
        join: &JoinSpec,
        summary: &SummarySpec,
    ) -> Result<CombinedResult, QueryError>
    where
        K: Fn(&ResultTable) -> KeyParameters,
    {
        let mut warnings = Vec::new();
        let mut timings = Vec::new();

        let (left, timing, error) = self
            .documents
            .execute(
                &document.connection,
                &document.collection,
                &document.query,
                mode,
                document.projection.as_ref(),
            )?
            .into_parts();
        timings.push(timing);
        warnings.extend(error.map(|e| e.to_string()));

        if left.is_empty() {
            tracing::info!(collection = %document.collection, mode = %mode, "document query returned no data");
            return Ok(CombinedResult::no_data(left, warnings, timings));
        }

        let keys = key_extraction(&left);
        for (name, values) in &keys {
            if values.is_empty() {
                warnings.push(format!("key parameter `{name}` is empty"));
            }
        }
        let parameters = Value::Object(
            keys.into_iter()
                .map(|(name, values)| (name, Value::Array(values)))
                .collect(),
        );

        let (right, timing, error) = self
            .graph
            .execute(&graph.connection, &graph.query, Some(&parameters), mode)?
            .into_parts();
        timings.push(timing);
        warnings.extend(error.map(|e| e.to_string()));

        let (outcome, mut merged) = match merge(&left, &right, join) {
            Ok(merged) => (CorrelationOutcome::Merged, Some(merged)),
            Err(err) => {
                tracing::warn!(error = %err, "results left unmerged");
                warnings.push(err.to_string());
                (CorrelationOutcome::Unmerged, None)
            }
        };

        let (summary, summary_warnings) = match merged.as_mut() {
            Some(merged) => {
                summary.apply_derived(merged);
                summary.compute(merged)
            }
            None => summary.compute(&left),
        };
        warnings.extend(summary_warnings);

        Ok(CombinedResult {
            outcome,
            left,
            right,
            merged,
            summary,
            warnings,
            timings,
        })
    }

    /// Run a catalog task in `mode`.
    pub fn run_task(
        &self,
        task: &AnalyticalTask,
        document: &DocumentConnectionInfo,
        graph: &GraphConnectionInfo,
        mode: ExecutionMode,
    ) -> Result<CombinedResult, QueryError> {
        let document = DocumentRequest {
            connection: document.clone(),
            collection: task.collection.clone(),
            query: task.document_query.clone(),
            projection: None,
        };
        let graph = GraphRequest {
            connection: graph.clone(),
            query: task.graph_query(mode).to_string(),
        };
        self.correlate(
            &document,
            &graph,
            mode,
            |table| task.keys.extract(table),
            &task.join,
            &task.summary,
        )
    }
}
