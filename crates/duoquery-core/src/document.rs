//! Document-store execution.

use crate::connection::{CollectionResolver, DocumentConnectionInfo};
use crate::error::{BackendError, BackendKind, QueryError};
use crate::query::{Document, ExecutionMode, Projection, QuerySpec};
use crate::table::ResultTable;
use crate::timing::{time_round_trip, Execution, TimingSample};
use std::ops::{Deref, DerefMut};

/// An open connection to a document store.
pub trait DocumentConnection {
    /// Documents of `collection` matching `filter`.
    fn find(
        &mut self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
        limit: Option<u64>,
    ) -> Result<Vec<Document>, BackendError>;

    /// Run an aggregation pipeline over `collection`.
    fn aggregate(
        &mut self,
        collection: &str,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, BackendError>;

    /// Release the connection. Called exactly once by the executor.
    fn close(&mut self);
}

/// Factory for document connections.
pub trait DocumentBackend {
    type Connection: DocumentConnection;

    fn connect(&self, info: &DocumentConnectionInfo) -> Result<Self::Connection, BackendError>;
}

/// Closes the wrapped connection when dropped, on every exit path.
struct ConnectionGuard<C: DocumentConnection> {
    conn: C,
}

impl<C: DocumentConnection> Deref for ConnectionGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C: DocumentConnection> DerefMut for ConnectionGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

impl<C: DocumentConnection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        self.conn.close();
    }
}

/// Runs filter and pipeline queries, selecting the physical collection from
/// the execution mode.
pub struct DocumentQueryExecutor<B> {
    backend: B,
    resolver: CollectionResolver,
}

impl<B: DocumentBackend> DocumentQueryExecutor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            resolver: CollectionResolver::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: CollectionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn resolver(&self) -> &CollectionResolver {
        &self.resolver
    }

    /// Execute `query` against the collection `logical_collection` resolves to
    /// under `mode`.
    ///
    /// Shape errors are returned as `Err` before a connection is opened.
    /// Backend failures come back as `Ok` with an empty table, a zero timing
    /// sample and `error` set.
    pub fn execute(
        &self,
        info: &DocumentConnectionInfo,
        logical_collection: &str,
        query: &QuerySpec,
        mode: ExecutionMode,
        projection: Option<&Projection>,
    ) -> Result<Execution, QueryError> {
        query.validate()?;

        let collection = self.resolver.resolve(logical_collection, mode);
        let label = match query {
            QuerySpec::Filter(_) => format!("find {collection}"),
            QuerySpec::Pipeline(_) => format!("aggregate {collection}"),
        };

        let mut conn = match self.backend.connect(info) {
            Ok(conn) => ConnectionGuard { conn },
            Err(err) => return Ok(unavailable(label, mode, err)),
        };

        let projection_doc = projection.map(Projection::to_document);
        let (result, elapsed) = time_round_trip(|| match query {
            QuerySpec::Filter(predicate) => {
                conn.find(collection, predicate, projection_doc.as_ref(), None)
            }
            QuerySpec::Pipeline(stages) => conn.aggregate(collection, stages),
        });
        drop(conn);

        let documents = match result {
            Ok(documents) => documents,
            Err(err) => return Ok(unavailable(label, mode, err)),
        };

        let mut table = ResultTable::new(documents);
        if let (QuerySpec::Pipeline(_), Some(projection)) = (query, projection) {
            table.retain_columns(|c| projection.keeps(c));
        }

        tracing::debug!(
            backend = "document",
            collection = %collection,
            mode = %mode,
            rows = table.len(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "document query executed"
        );

        Ok(Execution::succeeded(
            table,
            TimingSample::new(label, mode, elapsed),
        ))
    }

    /// Column names of one sample document from the resolved collection.
    pub fn sample_columns(
        &self,
        info: &DocumentConnectionInfo,
        logical_collection: &str,
        mode: ExecutionMode,
    ) -> Result<Vec<String>, QueryError> {
        let collection = self.resolver.resolve(logical_collection, mode);
        let mut conn = ConnectionGuard {
            conn: self
                .backend
                .connect(info)
                .map_err(|e| e.into_query_error(BackendKind::Document))?,
        };
        let docs = conn
            .find(collection, &Document::new(), None, Some(1))
            .map_err(|e| e.into_query_error(BackendKind::Document))?;
        Ok(docs
            .into_iter()
            .next()
            .map(|doc| doc.keys().cloned().collect())
            .unwrap_or_default())
    }
}

fn unavailable(label: String, mode: ExecutionMode, err: BackendError) -> Execution {
    let err = err.into_query_error(BackendKind::Document);
    tracing::warn!(operation = %label, mode = %mode, error = %err, "document query failed");
    Execution::failed(label, mode, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryKind;
    use crate::testing::ScriptedDocumentBackend;
    use serde_json::json;

    fn info() -> DocumentConnectionInfo {
        DocumentConnectionInfo::new("mem://", "dbcafe")
    }

    fn docs(value: serde_json::Value) -> Vec<Document> {
        ResultTable::from_values(value.as_array().cloned().unwrap_or_default()).into_rows()
    }

    #[test]
    fn optimized_mode_reads_the_indexed_collection() {
        let backend = ScriptedDocumentBackend::new()
            .with_collection("transactionlog", docs(json!([{"name": "a"}])))
            .with_collection("transactionlogindex", docs(json!([{"name": "a"}])));
        let resolver = CollectionResolver::new().with_route(
            "transactionlog",
            "transactionlog",
            "transactionlogindex",
        );
        let exec = DocumentQueryExecutor::new(backend).with_resolver(resolver);

        let run = exec
            .execute(&info(), "transactionlog", &QuerySpec::all(), ExecutionMode::Optimized, None)
            .unwrap();
        assert!(run.is_ok());
        assert_eq!(run.timing.operation_label, "find transactionlogindex");
        assert_eq!(exec.backend().stats().collections_touched(), vec!["transactionlogindex"]);
    }

    #[test]
    fn malformed_pipeline_never_reaches_the_backend() {
        let exec = DocumentQueryExecutor::new(ScriptedDocumentBackend::new());
        let bad = QuerySpec::Pipeline(vec![Document::new()]);

        let err = exec
            .execute(&info(), "transactionlog", &bad, ExecutionMode::Baseline, None)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidQueryShape(_)));
        let stats = exec.backend().stats();
        assert_eq!(stats.connects(), 0);
        assert_eq!(stats.round_trips(), 0);
    }

    #[test]
    fn connect_failure_yields_empty_result_and_zero_timing() {
        let exec = DocumentQueryExecutor::new(ScriptedDocumentBackend::new().failing_connect());
        let run = exec
            .execute(&info(), "transactionlog", &QuerySpec::all(), ExecutionMode::Baseline, None)
            .unwrap();
        assert!(run.table.is_empty());
        assert_eq!(run.timing.elapsed_seconds, 0.0);
        assert!(matches!(
            run.error,
            Some(QueryError::BackendUnavailable { backend: BackendKind::Document, .. })
        ));
        assert_eq!(exec.backend().stats().closes(), 0);
    }

    #[test]
    fn round_trip_failure_still_closes_once() {
        let exec = DocumentQueryExecutor::new(ScriptedDocumentBackend::new().failing_round_trip());
        let query = QuerySpec::parse(QueryKind::Pipeline, r#"[{"$unwind": "$product"}]"#).unwrap();
        let run = exec
            .execute(&info(), "transactionlog", &query, ExecutionMode::Optimized, None)
            .unwrap();
        assert!(run.error.is_some());
        assert!(run.table.is_empty());
        assert_eq!(run.timing.elapsed_seconds, 0.0);
        let stats = exec.backend().stats();
        assert_eq!(stats.connects(), 1);
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn projection_is_sent_for_filters_and_applied_to_pipelines() {
        let backend = ScriptedDocumentBackend::new().with_collection(
            "transactionlog",
            docs(json!([{"_id": 1, "name": "a", "total": 3}])),
        );
        let exec = DocumentQueryExecutor::new(backend);
        let projection = Projection::exclude(["_id"]);

        let run = exec
            .execute(&info(), "transactionlog", &QuerySpec::all(), ExecutionMode::Baseline, Some(&projection))
            .unwrap();
        assert_eq!(run.table.columns(), vec!["name", "total"]);

        let pipeline = QuerySpec::parse(QueryKind::Pipeline, r#"[{"$match": {}}]"#).unwrap();
        let run = exec
            .execute(&info(), "transactionlog", &pipeline, ExecutionMode::Baseline, Some(&projection))
            .unwrap();
        assert_eq!(run.table.columns(), vec!["name", "total"]);
        assert_eq!(exec.backend().stats().closes(), 2);
    }

    #[test]
    fn sample_columns_reads_one_document() {
        let backend = ScriptedDocumentBackend::new().with_collection(
            "transactionlog",
            docs(json!([{"id_transaction": 1, "product": []}, {"other": 1}])),
        );
        let exec = DocumentQueryExecutor::new(backend);
        let cols = exec
            .sample_columns(&info(), "transactionlog", ExecutionMode::Baseline)
            .unwrap();
        assert_eq!(cols, vec!["id_transaction", "product"]);
        assert_eq!(exec.backend().stats().closes(), 1);
    }
}
