//! Integration tests for the complete duoquery pipeline
//!
//! These tests run across crates with scripted backends:
//! - Catalog task → document query → key binding → graph query → merge → summary
//! - Baseline vs optimized routing and timing comparison
//! - Neo4j HTTP payloads → normalized rows → join
//!
//! Run with: cargo test --test integration_tests

use approx::assert_relative_eq;
use duoquery_core::tasks::{self, AnalyticalTask};
use duoquery_core::testing::{ScriptedDocumentBackend, ScriptedGraphBackend};
use duoquery_core::{
    compare_task, merge, CollectionResolver, CorrelationOutcome, DocumentConnectionInfo,
    DocumentQueryExecutor, Execution, ExecutionMode, GraphConnectionInfo, GraphQueryExecutor,
    GraphRecord, JoinHow, JoinSpec, QueryKind, QuerySpec, ResultCorrelator, ResultTable,
};
use serde_json::{json, Value};

fn rows(value: Value) -> Vec<serde_json::Map<String, Value>> {
    ResultTable::from_values(value.as_array().cloned().unwrap_or_default()).into_rows()
}

fn doc_info() -> DocumentConnectionInfo {
    DocumentConnectionInfo::new("mem://documents", "dbcafe")
}

fn graph_info() -> GraphConnectionInfo {
    GraphConnectionInfo::new("mem://graph", "neo4j", "secret", "neo4j")
}

fn routed() -> CollectionResolver {
    CollectionResolver::new().with_route("transactionlog", "transactionlog", "transactionlogindex")
}

fn franchise_records() -> Vec<GraphRecord> {
    vec![
        GraphRecord::new()
            .with("id_cafe", json!(1))
            .with("name", json!("Kopi Kenangan Senja"))
            .with("kota", json!("Jakarta")),
        GraphRecord::new()
            .with("id_cafe", json!(2))
            .with("name", json!("Kopi Pagi"))
            .with("kota", json!("Bandung")),
    ]
}

fn sales_task() -> AnalyticalTask {
    AnalyticalTask::sales_per_franchise().unwrap()
}

// ============================================================================
// Catalog tasks end to end
// ============================================================================

#[test]
fn test_sales_per_franchise_left_join_and_summary() {
    let sales = rows(json!([
        {"_id": 1, "total_sales": 42},
        {"_id": 2, "total_sales": 7}
    ]));
    let docs = ScriptedDocumentBackend::new().with_pipeline_result("transactionlog", sales);
    let graph = ScriptedGraphBackend::new().with_records(franchise_records());
    let correlator = ResultCorrelator::new(
        DocumentQueryExecutor::new(docs),
        GraphQueryExecutor::new(graph),
    );

    let result = correlator
        .run_task(&sales_task(), &doc_info(), &graph_info(), ExecutionMode::Baseline)
        .unwrap();

    assert_eq!(result.outcome, CorrelationOutcome::Merged);
    assert_eq!(
        correlator.graph().backend().stats().last_parameters(),
        Some(json!({"cafe_ids": [1, 2]}))
    );

    let merged = result.merged.as_ref().unwrap();
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.values("kota"), vec![json!("Jakarta"), json!("Bandung")]);
    assert_eq!(result.summary["franchise_count"], json!(2));
    assert_eq!(result.summary["total_sales"], json!(49));
    assert_relative_eq!(
        result.summary["avg_sales_per_franchise"].as_f64().unwrap(),
        24.5
    );
    assert_eq!(result.summary["sales_per_city"][0]["kota"], json!("Jakarta"));
    assert_eq!(result.timings.len(), 2);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[test]
fn test_unmatched_franchise_survives_left_join() {
    let sales = rows(json!([
        {"_id": 1, "total_sales": 42},
        {"_id": 99, "total_sales": 3}
    ]));
    let docs = ScriptedDocumentBackend::new().with_pipeline_result("transactionlog", sales);
    let graph = ScriptedGraphBackend::new().with_records(franchise_records());
    let correlator = ResultCorrelator::new(
        DocumentQueryExecutor::new(docs),
        GraphQueryExecutor::new(graph),
    );

    let result = correlator
        .run_task(&sales_task(), &doc_info(), &graph_info(), ExecutionMode::Optimized)
        .unwrap();

    let merged = result.merged.unwrap();
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.rows()[1].get("kota"), None);
    assert_eq!(result.summary["total_sales"], json!(45));
}

#[test]
fn test_empty_document_result_skips_the_graph() {
    let docs = ScriptedDocumentBackend::new().with_pipeline_result("transactionlog", Vec::new());
    let graph = ScriptedGraphBackend::new().with_records(franchise_records());
    let correlator = ResultCorrelator::new(
        DocumentQueryExecutor::new(docs),
        GraphQueryExecutor::new(graph),
    );

    let result = correlator
        .run_task(&sales_task(), &doc_info(), &graph_info(), ExecutionMode::Baseline)
        .unwrap();

    assert_eq!(result.outcome, CorrelationOutcome::NoData);
    assert!(result.right.is_empty());
    assert_eq!(correlator.graph().backend().stats().connects(), 0);
    assert_eq!(result.timings.len(), 1);
}

#[test]
fn test_product_sales_inner_join_on_two_keys() {
    let quantities = rows(json!([
        {"id_franchise": 1, "id_product": 10, "total_quantity": 4},
        {"id_franchise": 1, "id_product": 11, "total_quantity": 2},
        {"id_franchise": 2, "id_product": 10, "total_quantity": 5}
    ]));
    let products = vec![
        GraphRecord::new()
            .with("id_franchise", json!(1))
            .with("id_product", json!(10))
            .with("product_name", json!("Latte"))
            .with("category", json!("Coffee"))
            .with("price", json!(20)),
        GraphRecord::new()
            .with("id_franchise", json!(2))
            .with("id_product", json!(10))
            .with("product_name", json!("Latte"))
            .with("category", json!("Coffee"))
            .with("price", json!(22)),
    ];
    let task = AnalyticalTask::product_sales_per_franchise().unwrap();
    let correlator = ResultCorrelator::new(
        DocumentQueryExecutor::new(
            ScriptedDocumentBackend::new().with_pipeline_result("transactionlog", quantities),
        ),
        GraphQueryExecutor::new(ScriptedGraphBackend::new().with_records(products)),
    );

    let result = correlator
        .run_task(&task, &doc_info(), &graph_info(), ExecutionMode::Optimized)
        .unwrap();

    assert_eq!(
        correlator.graph().backend().stats().last_parameters(),
        Some(json!({"franchise_ids": [1, 2]}))
    );
    let merged = result.merged.unwrap();
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.values("total_revenue"), vec![json!(80), json!(110)]);
    assert_eq!(result.summary["total_revenue"], json!(190));
}

// ============================================================================
// Execution modes
// ============================================================================

#[test]
fn test_filter_results_identical_across_modes() {
    let docs = ScriptedDocumentBackend::new()
        .with_collection(
            "transactionlog",
            rows(json!([{"id_cafe": 1, "qty": 2}, {"id_cafe": 2, "qty": 5}])),
        )
        .with_collection(
            "transactionlogindex",
            rows(json!([{"id_cafe": 1, "qty": 2}, {"id_cafe": 2, "qty": 5}])),
        );
    let executor = DocumentQueryExecutor::new(docs).with_resolver(routed());
    let filter = QuerySpec::parse(QueryKind::Filter, r#"{"id_cafe": 2}"#).unwrap();

    let run = |mode| -> Execution {
        executor
            .execute(&doc_info(), "transactionlog", &filter, mode, None)
            .unwrap()
    };
    let baseline = run(ExecutionMode::Baseline);
    let optimized = run(ExecutionMode::Optimized);

    assert!(baseline.is_ok() && optimized.is_ok());
    assert_eq!(baseline.table, optimized.table);
    assert_eq!(baseline.table.len(), 1);
    assert_eq!(
        executor.backend().stats().collections_touched(),
        vec!["transactionlog", "transactionlogindex"]
    );
}

#[test]
fn test_compare_task_runs_both_modes() {
    let sales = rows(json!([{"_id": 1, "total_sales": 42}]));
    let docs = ScriptedDocumentBackend::new()
        .with_pipeline_result("transactionlog", sales.clone())
        .with_pipeline_result("transactionlogindex", sales);
    let correlator = ResultCorrelator::new(
        DocumentQueryExecutor::new(docs).with_resolver(routed()),
        GraphQueryExecutor::new(ScriptedGraphBackend::new().with_records(franchise_records())),
    );

    let out = compare_task(&correlator, &sales_task(), &doc_info(), &graph_info()).unwrap();

    assert_eq!(out.task, "sales-per-franchise");
    assert_eq!(out.baseline.summary, out.optimized.summary);
    assert_relative_eq!(
        out.comparison.baseline_seconds,
        out.baseline.total_seconds(),
        epsilon = 1e-12
    );
    assert_relative_eq!(
        out.comparison.optimized_seconds,
        out.optimized.total_seconds(),
        epsilon = 1e-12
    );
    let queries = correlator.graph().backend().stats().queries();
    assert_eq!(queries.len(), 2);
    assert!(queries[0].contains("valid_ids"));
    assert!(!queries[1].contains("valid_ids"));
}

#[test]
fn test_every_connection_is_closed_once() {
    let docs = ScriptedDocumentBackend::new()
        .with_pipeline_result("transactionlog", rows(json!([{"_id": 1, "total_sales": 1}])));
    let correlator = ResultCorrelator::new(
        DocumentQueryExecutor::new(docs),
        GraphQueryExecutor::new(ScriptedGraphBackend::new().failing_round_trip()),
    );

    let result = correlator
        .run_task(&sales_task(), &doc_info(), &graph_info(), ExecutionMode::Baseline)
        .unwrap();

    // The graph failure is reported, and the document rows still come back.
    assert_eq!(result.left.len(), 1);
    assert!(result.right.is_empty());
    assert!(result.warnings[0].contains("scripted failure"), "{:?}", result.warnings);
    let doc_stats = correlator.documents().backend().stats();
    let graph_stats = correlator.graph().backend().stats();
    assert_eq!((doc_stats.connects(), doc_stats.closes()), (1, 1));
    assert_eq!((graph_stats.connects(), graph_stats.closes()), (1, 1));
}

#[test]
fn test_catalog_slugs_are_unique() {
    let catalog = tasks::catalog().unwrap();
    let mut slugs: Vec<&str> = catalog.iter().map(|t| t.slug.as_str()).collect();
    slugs.sort_unstable();
    slugs.dedup();
    assert_eq!(slugs.len(), catalog.len());
    assert!(tasks::find("no_such_task").unwrap().is_none());
}

// ============================================================================
// HTTP payloads through normalization and join
// ============================================================================

#[test]
fn test_neo4j_payload_joins_document_rows() {
    let body = json!({
        "results": [{
            "columns": ["id_cafe", "f"],
            "data": [{
                "row": [1.0, {"name": "Kopi Kenangan Senja"}],
                "meta": [null, {"id": 3, "elementId": "4:db:3", "type": "node", "deleted": false}],
                "graph": {
                    "nodes": [{"id": "3", "elementId": "4:db:3", "labels": ["Franchise"], "properties": {}}],
                    "relationships": []
                }
            }]
        }],
        "errors": []
    });
    let right: ResultTable = duoquery_http::neo4j::parse_records(body)
        .unwrap()
        .into_iter()
        .map(duoquery_core::normalize_record)
        .collect();
    let left = ResultTable::from_values(vec![json!({"_id": 1, "total_sales": 42})]);

    let merged = merge(
        &left,
        &right,
        &JoinSpec::new(["_id"], ["id_cafe"], JoinHow::Inner).unwrap(),
    )
    .unwrap();

    assert_eq!(merged.len(), 1);
    assert_eq!(merged.rows()[0]["f"], json!({"name": "Kopi Kenangan Senja"}));
}
