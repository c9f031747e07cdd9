//! Built-in analytical tasks over the cafe transaction data set.
//!
//! Both tasks aggregate the `transactionlog` collection, look the resulting
//! franchise ids up in the graph and merge the two sides. The document
//! pipeline is the same in both modes (the mode picks the indexed copy of the
//! collection); the graph query text differs per mode.

use crate::correlate::KeyExtraction;
use crate::error::QueryError;
use crate::join::{JoinHow, JoinSpec};
use crate::query::{ExecutionMode, QueryKind, QuerySpec};
use crate::summary::{Aggregate, Derivation, GroupSummary, SummarySpec};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const TRANSACTION_LOG: &str = "transactionlog";

/// A value that exists once per execution mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerMode<T> {
    pub baseline: T,
    pub optimized: T,
}

impl<T> PerMode<T> {
    pub fn get(&self, mode: ExecutionMode) -> &T {
        match mode {
            ExecutionMode::Baseline => &self.baseline,
            ExecutionMode::Optimized => &self.optimized,
        }
    }
}

/// Everything needed to run one correlation end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticalTask {
    pub slug: String,
    pub name: String,
    pub collection: String,
    pub document_query: QuerySpec,
    pub graph_query: PerMode<String>,
    pub keys: KeyExtraction,
    pub join: JoinSpec,
    pub summary: SummarySpec,
}

impl AnalyticalTask {
    pub fn graph_query(&self, mode: ExecutionMode) -> &str {
        self.graph_query.get(mode)
    }

    /// Total quantity sold per franchise, with the franchise location.
    pub fn sales_per_franchise() -> Result<Self, QueryError> {
        let pipeline = QuerySpec::from_value(
            QueryKind::Pipeline,
            json!([
                {"$unwind": "$product"},
                {"$group": {
                    "_id": "$id_franchise",
                    "total_sales": {"$sum": "$product.quantity"},
                    "transaction_ids": {"$addToSet": "$id_transaction"}
                }},
                {"$project": {
                    "total_sales": 1,
                    "transaction_count": {"$size": "$transaction_ids"},
                    "avg_sales": {"$divide": ["$total_sales", {"$size": "$transaction_ids"}]}
                }},
                {"$sort": {"_id": 1}}
            ]),
        )?;

        let optimized = "MATCH (f:Franchise)-[:IS_LOCATED]->(d:Daerah)\n\
             WHERE f.id_cafe IN $cafe_ids\n\
             RETURN f.id_cafe AS id_cafe, f.name AS name, f.year AS year, \
             d.kota AS kota, d.kecamatan AS kecamatan, d.nama_daerah AS nama_daerah";
        let baseline = "WITH [id IN $cafe_ids WHERE id IS NOT NULL] AS valid_ids\n\
             MATCH (f:Franchise)-[:IS_LOCATED]->(d:Daerah)\n\
             WHERE f.id_cafe IN valid_ids\n\
             RETURN f.id_cafe AS id_cafe, f.name AS name, f.year AS year, \
             d.kota AS kota, d.kecamatan AS kecamatan, d.nama_daerah AS nama_daerah";

        Ok(Self {
            slug: "sales-per-franchise".to_string(),
            name: "Sales per franchise".to_string(),
            collection: TRANSACTION_LOG.to_string(),
            document_query: pipeline,
            graph_query: PerMode {
                baseline: baseline.to_string(),
                optimized: optimized.to_string(),
            },
            keys: KeyExtraction::all("_id", "cafe_ids"),
            join: JoinSpec::new(["_id"], ["id_cafe"], JoinHow::Left)?,
            summary: SummarySpec::new()
                .metric("franchise_count", Aggregate::Count)
                .metric("total_sales", Aggregate::Sum("total_sales".into()))
                .metric("avg_sales_per_franchise", Aggregate::Mean("total_sales".into()))
                .group(
                    GroupSummary::new("sales_per_city", ["kota"])
                        .metric("total_sales", Aggregate::Sum("total_sales".into()))
                        .top("total_sales", 5),
                ),
        })
    }

    /// Quantity per franchise and product, priced from the graph.
    pub fn product_sales_per_franchise() -> Result<Self, QueryError> {
        let pipeline = QuerySpec::from_value(
            QueryKind::Pipeline,
            json!([
                {"$unwind": "$product"},
                {"$group": {
                    "_id": {
                        "id_franchise": "$id_franchise",
                        "id_product": "$product.id_product",
                        "product_name": "$product.name"
                    },
                    "total_quantity": {"$sum": "$product.quantity"}
                }},
                {"$project": {
                    "_id": 0,
                    "id_franchise": "$_id.id_franchise",
                    "id_product": "$_id.id_product",
                    "product_name": "$_id.product_name",
                    "total_quantity": 1
                }},
                {"$sort": {"id_franchise": 1, "total_quantity": -1}}
            ]),
        )?;

        let returns = "RETURN f.id_cafe AS id_franchise, f.name AS franchise_name, f.year AS year, \
             p.id_product AS id_product, p.category AS category, p.price AS price\n\
             ORDER BY f.id_cafe";
        let optimized = format!(
            "MATCH (f:Franchise)-[:HAS_PRODUCT]->(p:Product)\n\
             WHERE f.id_cafe IN $franchise_ids\n{returns}"
        );
        let baseline = format!("MATCH (f:Franchise)-[:HAS_PRODUCT]->(p:Product)\n{returns}");

        let per_group = |group: GroupSummary| {
            group
                .metric("total_quantity", Aggregate::Sum("total_quantity".into()))
                .metric("total_revenue", Aggregate::Sum("total_revenue".into()))
                .metric("unique_products", Aggregate::Distinct("id_product".into()))
        };

        Ok(Self {
            slug: "product-sales-per-franchise".to_string(),
            name: "Product sales and revenue per franchise".to_string(),
            collection: TRANSACTION_LOG.to_string(),
            document_query: pipeline,
            graph_query: PerMode {
                baseline,
                optimized,
            },
            keys: KeyExtraction::distinct("id_franchise", "franchise_ids"),
            join: JoinSpec::new(
                ["id_franchise", "id_product"],
                ["id_franchise", "id_product"],
                JoinHow::Inner,
            )?,
            summary: SummarySpec::new()
                .derive(
                    "total_revenue",
                    Derivation::Product {
                        left: "total_quantity".into(),
                        right: "price".into(),
                    },
                )
                .metric("record_count", Aggregate::Count)
                .metric("franchise_count", Aggregate::Distinct("id_franchise".into()))
                .metric("product_count", Aggregate::Distinct("id_product".into()))
                .metric("total_quantity", Aggregate::Sum("total_quantity".into()))
                .metric("avg_revenue_per_product", Aggregate::Mean("total_revenue".into()))
                .metric("total_revenue", Aggregate::Sum("total_revenue".into()))
                .group(
                    GroupSummary::new("top_products", ["product_name"])
                        .metric("total_revenue", Aggregate::Sum("total_revenue".into()))
                        .top("total_revenue", 5),
                )
                .group(
                    GroupSummary::new("top_franchises", ["id_franchise", "franchise_name"])
                        .metric("total_revenue", Aggregate::Sum("total_revenue".into()))
                        .top("total_revenue", 5),
                )
                .group(per_group(GroupSummary::new("categories", ["category"])))
                .group(per_group(GroupSummary::new(
                    "franchise_performance",
                    ["id_franchise", "franchise_name", "year"],
                ))),
        })
    }
}

/// Every built-in task.
pub fn catalog() -> Result<Vec<AnalyticalTask>, QueryError> {
    Ok(vec![
        AnalyticalTask::sales_per_franchise()?,
        AnalyticalTask::product_sales_per_franchise()?,
    ])
}

/// Look a task up by slug.
pub fn find(slug: &str) -> Result<Option<AnalyticalTask>, QueryError> {
    Ok(catalog()?.into_iter().find(|t| t.slug == slug))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{DocumentConnectionInfo, GraphConnectionInfo};
    use crate::correlate::{CorrelationOutcome, ResultCorrelator};
    use crate::document::DocumentQueryExecutor;
    use crate::graph::{GraphQueryExecutor, GraphRecord};
    use crate::table::ResultTable;
    use crate::testing::{ScriptedDocumentBackend, ScriptedGraphBackend};
    use serde_json::Value;

    #[test]
    fn catalog_is_well_formed() {
        let tasks = catalog().unwrap();
        assert_eq!(tasks.len(), 2);
        for task in &tasks {
            task.document_query.validate().unwrap();
            assert_ne!(
                task.graph_query(ExecutionMode::Baseline),
                task.graph_query(ExecutionMode::Optimized)
            );
        }
        assert!(find("sales-per-franchise").unwrap().is_some());
        assert!(find("nope").unwrap().is_none());
    }

    #[test]
    fn product_sales_derives_revenue_and_ranks() {
        let task = AnalyticalTask::product_sales_per_franchise().unwrap();
        let grouped = ResultTable::from_values(vec![
            json!({"id_franchise": 1, "id_product": 10, "product_name": "Latte", "total_quantity": 4}),
            json!({"id_franchise": 1, "id_product": 11, "product_name": "Teh", "total_quantity": 10}),
            json!({"id_franchise": 2, "id_product": 10, "product_name": "Latte", "total_quantity": 1}),
        ]);
        let docs = ScriptedDocumentBackend::new()
            .with_pipeline_result(TRANSACTION_LOG, grouped.into_rows());
        let product = |f: i64, name: &str, p: i64, category: &str, price: i64| {
            GraphRecord::new()
                .with("id_franchise", json!(f))
                .with("franchise_name", json!(name))
                .with("year", json!(2020))
                .with("id_product", json!(p))
                .with("category", json!(category))
                .with("price", json!(price))
        };
        let graph = ScriptedGraphBackend::new().with_records(vec![
            product(1, "Kopi A", 10, "Coffee", 20),
            product(1, "Kopi A", 11, "Tea", 5),
            product(2, "Kopi B", 10, "Coffee", 22),
        ]);
        let correlator =
            ResultCorrelator::new(DocumentQueryExecutor::new(docs), GraphQueryExecutor::new(graph));

        let result = correlator
            .run_task(
                &task,
                &DocumentConnectionInfo::new("mem://", "dbcafe"),
                &GraphConnectionInfo::new("mem://", "neo4j", "pw", "neo4j"),
                ExecutionMode::Optimized,
            )
            .unwrap();

        assert_eq!(result.outcome, CorrelationOutcome::Merged);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert_eq!(
            correlator.graph().backend().stats().last_parameters(),
            Some(json!({"franchise_ids": [1, 2]}))
        );
        let s = &result.summary;
        assert_eq!(s["total_revenue"], json!(152));
        assert_eq!(s["franchise_count"], json!(2));
        assert_eq!(s["product_count"], json!(2));
        assert_eq!(s["total_quantity"], json!(15));
        assert_eq!(
            s["top_products"],
            json!([
                {"product_name": "Latte", "total_revenue": 102},
                {"product_name": "Teh", "total_revenue": 50}
            ])
        );
        assert_eq!(
            s["categories"][0],
            json!({"category": "Coffee", "total_quantity": 5, "total_revenue": 102, "unique_products": 1})
        );
        assert!(matches!(s["franchise_performance"], Value::Array(ref a) if a.len() == 2));
    }
}
