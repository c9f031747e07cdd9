//! Document store over a Data API style HTTP endpoint.

use crate::client::{base_url, build_client, endpoint, send_json};
use duoquery_core::{BackendError, Document, DocumentBackend, DocumentConnection, DocumentConnectionInfo};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use url::Url;

pub const DEFAULT_DATA_SOURCE: &str = "mongodb-atlas";

#[derive(Debug, Clone)]
pub struct DataApiBackend {
    data_source: String,
}

impl Default for DataApiBackend {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_SOURCE)
    }
}

impl DataApiBackend {
    /// `data_source` names the cluster behind the endpoint.
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
        }
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }
}

impl DocumentBackend for DataApiBackend {
    type Connection = DataApiConnection;

    fn connect(&self, info: &DocumentConnectionInfo) -> Result<Self::Connection, BackendError> {
        Ok(DataApiConnection {
            client: build_client(info.timeout_secs)?,
            base: base_url(&info.address)?,
            database: info.database.clone(),
            data_source: self.data_source.clone(),
            api_key: info.api_key.clone(),
        })
    }
}

pub struct DataApiConnection {
    client: Client,
    base: Url,
    database: String,
    data_source: String,
    api_key: Option<String>,
}

impl DataApiConnection {
    fn post(&self, action: &str, body: &Value) -> Result<Vec<Document>, BackendError> {
        let url = endpoint(&self.base, &format!("action/{action}"))?;
        let mut request = self
            .client
            .post(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key.as_str());
        }
        parse_documents(send_json(request, &url)?)
    }
}

impl DocumentConnection for DataApiConnection {
    fn find(
        &mut self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
        limit: Option<u64>,
    ) -> Result<Vec<Document>, BackendError> {
        let body = find_body(
            &self.data_source,
            &self.database,
            collection,
            filter,
            projection,
            limit,
        );
        self.post("find", &body)
    }

    fn aggregate(
        &mut self,
        collection: &str,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, BackendError> {
        let body = aggregate_body(&self.data_source, &self.database, collection, pipeline);
        self.post("aggregate", &body)
    }

    fn close(&mut self) {
        tracing::trace!(base = %self.base, "data api connection released");
    }
}

pub fn find_body(
    data_source: &str,
    database: &str,
    collection: &str,
    filter: &Document,
    projection: Option<&Document>,
    limit: Option<u64>,
) -> Value {
    let mut body = json!({
        "dataSource": data_source,
        "database": database,
        "collection": collection,
        "filter": filter,
    });
    if let Some(projection) = projection {
        body["projection"] = Value::Object(projection.clone());
    }
    if let Some(limit) = limit {
        body["limit"] = json!(limit);
    }
    body
}

pub fn aggregate_body(
    data_source: &str,
    database: &str,
    collection: &str,
    pipeline: &[Document],
) -> Value {
    json!({
        "dataSource": data_source,
        "database": database,
        "collection": collection,
        "pipeline": pipeline,
    })
}

/// Extract `documents` from a response body.
pub fn parse_documents(body: Value) -> Result<Vec<Document>, BackendError> {
    let Value::Object(mut body) = body else {
        return Err(BackendError::Response("expected a JSON object".to_string()));
    };
    match body.remove("documents") {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(doc) => Ok(doc),
                other => Err(BackendError::Response(format!(
                    "expected documents to be objects, got {other}"
                ))),
            })
            .collect(),
        Some(_) => Err(BackendError::Response("`documents` is not an array".to_string())),
        None => match body.get("error") {
            Some(err) => Err(BackendError::Engine {
                code: body
                    .get("error_code")
                    .and_then(Value::as_str)
                    .unwrap_or("DataApiError")
                    .to_string(),
                message: err.as_str().map_or_else(|| err.to_string(), str::to_string),
            }),
            None => Err(BackendError::Response("missing `documents`".to_string())),
        },
    }
}
