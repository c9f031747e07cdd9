//! CLI configuration: a JSON file plus `DUOQUERY_*` environment overrides.
//!
//! ```json
//! {
//!   "document": {
//!     "url": "https://data.example.net/app/data-abc/endpoint/data/v1",
//!     "database": "dbcafe",
//!     "api_key": "...",
//!     "collections": {
//!       "transactionlog": { "baseline": "transactionlog", "optimized": "transactionlogindex" }
//!     }
//!   },
//!   "graph": { "url": "http://localhost:7474", "username": "neo4j", "password": "..." }
//! }
//! ```

use duoquery_core::{CollectionResolver, DocumentConnectionInfo, GraphConnectionInfo};
use duoquery_http::DEFAULT_DATA_SOURCE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "duoquery.json";

pub const ENV_DOC_URL: &str = "DUOQUERY_DOC_URL";
pub const ENV_DOC_DATABASE: &str = "DUOQUERY_DOC_DATABASE";
pub const ENV_DOC_API_KEY: &str = "DUOQUERY_DOC_API_KEY";
pub const ENV_GRAPH_URL: &str = "DUOQUERY_GRAPH_URL";
pub const ENV_GRAPH_USER: &str = "DUOQUERY_GRAPH_USER";
pub const ENV_GRAPH_PASSWORD: &str = "DUOQUERY_GRAPH_PASSWORD";
pub const ENV_GRAPH_DATABASE: &str = "DUOQUERY_GRAPH_DATABASE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(
        "no document endpoint configured: set `document.url` or DUOQUERY_DOC_URL to a Data API \
         base URL (for example https://data.mongodb-api.com/app/<app-id>/endpoint/data/v1)"
    )]
    MissingDocumentUrl,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub document: DocumentConfig,
    pub graph: GraphConfig,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Data API base URL; there is no usable default.
    pub url: Option<String>,
    pub database: String,
    pub api_key: Option<String>,
    pub data_source: String,
    pub timeout_secs: Option<u64>,
    pub collections: CollectionResolver,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            url: None,
            database: "dbcafe".to_string(),
            api_key: None,
            data_source: DEFAULT_DATA_SOURCE.to_string(),
            timeout_secs: Some(30),
            collections: CollectionResolver::new().with_route(
                "transactionlog",
                "transactionlog",
                "transactionlogindex",
            ),
        }
    }
}

impl fmt::Debug for DocumentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("data_source", &self.data_source)
            .field("timeout_secs", &self.timeout_secs)
            .field("collections", &self.collections)
            .finish()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub timeout_secs: Option<u64>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".to_string(),
            username: "neo4j".to_string(),
            password: "neo4j".to_string(),
            database: "neo4j".to_string(),
            timeout_secs: Some(30),
        }
    }
}

impl fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    /// Load `path`, or `duoquery.json` when it exists, or the defaults; then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok());
        tracing::debug!(config = ?config, "configuration loaded");
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from `lookup(var)`; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        if let Some(v) = get(ENV_DOC_URL) {
            self.document.url = Some(v);
        }
        if let Some(v) = get(ENV_DOC_DATABASE) {
            self.document.database = v;
        }
        if let Some(v) = get(ENV_DOC_API_KEY) {
            self.document.api_key = Some(v);
        }
        if let Some(v) = get(ENV_GRAPH_URL) {
            self.graph.url = v;
        }
        if let Some(v) = get(ENV_GRAPH_USER) {
            self.graph.username = v;
        }
        if let Some(v) = get(ENV_GRAPH_PASSWORD) {
            self.graph.password = v;
        }
        if let Some(v) = get(ENV_GRAPH_DATABASE) {
            self.graph.database = v;
        }
    }

    pub fn document_info(&self) -> Result<DocumentConnectionInfo, ConfigError> {
        let address = self
            .document
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingDocumentUrl)?;
        Ok(DocumentConnectionInfo {
            address: address.to_string(),
            database: self.document.database.clone(),
            api_key: self.document.api_key.clone(),
            timeout_secs: self.document.timeout_secs,
        })
    }

    pub fn graph_info(&self) -> GraphConnectionInfo {
        GraphConnectionInfo {
            address: self.graph.url.clone(),
            username: self.graph.username.clone(),
            password: self.graph.password.clone(),
            database: self.graph.database.clone(),
            timeout_secs: self.graph.timeout_secs,
        }
    }
}
