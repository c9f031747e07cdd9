//! Explicit connection descriptors and collection resolution.
//!
//! Nothing here is process-global: callers build descriptors (usually from
//! the CLI config) and pass them into every executor call.

use crate::query::ExecutionMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where the document store lives.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConnectionInfo {
    pub address: String,
    pub database: String,
    /// Credential for HTTP data endpoints; `None` for open endpoints.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout enforced by adapters that support one.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl DocumentConnectionInfo {
    pub fn new(address: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            database: database.into(),
            api_key: None,
            timeout_secs: None,
        }
    }
}

impl fmt::Debug for DocumentConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentConnectionInfo")
            .field("address", &self.address)
            .field("database", &self.database)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Where the graph store lives.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConnectionInfo {
    pub address: String,
    pub username: String,
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl GraphConnectionInfo {
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password: password.into(),
            database: database.into(),
            timeout_secs: None,
        }
    }
}

impl fmt::Debug for GraphConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConnectionInfo")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Physical collections behind one logical collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalCollections {
    pub baseline: String,
    pub optimized: String,
}

/// Maps `(logical collection, mode)` to a physical collection name.
///
/// Unknown logical names resolve to themselves in both modes. The resolver
/// only selects among collections that already exist; it never builds
/// indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionResolver {
    routes: BTreeMap<String, PhysicalCollections>,
}

impl CollectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(
        mut self,
        logical: impl Into<String>,
        baseline: impl Into<String>,
        optimized: impl Into<String>,
    ) -> Self {
        self.routes.insert(
            logical.into(),
            PhysicalCollections {
                baseline: baseline.into(),
                optimized: optimized.into(),
            },
        );
        self
    }

    pub fn resolve<'a>(&'a self, logical: &'a str, mode: ExecutionMode) -> &'a str {
        match (self.routes.get(logical), mode) {
            (Some(route), ExecutionMode::Baseline) => &route.baseline,
            (Some(route), ExecutionMode::Optimized) => &route.optimized,
            (None, _) => logical,
        }
    }

    pub fn routes(&self) -> impl Iterator<Item = (&String, &PhysicalCollections)> {
        self.routes.iter()
    }
}
