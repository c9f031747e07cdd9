//! Error taxonomy shared by the executors and the correlator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which engine a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Document,
    Graph,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Document => write!(f, "document"),
            BackendKind::Graph => write!(f, "graph"),
        }
    }
}

/// Side of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinSide {
    Left,
    Right,
}

impl fmt::Display for JoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinSide::Left => write!(f, "left"),
            JoinSide::Right => write!(f, "right"),
        }
    }
}

/// Errors surfaced by the query facility.
///
/// `InvalidQueryShape` and `InvalidParameters` are caller errors and are
/// raised before any connection is opened. `BackendUnavailable` travels next
/// to an empty result instead of aborting. `MergeKeyMismatch` degrades a
/// correlation to unmerged tables.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("invalid query shape: {0}")]
    InvalidQueryShape(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{backend} backend unavailable: {message}")]
    BackendUnavailable { backend: BackendKind, message: String },

    #[error("merge key mismatch: {side} table has no column(s) {}", .missing.join(", "))]
    MergeKeyMismatch { side: JoinSide, missing: Vec<String> },
}

impl QueryError {
    /// True for errors that must reach the caller instead of degrading.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            QueryError::InvalidQueryShape(_) | QueryError::InvalidParameters(_)
        )
    }
}

/// Failure reported by a backend adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid response: {0}")]
    Response(String),

    /// Error reported by the engine itself (syntax error, unknown stage, ...).
    #[error("{code}: {message}")]
    Engine { code: String, message: String },
}

impl BackendError {
    pub(crate) fn into_query_error(self, backend: BackendKind) -> QueryError {
        QueryError::BackendUnavailable {
            backend,
            message: self.to_string(),
        }
    }
}
