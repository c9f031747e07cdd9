//! Duoquery core: dual-backend query execution and comparison
//!
//! Runs caller-supplied queries against a document store and a graph store,
//! times each backend round trip, normalizes both result shapes into one
//! tabular form and joins them for combined analytics.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        RESULT CORRELATOR                             │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  QuerySpec ──►┌──────────────────┐   keys   ┌──────────────────┐     │
//! │               │ DocumentExecutor │────────►│  GraphExecutor   │     │
//! │               └────────┬─────────┘          └────────┬─────────┘     │
//! │                        │ ResultTable                 │ ResultTable   │
//! │                        ▼                             ▼               │
//! │                   ┌──────────────────────────────────────┐          │
//! │                   │        merge (JoinSpec)              │          │
//! │                   └──────────────────┬───────────────────┘          │
//! │                                      ▼                               │
//! │                         summary aggregates + warnings                │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Timing boundary
//!
//! Every [`TimingSample`] covers exactly one backend round trip: the clock
//! starts after the connection or session has been acquired and stops once the
//! result has been fully received. Acquisition and release are excluded for
//! both backends and both [`ExecutionMode`]s, so baseline and optimized
//! samples are comparable.
//!
//! Engines are reached through the [`DocumentBackend`] and [`GraphBackend`]
//! traits; `duoquery-http` provides HTTP adapters and [`testing`] provides
//! scripted backends.

pub mod compare;
pub mod connection;
pub mod correlate;
pub mod document;
pub mod error;
pub mod graph;
pub mod join;
pub mod query;
pub mod stats;
pub mod summary;
pub mod table;
pub mod tasks;
pub mod timing;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use compare::{compare_modes, compare_task, ModeComparison, TaskComparison};
pub use connection::{CollectionResolver, DocumentConnectionInfo, GraphConnectionInfo};
pub use correlate::{
    CombinedResult, CorrelationOutcome, DocumentRequest, GraphRequest, KeyExtraction,
    KeyParameters, ResultCorrelator,
};
pub use document::{DocumentBackend, DocumentConnection, DocumentQueryExecutor};
pub use error::{BackendError, BackendKind, JoinSide, QueryError};
pub use graph::{
    normalize_record, DatabaseInfo, EntityKind, GraphBackend, GraphEntity, GraphQueryExecutor,
    GraphRecord, GraphSession, GraphValue, NormalizedField,
};
pub use join::{merge, JoinHow, JoinSpec};
pub use query::{Document, ExecutionMode, Projection, QueryKind, QuerySpec};
pub use stats::{describe, ColumnStats};
pub use summary::{Aggregate, Derivation, DerivedColumn, GroupSummary, Metric, SummarySpec};
pub use table::{ResultRow, ResultTable};
pub use tasks::{AnalyticalTask, PerMode};
pub use timing::{Execution, TimingSample};
