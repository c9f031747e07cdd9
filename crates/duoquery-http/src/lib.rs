//! HTTP adapters for the duoquery backend traits.
//!
//! - [`DataApiBackend`]: a document store reached through a Data API style
//!   endpoint (`POST {base}/action/find`, `POST {base}/action/aggregate`).
//! - [`Neo4jHttpBackend`]: a graph store reached through the Neo4j HTTP
//!   transaction endpoint (`POST {base}/db/{database}/tx/commit`).
//!
//! Both are blocking and hold no state between calls: a "connection" is a
//! configured client plus a resolved base URL, so acquiring one never touches
//! the network. Request and response translation lives in pure functions
//! that are tested without a server.

mod client;
pub mod data_api;
pub mod neo4j;

pub use data_api::{DataApiBackend, DataApiConnection, DEFAULT_DATA_SOURCE};
pub use neo4j::{Neo4jHttpBackend, Neo4jHttpSession};
