//! Datastore abstraction consumed by the engine.
//!
//! The engine only needs one capability from the datastore: execute a
//! multi-search batch of N requests against one cluster and get N parsed
//! responses back in the same order, each independently a result or an
//! error. Everything transport-related lives behind [`DatastoreClient`].

mod config;
mod request;
mod response;

pub use config::{DatastoreConfig, IndexDefinition};
pub use request::{Highlight, SearchRequest, SearchRequestBody, SourceSpec};
pub use response::{RawHit, RawHits, RawSearchResponse, RawTotal};

use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DatastoreError {
    #[error("datastore request failed: {0}")]
    Request(String),
    #[error("datastore response could not be decoded: {0}")]
    Decode(String),
    #[error("index `{0}` is not configured")]
    UnknownIndex(String),
}

/// Executes one multi-search batch against a single cluster.
///
/// Implementations must return exactly one entry per request, in request
/// order. A failing sub-request must not fail its siblings; the outer
/// `Result` is reserved for transport-level failures of the whole batch.
#[async_trait]
pub trait DatastoreClient: Send + Sync {
    async fn execute_batch(
        &self,
        cluster: &str,
        requests: Vec<SearchRequest>,
    ) -> Result<Vec<Result<RawSearchResponse, DatastoreError>>, DatastoreError>;
}
