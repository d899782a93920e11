use runtime::DatastoreError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The total document count was never requested on this query, or the
    /// response was produced by `filter_results`.
    #[error("total document count is not available on this response")]
    CountUnavailable,
    /// Aggregations cannot be reconstructed for a filtered sub-view.
    #[error("aggregations are not available on a filtered response")]
    AggregationsUnavailable,
    #[error("cannot filter results on `{field}`: the field is not present in any returned document")]
    FilterFieldMissing { field: String },
    /// Programmer error: the two queries were built for incompatible
    /// purposes and must not be combined.
    #[error("cannot merge queries: {0}")]
    QueryConflict(String),
    #[error("invalid pagination cursor: {0}")]
    InvalidCursor(String),
    #[error(transparent)]
    BackendRequestFailed(#[from] DatastoreError),
    #[error("internal error: {0}")]
    Internal(String),
}
