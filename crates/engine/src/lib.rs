//! Resolves a graph of data-fetching requests against a document-search
//! datastore while minimizing round trips.
//!
//! The building blocks, leaf first:
//!
//! - [`Query`]: an immutable description of one search request with a
//!   merge algebra, so independently constructed fragments combine safely.
//! - [`SearchResponse`]: one search result, splittable back into
//!   per-caller sub-views with [`SearchResponse::filter_results`].
//! - [`QueryBatcher`]: coalesces every query issued during one resolution
//!   pass into a single multi-search call per cluster.
//! - [`NestedRelationshipBatcher`]: collapses N per-parent-object
//!   relationship queries into as few round trips as the query shape
//!   allows, retrying with bounded attempts before degrading to separate
//!   queries.

mod batch;
mod error;
mod query;
mod response;

pub use batch::{
    can_merge_filters, IdSet, NestedRelationshipBatcher, QueryBatcher, QueryHandle,
    RelationshipField, EXTRA_SIZE_MULTIPLIER, MAX_OPTIMIZED_ATTEMPTS,
};
pub use error::Error;
pub use query::{
    AggregationRequest, BoolFilter, Computation, ComputationFunction, DocumentPagination, Filter,
    Grouping, Query, QueryBuilder, RangeBounds, SearchIndexSet, SortClause, SortDirection,
};
pub use response::{Cursor, CursorCodec, Document, ResponseMetadata, SearchResponse};
