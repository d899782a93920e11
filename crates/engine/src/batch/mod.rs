mod nested;
mod query_batcher;

pub use nested::{
    can_merge_filters, IdSet, NestedRelationshipBatcher, RelationshipField,
    EXTRA_SIZE_MULTIPLIER, MAX_OPTIMIZED_ATTEMPTS,
};
pub use query_batcher::{QueryBatcher, QueryHandle};
