use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::try_join_all;

use crate::error::Error;
use crate::query::{Filter, Query};
use crate::response::SearchResponse;

/// Headroom applied to a merged query's page size, on top of the id-set
/// count: a single merged query cannot otherwise guarantee fairness across
/// id-sets whose matches are unevenly distributed in sort order.
pub const EXTRA_SIZE_MULTIPLIER: u32 = 4;

/// Upper bound on merged-query attempts before degrading to one query per
/// id-set. Bounds the worst case at this many merged calls plus one
/// batched fallback call.
pub const MAX_OPTIMIZED_ATTEMPTS: u32 = 3;

/// The foreign-key values contributed by one parent object.
pub type IdSet = BTreeSet<String>;

/// The relationship field being resolved: where the foreign key lives in
/// the document, and which nested-object prefixes must be traversed to
/// reach it.
#[derive(Clone, Debug)]
pub struct RelationshipField {
    /// Human-readable description for log records, e.g. `Widget.components`.
    pub description: String,
    pub path: String,
    pub nested_paths: Vec<String>,
}

impl RelationshipField {
    pub fn new(description: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            path: path.into(),
            nested_paths: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_nested_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nested_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    fn id_set_filter(&self, ids: &IdSet) -> Filter {
        let mut filter = Filter::id_terms(self.path.clone(), ids.iter().cloned());
        for path in self.nested_paths.iter().rev() {
            filter = Filter::nested(path.clone(), filter);
        }
        filter
    }
}

/// Merging several id-sets into one query is only safe when the split
/// responses do not have to reconstruct a per-id-set total count or
/// aggregation buckets.
pub fn can_merge_filters(query: &Query) -> bool {
    !query.total_document_count_needed() && query.aggregations().is_empty()
}

/// Resolves one "to-many via foreign key" relationship for many parent
/// objects at once, using as few datastore round trips as the query shape
/// allows.
pub struct NestedRelationshipBatcher<'a> {
    batcher: &'a super::QueryBatcher,
    field: RelationshipField,
}

impl<'a> NestedRelationshipBatcher<'a> {
    pub fn new(batcher: &'a super::QueryBatcher, field: RelationshipField) -> Self {
        Self { batcher, field }
    }

    /// Produces one response per id-set.
    ///
    /// Incomplete merged results are never surfaced as errors; they are
    /// retried with fewer id-sets and finally resolved by the
    /// separate-queries fallback.
    pub async fn resolve(
        &self,
        id_sets: Vec<IdSet>,
        template: &Query,
    ) -> Result<HashMap<IdSet, SearchResponse>, Error> {
        let mut results = HashMap::new();
        let mut remaining: Vec<IdSet> = Vec::new();
        let mut seen: HashSet<IdSet> = HashSet::new();
        for id_set in id_sets {
            if !seen.insert(id_set.clone()) {
                continue;
            }
            if id_set.is_empty() {
                // No foreign keys, no possible matches; skip the datastore.
                let index_name = template.index_set().first_name().unwrap_or_default();
                results.insert(id_set, SearchResponse::synthesize_from_ids(index_name, &[]));
            } else {
                remaining.push(id_set);
            }
        }

        let id_set_count = seen.len();
        let total_distinct_ids = remaining
            .iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len();

        let mut attempts_made = 0u32;
        let mut degraded = false;

        if can_merge_filters(template) {
            let mut attempts_left = MAX_OPTIMIZED_ATTEMPTS;
            let template_size = template.effective_size(self.batcher.config()) as usize;

            while remaining.len() >= 2 && attempts_left > 0 {
                attempts_left -= 1;
                attempts_made += 1;

                let merged = self.merged_query(&remaining, template)?;
                let merged_size = merged.effective_size(self.batcher.config()) as usize;
                let response = self.batcher.load(Arc::new(merged)).await?;

                // A partially filled window proves no id-set was crowded
                // out: every split below is complete.
                let window_full = response.documents().len() >= merged_size;

                let mut still_incomplete = Vec::new();
                for id_set in remaining.drain(..) {
                    let split =
                        response.filter_results(&self.field.path, &id_set, template_size)?;
                    if window_full && split.documents().len() < template_size {
                        still_incomplete.push(id_set);
                    } else {
                        results.insert(id_set, split);
                    }
                }
                remaining = still_incomplete;
            }
        }

        if !remaining.is_empty() {
            degraded = attempts_made > 0;
            let separate = self.fetch_separate(&remaining, template).await?;
            results.extend(separate);
        }

        if id_set_count >= 2 {
            tracing::info!(
                field = %self.field.description,
                optimized_attempts = attempts_made,
                degraded,
                id_set_count,
                total_distinct_ids,
                "resolved nested relationship id sets"
            );
        }

        Ok(results)
    }

    /// One query filtered on the union of all ids, with the filter field
    /// projected so the response can be split back per id-set, and enough
    /// size headroom for unevenly distributed matches.
    fn merged_query(&self, id_sets: &[IdSet], template: &Query) -> Result<Query, Error> {
        let union: IdSet = id_sets.iter().flatten().cloned().collect();
        let fragment = Query::builder(template.index_set().clone())
            .internal_filter(self.field.id_set_filter(&union))
            .requested_fields([self.field.path.clone()])
            .size_multiplier(id_sets.len() as u32 * EXTRA_SIZE_MULTIPLIER)
            .build();
        template.merge(&fragment)
    }

    /// One query per id-set; a single round trip for the whole group
    /// thanks to query batching.
    async fn fetch_separate(
        &self,
        id_sets: &[IdSet],
        template: &Query,
    ) -> Result<HashMap<IdSet, SearchResponse>, Error> {
        let loads = id_sets.iter().map(|id_set| async move {
            let fragment = Query::builder(template.index_set().clone())
                .internal_filter(self.field.id_set_filter(id_set))
                .build();
            let query = template.merge(&fragment)?;
            let response = self.batcher.load(Arc::new(query)).await?;
            Ok::<_, Error>((id_set.clone(), (*response).clone()))
        });
        Ok(try_join_all(loads).await?.into_iter().collect())
    }
}
