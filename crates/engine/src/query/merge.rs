use std::collections::btree_map::Entry;

use itertools::Itertools;

use crate::error::Error;

use super::{DocumentPagination, Filter, Query};

impl Query {
    /// Combines two independently constructed query fragments.
    ///
    /// The result is the same whichever side the call starts from:
    /// conflicting scalar values (sort, pagination) are resolved by a
    /// deterministic order-independent pick and logged, not raised, since
    /// overlapping fragments are legitimate during field resolution.
    /// Merging across different index sets is a programmer error.
    pub fn merge(&self, other: &Query) -> Result<Query, Error> {
        if self.index_set != other.index_set {
            return Err(Error::QueryConflict(format!(
                "queries target different index sets: [{}] vs [{}]",
                self.index_set.names().join(", "),
                other.index_set.names().join(", "),
            )));
        }

        let sort = merge_scalar(&self.sort, &other.sort, Vec::is_empty, |ours, theirs| {
            tracing::warn!(
                ours = ?ours,
                theirs = ?theirs,
                "merging queries with conflicting sorts; keeping the one ordering first"
            );
        });

        let document_pagination = merge_scalar(
            &self.document_pagination,
            &other.document_pagination,
            DocumentPagination::is_empty,
            |ours, theirs| {
                tracing::warn!(
                    ours = ?ours,
                    theirs = ?theirs,
                    "merging queries with conflicting pagination; keeping the one ordering first"
                );
            },
        );

        let mut aggregations = self.aggregations.clone();
        for (name, request) in &other.aggregations {
            match aggregations.entry(name.clone()) {
                Entry::Vacant(vacant) => {
                    vacant.insert(request.clone());
                }
                Entry::Occupied(occupied) => {
                    if occupied.get() != request {
                        return Err(Error::QueryConflict(format!(
                            "aggregation `{name}` was requested twice with different specs"
                        )));
                    }
                }
            }
        }

        let monotonic_deadline = match (self.monotonic_deadline, other.monotonic_deadline) {
            // A shorter deadline must never be silently extended.
            (Some(ours), Some(theirs)) => Some(ours.min(theirs)),
            (ours, theirs) => ours.or(theirs),
        };

        Ok(Query {
            index_set: self.index_set.clone(),
            client_filters: concat_unique(&self.client_filters, &other.client_filters),
            internal_filters: concat_unique(&self.internal_filters, &other.internal_filters),
            sort,
            document_pagination,
            size_multiplier: self.size_multiplier.saturating_mul(other.size_multiplier),
            requested_fields: self
                .requested_fields
                .union(&other.requested_fields)
                .cloned()
                .collect(),
            request_all_fields: self.request_all_fields || other.request_all_fields,
            requested_highlights: self
                .requested_highlights
                .union(&other.requested_highlights)
                .cloned()
                .collect(),
            request_all_highlights: self.request_all_highlights || other.request_all_highlights,
            individual_docs_needed: self.individual_docs_needed || other.individual_docs_needed,
            total_document_count_needed: self.total_document_count_needed
                || other.total_document_count_needed,
            aggregations,
            monotonic_deadline,
        }
        .normalized())
    }
}

/// Empty values are the identity; equal values pass through; a genuine
/// conflict picks whichever value orders first, so that the choice does not
/// depend on which side of the merge it came from.
fn merge_scalar<T: Clone + Ord>(
    ours: &T,
    theirs: &T,
    is_empty: impl Fn(&T) -> bool,
    on_conflict: impl FnOnce(&T, &T),
) -> T {
    if is_empty(ours) {
        theirs.clone()
    } else if is_empty(theirs) || ours == theirs {
        ours.clone()
    } else {
        on_conflict(ours, theirs);
        T::clone(ours.min(theirs))
    }
}

/// Concatenates and de-duplicates filter fragments. The result is sorted by
/// wire representation so that merge order cannot leak into query equality.
fn concat_unique(ours: &[Filter], theirs: &[Filter]) -> Vec<Filter> {
    let mut combined: Vec<Filter> = Vec::with_capacity(ours.len() + theirs.len());
    for filter in ours.iter().chain(theirs) {
        if !combined.contains(filter) {
            combined.push(filter.clone());
        }
    }
    combined.sort_by_cached_key(|filter| filter.to_json().to_string());
    combined
}
