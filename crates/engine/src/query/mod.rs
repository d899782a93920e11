mod aggregation;
mod filter;
mod merge;
mod pagination;
mod sort;

pub use aggregation::{AggregationRequest, Computation, ComputationFunction, Grouping};
pub use filter::{BoolFilter, Filter, RangeBounds};
pub use pagination::DocumentPagination;
pub use sort::{SortClause, SortDirection};

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde_json::Map;

use runtime::{DatastoreConfig, Highlight, SearchRequest, SearchRequestBody, SourceSpec};

use crate::error::Error;
use crate::response::CursorCodec;

/// The set of index names one query executes against. Fixed at
/// construction; queries built for different sets can never be merged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchIndexSet(BTreeSet<String>);

impl SearchIndexSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn first_name(&self) -> Option<&str> {
        self.0.iter().next().map(String::as_str)
    }
}

/// An immutable description of one search request.
///
/// Resolvers build query fragments independently and combine them with
/// [`Query::merge`]; the result is only turned into a wire request when the
/// batch flushes.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub(crate) index_set: SearchIndexSet,
    pub(crate) client_filters: Vec<Filter>,
    pub(crate) internal_filters: Vec<Filter>,
    pub(crate) sort: Vec<SortClause>,
    pub(crate) document_pagination: DocumentPagination,
    pub(crate) size_multiplier: u32,
    pub(crate) requested_fields: BTreeSet<String>,
    pub(crate) request_all_fields: bool,
    pub(crate) requested_highlights: BTreeSet<String>,
    pub(crate) request_all_highlights: bool,
    pub(crate) individual_docs_needed: bool,
    pub(crate) total_document_count_needed: bool,
    pub(crate) aggregations: BTreeMap<String, AggregationRequest>,
    pub(crate) monotonic_deadline: Option<Instant>,
}

impl Query {
    pub fn builder(index_set: SearchIndexSet) -> QueryBuilder {
        QueryBuilder {
            query: Query {
                index_set,
                client_filters: Vec::new(),
                internal_filters: Vec::new(),
                sort: Vec::new(),
                document_pagination: DocumentPagination::default(),
                size_multiplier: 1,
                requested_fields: BTreeSet::new(),
                request_all_fields: false,
                requested_highlights: BTreeSet::new(),
                request_all_highlights: false,
                individual_docs_needed: false,
                total_document_count_needed: false,
                aggregations: BTreeMap::new(),
                monotonic_deadline: None,
            },
        }
    }

    pub fn index_set(&self) -> &SearchIndexSet {
        &self.index_set
    }

    pub fn sort(&self) -> &[SortClause] {
        &self.sort
    }

    pub fn document_pagination(&self) -> &DocumentPagination {
        &self.document_pagination
    }

    pub fn size_multiplier(&self) -> u32 {
        self.size_multiplier
    }

    pub fn individual_docs_needed(&self) -> bool {
        self.individual_docs_needed
    }

    pub fn total_document_count_needed(&self) -> bool {
        self.total_document_count_needed
    }

    pub fn aggregations(&self) -> &BTreeMap<String, AggregationRequest> {
        &self.aggregations
    }

    pub fn monotonic_deadline(&self) -> Option<Instant> {
        self.monotonic_deadline
    }

    /// Fetching field values (rather than just matching) always requires
    /// full documents, and an ungrouped counting aggregation relies on the
    /// document-level total. Applied after construction and after merge so
    /// the flags can never disagree with the rest of the query.
    pub(crate) fn normalized(mut self) -> Self {
        if self.request_all_fields
            || self.request_all_highlights
            || !self.requested_fields.is_empty()
            || !self.requested_highlights.is_empty()
        {
            self.individual_docs_needed = true;
        }
        if self
            .aggregations
            .values()
            .any(AggregationRequest::needs_document_level_count)
        {
            self.total_document_count_needed = true;
        }
        self
    }

    /// The page size actually sent to the backend: requested size plus one
    /// sentinel row (to detect "has next page" without a second round
    /// trip), scaled by the size multiplier, capped by configuration and
    /// the narrowest per-index result window.
    pub fn effective_size(&self, config: &DatastoreConfig) -> u32 {
        let requested = self.document_pagination.requested_page_size(config);
        let uncapped = (requested + 1).saturating_mul(self.size_multiplier);
        let window_cap = self
            .index_set
            .names()
            .filter_map(|name| config.index(name))
            .map(|index| index.max_result_window)
            .min()
            .unwrap_or(config.max_page_size);
        uncapped.min(config.max_page_size.min(window_cap))
    }

    pub fn to_search_request(&self, config: &DatastoreConfig) -> Result<SearchRequest, Error> {
        let mut sort: Vec<serde_json::Value> = self.sort.iter().map(SortClause::to_json).collect();
        if !self.sort.iter().any(|clause| clause.field == "id") {
            sort.push(SortClause::tiebreak_json());
        }

        let search_after = match &self.document_pagination.after {
            Some(cursor) => Some(CursorCodec::decode(cursor)?),
            None => None,
        };

        let source = if !self.individual_docs_needed {
            Some(SourceSpec::Enabled(false))
        } else if self.request_all_fields {
            None
        } else if !self.requested_fields.is_empty() {
            Some(SourceSpec::Includes {
                includes: self.requested_fields.iter().cloned().collect(),
            })
        } else {
            None
        };

        let aggs = if self.aggregations.is_empty() {
            None
        } else {
            let mut map = Map::new();
            for (name, request) in &self.aggregations {
                request.append_wire_entries(name, &mut map);
            }
            Some(map)
        };

        let timeout = self.monotonic_deadline.map(|deadline| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            format!("{}ms", remaining.as_millis())
        });

        let body = SearchRequestBody {
            query: filter::bool_query(&self.client_filters, &self.internal_filters),
            sort,
            size: self.effective_size(config),
            search_after,
            highlight: self.highlight_block(),
            source,
            track_total_hits: self.total_document_count_needed.then_some(true),
            aggs,
            timeout,
        };

        Ok(SearchRequest {
            index_names: self.index_set.names().map(str::to_owned).collect(),
            body,
            deadline: self.monotonic_deadline,
        })
    }

    fn highlight_block(&self) -> Option<Highlight> {
        if !self.request_all_highlights && self.requested_highlights.is_empty() {
            return None;
        }
        let mut fields = Map::new();
        if self.request_all_highlights {
            fields.insert("*".to_owned(), serde_json::json!({}));
        } else {
            for path in &self.requested_highlights {
                fields.insert(path.clone(), serde_json::json!({}));
            }
        }
        // Internal filters participate in matching but must never drive
        // highlighting; when present, highlight against client filters only.
        let highlight_query = (!self.internal_filters.is_empty() && !self.client_filters.is_empty())
            .then(|| filter::bool_query(&self.client_filters, &[]));
        Some(Highlight {
            fields,
            highlight_query,
        })
    }
}

pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    #[must_use]
    pub fn client_filter(mut self, filter: Filter) -> Self {
        self.query.client_filters.push(filter);
        self
    }

    #[must_use]
    pub fn internal_filter(mut self, filter: Filter) -> Self {
        self.query.internal_filters.push(filter);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: Vec<SortClause>) -> Self {
        self.query.sort = sort;
        self
    }

    #[must_use]
    pub fn document_pagination(mut self, pagination: DocumentPagination) -> Self {
        self.query.document_pagination = pagination;
        self
    }

    #[must_use]
    pub fn size_multiplier(mut self, multiplier: u32) -> Self {
        self.query.size_multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn requested_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query
            .requested_fields
            .extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn request_all_fields(mut self) -> Self {
        self.query.request_all_fields = true;
        self
    }

    #[must_use]
    pub fn requested_highlights<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query
            .requested_highlights
            .extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn request_all_highlights(mut self) -> Self {
        self.query.request_all_highlights = true;
        self
    }

    #[must_use]
    pub fn individual_docs_needed(mut self) -> Self {
        self.query.individual_docs_needed = true;
        self
    }

    #[must_use]
    pub fn total_document_count_needed(mut self) -> Self {
        self.query.total_document_count_needed = true;
        self
    }

    #[must_use]
    pub fn aggregation(mut self, name: impl Into<String>, request: AggregationRequest) -> Self {
        self.query.aggregations.insert(name.into(), request);
        self
    }

    #[must_use]
    pub fn monotonic_deadline(mut self, deadline: Instant) -> Self {
        self.query.monotonic_deadline = Some(deadline);
        self
    }

    pub fn build(self) -> Query {
        self.query.normalized()
    }
}
