mod cursor;

pub use cursor::{Cursor, CursorCodec};

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use runtime::{RawHit, RawSearchResponse};

use crate::error::Error;

/// Everything the backend returned apart from the document list itself.
/// Preserved unchanged when a response is filtered into a sub-view.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
    pub took: u64,
    pub timed_out: bool,
    pub shards: Option<Value>,
    /// The raw total-count block, kept for diagnostics even when the
    /// typed count is unavailable.
    pub raw_total: Option<Value>,
    pub index: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Document {
    id: String,
    payload: Map<String, Value>,
    sort_values: Vec<Value>,
    highlights: Option<Map<String, Value>>,
}

impl Document {
    fn from_raw(hit: RawHit) -> Self {
        Self {
            id: hit.id,
            payload: hit.source,
            sort_values: hit.sort,
            highlights: hit.highlight,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn highlights(&self) -> Option<&Map<String, Value>> {
        self.highlights.as_ref()
    }

    /// The cursor addressing this document within its response, derived
    /// from the sort values the backend returned for it.
    pub fn cursor(&self) -> Cursor {
        if self.sort_values.is_empty() {
            CursorCodec::encode(&[Value::String(self.id.clone())])
        } else {
            CursorCodec::encode(&self.sort_values)
        }
    }

    fn values_at_path<'a>(&'a self, segments: &[&str]) -> Vec<&'a Value> {
        let mut out = Vec::new();
        if let Some((head, rest)) = segments.split_first() {
            if let Some(value) = self.payload.get(*head) {
                collect_values(value, rest, &mut out);
            }
        }
        out
    }

    fn path_present(&self, segments: &[&str]) -> bool {
        match segments.split_first() {
            Some((head, rest)) => self
                .payload
                .get(*head)
                .is_some_and(|value| rest.is_empty() || path_present(value, rest)),
            None => false,
        }
    }
}

fn collect_values<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    if segments.is_empty() {
        match value {
            Value::Array(items) => out.extend(items.iter()),
            other => out.push(other),
        }
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                collect_values(item, segments, out);
            }
        }
        Value::Object(map) => {
            if let Some(inner) = map.get(segments[0]) {
                collect_values(inner, &segments[1..], out);
            }
        }
        _ => {}
    }
}

fn path_present(value: &Value, segments: &[&str]) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|item| path_present(item, segments)),
        Value::Object(map) => match segments.split_first() {
            Some((head, rest)) => map
                .get(*head)
                .is_some_and(|inner| rest.is_empty() || path_present(inner, rest)),
            None => true,
        },
        _ => segments.is_empty(),
    }
}

/// One search result. Immutable once built; [`SearchResponse::filter_results`]
/// carves out new responses rather than mutating.
#[derive(Clone, Debug)]
pub struct SearchResponse {
    metadata: ResponseMetadata,
    documents: Vec<Document>,
    total_document_count: Option<u64>,
    aggregations: Option<Map<String, Value>>,
    filtered: bool,
}

impl SearchResponse {
    pub fn from_raw(raw: RawSearchResponse) -> Self {
        let raw_total = raw
            .hits
            .total
            .as_ref()
            .map(|total| json!({"value": total.value, "relation": total.relation}));
        Self {
            metadata: ResponseMetadata {
                took: raw.took,
                timed_out: raw.timed_out,
                shards: raw.shards,
                raw_total,
                index: None,
            },
            total_document_count: raw.hits.total.map(|total| total.value),
            documents: raw.hits.hits.into_iter().map(Document::from_raw).collect(),
            aggregations: raw.aggregations,
            filtered: false,
        }
    }

    /// A zero-cost response built from an already known, ordered id list,
    /// used to short-circuit a datastore call entirely.
    pub fn synthesize_from_ids(index_name: &str, ids: &[String]) -> Self {
        let documents = ids
            .iter()
            .map(|id| {
                let mut payload = Map::new();
                payload.insert("id".to_owned(), Value::String(id.clone()));
                Document {
                    id: id.clone(),
                    payload,
                    sort_values: vec![Value::String(id.clone())],
                    highlights: None,
                }
            })
            .collect();
        Self {
            metadata: ResponseMetadata {
                index: Some(index_name.to_owned()),
                ..Default::default()
            },
            documents,
            total_document_count: Some(ids.len() as u64),
            aggregations: None,
            filtered: false,
        }
    }

    pub fn metadata(&self) -> &ResponseMetadata {
        &self.metadata
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document_ids(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(Document::id)
    }

    pub fn total_document_count(&self) -> Result<u64, Error> {
        self.total_document_count.ok_or(Error::CountUnavailable)
    }

    pub fn total_document_count_or(&self, default: u64) -> u64 {
        self.total_document_count.unwrap_or(default)
    }

    pub fn aggregations(&self) -> Result<Option<&Map<String, Value>>, Error> {
        if self.filtered {
            return Err(Error::AggregationsUnavailable);
        }
        Ok(self.aggregations.as_ref())
    }

    /// Carves the sub-view belonging to one id-set out of a combined
    /// response.
    ///
    /// A document matches when the value at `field_path` (scalar or
    /// list-valued; any overlap counts) intersects `id_set`. `"id"` is
    /// special-cased to use the document identifier so the field does not
    /// have to be requested in the payload. The result keeps the original
    /// relative order, truncated to `limit`, and can report neither a total
    /// count nor aggregations.
    pub fn filter_results(
        &self,
        field_path: &str,
        id_set: &BTreeSet<String>,
        limit: usize,
    ) -> Result<SearchResponse, Error> {
        let base = SearchResponse {
            metadata: self.metadata.clone(),
            documents: Vec::new(),
            total_document_count: None,
            aggregations: None,
            filtered: true,
        };
        if id_set.is_empty() || limit == 0 {
            return Ok(base);
        }

        let use_document_id = field_path == "id";
        let segments: Vec<&str> = field_path.split('.').collect();
        if !use_document_id
            && !self.documents.is_empty()
            && !self.documents.iter().any(|doc| doc.path_present(&segments))
        {
            return Err(Error::FilterFieldMissing {
                field: field_path.to_owned(),
            });
        }

        let mut documents = Vec::new();
        for document in &self.documents {
            let matched = if use_document_id {
                id_set.contains(document.id())
            } else {
                document
                    .values_at_path(&segments)
                    .into_iter()
                    .any(|value| value_in_id_set(value, id_set))
            };
            if matched {
                documents.push(document.clone());
                if documents.len() == limit {
                    break;
                }
            }
        }

        Ok(SearchResponse { documents, ..base })
    }
}

fn value_in_id_set(value: &Value, id_set: &BTreeSet<String>) -> bool {
    match value {
        Value::String(s) => id_set.contains(s),
        Value::Number(n) => id_set.contains(&n.to_string()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::{RawHits, RawTotal};

    fn response_with_docs(docs: Vec<(&str, Value)>) -> SearchResponse {
        SearchResponse::from_raw(RawSearchResponse {
            took: 3,
            timed_out: false,
            shards: None,
            hits: RawHits {
                total: Some(RawTotal {
                    value: docs.len() as u64,
                    relation: Some("eq".to_owned()),
                }),
                hits: docs
                    .into_iter()
                    .map(|(id, source)| RawHit {
                        id: id.to_owned(),
                        source: match source {
                            Value::Object(map) => map,
                            _ => Map::new(),
                        },
                        sort: vec![Value::String(id.to_owned())],
                        highlight: None,
                    })
                    .collect(),
            },
            aggregations: None,
        })
    }

    fn id_set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| (*id).to_owned()).collect()
    }

    #[test]
    fn list_valued_fields_match_on_any_overlap() {
        let response = response_with_docs(vec![
            ("d1", json!({"foo_ids": [1, 17]})),
            ("d2", json!({"foo_ids": [2, 20]})),
            ("d3", json!({"foo_ids": [3, 19, 47]})),
        ]);

        let filtered = response
            .filter_results("foo_ids", &id_set(&["1", "17", "19"]), 10)
            .unwrap();
        let ids: Vec<_> = filtered.document_ids().collect();
        assert_eq!(ids, vec!["d1", "d3"]);
    }

    #[test]
    fn id_path_matches_without_a_payload_field() {
        let response = response_with_docs(vec![("d1", json!({})), ("d2", json!({}))]);
        let filtered = response.filter_results("id", &id_set(&["d2"]), 10).unwrap();
        let ids: Vec<_> = filtered.document_ids().collect();
        assert_eq!(ids, vec!["d2"]);
    }

    #[test]
    fn empty_id_set_yields_an_empty_response() {
        let response = response_with_docs(vec![("d1", json!({"foo_ids": [1]}))]);
        let filtered = response
            .filter_results("foo_ids", &BTreeSet::new(), 10)
            .unwrap();
        assert!(filtered.documents().is_empty());
    }

    #[test]
    fn unknown_field_path_is_an_error() {
        let response = response_with_docs(vec![("d1", json!({"foo_ids": [1]}))]);
        let err = response
            .filter_results("bar_ids", &id_set(&["1"]), 10)
            .unwrap_err();
        assert!(matches!(err, Error::FilterFieldMissing { field } if field == "bar_ids"));
    }

    #[test]
    fn filtering_clears_count_and_aggregations_but_keeps_metadata() {
        let response = response_with_docs(vec![("d1", json!({"foo_ids": [1]}))]);
        assert_eq!(response.total_document_count().unwrap(), 1);

        let filtered = response.filter_results("foo_ids", &id_set(&["1"]), 10).unwrap();
        assert!(matches!(
            filtered.total_document_count(),
            Err(Error::CountUnavailable)
        ));
        assert_eq!(filtered.total_document_count_or(0), 0);
        assert!(matches!(
            filtered.aggregations(),
            Err(Error::AggregationsUnavailable)
        ));
        assert_eq!(filtered.metadata().took, 3);
    }

    #[test]
    fn truncates_to_limit_preserving_order() {
        let response = response_with_docs(vec![
            ("d1", json!({"k": "a"})),
            ("d2", json!({"k": "a"})),
            ("d3", json!({"k": "a"})),
        ]);
        let filtered = response.filter_results("k", &id_set(&["a"]), 2).unwrap();
        let ids: Vec<_> = filtered.document_ids().collect();
        assert_eq!(ids, vec!["d1", "d2"]);
    }

    #[test]
    fn nested_paths_traverse_objects_and_arrays() {
        let response = response_with_docs(vec![
            ("d1", json!({"components": [{"part_id": "p1"}, {"part_id": "p2"}]})),
            ("d2", json!({"components": [{"part_id": "p9"}]})),
        ]);
        let filtered = response
            .filter_results("components.part_id", &id_set(&["p2"]), 10)
            .unwrap();
        let ids: Vec<_> = filtered.document_ids().collect();
        assert_eq!(ids, vec!["d1"]);
    }

    #[test]
    fn synthesized_response_reports_its_ids_in_order() {
        let response =
            SearchResponse::synthesize_from_ids("widgets", &["a".to_owned(), "b".to_owned()]);
        let ids: Vec<_> = response.document_ids().collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(response.total_document_count().unwrap(), 2);
        assert_eq!(response.metadata().index.as_deref(), Some("widgets"));
        assert!(!response.documents()[0].cursor().as_str().is_empty());
    }

    #[test]
    fn count_unavailable_when_never_requested() {
        let response = SearchResponse::from_raw(RawSearchResponse::default());
        assert!(matches!(
            response.total_document_count(),
            Err(Error::CountUnavailable)
        ));
        assert_eq!(response.total_document_count_or(7), 7);
    }
}
