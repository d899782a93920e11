#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use runtime::{
    DatastoreClient, DatastoreConfig, DatastoreError, RawHit, RawHits, RawSearchResponse,
    RawTotal, SearchRequest,
};

/// In-memory datastore. Corpus order stands in for sort order: requests
/// are answered with matching documents in insertion order, truncated to
/// the requested size. Round trips are recorded per batch call.
pub struct FakeDatastore {
    corpus: Vec<FakeDoc>,
    calls: Mutex<Vec<usize>>,
    fail_index: Option<String>,
}

#[derive(Clone)]
pub struct FakeDoc {
    pub id: String,
    pub source: Map<String, Value>,
}

pub fn doc(id: &str, source: Value) -> FakeDoc {
    FakeDoc {
        id: id.to_owned(),
        source: match source {
            Value::Object(map) => map,
            _ => Map::new(),
        },
    }
}

pub fn config() -> DatastoreConfig {
    DatastoreConfig::from_toml_str(
        r#"
        [[indices]]
        name = "widgets"

        [[indices]]
        name = "parts"
        cluster = "secondary"

        [[indices]]
        name = "broken"
        "#,
    )
    .unwrap()
}

impl FakeDatastore {
    pub fn new(corpus: Vec<FakeDoc>) -> Self {
        Self {
            corpus,
            calls: Mutex::new(Vec::new()),
            fail_index: None,
        }
    }

    pub fn failing_index(mut self, index: &str) -> Self {
        self.fail_index = Some(index.to_owned());
        self
    }

    /// Number of multi-search calls issued so far.
    pub fn batch_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Total sub-queries across all batch calls.
    pub fn total_requests(&self) -> usize {
        self.calls.lock().unwrap().iter().sum()
    }

    pub fn requests_per_call(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }

    fn execute_one(&self, request: &SearchRequest) -> RawSearchResponse {
        let mut constraints = Vec::new();
        collect_constraints(&request.body.query, &mut constraints);

        let matching: Vec<&FakeDoc> = self
            .corpus
            .iter()
            .filter(|doc| doc_matches(doc, &constraints))
            .collect();
        let total = matching.len() as u64;
        let hits = matching
            .into_iter()
            .take(request.body.size as usize)
            .map(|doc| RawHit {
                id: doc.id.clone(),
                source: doc.source.clone(),
                sort: vec![Value::String(doc.id.clone())],
                highlight: None,
            })
            .collect();

        RawSearchResponse {
            took: 1,
            timed_out: false,
            shards: None,
            hits: RawHits {
                total: request
                    .body
                    .track_total_hits
                    .unwrap_or(false)
                    .then(|| RawTotal {
                        value: total,
                        relation: Some("eq".to_owned()),
                    }),
                hits,
            },
            aggregations: None,
        }
    }
}

#[async_trait]
impl DatastoreClient for FakeDatastore {
    async fn execute_batch(
        &self,
        _cluster: &str,
        requests: Vec<SearchRequest>,
    ) -> Result<Vec<Result<RawSearchResponse, DatastoreError>>, DatastoreError> {
        self.calls.lock().unwrap().push(requests.len());
        Ok(requests
            .iter()
            .map(|request| {
                if let Some(fail) = &self.fail_index {
                    if request.index_names.iter().any(|name| name == fail) {
                        return Err(DatastoreError::Request(format!("index `{fail}` is down")));
                    }
                }
                Ok(self.execute_one(request))
            })
            .collect())
    }
}

fn collect_constraints(query: &Value, out: &mut Vec<(String, BTreeSet<String>)>) {
    let Value::Object(map) = query else { return };
    if let Some(Value::Object(terms)) = map.get("terms") {
        for (field, values) in terms {
            let allowed = values
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(stringify)
                .collect();
            out.push((field.clone(), allowed));
        }
    } else if let Some(Value::Object(term)) = map.get("term") {
        for (field, value) in term {
            out.push((field.clone(), stringify(value).into_iter().collect()));
        }
    } else if let Some(nested) = map.get("nested") {
        if let Some(inner) = nested.get("query") {
            collect_constraints(inner, out);
        }
    } else if let Some(Value::Object(bool_query)) = map.get("bool") {
        if let Some(Value::Array(filters)) = bool_query.get("filter") {
            for filter in filters {
                collect_constraints(filter, out);
            }
        }
    }
}

fn doc_matches(doc: &FakeDoc, constraints: &[(String, BTreeSet<String>)]) -> bool {
    constraints.iter().all(|(field, allowed)| {
        let mut values = Vec::new();
        collect_field_values(&Value::Object(doc.source.clone()), field.split('.'), &mut values);
        values.iter().any(|value| allowed.contains(value))
    })
}

fn collect_field_values<'a>(
    value: &Value,
    mut path: impl Iterator<Item = &'a str> + Clone,
    out: &mut Vec<String>,
) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_field_values(item, path.clone(), out);
            }
        }
        Value::Object(map) => {
            if let Some(head) = path.next() {
                if let Some(inner) = map.get(head) {
                    collect_field_values(inner, path, out);
                }
            }
        }
        other => {
            if path.next().is_none() {
                if let Some(s) = stringify(other) {
                    out.push(s);
                }
            }
        }
    }
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
