use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A parsed single-search response, one per multi-search entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSearchResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, rename = "_shards", skip_serializing_if = "Option::is_none")]
    pub shards: Option<Value>,
    #[serde(default)]
    pub hits: RawHits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawHits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<RawTotal>,
    #[serde(default)]
    pub hits: Vec<RawHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTotal {
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, rename = "_source")]
    pub source: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_backend_payload() {
        let response: RawSearchResponse = serde_json::from_value(serde_json::json!({
            "took": 7,
            "timed_out": false,
            "_shards": {"total": 5, "successful": 5, "failed": 0},
            "hits": {
                "total": {"value": 42, "relation": "eq"},
                "hits": [
                    {"_id": "w1", "_source": {"name": "widget"}, "sort": ["widget", "w1"]},
                    {"_id": "w2"}
                ]
            }
        }))
        .unwrap();

        assert_eq!(response.took, 7);
        assert_eq!(response.hits.total.unwrap().value, 42);
        assert_eq!(response.hits.hits.len(), 2);
        assert_eq!(response.hits.hits[0].sort.len(), 2);
        assert!(response.hits.hits[1].source.is_empty());
        assert!(response.aggregations.is_none());
    }
}
