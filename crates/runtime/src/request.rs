use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};

/// One entry of a multi-search batch.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub index_names: Vec<String>,
    pub body: SearchRequestBody,
    /// Advisory deadline, passed down so the transport can abort work the
    /// caller will no longer wait for.
    pub deadline: Option<Instant>,
}

/// The search body wire shape.
///
/// Field order is meaningful for request fingerprinting on some backends,
/// hence `preserve_order` on `serde_json` and plain struct-order
/// serialization here.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequestBody {
    pub query: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
    pub size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_after: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Highlight>,
    #[serde(rename = "_source", skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_total_hits: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggs: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Highlight {
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_query: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SourceSpec {
    Enabled(bool),
    Includes { includes: Vec<String> },
}
