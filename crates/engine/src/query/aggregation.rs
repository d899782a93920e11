use serde_json::{json, Map, Value};

/// One named aggregation requested alongside a query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregationRequest {
    /// Whether the caller needs a document count for this aggregation.
    pub needs_doc_count: bool,
    pub groupings: Vec<Grouping>,
    pub computations: Vec<Computation>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Grouping {
    Terms { field: String, size: u32 },
    DateHistogram { field: String, interval: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Computation {
    pub field: String,
    pub function: ComputationFunction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComputationFunction {
    Min,
    Max,
    Sum,
    Avg,
}

impl AggregationRequest {
    /// A grouped aggregation gets its count per bucket; only an ungrouped
    /// one has to fall back to the document-level total count.
    pub(crate) fn needs_document_level_count(&self) -> bool {
        self.needs_doc_count && self.groupings.is_empty()
    }

    /// Appends this aggregation's wire entries under `name` prefixes.
    pub(crate) fn append_wire_entries(&self, name: &str, aggs: &mut Map<String, Value>) {
        if self.groupings.is_empty() {
            for computation in &self.computations {
                aggs.insert(format!("{name}:{}", computation.key()), computation.to_json());
            }
            return;
        }

        let mut current: Option<Value> = if self.computations.is_empty() {
            None
        } else {
            let mut inner = Map::new();
            for computation in &self.computations {
                inner.insert(computation.key(), computation.to_json());
            }
            Some(Value::Object(inner))
        };

        for grouping in self.groupings.iter().rev() {
            let mut node = grouping.body();
            if let Some(sub_aggs) = current.take() {
                node.insert("aggs".to_owned(), sub_aggs);
            }
            let mut named = Map::new();
            named.insert(grouping.field().to_owned(), Value::Object(node));
            current = Some(Value::Object(named));
        }

        if let Some(Value::Object(outer)) = current {
            for (key, value) in outer {
                aggs.insert(format!("{name}:{key}"), value);
            }
        }
    }
}

impl Grouping {
    fn field(&self) -> &str {
        match self {
            Grouping::Terms { field, .. } | Grouping::DateHistogram { field, .. } => field,
        }
    }

    fn body(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            Grouping::Terms { field, size } => {
                map.insert("terms".to_owned(), json!({"field": field, "size": size}));
            }
            Grouping::DateHistogram { field, interval } => {
                map.insert(
                    "date_histogram".to_owned(),
                    json!({"field": field, "calendar_interval": interval}),
                );
            }
        }
        map
    }
}

impl Computation {
    fn key(&self) -> String {
        format!("{}_{}", self.function.name(), self.field)
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.function.name().to_owned(), json!({"field": self.field}));
        Value::Object(map)
    }
}

impl ComputationFunction {
    fn name(self) -> &'static str {
        match self {
            ComputationFunction::Min => "min",
            ComputationFunction::Max => "max",
            ComputationFunction::Sum => "sum",
            ComputationFunction::Avg => "avg",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouped_aggregation_nests_computations_under_buckets() {
        let request = AggregationRequest {
            needs_doc_count: true,
            groupings: vec![Grouping::Terms {
                field: "category".to_owned(),
                size: 10,
            }],
            computations: vec![Computation {
                field: "cost".to_owned(),
                function: ComputationFunction::Avg,
            }],
        };

        let mut aggs = Map::new();
        request.append_wire_entries("by_category", &mut aggs);
        assert_eq!(
            Value::Object(aggs),
            json!({
                "by_category:category": {
                    "terms": {"field": "category", "size": 10},
                    "aggs": {"avg_cost": {"avg": {"field": "cost"}}}
                }
            })
        );
        assert!(!request.needs_document_level_count());
    }

    #[test]
    fn ungrouped_computations_serialize_as_top_level_entries() {
        let request = AggregationRequest {
            needs_doc_count: true,
            groupings: Vec::new(),
            computations: vec![Computation {
                field: "cost".to_owned(),
                function: ComputationFunction::Max,
            }],
        };

        let mut aggs = Map::new();
        request.append_wire_entries("cost_stats", &mut aggs);
        assert_eq!(
            Value::Object(aggs),
            json!({"cost_stats:max_cost": {"max": {"field": "cost"}}})
        );
        assert!(request.needs_document_level_count());
    }
}
