use serde_json::{json, Map, Value};

/// One boolean-filter tree fragment, mirroring the backend's filter
/// context. Fragments are compared structurally so that merging two
/// queries can de-duplicate identical predicates.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Term { field: String, value: Value },
    Terms { field: String, values: Vec<Value> },
    Range { field: String, bounds: RangeBounds },
    Exists { field: String },
    Bool(BoolFilter),
    Nested { path: String, filter: Box<Filter> },
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct RangeBounds {
    pub gt: Option<Value>,
    pub gte: Option<Value>,
    pub lt: Option<Value>,
    pub lte: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct BoolFilter {
    pub must: Vec<Filter>,
    pub should: Vec<Filter>,
    pub must_not: Vec<Filter>,
    pub filter: Vec<Filter>,
}

impl Filter {
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn terms(field: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::Terms {
            field: field.into(),
            values,
        }
    }

    /// A terms filter over a set of foreign-key values.
    pub fn id_terms<I, S>(field: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Terms {
            field: field.into(),
            values: ids.into_iter().map(|id| Value::String(id.into())).collect(),
        }
    }

    pub fn nested(path: impl Into<String>, filter: Filter) -> Self {
        Filter::Nested {
            path: path.into(),
            filter: Box::new(filter),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Filter::Term { field, value } => json!({"term": keyed(field, value.clone())}),
            Filter::Terms { field, values } => {
                json!({"terms": keyed(field, Value::Array(values.clone()))})
            }
            Filter::Range { field, bounds } => {
                let mut range = Map::new();
                if let Some(gt) = &bounds.gt {
                    range.insert("gt".to_owned(), gt.clone());
                }
                if let Some(gte) = &bounds.gte {
                    range.insert("gte".to_owned(), gte.clone());
                }
                if let Some(lt) = &bounds.lt {
                    range.insert("lt".to_owned(), lt.clone());
                }
                if let Some(lte) = &bounds.lte {
                    range.insert("lte".to_owned(), lte.clone());
                }
                json!({"range": keyed(field, Value::Object(range))})
            }
            Filter::Exists { field } => json!({"exists": {"field": field}}),
            Filter::Bool(bool_filter) => {
                let mut clauses = Map::new();
                for (name, filters) in [
                    ("must", &bool_filter.must),
                    ("should", &bool_filter.should),
                    ("must_not", &bool_filter.must_not),
                    ("filter", &bool_filter.filter),
                ] {
                    if !filters.is_empty() {
                        clauses.insert(
                            name.to_owned(),
                            Value::Array(filters.iter().map(Filter::to_json).collect()),
                        );
                    }
                }
                json!({"bool": clauses})
            }
            Filter::Nested { path, filter } => {
                json!({"nested": {"path": path, "query": filter.to_json()}})
            }
        }
    }
}

fn keyed(field: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(field.to_owned(), value);
    map
}

/// The top-level query sent to the backend: all filters in filter context,
/// client-supplied ones first.
pub(crate) fn bool_query(client_filters: &[Filter], internal_filters: &[Filter]) -> Value {
    let fragments: Vec<Value> = client_filters
        .iter()
        .chain(internal_filters)
        .map(Filter::to_json)
        .collect();
    json!({"bool": {"filter": fragments}})
}
