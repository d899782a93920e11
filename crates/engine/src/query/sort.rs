use serde_json::{json, Value};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortClause {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortClause {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn to_json(&self) -> Value {
        let order = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        let mut map = serde_json::Map::new();
        map.insert(self.field.clone(), json!({"order": order}));
        Value::Object(map)
    }

    /// Trailing clause guaranteeing deterministic pagination when the
    /// primary sort has ties.
    pub(crate) fn tiebreak_json() -> Value {
        json!({"id": {"order": "asc", "missing": "_last"}})
    }
}
