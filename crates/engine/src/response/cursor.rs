use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::Value;

use crate::error::Error;

/// An opaque pagination cursor.
///
/// Unpadded url-safe base64 keeps it copy-pasteable and short.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes a document's sort-key values into an opaque, order-preserving
/// cursor and back. Documents from one response always decode to the same
/// relative order when re-paginated with `after`/`before`.
pub struct CursorCodec;

impl CursorCodec {
    pub fn encode(sort_values: &[Value]) -> Cursor {
        // Serializing JSON values to bytes cannot fail.
        let bytes = serde_json::to_vec(sort_values).unwrap_or_default();
        Cursor(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn decode(cursor: &Cursor) -> Result<Vec<Value>, Error> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor.as_str())
            .map_err(|err| Error::InvalidCursor(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| Error::InvalidCursor(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_sort_values() {
        let values = vec![json!("2024-05-01"), json!(17), json!("w42")];
        let cursor = CursorCodec::encode(&values);
        assert_eq!(CursorCodec::decode(&cursor).unwrap(), values);
    }

    #[test]
    fn rejects_garbage() {
        let err = CursorCodec::decode(&Cursor::from_string("not base64!!")).unwrap_err();
        assert!(matches!(err, Error::InvalidCursor(_)));
    }

    #[test]
    fn encoding_is_deterministic() {
        let values = vec![json!(["a", 1])];
        assert_eq!(CursorCodec::encode(&values), CursorCodec::encode(&values));
    }
}
