use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use tracing::debug;

/// Domain-specific normalization of decoded records.
///
/// Implementations must not panic on malformed input: records that
/// cannot be normalized are skipped, and a non-array input yields an
/// empty `Vec`.
pub trait RecordParser: Send + Sync + 'static {
    type Record: Clone + Serialize + Send + Sync + 'static;

    fn parse_data(&self, raw: Value) -> Vec<Self::Record>;
}

/// Deserializes each array element into `T`, dropping those that don't fit
#[derive(Debug)]
pub struct SerdeParser<T> {
    _record: PhantomData<fn() -> T>,
}

impl<T> Default for SerdeParser<T> {
    fn default() -> Self {
        Self { _record: PhantomData }
    }
}

impl<T> SerdeParser<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> RecordParser for SerdeParser<T>
where
    T: DeserializeOwned + Clone + Serialize + Send + Sync + 'static,
{
    type Record = T;

    fn parse_data(&self, raw: Value) -> Vec<T> {
        let Value::Array(items) = raw else {
            return Vec::new();
        };
        let total = items.len();
        let parsed: Vec<T> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();
        if parsed.len() < total {
            debug!("Skipped {} malformed records", total - parsed.len());
        }
        parsed
    }
}

/// Passes decoded JSON records through untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueParser;

impl RecordParser for ValueParser {
    type Record = Value;

    fn parse_data(&self, raw: Value) -> Vec<Value> {
        match raw {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }
}

/// Lenient numeric coercion for ids that arrive as strings from CSV/TXT sources.
#[must_use]
pub fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u64,
        name: String,
    }

    #[test]
    fn test_serde_parser_skips_malformed() {
        let parser = SerdeParser::<User>::new();
        let users = parser.parse_data(json!([
            {"id": 1, "name": "Alice"},
            {"id": "oops"},
            {"id": 2, "name": "Bob", "extra": true}
        ]));
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].name, "Bob");
        assert!(parser.parse_data(json!({"id": 1})).is_empty());
    }

    #[test]
    fn test_value_parser_and_coercion() {
        assert_eq!(ValueParser.parse_data(json!([1, 2])).len(), 2);
        assert!(ValueParser.parse_data(json!("x")).is_empty());
        assert_eq!(coerce_u64(&json!(" 42 ")), Some(42));
        assert_eq!(coerce_u64(&json!(7)), Some(7));
        assert_eq!(coerce_u64(&json!(null)), None);
    }
}
