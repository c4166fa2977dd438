//! Format decoders turning raw response bodies into JSON records.
//!
//! Every decoder produces `serde_json::Value` records; the fetcher's
//! `RecordParser` then normalizes them into domain types.

use crate::error::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Pagination block of an enveloped JSON response
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub total_items: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Records(Vec<Value>),
    Envelope {
        data: Vec<Value>,
        #[serde(default)]
        pagination: Option<PageInfo>,
    },
}

/// Accepted shapes of a JSON response body
#[derive(Debug, Clone, PartialEq)]
pub enum JsonPayload {
    /// A bare array of records
    Records(Vec<Value>),
    /// `{data: [...], pagination: {...}}`
    Envelope {
        data: Vec<Value>,
        pagination: Option<PageInfo>,
    },
    /// Anything else; carries a short description of what was seen
    Unrecognized(String),
}

impl JsonPayload {
    /// Classifies an already-parsed JSON document.
    #[must_use]
    pub fn classify(value: Value) -> Self {
        let shape = describe(&value);
        match serde_json::from_value::<WirePayload>(value) {
            Ok(WirePayload::Records(data)) => Self::Records(data),
            Ok(WirePayload::Envelope { data, pagination }) => Self::Envelope { data, pagination },
            Err(_) => Self::Unrecognized(shape),
        }
    }

    /// Parses a response body.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if `body` is not valid JSON at all.
    pub fn from_body(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)?;
        Ok(Self::classify(value))
    }

    /// Records plus `(total_items, total_pages)`; unrecognized shapes log and yield nothing.
    #[must_use]
    pub fn into_parts(self, context: &str) -> (Vec<Value>, Option<u64>, Option<u64>) {
        match self {
            Self::Records(data) => (data, None, None),
            Self::Envelope { data, pagination } => {
                let page = pagination.unwrap_or_default();
                (data, page.total_items, page.total_pages)
            }
            Self::Unrecognized(shape) => {
                warn!("⚠️  Unrecognized JSON shape for {}: {}", context, shape);
                (Vec::new(), None, None)
            }
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
    }
}

/// Header row plus positional rows; every value stays a trimmed string.
///
/// # Errors
///
/// Returns a CSV error if the reader cannot tokenize the input.
pub fn parse_csv(text: &str) -> Result<Vec<Value>> {
    let content: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    if content.is_empty() {
        return Ok(Vec::new());
    }

    let joined = content.join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(joined.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: Map<String, Value> = headers
            .iter()
            .enumerate()
            .map(|(index, header)| {
                let value = row.get(index).unwrap_or_default();
                (header.clone(), Value::String(value.to_string()))
            })
            .collect();
        records.push(Value::Object(record));
    }

    debug!("Parsed {} CSV records with {} columns", records.len(), headers.len());
    Ok(records)
}

/// One record per non-blank line: JSON first, then the `key:value,key:value` grammar.
#[must_use]
pub fn parse_txt(text: &str) -> Vec<Value> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_txt_line)
        .collect()
}

fn parse_txt_line(line: &str) -> Value {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(line) {
        return value;
    }

    let record: Map<String, Value> = line
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once(':')?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some((key.to_string(), Value::String(value.to_string())))
        })
        .collect();
    Value::Object(record)
}
