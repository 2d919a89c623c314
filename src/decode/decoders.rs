//! Decoder implementations

use super::types::RecordDecoder;
use crate::error::{Error, Result};
use serde_json::Value;

// ============================================================================
// JSON Decoder
// ============================================================================

/// JSON decoder with record path extraction
///
/// The record path must be present in every body; a missing path or a
/// non-array value is a malformed response.
#[derive(Debug, Clone)]
pub struct JsonDecoder {
    /// Path to the records array (`None` = whole body is the array)
    record_path: Option<String>,
}

impl Default for JsonDecoder {
    fn default() -> Self {
        Self::with_path("results")
    }
}

impl JsonDecoder {
    /// Create a decoder reading `results`
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JSON decoder with a record path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            record_path: Some(path.into()),
        }
    }

    /// Create a decoder that expects the whole body to be an array
    pub fn root() -> Self {
        Self { record_path: None }
    }

    /// Get the record path
    pub fn record_path(&self) -> Option<&str> {
        self.record_path.as_deref()
    }
}

impl RecordDecoder for JsonDecoder {
    fn records(&self, body: &Value) -> Result<Vec<Value>> {
        let Some(path) = &self.record_path else {
            return match body {
                Value::Array(arr) => Ok(arr.clone()),
                other => Err(Error::malformed(format!(
                    "expected a JSON array body, got {}",
                    type_name(other)
                ))),
            };
        };

        // Only use jsonpath-rust for wildcard patterns
        if path.contains('*') {
            return extract_with_jsonpath(body, path);
        }

        match lookup(body, path) {
            Some(Value::Array(arr)) => Ok(arr.clone()),
            Some(other) => Err(Error::malformed(format!(
                "field '{path}' is {}, expected an array",
                type_name(other)
            ))),
            None => Err(Error::malformed(format!("missing field '{path}'"))),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Look up a value by dot-notation path (`paging.next.after`, `items[0].id`)
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    if path.is_empty() || path == "$" {
        return Some(value);
    }

    let mut current = value;
    for part in path.split('.') {
        // Handle array indexing like "data[0]" or "items[-1]"
        if let Some(bracket_pos) = part.find('[') {
            let name = &part[..bracket_pos];
            let index_str = part[bracket_pos + 1..].trim_end_matches(']');

            if !name.is_empty() {
                current = current.get(name)?;
            }

            let index = index_str.parse::<i64>().ok()?;
            let arr = current.as_array()?;
            #[allow(clippy::cast_possible_wrap)]
            let idx = if index < 0 {
                arr.len() as i64 + index
            } else {
                index
            };
            current = arr.get(usize::try_from(idx).ok()?)?;
        } else {
            current = current.get(part)?;
        }
    }

    Some(current)
}

/// Look up a scalar by path and render it as a string
pub fn lookup_string(value: &Value, path: &str) -> Option<String> {
    match lookup(value, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Extract records using jsonpath-rust
fn extract_with_jsonpath(value: &Value, path: &str) -> Result<Vec<Value>> {
    use jsonpath_rust::JsonPath;

    let jp = JsonPath::try_from(path)
        .map_err(|e| Error::json_path(format!("Invalid JSONPath: {e}")))?;

    match jp.find(value) {
        Value::Array(arr) => Ok(arr),
        Value::Null => Ok(vec![]),
        other => Ok(vec![other]),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
