//! Decoder traits

use crate::error::Result;
use serde_json::Value;

/// Core trait for turning a response body into records
pub trait RecordDecoder: Send + Sync {
    /// Extract the page's records from a parsed body
    fn records(&self, body: &Value) -> Result<Vec<Value>>;
}
