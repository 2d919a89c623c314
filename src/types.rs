//! Common types used throughout hubspot-batch
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Type Aliases
// ============================================================================

/// Generic key-value map with string keys and values
pub type StringMap = HashMap<String, String>;

// ============================================================================
// HTTP Types
// ============================================================================

/// HTTP methods used against the CRM API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    GET,
    POST,
    PATCH,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::PATCH => reqwest::Method::PATCH,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PATCH => "PATCH",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Growth of the retry delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Same delay for every retry
    Constant,
    /// Delay grows by one base step per retry
    Linear,
    /// Delay is multiplied by the policy multiplier per retry
    #[default]
    Exponential,
}

// ============================================================================
// Item Error Policy
// ============================================================================

/// What a job does when a single record or sub-fetch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorPolicy {
    /// Log the failure and continue with the next item
    #[default]
    Skip,
    /// Abort the whole run on the first failing item
    Abort,
}

// ============================================================================
// CRM Object Types
// ============================================================================

/// CRM object types that carry custom date properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Contacts,
    Companies,
    Deals,
}

impl ObjectType {
    /// Path segment used by the CRM v3 API
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Contacts => "contacts",
            ObjectType::Companies => "companies",
            ObjectType::Deals => "deals",
        }
    }

    /// Default property group for new properties on this object type
    pub fn property_group(&self) -> &'static str {
        match self {
            ObjectType::Contacts => "contactinformation",
            ObjectType::Companies => "companyinformation",
            ObjectType::Deals => "dealinformation",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contacts" => Ok(ObjectType::Contacts),
            "companies" => Ok(ObjectType::Companies),
            "deals" => Ok(ObjectType::Deals),
            other => Err(crate::error::Error::config(format!(
                "Unknown object type: {other}"
            ))),
        }
    }
}

// ============================================================================
// Utilities
// ============================================================================

/// Extension trait for Option<String> to handle empty strings
pub trait OptionStringExt {
    /// Returns None if the string is empty
    fn none_if_empty(self) -> Option<String>;
}

impl OptionStringExt for Option<String> {
    fn none_if_empty(self) -> Option<String> {
        self.filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_conversion() {
        let get: reqwest::Method = Method::GET.into();
        assert_eq!(reqwest::Method::GET, get);
        let patch: reqwest::Method = Method::PATCH.into();
        assert_eq!(reqwest::Method::PATCH, patch);
        assert_eq!(Method::POST.to_string(), "POST");
    }

    #[test]
    fn test_method_default() {
        assert_eq!(Method::default(), Method::GET);
    }

    #[test]
    fn test_backoff_type_serde() {
        let backoff: BackoffType = serde_json::from_str("\"constant\"").unwrap();
        assert_eq!(backoff, BackoffType::Constant);
        assert_eq!(BackoffType::default(), BackoffType::Exponential);
    }

    #[test]
    fn test_item_error_policy_serde() {
        let policy: ItemErrorPolicy = serde_json::from_str("\"abort\"").unwrap();
        assert_eq!(policy, ItemErrorPolicy::Abort);
        assert_eq!(ItemErrorPolicy::default(), ItemErrorPolicy::Skip);
    }

    #[test]
    fn test_object_type() {
        assert_eq!("Deals".parse::<ObjectType>().unwrap(), ObjectType::Deals);
        assert!("tickets".parse::<ObjectType>().is_err());
        assert_eq!(ObjectType::Companies.property_group(), "companyinformation");
        assert_eq!(ObjectType::Contacts.to_string(), "contacts");
    }

    #[test]
    fn test_option_string_none_if_empty() {
        assert_eq!(
            Some("test".to_string()).none_if_empty(),
            Some("test".to_string())
        );
        assert_eq!(Some(String::new()).none_if_empty(), None);
        assert_eq!(None::<String>.none_if_empty(), None);
    }
}
