//! Pagination types and traits
//!
//! Defines the core pagination abstractions used by all strategies and the
//! request/page values exchanged with [`super::PaginatedFetcher`].

use crate::types::{Method, StringMap};
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// Fetch Request / Page
// ============================================================================

/// Description of a paginated fetch. Immutable for the whole session.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Absolute URL or path relative to the client's base URL
    pub url: String,
    /// HTTP method (GET for listings, POST for search-style endpoints)
    pub method: Method,
    /// Query parameters sent with every page
    pub query: StringMap,
    /// Optional JSON body sent with every page
    pub body: Option<Value>,
    /// Stop after this many records in total
    pub limit: Option<usize>,
}

impl FetchRequest {
    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            query: HashMap::new(),
            body: None,
            limit: None,
        }
    }

    /// Create a POST request with a JSON body
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(url)
        }
    }

    /// Add a query parameter (numbers are stringified)
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.insert(key.into(), value.to_string());
        self
    }

    /// Add several query parameters
    #[must_use]
    pub fn params(mut self, params: &StringMap) -> Self {
        self.query
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Cap the total number of records
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// One successful response worth of records
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Zero-based position of this page in the session
    pub index: usize,
    /// Records in server order
    pub records: Vec<Value>,
    /// Token for the following page, if the server returned one
    pub next_cursor: Option<String>,
}

impl Page {
    /// Check if another page follows
    pub fn has_next(&self) -> bool {
        self.next_cursor.is_some()
    }

    /// Number of records on this page
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the page has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Next Page
// ============================================================================

/// Result of the next page computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// More pages available with these parameters
    Continue {
        /// Query parameters to add/replace
        query_params: HashMap<String, String>,
        /// Optional new URL (for next-link pagination)
        url: Option<String>,
    },
    /// No more pages
    Done,
}

impl NextPage {
    /// Create a continuation with query parameters
    pub fn with_params(params: HashMap<String, String>) -> Self {
        Self::Continue {
            query_params: params,
            url: None,
        }
    }

    /// Create a continuation with a single parameter
    pub fn with_param(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut params = HashMap::new();
        params.insert(key.into(), value.into());
        Self::with_params(params)
    }

    /// Create a continuation with a new URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::Continue {
            query_params: HashMap::new(),
            url: Some(url.into()),
        }
    }

    /// Check if this is a done result
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Check if this is a continue result
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue { .. })
    }
}

// ============================================================================
// Stop Conditions
// ============================================================================

/// Extra stop conditions checked before following a cursor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopCondition {
    /// Only the absence of a cursor ends pagination
    #[default]
    Never,

    /// Stop on a page without records, even if it carries a cursor
    EmptyPage,
}

impl StopCondition {
    /// Check the condition against a page
    pub fn should_stop(&self, records_count: usize) -> bool {
        match self {
            StopCondition::Never => false,
            StopCondition::EmptyPage => records_count == 0,
        }
    }
}

// ============================================================================
// Pagination State
// ============================================================================

/// Tracks pagination state during one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    /// Pages processed so far
    pub page: u32,
    /// Current offset (for offset-based pagination)
    pub offset: u64,
    /// Token identifying the next page
    pub cursor: Option<String>,
    /// Total records fetched so far
    pub total_fetched: u64,
    /// Is pagination complete?
    pub done: bool,
}

impl PaginationState {
    /// Create a new pagination state
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark pagination as complete
    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// Increment page number
    pub fn next_page(&mut self) {
        self.page += 1;
    }

    /// Add offset
    pub fn add_offset(&mut self, amount: u64) {
        self.offset += amount;
    }

    /// Set cursor
    pub fn set_cursor(&mut self, cursor: String) {
        self.cursor = Some(cursor);
    }

    /// Add to total fetched
    pub fn add_fetched(&mut self, count: u64) {
        self.total_fetched += count;
    }
}

// ============================================================================
// Paginator Trait
// ============================================================================

/// Core trait for pagination strategies
pub trait Paginator: Send + Sync {
    /// Query parameters for the first request
    fn initial_params(&self, state: &PaginationState) -> HashMap<String, String>;

    /// Process a response and determine if there's a next page.
    ///
    /// Implementations set `state.cursor` whenever they return `Continue`.
    fn process_response(
        &self,
        body: &Value,
        headers: &HeaderMap,
        records_count: usize,
        state: &mut PaginationState,
    ) -> NextPage;
}
