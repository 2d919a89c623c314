//! Pagination strategy implementations
//!
//! Each strategy handles a specific pagination pattern.

use super::types::{NextPage, PaginationState, Paginator, StopCondition};
use crate::decode::lookup_string;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;

/// Query parameter carrying the CRM cursor
pub const DEFAULT_CURSOR_PARAM: &str = "after";
/// Location of the CRM cursor in a list response
pub const DEFAULT_CURSOR_PATH: &str = "paging.next.after";
/// Location of the absolute next-page link in a list response
pub const DEFAULT_NEXT_LINK_PATH: &str = "paging.next.link";

// ============================================================================
// Cursor Pagination
// ============================================================================

/// Cursor-based pagination
///
/// Reads an opaque token from the response and sends it back as a query
/// parameter, e.g. `?after=NTI1Cg%3D%3D`. A missing or empty token ends the
/// session.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorPaginator {
    /// Query parameter name for cursor
    pub cursor_param: String,
    /// Path to extract cursor from response
    pub cursor_path: String,
    /// Stop condition
    pub stop_condition: StopCondition,
}

impl Default for CursorPaginator {
    fn default() -> Self {
        Self::new(
            DEFAULT_CURSOR_PARAM,
            DEFAULT_CURSOR_PATH,
            StopCondition::Never,
        )
    }
}

impl CursorPaginator {
    /// Create a new cursor paginator
    pub fn new(
        cursor_param: impl Into<String>,
        cursor_path: impl Into<String>,
        stop_condition: StopCondition,
    ) -> Self {
        Self {
            cursor_param: cursor_param.into(),
            cursor_path: cursor_path.into(),
            stop_condition,
        }
    }

    /// Replace the stop condition
    #[must_use]
    pub fn with_stop_condition(mut self, stop_condition: StopCondition) -> Self {
        self.stop_condition = stop_condition;
        self
    }
}

impl Paginator for CursorPaginator {
    fn initial_params(&self, state: &PaginationState) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let Some(cursor) = &state.cursor {
            params.insert(self.cursor_param.clone(), cursor.clone());
        }
        params
    }

    fn process_response(
        &self,
        body: &Value,
        _headers: &HeaderMap,
        records_count: usize,
        state: &mut PaginationState,
    ) -> NextPage {
        state.add_fetched(records_count as u64);
        state.next_page();

        if self.stop_condition.should_stop(records_count) {
            state.mark_done();
            return NextPage::Done;
        }

        match lookup_string(body, &self.cursor_path) {
            Some(cursor) if !cursor.is_empty() => {
                state.set_cursor(cursor.clone());
                NextPage::with_param(&self.cursor_param, cursor)
            }
            _ => {
                state.mark_done();
                NextPage::Done
            }
        }
    }
}

// ============================================================================
// Next URL Pagination
// ============================================================================

/// Follows an absolute "next" link found in the response body
///
/// The link already contains every query parameter, so the request's own
/// query is dropped after the first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextUrlPaginator {
    /// Path to the next URL in the response
    pub path: String,
}

impl Default for NextUrlPaginator {
    fn default() -> Self {
        Self::new(DEFAULT_NEXT_LINK_PATH)
    }
}

impl NextUrlPaginator {
    /// Create a next-link paginator reading from `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Paginator for NextUrlPaginator {
    fn initial_params(&self, _state: &PaginationState) -> HashMap<String, String> {
        HashMap::new()
    }

    fn process_response(
        &self,
        body: &Value,
        _headers: &HeaderMap,
        records_count: usize,
        state: &mut PaginationState,
    ) -> NextPage {
        state.add_fetched(records_count as u64);
        state.next_page();

        match lookup_string(body, &self.path) {
            Some(url) if !url.is_empty() => {
                state.set_cursor(url.clone());
                NextPage::with_url(url)
            }
            _ => {
                state.mark_done();
                NextPage::Done
            }
        }
    }
}

// ============================================================================
// Offset Pagination
// ============================================================================

/// Offset-based pagination, as used by the legacy v1 endpoints
///
/// Sends `offset` and `limit`. Ends on a short page, or when `has_more_path`
/// is configured and the response says `false`.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetPaginator {
    /// Query parameter name for offset
    pub offset_param: String,
    /// Query parameter name for limit
    pub limit_param: String,
    /// Number of records per page
    pub limit_value: u32,
    /// Optional boolean flag in the body saying more pages exist
    pub has_more_path: Option<String>,
}

impl OffsetPaginator {
    /// Create a new offset paginator
    pub fn new(
        offset_param: impl Into<String>,
        limit_param: impl Into<String>,
        limit_value: u32,
    ) -> Self {
        Self {
            offset_param: offset_param.into(),
            limit_param: limit_param.into(),
            limit_value,
            has_more_path: None,
        }
    }

    /// Honour a `hasMore`-style flag
    #[must_use]
    pub fn with_has_more(mut self, path: impl Into<String>) -> Self {
        self.has_more_path = Some(path.into());
        self
    }

    fn params_for(&self, offset: u64) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert(self.offset_param.clone(), offset.to_string());
        params.insert(self.limit_param.clone(), self.limit_value.to_string());
        params
    }
}

impl Paginator for OffsetPaginator {
    fn initial_params(&self, state: &PaginationState) -> HashMap<String, String> {
        self.params_for(state.offset)
    }

    fn process_response(
        &self,
        body: &Value,
        _headers: &HeaderMap,
        records_count: usize,
        state: &mut PaginationState,
    ) -> NextPage {
        state.add_fetched(records_count as u64);
        state.next_page();

        let more = match &self.has_more_path {
            Some(path) => lookup_string(body, path).as_deref() == Some("true"),
            None => records_count >= self.limit_value as usize,
        };
        if !more || records_count == 0 {
            state.mark_done();
            return NextPage::Done;
        }

        state.add_offset(records_count as u64);
        state.set_cursor(state.offset.to_string());
        NextPage::with_params(self.params_for(state.offset))
    }
}

// ============================================================================
// No Pagination
// ============================================================================

/// Single request, no pagination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoPaginator;

impl Paginator for NoPaginator {
    fn initial_params(&self, _state: &PaginationState) -> HashMap<String, String> {
        HashMap::new()
    }

    fn process_response(
        &self,
        _body: &Value,
        _headers: &HeaderMap,
        records_count: usize,
        state: &mut PaginationState,
    ) -> NextPage {
        state.add_fetched(records_count as u64);
        state.next_page();
        state.mark_done();
        NextPage::Done
    }
}
