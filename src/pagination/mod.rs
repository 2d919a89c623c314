//! Pagination module
//!
//! Supports: Cursor (`paging.next.after`), Next URL (`paging.next.link`),
//! Offset, and single-request endpoints.
//!
//! # Overview
//!
//! A [`Paginator`] extracts the next page parameters from each response and
//! decides when the session is complete. [`PaginatedFetcher`] drives one of
//! them over the retrying HTTP client and yields pages as a stream.

mod fetcher;
mod strategies;
mod types;

pub use fetcher::PaginatedFetcher;
pub use strategies::{
    CursorPaginator, NextUrlPaginator, NoPaginator, OffsetPaginator, DEFAULT_CURSOR_PARAM,
    DEFAULT_CURSOR_PATH, DEFAULT_NEXT_LINK_PATH,
};
pub use types::{FetchRequest, NextPage, Page, PaginationState, Paginator, StopCondition};
