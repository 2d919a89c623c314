// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # hubspot-batch
//!
//! Batch jobs against the HubSpot CRM API, built on a paginated fetcher that
//! follows `paging.next.after` cursors and absorbs rate limits and transient
//! server errors.
//!
//! ## Features
//!
//! - **Resilient Pagination**: Cursor, next-link and offset strategies yielding a `Stream` of pages
//! - **Retry with Backoff**: 429 and 5xx retried with exponential backoff, `Retry-After` honored
//! - **Typed Errors**: Rate limits, server errors, client errors, exhausted retries, malformed bodies
//! - **Bounded Fan-out**: A worker pool with a fixed number of concurrent tasks
//! - **Explicit Configuration**: YAML file plus token from flag or environment, passed into every job
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use futures::TryStreamExt;
//! use hubspot_batch::config::AppConfig;
//! use hubspot_batch::pagination::{FetchRequest, PaginatedFetcher};
//!
//! #[tokio::main]
//! async fn main() -> hubspot_batch::Result<()> {
//!     let config = AppConfig::default().with_token(std::env::var("HUBSPOT_ACCESS_TOKEN").ok());
//!     let fetcher = PaginatedFetcher::new(config.client()?);
//!
//!     let request = FetchRequest::get("/crm/v3/objects/contacts").param("limit", 100);
//!     let mut pages = Box::pin(fetcher.fetch_all(request));
//!     while let Some(page) = pages.try_next().await? {
//!         println!("page {}: {} records", page.index, page.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                              Jobs                               │
//! │  touchpoints  backfill-datetimes  engagements  fetch  (local)   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │   Auth   │   HTTP    │   Paginate    │   Pool    │   Decode    │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ Bearer   │ GET/POST  │ Cursor        │ Semaphore │ JSON path   │
//! │ API Key  │ Retry     │ Next link     │ JoinSet   │ CSV rows    │
//! │          │ Rate Limit│ Offset        │ Policy    │             │
//! │          │ Backoff   │ Stop rules    │           │             │
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Authentication
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Pagination strategies and the paginated fetcher
pub mod pagination;

/// Response decoders and CSV helpers
pub mod decode;

/// Bounded worker pool
pub mod pool;

/// Application configuration
pub mod config;

/// Batch jobs
pub mod jobs;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use config::AppConfig;
pub use pagination::{FetchRequest, Page, PaginatedFetcher};
pub use pool::WorkerPool;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
