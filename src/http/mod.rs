//! HTTP client module
//!
//! Provides an HTTP client with retry, rate limiting, and backoff.
//!
//! # Features
//!
//! - **Automatic Retries**: 429 and 5xx responses retried under a [`RetryPolicy`]
//! - **Server Hints**: `Retry-After` used as the backoff base when present
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Authentication**: Integration with auth module

mod client;
mod rate_limit;
pub mod retry;

pub use client::{
    HttpClient, HttpClientConfig, HttpClientConfigBuilder, JsonResponse, MultipartUpload,
    RawResponse, RequestConfig, DEFAULT_BASE_URL,
};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use retry::{
    AttemptOutcome, RecordingSleeper, RetryExecutor, RetryPolicy, RetryableKind, Sleeper,
    TokioSleeper,
};

#[cfg(test)]
mod tests;
