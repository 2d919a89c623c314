//! Retry policy and the bounded retry loop
//!
//! Every HTTP call in the crate goes through [`RetryExecutor::run`]:
//! rate limits (429) and server errors (5xx) are retried with backoff,
//! everything else fails immediately.

use crate::error::{Error, Result};
use crate::types::BackoffType;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, warn};

// ============================================================================
// Retry Policy
// ============================================================================

/// Retry configuration. Holds no mutable state.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first request
    pub max_attempts: u32,
    /// Delay used when the server gives no hint
    pub base_delay: Duration,
    /// Growth factor applied per retry for exponential backoff
    pub multiplier: f64,
    /// How the delay grows between retries
    pub backoff_type: BackoffType,
    /// Upper bound for computed delays (a larger server hint still wins)
    pub max_delay: Duration,
    /// Random extra delay in `[0, jitter]`
    pub jitter: Option<Duration>,
    /// Use the `Retry-After` header as the base delay when present
    pub respect_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            backoff_type: BackoffType::Exponential,
            max_delay: Duration::from_secs(60),
            jitter: Some(Duration::from_secs(1)),
            respect_retry_after: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt cap and default backoff
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A policy that performs exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            jitter: None,
            ..Default::default()
        }
    }

    /// Set the base delay
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff multiplier
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the backoff type
    #[must_use]
    pub fn with_backoff_type(mut self, backoff_type: BackoffType) -> Self {
        self.backoff_type = backoff_type;
        self
    }

    /// Set the delay cap
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the jitter range (`None` disables jitter)
    #[must_use]
    pub fn with_jitter(mut self, jitter: Option<Duration>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Enable or disable honoring `Retry-After`
    #[must_use]
    pub fn with_respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    /// Attempt cap, never below one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (0 for the first retry), without jitter.
    ///
    /// `hint` is the server-supplied `Retry-After` value, if any.
    pub fn base_delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let hint = hint.filter(|_| self.respect_retry_after);
        let base = hint.unwrap_or(self.base_delay);

        let scaled = match self.backoff_type {
            BackoffType::Constant => base,
            BackoffType::Linear => base.saturating_mul(retry.saturating_add(1)),
            BackoffType::Exponential => {
                let factor = self.multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
                Duration::try_from_secs_f64(base.as_secs_f64() * factor)
                    .unwrap_or(Duration::MAX)
            }
        };

        let cap = hint.map_or(self.max_delay, |h| self.max_delay.max(h));
        scaled.min(cap)
    }

    /// Delay before retry number `retry`, including jitter
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let delay = self.base_delay_for(retry, hint);
        match self.jitter {
            Some(range) if !range.is_zero() => {
                let extra = rand::thread_rng().gen_range(0.0..=range.as_secs_f64());
                delay.saturating_add(Duration::try_from_secs_f64(extra).unwrap_or_default())
            }
            _ => delay,
        }
    }
}

// ============================================================================
// Attempt Outcome
// ============================================================================

/// Why an attempt may be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryableKind {
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError,
    /// Timeout or connection failure before a response arrived
    Transport,
}

impl RetryableKind {
    /// Error describing one retryable failure
    pub fn to_error(self, status: Option<u16>, retry_after: Option<Duration>, body: &str) -> Error {
        match self {
            RetryableKind::RateLimited => Error::RateLimited {
                retry_after_seconds: retry_after.map_or(0, |d| d.as_secs()),
            },
            RetryableKind::ServerError => Error::TransientServerError {
                status: status.unwrap_or_default(),
            },
            RetryableKind::Transport => Error::Other(format!("transport error: {body}")),
        }
    }
}

/// Result of a single attempt. Drives the retry loop, never persisted.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    /// The attempt produced a value
    Success(T),
    /// The attempt failed in a way worth retrying
    Retryable {
        /// Failure classification
        kind: RetryableKind,
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Server-supplied delay hint
        retry_after: Option<Duration>,
        /// Response body or transport error text
        body: String,
    },
    /// The attempt failed permanently
    Fatal(Error),
}

impl<T> AttemptOutcome<T> {
    /// Check if this outcome is a success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Check if this outcome is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    /// Continue a successful attempt, e.g. to decode its body
    pub fn and_then<U>(self, f: impl FnOnce(T) -> AttemptOutcome<U>) -> AttemptOutcome<U> {
        match self {
            Self::Success(value) => f(value),
            Self::Retryable {
                kind,
                status,
                retry_after,
                body,
            } => AttemptOutcome::Retryable {
                kind,
                status,
                retry_after,
                body,
            },
            Self::Fatal(e) => AttemptOutcome::Fatal(e),
        }
    }
}

/// Classify a non-success HTTP status.
///
/// 429 and 5xx are retryable; every other status becomes a `ClientError`.
pub fn classify_status<T>(
    status: u16,
    retry_after: Option<Duration>,
    body: String,
) -> AttemptOutcome<T> {
    match status {
        429 => AttemptOutcome::Retryable {
            kind: RetryableKind::RateLimited,
            status: Some(status),
            retry_after,
            body,
        },
        500..=599 => AttemptOutcome::Retryable {
            kind: RetryableKind::ServerError,
            status: Some(status),
            retry_after,
            body,
        },
        _ => AttemptOutcome::Fatal(Error::client_error(status, body)),
    }
}

/// Parse a `Retry-After` header value given in whole seconds.
///
/// HTTP-date values are not used by the CRM API and are ignored, as are
/// values too large to fit a `Duration`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    value
        .parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
}

// ============================================================================
// Sleeper
// ============================================================================

/// Suspension point of the retry loop
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for the given duration
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that records requested delays and returns immediately
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All delays requested so far, in order
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Sum of all requested delays
    pub fn total(&self) -> Duration {
        self.delays().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

// ============================================================================
// Retry Executor
// ============================================================================

/// Runs an attempt function until success, a fatal failure, or the attempt cap
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryExecutor {
    /// Create an executor that sleeps on the tokio timer
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Arc::new(TokioSleeper))
    }

    /// Create an executor with a custom sleeper
    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    /// Get the retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt_fn` with the 1-based attempt number until it settles.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AttemptOutcome<T>>,
    {
        let max_attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match attempt_fn(attempt).await {
                AttemptOutcome::Success(value) => {
                    if attempt > 1 {
                        debug!("{label} succeeded on attempt {attempt}/{max_attempts}");
                    }
                    return Ok(value);
                }
                AttemptOutcome::Fatal(err) => {
                    warn!("{label} failed: {err}");
                    return Err(err);
                }
                AttemptOutcome::Retryable {
                    kind,
                    status,
                    retry_after,
                    body,
                } => {
                    if attempt >= max_attempts {
                        error!(
                            "{label} gave up after {attempt} attempts (last status: {status:?})"
                        );
                        return Err(Error::RetriesExhausted {
                            attempts: attempt,
                            last_status: status,
                            last_body: body,
                        });
                    }

                    let delay = self.policy.delay_for(attempt - 1, retry_after);
                    let cause = kind.to_error(status, retry_after, &body);
                    warn!(
                        "{label}: {cause}, attempt {attempt}/{max_attempts}, retrying in {:.2}s",
                        delay.as_secs_f64()
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
