//! Client-side request throttling
//!
//! Uses the governor crate for token bucket rate limiting. The CRM API
//! enforces limits per rolling window (e.g. 100 requests per 10 seconds for
//! private apps), so quotas are expressed as `max_requests` per `interval`.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for rate limiting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Requests allowed per interval
    pub max_requests: u32,
    /// Length of the window
    pub interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::private_app()
    }
}

impl RateLimiterConfig {
    /// Create a new rate limiter config
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_requests,
            interval,
        }
    }

    /// Quota expressed in requests per second
    pub fn per_second(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(1))
    }

    /// Private app burst limit: 100 requests per 10 seconds
    pub fn private_app() -> Self {
        Self::new(100, Duration::from_secs(10))
    }

    /// CRM search endpoints: 5 requests per second
    pub fn search() -> Self {
        Self::per_second(5)
    }

    fn quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.max_requests).unwrap_or(NonZeroU32::MIN);
        // Replenish one token every interval / max_requests
        let period = self.interval / burst.get();
        let period = if period.is_zero() {
            Duration::from_nanos(1)
        } else {
            period
        };
        Quota::with_period(period).map_or_else(
            || Quota::per_second(burst),
            |quota| quota.allow_burst(burst),
        )
    }
}

/// Token bucket rate limiter, cheap to clone and share between workers
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: &RateLimiterConfig) -> Self {
        Self {
            limiter: Arc::new(Governor::direct(config.quota())),
        }
    }

    /// Wait until a request can be made
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Try to acquire a permit, returning immediately
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimiterConfig::default())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish()
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use super::*;

    #[test]
    fn test_rate_limiter_config_default() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.max_requests, 100);
        assert_eq!(config.interval, Duration::from_secs(10));
    }

    #[test]
    fn test_rate_limiter_config_presets() {
        let search = RateLimiterConfig::search();
        assert_eq!(search.max_requests, 5);
        assert_eq!(search.interval, Duration::from_secs(1));

        assert_eq!(
            RateLimiterConfig::per_second(20),
            RateLimiterConfig::new(20, Duration::from_secs(1))
        );
    }

    #[test]
    fn test_rate_limiter_allows_burst_then_blocks() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(3, Duration::from_secs(60)));

        for _ in 0..3 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_zero_requests_is_clamped() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(0, Duration::from_secs(60)));
        assert!(limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_rate_limiter_wait_within_burst() {
        let limiter = RateLimiter::new(&RateLimiterConfig::per_second(100));
        limiter.wait().await;
    }

    #[tokio::test]
    async fn test_shared_limiter_across_clones() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(2, Duration::from_secs(60)));
        let other = limiter.clone();

        assert!(limiter.try_acquire());
        assert!(other.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
