use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::info;

pub mod layer;

pub use layer::{rate_limit_layer, RateLimitLayer};

/// `{limit, window_seconds}` per spec §4.2. The two limiters used in the
/// core are inbound HTTP-style per app (100 / 60s) and outbound P2P send
/// per entity (20 / 1s); callers construct one [`RateLimiter`] per purpose.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub limit: u64,
    pub window: Duration,
}

impl RateLimitConfig {
    pub const fn new(limit: u64, window_seconds: u64) -> Self {
        RateLimitConfig {
            limit,
            window: Duration::from_secs(window_seconds),
        }
    }
}

#[derive(Debug)]
struct Counter {
    count: u64,
    reset: Instant,
}

/// Fixed-window limiter. `allow(key)` resets the window when `now > reset`;
/// otherwise it increments and compares against `limit`.
pub struct RateLimiter {
    config: RateLimitConfig,
    counters: Mutex<HashMap<String, Counter>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        RateLimiter {
            config,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` iff the call is allowed under the current window.
    /// Advisory retry-after (seconds) is available via [`RateLimiter::retry_after`]
    /// on a `false` result.
    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        let entry = counters.entry(key.to_string()).or_insert_with(|| Counter {
            count: 0,
            reset: now + self.config.window,
        });

        if now >= entry.reset {
            entry.count = 0;
            entry.reset = now + self.config.window;
        }

        entry.count += 1;
        entry.count <= self.config.limit
    }

    pub async fn retry_after(&self, key: &str) -> Option<Duration> {
        let counters = self.counters.lock().await;
        counters
            .get(key)
            .map(|entry| entry.reset.saturating_duration_since(Instant::now()))
    }

    /// Deletes the entry, used after a successful login or similar event
    /// that should forgive prior failed attempts.
    pub async fn reset(&self, key: &str) {
        self.counters.lock().await.remove(key);
    }

    /// Drops entries whose window has already elapsed. Intended to run
    /// roughly once per minute from a background task.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        let before = counters.len();
        counters.retain(|_, entry| entry.reset > now);
        if counters.len() != before {
            info!(evicted = before - counters.len(), "rate limiter cleanup");
        }
    }

    pub fn spawn_cleanup_task(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                self.cleanup().await;
            }
        })
    }
}

/// The core's two standing limiters, per spec §4.2.
pub const URL_FETCH_LIMIT: RateLimitConfig = RateLimitConfig::new(100, 60);
pub const P2P_SEND_LIMIT: RateLimitConfig = RateLimitConfig::new(20, 1);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, 60));
        assert!(limiter.allow("k").await);
        assert!(limiter.allow("k").await);
        assert!(!limiter.allow("k").await);
    }

    #[tokio::test]
    async fn reset_clears_the_counter() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 60));
        assert!(limiter.allow("k").await);
        assert!(!limiter.allow("k").await);
        limiter.reset("k").await;
        assert!(limiter.allow("k").await);
    }

    #[tokio::test]
    async fn distinct_keys_have_independent_windows() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 60));
        assert!(limiter.allow("a").await);
        assert!(limiter.allow("b").await);
    }

    #[tokio::test]
    async fn cleanup_drops_only_expired_entries() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 60));
        limiter.allow("k").await;
        limiter.cleanup().await;
        // window has not elapsed yet, entry survives
        assert!(!limiter.allow("k").await);
    }
}
