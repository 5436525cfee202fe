//! Per-client token-bucket rate limiting.
//!
//! Each client key (the authenticated user's email) gets its own
//! `governor` bucket, created on first use. Requests beyond the bucket are
//! dropped, not queued. A janitor evicts buckets that have been idle
//! longer than the configured expiry so the registry does not grow without
//! bound.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, Quota};
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitConfig;

/// How often the janitor sweeps idle buckets.
pub const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

struct ClientBucket {
    limiter: DefaultDirectRateLimiter,
    last_access: Instant,
}

/// Registry of per-client token buckets.
pub struct RateLimiter {
    quota: Quota,
    expiry: Duration,
    clients: Mutex<HashMap<String, ClientBucket>>,
}

impl RateLimiter {
    /// Build a registry whose buckets hold `burst` tokens and refill one
    /// token every `interval`.
    pub fn new(config: RateLimitConfig) -> Self {
        let burst = NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN);
        // A zero interval means no limit worth enforcing.
        let quota = Quota::with_period(config.interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
            .allow_burst(burst);

        Self {
            quota,
            expiry: config.expiry,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Take one token from `client`'s bucket. Returns `false` when the
    /// bucket is empty and the request should be dropped.
    pub fn check(&self, client: &str) -> bool {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        let bucket = clients
            .entry(client.to_string())
            .or_insert_with(|| ClientBucket {
                limiter: DefaultDirectRateLimiter::direct(self.quota),
                last_access: now,
            });
        bucket.last_access = now;

        let allowed = bucket.limiter.check().is_ok();
        if !allowed {
            tracing::debug!(client, "Rate limit exceeded");
        }
        allowed
    }

    /// Drop buckets idle for longer than the expiry. Returns how many were
    /// removed.
    pub fn purge_idle(&self) -> usize {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let before = clients.len();
        clients.retain(|_, bucket| bucket.last_access.elapsed() <= self.expiry);
        before - clients.len()
    }

    /// Number of clients currently tracked.
    pub fn client_count(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Sweep idle buckets every [`JANITOR_INTERVAL`] until `cancel` fires.
    pub async fn run_janitor(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(JANITOR_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Rate limiter janitor stopping");
                    break;
                }
                _ = interval.tick() => {
                    let evicted = self.purge_idle();
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining = self.client_count(), "Evicted idle rate-limit buckets");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(burst: u32, interval: Duration, expiry: Duration) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            burst,
            interval,
            expiry,
        })
    }

    #[test]
    fn second_request_inside_interval_is_dropped() {
        let limiter = limiter(1, Duration::from_secs(60), Duration::from_secs(300));
        let results = [limiter.check("a@example.com"), limiter.check("a@example.com")];
        assert_eq!(results, [true, false]);
    }

    #[test]
    fn requests_an_interval_apart_are_allowed() {
        let limiter = limiter(1, Duration::from_millis(50), Duration::from_secs(300));
        let first = limiter.check("a@example.com");
        std::thread::sleep(Duration::from_millis(80));
        let second = limiter.check("a@example.com");
        assert_eq!([first, second], [true, true]);
    }

    #[test]
    fn burst_allows_back_to_back_requests() {
        let limiter = limiter(3, Duration::from_secs(60), Duration::from_secs(300));
        let results: Vec<_> = (0..4).map(|_| limiter.check("a@example.com")).collect();
        assert_eq!(results, [true, true, true, false]);
    }

    #[test]
    fn clients_have_independent_buckets() {
        let limiter = limiter(1, Duration::from_secs(60), Duration::from_secs(300));
        assert!(limiter.check("a@example.com"));
        assert!(limiter.check("b@example.com"));
        assert!(!limiter.check("a@example.com"));
        assert_eq!(limiter.client_count(), 2);
    }

    #[test]
    fn zero_burst_is_treated_as_one() {
        let limiter = limiter(0, Duration::from_secs(60), Duration::from_secs(300));
        assert!(limiter.check("a@example.com"));
        assert!(!limiter.check("a@example.com"));
    }

    #[test]
    fn purge_evicts_only_idle_buckets() {
        let limiter = limiter(1, Duration::from_secs(60), Duration::from_millis(30));
        limiter.check("idle@example.com");
        std::thread::sleep(Duration::from_millis(60));
        limiter.check("active@example.com");

        assert_eq!(limiter.purge_idle(), 1);
        assert_eq!(limiter.client_count(), 1);

        // A purged client starts over with a full bucket.
        assert!(limiter.check("idle@example.com"));
    }
}
