//! Per-IP token bucket rate limiting.
//!
//! Each source IP gets its own bucket that refills at a steady `rate`
//! (tokens per second) and can accumulate up to `burst` tokens. Every
//! allowed request consumes exactly one token, so over any interval of
//! length T a single IP is admitted at most `burst + rate * T` times.
//!
//! Buckets live in a [`DashMap`](dashmap::DashMap) for lock-free concurrent
//! access; entries idle for more than 10 minutes are evicted by
//! [`sweep`](IpRateLimiter::sweep), which the background reaper calls every
//! 5 minutes.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// Buckets untouched for this long are dropped by the sweeper.
const IDLE_EVICTION: Duration = Duration::from_secs(10 * 60);

struct IpBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// Concurrent per-IP token bucket limiter.
pub struct IpRateLimiter {
    buckets: DashMap<String, IpBucket>,
    rate: f64,
    burst: f64,
}

impl IpRateLimiter {
    /// * `rate`  - sustained tokens per second (refill rate)
    /// * `burst` - bucket capacity
    pub fn new(rate: f64, burst: u64) -> Self {
        debug!(rate, burst, "creating per-ip token bucket limiter");
        Self {
            buckets: DashMap::new(),
            rate,
            burst: burst as f64,
        }
    }

    /// Refill the bucket for `ip` according to elapsed time and try to
    /// consume one token. Returns `true` iff a token was available.
    ///
    /// A bucket is created full on the first request from an IP.
    pub fn allow(&self, ip: &str) -> bool {
        let now = Instant::now();

        let mut entry = self.buckets.entry(ip.to_string()).or_insert_with(|| IpBucket {
            tokens: self.burst,
            last_refill: now,
            last_seen: now,
        });

        let bucket = entry.value_mut();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets that have not been used for more than 10 minutes.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_seen) < IDLE_EVICTION);
        debug!(remaining = self.buckets.len(), "limiter sweep complete");
    }

    /// Number of tracked IPs (for the reaper's log line).
    pub fn tracked_ips(&self) -> usize {
        self.buckets.len()
    }
}
