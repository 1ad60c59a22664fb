//! # Requeue Backoff
//!
//! Rate limiters deciding how long a failed key waits before it becomes
//! visible in the reconcile queue again.
//!
//! - [`ItemExponentialRateLimiter`]: per-key exponential backoff, `base * 2^failures`, capped
//! - [`BucketRateLimiter`]: overall token bucket shared by every key
//! - [`MaxOfRateLimiter`]: the slowest answer of several limiters
//!
//! The controller default combines the first two, so a single hot key backs
//! off exponentially while a burst of failing keys is also throttled as a whole.
//!
//! ## Usage
//!
//! ```rust
//! use multicluster_secret_controller::controller::backoff::{ItemExponentialRateLimiter, RateLimiter};
//! use std::time::Duration;
//!
//! let limiter = ItemExponentialRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1000));
//! assert_eq!(limiter.when("ns/a"), Duration::from_millis(5));
//! assert_eq!(limiter.when("ns/a"), Duration::from_millis(10));
//! assert_eq!(limiter.when("ns/a"), Duration::from_millis(20));
//! limiter.forget("ns/a");
//! assert_eq!(limiter.num_requeues("ns/a"), 0);
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Decides requeue delays for queue keys.
pub trait RateLimiter: Send + Sync + std::fmt::Debug {
    /// Delay before `key` may be processed again; records one more failure.
    fn when(&self, key: &str) -> Duration;

    /// Drop all failure history for `key`.
    fn forget(&self, key: &str);

    /// Failures recorded for `key` since it was last forgotten.
    fn num_requeues(&self, key: &str) -> u32;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Limiter state stays consistent across a panic in another holder.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-key exponential backoff
///
/// The n-th failure of a key (counting from zero) waits `base * 2^n`,
/// never longer than `max`.
#[derive(Debug)]
pub struct ItemExponentialRateLimiter {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl ItemExponentialRateLimiter {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn delay_for(&self, exponent: u32) -> Duration {
        // 2^31 * base overflows long before it is useful; saturate to max.
        let Some(factor) = 1u32.checked_shl(exponent) else {
            return self.max;
        };
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl RateLimiter for ItemExponentialRateLimiter {
    fn when(&self, key: &str) -> Duration {
        let mut failures = lock(&self.failures);
        let count = failures.entry(key.to_string()).or_insert(0);
        let exponent = *count;
        *count = count.saturating_add(1);
        self.delay_for(exponent)
    }

    fn forget(&self, key: &str) {
        lock(&self.failures).remove(key);
    }

    fn num_requeues(&self, key: &str) -> u32 {
        lock(&self.failures).get(key).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Overall token bucket
///
/// Refills at `qps` tokens per second up to `burst`. Each call to `when`
/// reserves one token; if none is left, the delay is the time until the
/// reservation is covered. Tracks no per-key state.
#[derive(Debug)]
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {
    #[must_use]
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }
}

impl RateLimiter for BucketRateLimiter {
    fn when(&self, _key: &str) -> Duration {
        let mut bucket = lock(&self.bucket);
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last).as_secs_f64();
        bucket.last = now;
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 || self.qps <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(-bucket.tokens / self.qps).unwrap_or(Duration::MAX)
    }

    fn forget(&self, _key: &str) {}

    fn num_requeues(&self, _key: &str) -> u32 {
        0
    }
}

/// Combines limiters by taking the longest delay and the highest requeue count.
#[derive(Debug)]
pub struct MaxOfRateLimiter {
    limiters: Vec<Box<dyn RateLimiter>>,
}

impl MaxOfRateLimiter {
    #[must_use]
    pub fn new(limiters: Vec<Box<dyn RateLimiter>>) -> Self {
        Self { limiters }
    }
}

impl RateLimiter for MaxOfRateLimiter {
    fn when(&self, key: &str) -> Duration {
        // Every limiter must observe the failure, so no short-circuiting.
        self.limiters
            .iter()
            .map(|limiter| limiter.when(key))
            .fold(Duration::ZERO, Duration::max)
    }

    fn forget(&self, key: &str) {
        for limiter in &self.limiters {
            limiter.forget(key);
        }
    }

    fn num_requeues(&self, key: &str) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(key))
            .max()
            .unwrap_or(0)
    }
}
