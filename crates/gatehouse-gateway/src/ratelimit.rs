//! Token-bucket rate limiting for auto-allowed executions.
//!
//! One bucket per gateway (not per session): the cap bounds what the
//! agent can make trusted services do per minute, regardless of how it
//! spreads requests across connections.

use std::sync::Mutex;
use std::time::Instant;

/// A token bucket: capacity `max_per_minute`, refilling continuously at
/// `max_per_minute` tokens per rolling minute.
#[derive(Debug)]
pub struct RateLimiter {
    inner: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// A bucket allowing `max_per_minute` acquisitions per rolling minute.
    #[must_use]
    pub fn new(max_per_minute: u32) -> Self {
        let capacity = f64::from(max_per_minute);
        Self {
            inner: Mutex::new(Bucket {
                capacity,
                tokens: capacity,
                refill_per_sec: capacity / 60.0,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available. Never blocks.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Clock-injectable variant for tests.
    fn try_acquire_at(&self, now: Instant) -> bool {
        let Ok(mut bucket) = self.inner.lock() else {
            // A poisoned bucket fails closed.
            return false;
        };
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * bucket.refill_per_sec).min(bucket.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
