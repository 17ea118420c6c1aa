//! Token-bucket admission gate.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::common::Capacity;
use crate::config::{validate_burst, validate_limit, Config};
use crate::error::Result;

/// Bucket state. `limit <= burst` and `tokens <= burst` hold whenever the
/// lock is released.
#[derive(Debug)]
struct Bucket {
    limit: f64,
    burst: usize,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.limit).min(self.burst as f64);
        self.last_refill = now;
    }

    /// Time until `want` tokens are available, `None` if they never will be at
    /// the current rate or the wait is too long to represent.
    fn delay_for(&self, want: f64) -> Option<Duration> {
        if self.limit <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64((want - self.tokens) / self.limit).ok()
    }
}

/// Token-bucket rate limiter with a mutable rate and burst.
///
/// The bucket holds up to `burst` tokens and is replenished at `limit` tokens
/// per second; it starts full. Waiting is the backpressure mechanism: a wait
/// never fails, it blocks until admitted (or until the caller drops it).
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    poll_interval: Duration,
}

impl RateLimiter {
    /// Creates a limiter admitting `limit` per second with at most `burst` at
    /// once. A `limit` greater than `burst` is clamped to `burst`.
    ///
    /// ```rust
    /// use ratepool::limiter::RateLimiter;
    ///
    /// let limiter = RateLimiter::new(100.0, 10).unwrap();
    /// assert_eq!(limiter.limits(), (10.0, 10));
    /// ```
    pub fn new(limit: f64, burst: usize) -> Result<Self> {
        Self::from_config(&Config::new(limit, burst))
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let burst = config.burst;
        Ok(Self {
            bucket: Mutex::new(Bucket {
                limit: config.limit.min(burst as f64),
                burst,
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
            poll_interval: config.poll_interval,
        })
    }

    fn bucket(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn limit(&self) -> f64 {
        self.bucket().limit
    }

    pub fn burst(&self) -> usize {
        self.bucket().burst
    }

    /// The `(limit, burst)` pair, read together.
    pub fn limits(&self) -> (f64, usize) {
        let bucket = self.bucket();
        (bucket.limit, bucket.burst)
    }

    /// Tokens that could be taken right now.
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket();
        bucket.refill(Instant::now());
        bucket.tokens
    }

    /// Sets the sustained rate. A value above the current burst is clamped to
    /// the burst.
    pub fn set_limit(&self, limit: f64) -> Result<()> {
        validate_limit(limit)?;
        let mut bucket = self.bucket();
        // Credit what accrued under the old rate first.
        bucket.refill(Instant::now());
        bucket.limit = limit.min(bucket.burst as f64);
        Ok(())
    }

    /// Sets the burst. A burst below the current limit lowers the limit to it.
    pub fn set_burst(&self, burst: usize) -> Result<()> {
        validate_burst(burst)?;
        let mut bucket = self.bucket();
        bucket.refill(Instant::now());
        bucket.burst = burst;
        bucket.limit = bucket.limit.min(burst as f64);
        bucket.tokens = bucket.tokens.min(burst as f64);
        Ok(())
    }

    /// Takes one token if available.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_n(1)
    }

    /// Takes `min(n, burst)` tokens if all of them are available.
    pub fn try_acquire_n(&self, n: usize) -> bool {
        let mut bucket = self.bucket();
        bucket.refill(Instant::now());
        let want = n.min(bucket.burst) as f64;
        if bucket.tokens >= want {
            bucket.tokens -= want;
            true
        } else {
            false
        }
    }

    /// Waits for one token and consumes it.
    pub async fn wait(&self) {
        self.wait_n(1).await
    }

    /// Waits for `min(n, burst)` tokens and consumes them at once.
    ///
    /// Asking for more than the burst would never be satisfiable, so the
    /// request is capped. A blocked wait re-reads the configuration at least
    /// every poll interval, so a raised limit or burst is picked up.
    pub async fn wait_n(&self, n: usize) {
        if n == 0 {
            return;
        }
        loop {
            let delay = {
                let mut bucket = self.bucket();
                bucket.refill(Instant::now());
                let want = n.min(bucket.burst) as f64;
                if bucket.tokens >= want {
                    bucket.tokens -= want;
                    return;
                }
                bucket.delay_for(want)
            };
            let delay = delay.map_or(self.poll_interval, |d| d.min(self.poll_interval));
            tokio::time::sleep(delay.max(Duration::from_millis(1))).await;
        }
    }
}

impl Capacity for RateLimiter {
    fn capacity(&self) -> usize {
        self.burst()
    }

    fn set_capacity(&self, capacity: usize) -> Result<()> {
        validate_burst(capacity)?;
        let mut bucket = self.bucket();
        bucket.refill(Instant::now());
        bucket.burst = capacity;
        bucket.limit = capacity as f64;
        bucket.tokens = bucket.tokens.min(capacity as f64);
        Ok(())
    }
}
