//! Limiter configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default upper bound on a single sleep of a blocked admission wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Rate limiter configuration.
///
/// A `limit` above `burst` is accepted here and clamped by the limiter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Sustained admissions per second.
    pub limit: f64,
    /// Maximum admissions available at once.
    pub burst: usize,
    /// How long a blocked wait sleeps at most before re-reading the
    /// `(limit, burst)` pair.
    pub poll_interval: Duration,
}

impl Config {
    pub fn new(limit: f64, burst: usize) -> Self {
        Self {
            limit,
            burst,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Same rate and burst: `capacity` admissions per second, at most
    /// `capacity` at once.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(capacity as f64, capacity)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Validate that the configuration is well-formed.
    pub fn validate(&self) -> Result<()> {
        validate_limit(self.limit)?;
        validate_burst(self.burst)
    }
}

pub(crate) fn validate_limit(limit: f64) -> Result<()> {
    if limit.is_finite() && limit >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidLimit(limit))
    }
}

pub(crate) fn validate_burst(burst: usize) -> Result<()> {
    if burst == 0 {
        Err(Error::InvalidBurst(burst))
    } else {
        Ok(())
    }
}
