//! Error type shared by every fallible operation in the crate.

use thiserror::Error;

/// Errors reported synchronously by configuration and submission calls.
///
/// Failures raised *inside* a task function are not represented here: they
/// are recovered per execution and delivered to the task's failure callback
/// as a [`Failure`](crate::task::Failure).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("pool has been stopped")]
    Stopped,

    #[error("invalid rate limit {0}: must be finite and non-negative")]
    InvalidLimit(f64),

    #[error("invalid burst {0}: must be at least 1")]
    InvalidBurst(usize),

    #[error("no tokio runtime available to drive the pool")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, Error>;
