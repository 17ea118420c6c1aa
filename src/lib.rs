//! Rate-limited, concurrency-bounded task dispatch on tokio.
//!
//! This crate runs a function over a collection of inputs in parallel while
//! enforcing two independent admission policies:
//!
//! - a global **rate limit**: every execution waits for a token from one shared
//!   token bucket (`limit` per second, at most `burst` at once), and
//! - a per-task **concurrency ceiling**: no more than N executions of the same
//!   task in flight at once.
//!
//! Work is described by a [`Task`]: a function, its parameters, an optional
//! ceiling, an optional [`CancellationToken`](tokio_util::sync::CancellationToken)
//! and an optional failure callback. Tasks are handed to a [`Pool`], which
//! starts one dispatch routine per task and returns a [`BatchHandle`] that
//! completes once every parameter has been accounted for.
//!
//! Bounded tasks take their slots from a [`SlotSet`] borrowed from the pool's
//! [`SlotPool`], so successive tasks sharing a ceiling reuse the same
//! semaphore instead of allocating a new one.
//!
//! A panic inside the task function stays inside its own execution: it is
//! recovered and handed, with the parameter, to the task's failure callback.
//! Cancellation only stops *new* parameters from being dispatched; whatever
//! was already started runs to completion.
//!
//! The library logs through [`tracing`] and installs no subscriber.
pub mod common;
pub mod config;
pub mod error;
mod inflight;
pub mod join;
pub mod limiter;
pub mod pool;
pub mod slot;
pub mod task;

pub use common::Capacity;
pub use config::Config;
pub use error::{Error, Result};
pub use join::BatchHandle;
pub use limiter::RateLimiter;
pub use pool::Pool;
pub use slot::{Slot, SlotPool, SlotSet};
pub use task::{Failure, Task};
