//! Module containing traits shared by the limiter and the pool.

use crate::error::Result;

/// Provides live capacity reconfiguration for admission gates.
///
/// Capacity is the burst of the underlying rate limiter. Setting it sets the
/// sustained rate to the same value, so `n` means "`n` admissions per second,
/// at most `n` at once".
pub trait Capacity {
    /// Current capacity.
    fn capacity(&self) -> usize;

    /// Change the capacity at runtime.
    ///
    /// **IMPORTANT**: concurrency already granted to running tasks is not
    /// shrunk retroactively; only admissions issued afterwards observe it.
    fn set_capacity(&self, capacity: usize) -> Result<()>;
}
