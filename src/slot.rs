//! Reusable concurrency slots.
//!
//! A [`SlotSet`] is a bounded counting semaphore: it holds `capacity` tokens,
//! each [`Slot`] taken from it is one running execution, and the token goes
//! back when the slot is dropped. The [`SlotPool`] keeps idle sets keyed by
//! capacity so that successive tasks sharing a concurrency ceiling reuse them
//! instead of allocating a fresh semaphore each time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A set of `capacity` concurrency tokens.
#[derive(Debug)]
pub struct SlotSet {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

/// One token taken from a [`SlotSet`]; returned on drop.
#[derive(Debug)]
#[must_use = "the slot is released as soon as it is dropped"]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl SlotSet {
    /// Creates a set pre-filled with `capacity` tokens.
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens not currently held by a [`Slot`].
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Whether every token is back in the set.
    pub fn is_full(&self) -> bool {
        self.available() == self.capacity
    }

    /// Waits for a free token. Returns `None` once the set has been closed.
    pub async fn acquire(&self) -> Option<Slot> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;
        Some(Slot { _permit: permit })
    }

    /// Takes a free token without waiting.
    pub fn try_acquire(&self) -> Option<Slot> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        Some(Slot { _permit: permit })
    }

    /// Closes the set, waking pending `acquire` calls with `None`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

/// Registry of idle [`SlotSet`]s keyed by capacity.
#[derive(Debug, Default)]
pub struct SlotPool {
    idle: Mutex<HashMap<usize, Vec<SlotSet>>>,
    allocated: AtomicUsize,
}

impl SlotPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn idle_sets(&self) -> MutexGuard<'_, HashMap<usize, Vec<SlotSet>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands out a full set of `limit` tokens, reusing an idle one if present.
    ///
    /// Panics if `limit` is 0.
    pub fn acquire(&self, limit: usize) -> SlotSet {
        if let Some(set) = self.idle_sets().get_mut(&limit).and_then(Vec::pop) {
            return set;
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(limit, "Allocating slot set");
        SlotSet::new(limit)
    }

    /// Returns a set to the registry.
    ///
    /// A set that still has tokens out (or was closed) cannot be handed to
    /// the next task as full, so it is closed and dropped instead.
    pub fn release(&self, set: SlotSet) {
        if !set.is_full() || set.is_closed() {
            tracing::warn!(
                limit = set.capacity(),
                available = set.available(),
                "Slot set returned while in use - discarding"
            );
            set.close();
            return;
        }
        self.idle_sets().entry(set.capacity()).or_default().push(set);
    }

    /// Idle sets currently held for `limit`.
    pub fn idle(&self, limit: usize) -> usize {
        self.idle_sets().get(&limit).map_or(0, Vec::len)
    }

    /// Total sets ever created by this pool.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}
