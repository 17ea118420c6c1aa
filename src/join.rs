//! Completion tracking for one submission.

use std::future::IntoFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Notify;

#[derive(Debug)]
struct Counter {
    remaining: AtomicUsize,
    notify: Notify,
}

/// Join handle returned by [`Pool::submit`](crate::pool::Pool::submit).
///
/// Counts down once per parameter across every task of the submission,
/// whether the parameter ran, failed, or was skipped by cancellation. Clones
/// share the same counter.
///
/// ```rust
/// use ratepool::{Pool, Task};
///
/// tokio_test::block_on(async {
///     let pool = Pool::with_capacity(10).unwrap();
///     let handle = pool
///         .submit([Task::new(|n: u32| async move { assert!(n < 3) }, 0..3)])
///         .unwrap();
///     handle.clone().await;
///     assert!(handle.is_finished());
/// });
/// ```
#[derive(Debug, Clone)]
pub struct BatchHandle {
    counter: Arc<Counter>,
}

impl BatchHandle {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            counter: Arc::new(Counter {
                remaining: AtomicUsize::new(total),
                notify: Notify::new(),
            }),
        }
    }

    /// Parameters not yet accounted for.
    pub fn remaining(&self) -> usize {
        self.counter.remaining.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.remaining() == 0
    }

    /// Waits until every parameter of the submission is accounted for.
    pub async fn wait(&self) {
        loop {
            let notified = self.counter.notify.notified();
            tokio::pin!(notified);
            // Register before checking, so a wakeup between the check and the
            // await is not lost.
            notified.as_mut().enable();
            if self.is_finished() {
                return;
            }
            notified.await;
        }
    }

    /// Marks `n` parameters as accounted for.
    pub(crate) fn complete(&self, n: usize) {
        if n == 0 {
            return;
        }
        let previous = self.counter.remaining.fetch_sub(n, Ordering::AcqRel);
        debug_assert!(previous >= n, "batch completed more parameters than submitted");
        if previous == n {
            self.counter.notify.notify_waiters();
        }
    }

    /// Guard that completes one parameter when dropped.
    pub(crate) fn guard(&self) -> CompletionGuard {
        self.pending(1)
    }

    /// Guard that completes `count` parameters when dropped, minus those
    /// handed off with [`CompletionGuard::take_one`].
    pub(crate) fn pending(&self, count: usize) -> CompletionGuard {
        CompletionGuard {
            batch: self.clone(),
            count,
        }
    }
}

impl IntoFuture for BatchHandle {
    type Output = ();
    type IntoFuture = BoxFuture<'static, ()>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

/// Completes its count on drop, including during unwinding.
#[derive(Debug)]
pub(crate) struct CompletionGuard {
    batch: BatchHandle,
    count: usize,
}

impl CompletionGuard {
    /// Moves one parameter out of this guard into its own guard.
    pub(crate) fn take_one(&mut self) -> CompletionGuard {
        debug_assert!(self.count > 0);
        self.count -= 1;
        self.batch.guard()
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.batch.complete(self.count);
    }
}
