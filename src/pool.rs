//! The dispatcher: task intake, per-task fan-out and execution.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::common::Capacity;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::inflight::InFlight;
use crate::join::{BatchHandle, CompletionGuard};
use crate::limiter::RateLimiter;
use crate::slot::{Slot, SlotPool, SlotSet};
use crate::task::{Failure, FailureFn, Task, TaskFn};

/// A task on its way to a dispatch routine, tied to its submission's counter.
struct Submission<T> {
    task: Task<T>,
    batch: BatchHandle,
}

/// State shared by the intake loop and every dispatch routine.
#[derive(Debug)]
struct Shared {
    limiter: RateLimiter,
    slots: SlotPool,
}

#[derive(Debug)]
struct Intake<T> {
    tx: mpsc::UnboundedSender<Submission<T>>,
    stopped: bool,
}

/// Rate-limited, concurrency-bounded dispatcher.
///
/// Every parameter of every submitted task waits for admission from one
/// shared [`RateLimiter`]. Tasks with a limit additionally run at most
/// `min(limit, capacity)` executions at once, using a slot set borrowed from
/// the pool's [`SlotPool`]. Panics inside the task function are recovered per
/// execution.
///
/// Must be created inside a tokio runtime, which drives the intake loop and
/// every execution.
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// use ratepool::{Pool, Task};
///
/// tokio_test::block_on(async {
///     let pool = Pool::with_capacity(40).unwrap();
///     let sum = Arc::new(AtomicUsize::new(0));
///
///     let add = {
///         let sum = Arc::clone(&sum);
///         move |n: usize| {
///             let sum = Arc::clone(&sum);
///             async move {
///                 sum.fetch_add(n, Ordering::SeqCst);
///             }
///         }
///     };
///     let handle = pool
///         .submit([
///             Task::new(add.clone(), 1..=10).with_limit(2),
///             Task::new(add, 11..=20),
///         ])
///         .unwrap();
///     handle.await;
///     assert_eq!(sum.load(Ordering::SeqCst), 210);
///
///     pool.stop();
///     assert!(pool.submit([]).is_err());
/// });
/// ```
#[derive(Debug)]
pub struct Pool<T> {
    shared: Arc<Shared>,
    intake: Mutex<Intake<T>>,
    shutdown: CancellationToken,
}

impl<T> Pool<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(config: Config) -> Result<Self> {
        let limiter = RateLimiter::from_config(&config)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let shared = Arc::new(Shared {
            limiter,
            slots: SlotPool::new(),
        });
        let shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(intake_loop(rx, shutdown.clone(), Arc::clone(&shared)));

        Ok(Self {
            shared,
            intake: Mutex::new(Intake { tx, stopped: false }),
            shutdown,
        })
    }

    /// Pool admitting `capacity` parameters per second, at most `capacity`
    /// at once.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::new(Config::with_capacity(capacity))
    }

    /// Hands `tasks` to the dispatcher.
    ///
    /// The returned handle completes once every parameter of every task has
    /// run or been skipped by its task's cancellation. Fails with
    /// [`Error::Stopped`] after [`stop`](Self::stop), enqueuing nothing.
    pub fn submit<I>(&self, tasks: I) -> Result<BatchHandle>
    where
        I: IntoIterator<Item = Task<T>>,
    {
        let mut intake = self.intake();
        if intake.stopped {
            return Err(Error::Stopped);
        }

        let tasks = tasks.into_iter().collect::<Vec<_>>();
        let total = tasks.iter().map(Task::len).sum();
        let batch = BatchHandle::new(total);

        let mut tasks = tasks.into_iter();
        while let Some(task) = tasks.next() {
            let submission = Submission {
                task,
                batch: batch.clone(),
            };
            if let Err(mpsc::error::SendError(lost)) = intake.tx.send(submission) {
                // The intake loop is gone with its runtime. Nothing more can
                // run, so account for what was not enqueued.
                tracing::warn!("Intake loop is gone - stopping pool");
                intake.stopped = true;
                let unsent = lost.task.len() + tasks.by_ref().map(|t| t.len()).sum::<usize>();
                batch.complete(unsent);
                return Err(Error::Stopped);
            }
        }
        Ok(batch)
    }

    /// Submits one task and waits for it to finish.
    pub async fn run(&self, task: Task<T>) -> Result<()> {
        self.submit([task])?.await;
        Ok(())
    }
}

impl<T> Pool<T> {
    fn intake(&self) -> MutexGuard<'_, Intake<T>> {
        self.intake.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops accepting submissions. Tasks already submitted, queued or
    /// running, are not affected. Calling it again has no effect.
    pub fn stop(&self) {
        let mut intake = self.intake();
        if intake.stopped {
            return;
        }
        intake.stopped = true;
        self.shutdown.cancel();
        tracing::info!("Pool stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.intake().stopped
    }

    /// The shared rate limiter, for adjusting limit and burst separately.
    pub fn limiter(&self) -> &RateLimiter {
        &self.shared.limiter
    }

    pub fn slot_pool(&self) -> &SlotPool {
        &self.shared.slots
    }
}

impl<T> Capacity for Pool<T> {
    fn capacity(&self) -> usize {
        self.shared.limiter.capacity()
    }

    fn set_capacity(&self, capacity: usize) -> Result<()> {
        self.shared.limiter.set_capacity(capacity)
    }
}

/// Starts one dispatch routine per received task until shutdown, then
/// dispatches whatever was already queued.
async fn intake_loop<T>(
    mut rx: mpsc::UnboundedReceiver<Submission<T>>,
    shutdown: CancellationToken,
    shared: Arc<Shared>,
) where
    T: Clone + Send + 'static,
{
    loop {
        tokio::select! {
            biased;
            received = rx.recv() => match received {
                Some(submission) => {
                    tokio::spawn(dispatch(Arc::clone(&shared), submission));
                }
                // Pool dropped.
                None => return,
            },
            _ = shutdown.cancelled() => break,
        }
    }

    rx.close();
    while let Some(submission) = rx.recv().await {
        tokio::spawn(dispatch(Arc::clone(&shared), submission));
    }
}

/// Fans one task out into one execution per parameter.
async fn dispatch<T>(shared: Arc<Shared>, submission: Submission<T>)
where
    T: Clone + Send + 'static,
{
    let Submission { task, batch } = submission;
    let Task {
        func,
        params,
        limit,
        cancel,
        on_failure,
    } = task;
    let cancel = cancel.unwrap_or_default();
    let total = params.len();

    // Bounded mode borrows a slot set; unbounded mode runs on the rate alone.
    let slots = (limit > 0).then(|| {
        let ceiling = limit.min(shared.limiter.capacity());
        shared.slots.acquire(ceiling)
    });
    tracing::debug!(
        params = total,
        ceiling = slots.as_ref().map_or(0, SlotSet::capacity),
        "Dispatching task"
    );

    let mut undispatched = batch.pending(total);
    let mut in_flight = InFlight::new();
    for param in params {
        let slot = match &slots {
            Some(set) => match admit_slot(set, &cancel).await {
                Some(slot) => Some(slot),
                None => break,
            },
            None => None,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = shared.limiter.wait() => {}
        }
        tracing::trace!(dispatched = in_flight.len() + 1, "Parameter admitted");

        let execution = Execution {
            func: Arc::clone(&func),
            on_failure: on_failure.clone(),
            param,
            finish: Finish {
                slot,
                done: undispatched.take_one(),
            },
        };
        in_flight.push(tokio::spawn(execution.run()));
    }

    let dispatched = in_flight.len();
    if dispatched < total {
        tracing::debug!(
            dispatched,
            skipped = total - dispatched,
            "Task cancelled - remaining parameters skipped"
        );
    }
    // Skipped parameters count as complete right away.
    drop(undispatched);

    in_flight.join_all().await;
    if let Some(set) = slots {
        shared.slots.release(set);
    }
    tracing::debug!(dispatched, aborted = in_flight.aborted(), "Task finished");
}

/// Takes a slot, giving up if the task is cancelled first.
async fn admit_slot(set: &SlotSet, cancel: &CancellationToken) -> Option<Slot> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        slot = set.acquire() => {
            if slot.is_none() {
                tracing::warn!(limit = set.capacity(), "Slot set closed during dispatch");
            }
            slot
        }
    }
}

/// One parameter's run of the task function.
struct Execution<T> {
    func: TaskFn<T>,
    on_failure: Option<FailureFn<T>>,
    param: T,
    finish: Finish,
}

/// Held for the lifetime of an execution. Fields drop in declaration order,
/// so the slot is returned before the parameter is counted complete, on
/// unwinding as well.
struct Finish {
    slot: Option<Slot>,
    done: CompletionGuard,
}

impl<T> Execution<T>
where
    T: Clone + Send + 'static,
{
    async fn run(self) {
        let Execution {
            func,
            on_failure,
            param,
            finish,
        } = self;

        // Only needed to report a failure.
        let retained = on_failure.as_ref().map(|_| param.clone());
        let outcome = AssertUnwindSafe(async move { func(param).await })
            .catch_unwind()
            .await;

        if let Err(payload) = outcome {
            let failure = Failure::new(payload);
            match (on_failure, retained) {
                (Some(callback), Some(param)) => {
                    tracing::warn!(failure = %failure, "Execution panicked");
                    callback(param, failure);
                }
                _ => tracing::debug!(failure = %failure, "Execution panicked - no failure callback"),
            }
        }

        drop(finish);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;

    /// Tracks how many executions are running at once.
    #[derive(Default)]
    struct Gauge {
        running: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Gauge {
        async fn hold(&self, duration: Duration) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(duration).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        fn finished(&self) -> usize {
            self.finished.load(Ordering::SeqCst)
        }
    }

    fn sleeper(
        gauge: &Arc<Gauge>,
        duration: Duration,
    ) -> impl Fn(usize) -> futures::future::BoxFuture<'static, ()> + Send + Sync + 'static {
        let gauge = Arc::clone(gauge);
        move |_| {
            let gauge = Arc::clone(&gauge);
            async move { gauge.hold(duration).await }.boxed()
        }
    }

    /// Lets dispatch routines return their slot sets after a batch completes.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[test]
    fn test_new_outside_runtime() {
        let pool = Pool::<u8>::with_capacity(1);
        assert_eq!(pool.unwrap_err(), Error::NoRuntime);
    }

    #[tokio::test]
    async fn test_invalid_config() {
        assert_eq!(
            Pool::<u8>::new(Config::new(1.0, 0)).unwrap_err(),
            Error::InvalidBurst(0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_is_serialized_by_rate() {
        let pool = Pool::new(Config::new(1.0, 1)).unwrap();
        let starts = Arc::new(Mutex::new(Vec::new()));
        let task = {
            let starts = Arc::clone(&starts);
            Task::new(
                move |_: usize| {
                    let starts = Arc::clone(&starts);
                    async move { starts.lock().unwrap().push(Instant::now()) }
                },
                0..5,
            )
        };

        let start = Instant::now();
        let handle = pool.submit([task]).unwrap();
        handle.wait().await;

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 5);
        for pair in starts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(950), "{gap:?}");
        }
        assert!(start.elapsed() >= Duration::from_millis(3950));
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wall_time() {
        let pool = Pool::with_capacity(10).unwrap();
        let gauge = Arc::new(Gauge::default());
        let task = Task::new(sleeper(&gauge, Duration::from_secs(1)), 0..6).with_limit(2);

        let start = Instant::now();
        pool.run(task).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(gauge.finished(), 6);
        assert_eq!(gauge.peak(), 2);
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3500), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_ceiling() {
        let pool = Pool::with_capacity(100).unwrap();
        let gauge = Arc::new(Gauge::default());
        let task = Task::new(sleeper(&gauge, Duration::from_millis(30)), 0..40).with_limit(3);

        pool.run(task).await.unwrap();
        assert_eq!(gauge.finished(), 40);
        assert_eq!(gauge.peak(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_clamped_to_capacity() {
        let pool = Pool::with_capacity(4).unwrap();
        let gauge = Arc::new(Gauge::default());
        let task = Task::new(sleeper(&gauge, Duration::from_secs(1)), 0..12).with_limit(50);

        pool.run(task).await.unwrap();
        assert_eq!(gauge.finished(), 12);
        assert_eq!(gauge.peak(), 4);
        settle().await;
        assert_eq!(pool.slot_pool().idle(4), 1);
        assert_eq!(pool.slot_pool().idle(50), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_sets_are_reused() {
        let pool = Pool::with_capacity(10).unwrap();
        let gauge = Arc::new(Gauge::default());
        for _ in 0..3 {
            let task = Task::new(sleeper(&gauge, Duration::from_millis(10)), 0..5).with_limit(2);
            pool.run(task).await.unwrap();
            settle().await;
        }
        assert_eq!(gauge.finished(), 15);
        assert_eq!(pool.slot_pool().allocated(), 1);
        assert_eq!(pool.slot_pool().idle(2), 1);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let pool = Pool::with_capacity(50).unwrap();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let ran = Arc::clone(&ran);
            let failures = Arc::clone(&failures);
            Task::new(
                move |param: &'static str| {
                    let ran = Arc::clone(&ran);
                    async move {
                        if param == "bad" {
                            panic!("cannot handle {param}");
                        }
                        ran.lock().unwrap().push(param);
                    }
                },
                ["a", "b", "bad", "c", "d"],
            )
            .with_limit(2)
            .on_failure(move |param, failure| {
                failures
                    .lock()
                    .unwrap()
                    .push((param, failure.message().map(str::to_owned)));
            })
        };

        let handle = pool.submit([task]).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();

        let failures = failures.lock().unwrap();
        assert_eq!(
            *failures,
            vec![("bad", Some("cannot handle bad".to_string()))]
        );
        let mut ran = ran.lock().unwrap().clone();
        ran.sort_unstable();
        assert_eq!(ran, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_holds_with_failures() {
        let pool = Pool::with_capacity(10).unwrap();
        let gauge = Arc::new(Gauge::default());
        let failures = Arc::new(AtomicUsize::new(0));

        let task = {
            let gauge = Arc::clone(&gauge);
            let failures = Arc::clone(&failures);
            Task::new(
                move |n: usize| {
                    let gauge = Arc::clone(&gauge);
                    async move {
                        gauge.hold(Duration::from_millis(100 * (n as u64 % 4 + 1))).await;
                        if n % 2 == 1 {
                            panic!("odd {n}");
                        }
                    }
                },
                0..12,
            )
            .with_limit(3)
            .on_failure(move |_, _| {
                failures.fetch_add(1, Ordering::SeqCst);
            })
        };

        let handle = pool.submit([task]).unwrap();
        tokio::time::timeout(Duration::from_secs(10), handle.wait())
            .await
            .unwrap();
        assert!(handle.is_finished());
        assert_eq!(gauge.finished(), 12);
        assert_eq!(gauge.peak(), 3);
        assert_eq!(failures.load(Ordering::SeqCst), 6);

        settle().await;
        assert_eq!(pool.slot_pool().idle(3), 1);
        assert_eq!(pool.slot_pool().allocated(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slot_returned_before_completion_on_unwind() {
        for _ in 0..100 {
            let set = Arc::new(SlotSet::new(1));
            let batch = BatchHandle::new(1);
            let finish = Finish {
                slot: set.try_acquire(),
                done: batch.guard(),
            };

            let waiter = {
                let set = Arc::clone(&set);
                let batch = batch.clone();
                tokio::spawn(async move {
                    batch.wait().await;
                    set.is_full()
                })
            };
            tokio::task::yield_now().await;

            let unwound = std::panic::catch_unwind(AssertUnwindSafe(move || {
                let _finish = finish;
                panic!("callback");
            }));
            assert!(unwound.is_err());
            assert!(waiter.await.unwrap());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_rate_does_not_drop_parameters() {
        let pool = Pool::new(Config::new(1e-30, 1)).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let task = {
            let ran = Arc::clone(&ran);
            Task::new(
                move |_: usize| {
                    let ran = Arc::clone(&ran);
                    async move {
                        ran.fetch_add(1, Ordering::SeqCst);
                    }
                },
                0..3,
            )
        };

        let handle = pool.submit([task]).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(handle.remaining(), 2);

        pool.limiter().set_limit(1.0).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_without_callback_is_dropped() {
        let pool = Pool::with_capacity(50).unwrap();
        let task = Task::new(
            |n: u32| async move {
                if n % 2 == 0 {
                    panic!("even");
                }
            },
            0..10,
        );
        tokio::time::timeout(Duration::from_secs(5), pool.run(task))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_panicking_callback_still_completes() {
        let pool = Pool::with_capacity(50).unwrap();
        let task = Task::new(|_: u32| async { panic!("inner") }, 0..3)
            .with_limit(1)
            .on_failure(|_, _| panic!("callback"));
        tokio::time::timeout(Duration::from_secs(5), pool.run(task))
            .await
            .unwrap()
            .unwrap();
        settle().await;
        // The slot of every execution came back.
        assert_eq!(pool.slot_pool().idle(1), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_dispatch() {
        let pool = Pool::new(Config::new(1.0, 1)).unwrap();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let token = CancellationToken::new();

        let task = {
            let ran = Arc::clone(&ran);
            Task::new(
                move |n: usize| {
                    let ran = Arc::clone(&ran);
                    async move { ran.lock().unwrap().push(n) }
                },
                0..10,
            )
            .with_cancellation(token.clone())
        };

        let handle = pool.submit([task]).unwrap();
        // Admissions at t=0s and t=1s, cancelled before the one at t=2s.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle.wait())
            .await
            .unwrap();
        assert_eq!(*ran.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_lets_running_executions_finish() {
        let pool = Pool::with_capacity(10).unwrap();
        let gauge = Arc::new(Gauge::default());
        let token = CancellationToken::new();
        let task = Task::new(sleeper(&gauge, Duration::from_secs(2)), 0..10)
            .with_limit(2)
            .with_cancellation(token.clone());

        let handle = pool.submit([task]).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();
        assert!(!handle.is_finished());

        handle.wait().await;
        // The two running when cancelled finished; nothing else started.
        assert_eq!(gauge.finished(), 2);
        settle().await;
        assert_eq!(pool.slot_pool().idle(2), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let pool = Pool::with_capacity(10).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let ran = Arc::new(AtomicUsize::new(0));
        let task = {
            let ran = Arc::clone(&ran);
            Task::new(
                move |_: usize| {
                    let ran = Arc::clone(&ran);
                    async move {
                        ran.fetch_add(1, Ordering::SeqCst);
                    }
                },
                0..5,
            )
            .with_limit(2)
            .with_cancellation(token)
        };

        tokio::time::timeout(Duration::from_secs(1), pool.run(task))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_task() {
        let pool = Pool::with_capacity(1).unwrap();
        let handle = pool.submit([Task::new(|_: u8| async {}, [])]).unwrap();
        assert!(handle.is_finished());
        handle.wait().await;

        let handle = pool.submit(Vec::new()).unwrap();
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_spans_tasks() {
        let pool = Pool::with_capacity(40).unwrap();
        let gauge = Arc::new(Gauge::default());
        let deadline = CancellationToken::new();
        {
            let deadline = deadline.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                deadline.cancel();
            });
        }

        let handle = pool
            .submit([
                Task::new(sleeper(&gauge, Duration::from_secs(2)), 0..100).with_limit(1),
                Task::new(sleeper(&gauge, Duration::from_secs(2)), 100..200).with_limit(1),
                Task::new(sleeper(&gauge, Duration::from_secs(2)), 200..300)
                    .with_limit(1)
                    .with_cancellation(deadline),
            ])
            .unwrap();
        assert_eq!(handle.remaining(), 300);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!handle.is_finished());
        // Third task ran for 5s at 2s each: three executions, rest skipped.
        // The first two finished four or five executions each.
        let remaining = handle.remaining();
        assert!((190..=192).contains(&remaining), "{remaining}");

        handle.wait().await;
        assert_eq!(gauge.finished(), 203);
        assert_eq!(gauge.peak(), 3);
    }

    #[tokio::test]
    async fn test_stop() {
        let pool = Pool::with_capacity(10).unwrap();
        assert!(!pool.is_stopped());

        pool.stop();
        pool.stop();
        assert!(pool.is_stopped());

        let task = Task::new(|_: u8| async {}, [1]);
        assert_eq!(pool.submit([task]).unwrap_err(), Error::Stopped);
        let task = Task::new(|_: u8| async {}, [1]);
        assert_eq!(pool.run(task).await.unwrap_err(), Error::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_spares_submitted_tasks() {
        let pool = Pool::with_capacity(10).unwrap();
        let gauge = Arc::new(Gauge::default());
        let handle = pool
            .submit([
                Task::new(sleeper(&gauge, Duration::from_secs(1)), 0..4).with_limit(2),
                Task::new(sleeper(&gauge, Duration::from_secs(1)), 0..4),
            ])
            .unwrap();
        pool.stop();

        handle.wait().await;
        assert_eq!(gauge.finished(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_capacity() {
        let pool = Pool::with_capacity(2).unwrap();
        assert_eq!(pool.capacity(), 2);
        pool.set_capacity(8).unwrap();
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.limiter().limits(), (8.0, 8));
        assert!(pool.set_capacity(0).is_err());

        let gauge = Arc::new(Gauge::default());
        let task = Task::new(sleeper(&gauge, Duration::from_secs(1)), 0..16).with_limit(6);
        pool.run(task).await.unwrap();
        assert_eq!(gauge.peak(), 6);
        settle().await;
        assert_eq!(pool.slot_pool().idle(6), 1);
    }
}
