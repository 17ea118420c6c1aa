//! Units of work submitted to a [`Pool`](crate::pool::Pool).

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

pub(crate) type TaskFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;
pub(crate) type FailureFn<T> = Arc<dyn Fn(T, Failure) + Send + Sync>;

/// A panic recovered from one execution of a task function.
pub struct Failure {
    payload: Box<dyn Any + Send>,
}

impl Failure {
    pub(crate) fn new(payload: Box<dyn Any + Send>) -> Self {
        Self { payload }
    }

    /// The panic message, if the payload was a string.
    pub fn message(&self) -> Option<&str> {
        if let Some(s) = self.payload.downcast_ref::<&'static str>() {
            Some(*s)
        } else {
            self.payload.downcast_ref::<String>().map(String::as_str)
        }
    }

    pub fn payload(&self) -> &(dyn Any + Send) {
        &*self.payload
    }

    pub fn into_payload(self) -> Box<dyn Any + Send> {
        self.payload
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("message", &self.message())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message().unwrap_or("non-string panic payload"))
    }
}

/// A function and the parameters to run it over.
///
/// `limit` caps how many executions of this task run at once, further clamped
/// to the pool capacity; 0 leaves only the pool's rate limit in effect.
///
/// ```rust
/// use ratepool::Task;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let task = Task::new(|url: String| async move { println!("{url}") }, vec!["a".to_string()])
///     .with_limit(4)
///     .with_cancellation(token.clone())
///     .on_failure(|url, failure| eprintln!("{url}: {failure}"));
/// assert_eq!(task.limit(), 4);
/// assert_eq!(task.len(), 1);
/// ```
pub struct Task<T> {
    pub(crate) func: TaskFn<T>,
    pub(crate) params: Vec<T>,
    pub(crate) limit: usize,
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) on_failure: Option<FailureFn<T>>,
}

impl<T> Task<T>
where
    T: Send + 'static,
{
    pub fn new<F, Fut, I>(func: F, params: I) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        I: IntoIterator<Item = T>,
    {
        Self {
            func: Arc::new(move |param| func(param).boxed()),
            params: params.into_iter().collect(),
            limit: 0,
            cancel: None,
            on_failure: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Stop dispatching parameters once `token` is cancelled. Executions
    /// already started are left to finish.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Receive the parameter and the recovered panic of failed executions.
    /// Without a callback, failures are dropped.
    pub fn on_failure<C>(mut self, callback: C) -> Self
    where
        C: Fn(T, Failure) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(callback));
        self
    }
}

impl<T> Task<T> {
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("params", &self.params.len())
            .field("limit", &self.limit)
            .field("cancellable", &self.cancel.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}
