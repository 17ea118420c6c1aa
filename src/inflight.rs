//! Tracking of the executions spawned by one dispatch routine.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{FuturesUnordered, Stream, StreamExt};
use pin_project::pin_project;
use tokio::task::JoinHandle;

/// Spawned executions of one task, yielded as they finish in any order.
///
/// Executions recover their own panics, so a join error here means the
/// execution died outside that boundary (the failure callback panicked, or
/// the runtime is shutting down). Those are logged and counted as finished;
/// the batch counter is released by the execution's own guard either way.
#[pin_project]
pub(crate) struct InFlight {
    #[pin]
    running: FuturesUnordered<JoinHandle<()>>,
    aborted: usize,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self {
            running: FuturesUnordered::new(),
            aborted: 0,
        }
    }

    pub(crate) fn push(&mut self, execution: JoinHandle<()>) {
        self.running.push(execution);
    }

    /// Executions spawned and not yet reaped.
    pub(crate) fn len(&self) -> usize {
        self.running.len()
    }

    /// Executions that ended with a join error.
    pub(crate) fn aborted(&self) -> usize {
        self.aborted
    }

    /// Waits for every spawned execution to finish.
    pub(crate) async fn join_all(&mut self) {
        while self.next().await.is_some() {}
    }
}

impl Stream for InFlight {
    type Item = ();

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.running.poll_next(cx) {
            Poll::Ready(Some(Ok(()))) => Poll::Ready(Some(())),
            Poll::Ready(Some(Err(err))) => {
                *this.aborted += 1;
                tracing::warn!(error = %err, "Execution ended abnormally");
                Poll::Ready(Some(()))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
