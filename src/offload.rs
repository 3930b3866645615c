//! Worker offload pool for blocking and GPU-bound work.
//!
//! Callables run on tokio's blocking threads behind a semaphore, so the
//! control path never waits on them unless it awaits the returned
//! [`OffloadTask`].

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::recovery::extract_panic_message;
use crate::types::{Error, Result};

/// Bounded pool of blocking workers.
#[derive(Debug, Clone)]
pub struct OffloadPool {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    next_task: Arc<AtomicU64>,
}

impl OffloadPool {
    /// `max_concurrency` is clamped to at least one worker.
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            next_task: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Queue `work` and return immediately.
    ///
    /// The result is only observable through the returned task. An `Err`
    /// from `work` or a panic inside it resolves to `OffloadFailure`; the
    /// pool keeps serving other submissions. Must be called from within a
    /// tokio runtime.
    pub fn submit<T, F>(&self, work: F) -> OffloadTask<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let task_id = self.next_task.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let semaphore = self.semaphore.clone();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                tracing::debug!(task_id, "offload task cancelled before start");
                return Err(Error::offload_failure(format!(
                    "task {} cancelled before start",
                    task_id
                )));
            };
            if token.is_cancelled() {
                return Err(Error::offload_failure(format!(
                    "task {} cancelled before start",
                    task_id
                )));
            }

            tracing::debug!(task_id, "offload task started");
            let joined = tokio::task::spawn_blocking(move || {
                // Slot stays taken until the callable returns.
                let _permit = permit;
                catch_unwind(AssertUnwindSafe(work))
            })
            .await;

            match joined {
                Ok(Ok(Ok(value))) => Ok(value),
                Ok(Ok(Err(err))) => {
                    tracing::warn!(task_id, "offload task failed: {}", err);
                    Err(match err {
                        Error::OffloadFailure(reason) => Error::OffloadFailure(reason),
                        other => Error::offload_failure(other.to_string()),
                    })
                }
                Ok(Err(payload)) => {
                    let panic_msg = extract_panic_message(payload.as_ref());
                    tracing::error!(task_id, "offload task panicked: {}", panic_msg);
                    Err(Error::offload_failure(format!("panic: {}", panic_msg)))
                }
                Err(join_err) => Err(Error::offload_failure(join_err.to_string())),
            }
        });

        OffloadTask {
            task_id,
            handle,
            cancel,
        }
    }

    /// Slots not currently held by running callables.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

/// Handle to one submitted callable. Await it for the result.
///
/// Dropping the handle does not cancel the work.
pub struct OffloadTask<T> {
    task_id: u64,
    handle: JoinHandle<Result<T>>,
    cancel: CancellationToken,
}

impl<T> OffloadTask<T> {
    /// Best-effort cancellation: work that has not started yet never runs and
    /// the task resolves to `OffloadFailure`. Started work runs to completion.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn id(&self) -> u64 {
        self.task_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> fmt::Debug for OffloadTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffloadTask")
            .field("task_id", &self.task_id)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

impl<T> Future for OffloadTask<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(join_err)) => {
                Poll::Ready(Err(Error::offload_failure(join_err.to_string())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
