//! Bounded fan-out.
//!
//! Runs a fallible operation over a list of items with at most
//! `max_parallel` operations in flight. The first failure is kept and stops
//! further dispatch; later failures are only logged. Work already dispatched
//! is always awaited before returning.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, warn};

use crate::error::{Error, Result};

/// Concurrency-capped executor shared by every fan-out of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedExecutor {
    max_parallel: usize,
}

impl BoundedExecutor {
    /// Create an executor; a zero limit is raised to one.
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    /// The concurrency cap.
    pub const fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Run `op` over `items`, returning results in item order.
    ///
    /// Returns [`Error::Cancelled`] when `token` fires, otherwise the first
    /// error any operation produced.
    pub async fn run<T, R, F, Fut>(
        &self,
        token: &CancellationToken,
        items: Vec<T>,
        op: F,
    ) -> Result<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let total = items.len();
        let gate = Arc::new(Semaphore::new(self.max_parallel));
        let phase = token.child_token();
        let first_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
        let op = Arc::new(op);
        let mut tasks = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                () = phase.cancelled() => break,
                permit = Arc::clone(&gate).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let op = Arc::clone(&op);
            let phase = phase.clone();
            let first_error = Arc::clone(&first_error);
            tasks.spawn(
                async move {
                    let _permit = permit;
                    match op(item).await {
                        Ok(result) => Some((index, result)),
                        Err(e) => {
                            record_failure(&first_error, &phase, e).await;
                            None
                        }
                    }
                }
                .in_current_span(),
            );
        }

        let dispatched = tasks.len();
        let mut results = Vec::with_capacity(dispatched);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => record_failure(&first_error, &phase, Error::task_failed(e.to_string())).await,
            }
        }

        if token.is_cancelled() {
            debug!(dispatched, total, "Fan-out cancelled");
            return Err(Error::Cancelled);
        }
        if let Some(e) = first_error.lock().await.take() {
            debug!(dispatched, total, error = %e, "Fan-out failed");
            return Err(e);
        }

        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, result)| result).collect())
    }
}

async fn record_failure(slot: &Mutex<Option<Error>>, phase: &CancellationToken, error: Error) {
    let mut slot = slot.lock().await;
    if slot.is_none() {
        *slot = Some(error);
        phase.cancel();
    } else {
        warn!(error = %error, "Additional failure after fan-out was stopped");
    }
}
