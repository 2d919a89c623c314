//! Bounded worker pool for per-entity fan-out
//!
//! Every item becomes one Tokio task. A semaphore caps how many run at once,
//! tasks share nothing but what the caller moves into them, and results are
//! collected after the join and returned in input order.

use crate::error::{Error, Result};
use crate::types::ItemErrorPolicy;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Default number of concurrent workers
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Runs one async task per item with bounded concurrency
#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl WorkerPool {
    /// Create a pool running at most `concurrency` tasks at a time (minimum 1)
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Maximum number of tasks in flight
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `task` for every item and return one result per item, in input order.
    ///
    /// A panicking task yields an `Error::Job` for its slot; the other tasks
    /// are unaffected.
    pub async fn map<I, T, F, Fut>(&self, items: Vec<I>, task: F) -> Vec<Result<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let task = Arc::new(task);
        let mut js: JoinSet<(usize, Result<T>)> = JoinSet::new();

        debug!(
            "Worker pool: starting {total} tasks with concurrency {}",
            self.concurrency
        );

        for (idx, item) in items.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let task = Arc::clone(&task);
            js.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => task(item).await,
                    Err(e) => Err(Error::Other(format!("worker pool closed: {e}"))),
                };
                (idx, result)
            });
        }

        let mut slots: Vec<Option<Result<T>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = js.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => warn!("Worker pool: task panicked: {e}"),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    Err(Error::job("worker-pool", format!("task {idx} did not complete")))
                })
            })
            .collect()
    }

    /// Like [`WorkerPool::map`], then apply `policy` to the failures
    pub async fn map_with_policy<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        policy: ItemErrorPolicy,
        task: F,
    ) -> Result<Vec<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        collect_with_policy(self.map(items, task).await, policy)
    }
}

/// Keep the successes. `Skip` logs and drops failures, `Abort` returns the first.
pub fn collect_with_policy<T>(results: Vec<Result<T>>, policy: ItemErrorPolicy) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut skipped = 0usize;

    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) => match policy {
                ItemErrorPolicy::Abort => return Err(e),
                ItemErrorPolicy::Skip => {
                    warn!("Skipping failed item: {e}");
                    skipped += 1;
                }
            },
        }
    }

    if skipped > 0 {
        warn!("{skipped} item(s) skipped");
    }
    Ok(values)
}
