//! Bounded concurrent execution of per-item model calls.
//!
//! One [`WorkerPool`] is shared by every task in the process. Its semaphore
//! caps in-flight calls globally; each batch additionally keeps at most
//! `max_workers` futures in flight so a single task cannot queue its whole
//! batch on the semaphore.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Semaphore;
use tracing::debug;

use scout_core::{Error, Result};

/// Result for the item at `index` in the input batch.
#[derive(Debug)]
pub struct ItemOutcome<R> {
    pub index: usize,
    pub result: Result<R>,
}

impl<R> ItemOutcome<R> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Process-wide cap on concurrent outbound calls.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Permits not currently held by a running call.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run `f` over every item, returning outcomes in input order.
    ///
    /// A failing item never affects its siblings. Once `cancel` is raised,
    /// items not yet started resolve to [`Error::Cancelled`] while calls
    /// already in flight run to completion. `on_progress(done, total)` fires
    /// after every item finishes.
    pub async fn run_all<T, R, F, Fut, P>(
        &self,
        items: Vec<T>,
        cancel: &AtomicBool,
        on_progress: P,
        f: F,
    ) -> Vec<ItemOutcome<R>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R>>,
        P: Fn(usize, usize),
    {
        let total = items.len();
        let mut slots: Vec<Option<Result<R>>> = (0..total).map(|_| None).collect();
        let f = &f;

        let calls = futures::stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| {
                let semaphore = self.semaphore.clone();
                async move {
                    if cancel.load(Ordering::SeqCst) {
                        return (index, Err(Error::Cancelled));
                    }
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return (index, Err(Error::Internal("Worker pool closed".into())))
                        }
                    };
                    if cancel.load(Ordering::SeqCst) {
                        return (index, Err(Error::Cancelled));
                    }
                    (index, f(item).await)
                }
            })
            .buffer_unordered(self.max_workers);
        let mut calls = std::pin::pin!(calls);

        let mut done = 0;
        while let Some((index, result)) = calls.next().await {
            slots[index] = Some(result);
            done += 1;
            on_progress(done, total);
        }

        let outcomes: Vec<ItemOutcome<R>> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| ItemOutcome {
                index,
                result: slot.unwrap_or_else(|| Err(Error::Internal("Item never ran".into()))),
            })
            .collect();

        debug!(
            item_count = total,
            failed = outcomes.iter().filter(|o| !o.is_ok()).count(),
            "Worker pool batch finished"
        );
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_order_preserved_under_varied_latency() {
        let pool = WorkerPool::new(3);
        let items: Vec<u64> = vec![50, 10, 40, 5, 30, 20, 1];
        let outcomes = pool
            .run_all(items.clone(), &AtomicBool::new(false), |_, _| {}, |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ms * 2)
            })
            .await;

        assert_eq!(outcomes.len(), items.len());
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.index, i);
            assert_eq!(*outcome.result.as_ref().unwrap(), items[i] * 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_isolated() {
        let pool = WorkerPool::new(2);
        let outcomes = pool
            .run_all(vec![1, 2, 3], &AtomicBool::new(false), |_, _| {}, |n| async move {
                if n == 2 {
                    Err(Error::Inference("bad".into()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert!(outcomes[0].is_ok());
        assert!(!outcomes[1].is_ok());
        assert!(outcomes[2].is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded() {
        let pool = WorkerPool::new(2);
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        pool.run_all((0..8).collect::<Vec<_>>(), &AtomicBool::new(false), |_, _| {}, |_| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_undispatched_items() {
        let pool = WorkerPool::new(1);
        let cancel = AtomicBool::new(false);
        let started = AtomicUsize::new(0);

        let outcomes = pool
            .run_all((0..5).collect::<Vec<_>>(), &cancel, |_, _| {}, |n| {
                let cancel = &cancel;
                let started = &started;
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if n == 1 {
                        cancel.store(true, Ordering::SeqCst);
                    }
                    Ok(n)
                }
            })
            .await;

        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert!(outcomes[0].is_ok());
        assert!(outcomes[1].is_ok());
        for outcome in &outcomes[2..] {
            assert!(matches!(outcome.result, Err(Error::Cancelled)));
        }
    }

    #[tokio::test]
    async fn test_progress_reported_per_item() {
        let pool = WorkerPool::new(4);
        let seen = Mutex::new(Vec::new());
        pool.run_all(
            vec![1, 2, 3],
            &AtomicBool::new(false),
            |done, total| seen.lock().unwrap().push((done, total)),
            |n| async move { Ok(n) },
        )
        .await;
        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pool = WorkerPool::new(4);
        let outcomes: Vec<ItemOutcome<()>> = pool
            .run_all(Vec::<u8>::new(), &AtomicBool::new(false), |_, _| {}, |_| async { Ok(()) })
            .await;
        assert!(outcomes.is_empty());
    }
}
