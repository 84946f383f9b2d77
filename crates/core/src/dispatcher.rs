//! Bounded worker pool for per-file fan-out.
//!
//! Failure policy: per-item isolation. One item failing (or panicking)
//! never aborts the rest of the batch; the caller gets an aggregate report
//! and decides what a partial failure means.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::warn;

/// Outcome of a batch: how many items succeeded and failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn all_ok(&self) -> bool {
        self.failed == 0
    }
}

/// Applies an operation across items with at most `workers` running at
/// once. Workers share no mutable state; each operation receives only its
/// own item.
#[derive(Clone)]
pub struct Dispatcher {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl Dispatcher {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `op` over every item, bounded by the worker count, and blocks
    /// until the whole batch completes. Each item reports success as a
    /// bool; panics are caught by the join and counted as failures.
    pub async fn map_all<T, F, Fut>(&self, items: Vec<T>, op: F) -> BatchReport
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + 'static,
        Fut: std::future::Future<Output = bool> + Send + 'static,
    {
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let permits = Arc::clone(&self.permits);
            let op = op.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.expect("semaphore open");
                op(item).await
            }));
        }

        let mut report = BatchReport {
            completed: 0,
            failed: 0,
        };
        for joined in join_all(handles).await {
            match joined {
                Ok(true) => report.completed += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    warn!("Batch worker panicked: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_empty_batch_is_ok() {
        let dispatcher = Dispatcher::new(4);
        let report = dispatcher.map_all(Vec::<u32>::new(), |_| async { true }).await;
        assert_eq!(report, BatchReport { completed: 0, failed: 0 });
        assert!(report.all_ok());
    }

    #[tokio::test]
    async fn test_all_items_processed() {
        let dispatcher = Dispatcher::new(2);
        let report = dispatcher
            .map_all((0..10).collect(), |n: u32| async move { n % 2 == 0 })
            .await;
        assert_eq!(report.completed, 5);
        assert_eq!(report.failed, 5);
        assert!(!report.all_ok());
    }

    #[tokio::test]
    async fn test_worker_bound_is_respected() {
        let dispatcher = Dispatcher::new(3);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let report = dispatcher
            .map_all((0..20).collect::<Vec<u32>>(), {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                move |_| {
                    let active = Arc::clone(&active);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        true
                    }
                }
            })
            .await;

        assert_eq!(report.completed, 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let dispatcher = Dispatcher::new(2);
        let report = dispatcher
            .map_all(vec![1u32, 2, 3], |n| async move {
                if n == 2 {
                    panic!("boom");
                }
                true
            })
            .await;
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_zero_workers_clamped_to_one() {
        assert_eq!(Dispatcher::new(0).workers(), 1);
    }
}
