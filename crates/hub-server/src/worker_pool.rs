//! Bounded worker pools (§5 "Scheduling model"): "fire-and-forget" work in
//! the system this hub models on becomes an explicit FIFO queue plus a fixed
//! number of workers here. Enqueueing is idempotent per key — a key already
//! queued or in flight is not queued again — matching
//! `enqueueProvisioningForAllPending`'s self-heal behavior on restart.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// A bounded pool of `concurrency` workers draining an unbounded mpsc queue
/// of `K`, deduplicating in-flight/queued keys.
pub struct WorkerPool<K> {
    tx: mpsc::UnboundedSender<K>,
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K> WorkerPool<K>
where
    K: Eq + std::hash::Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    /// Spawn `concurrency` workers, each running `handler(key)` for items
    /// pulled off the shared queue.
    pub fn spawn<F, Fut>(concurrency: usize, handler: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<K>();
        let rx = Arc::new(Mutex::new(rx));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));
        let handler = Arc::new(handler);

        for _ in 0..concurrency.max(1) {
            let rx = rx.clone();
            let in_flight = in_flight.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                loop {
                    let item = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(key) = item else { break };
                    handler(key.clone()).await;
                    in_flight.lock().await.remove(&key);
                }
            });
        }

        WorkerPool { tx, in_flight }
    }

    /// Enqueue `key` unless it is already queued or being processed.
    pub async fn enqueue(&self, key: K) {
        let mut guard = self.in_flight.lock().await;
        if !guard.insert(key.clone()) {
            return;
        }
        drop(guard);
        if self.tx.send(key.clone()).is_err() {
            warn!(component = "worker_pool", event = "worker_pool.send_failed", key = ?key);
            self.in_flight.lock().await.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn runs_enqueued_work() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        let pool: WorkerPool<u32> = WorkerPool::spawn(2, move |_k| {
            let counter = counter2.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        pool.enqueue(1).await;
        pool.enqueue(2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dedups_identical_keys_in_flight() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        let pool: WorkerPool<u32> = WorkerPool::spawn(1, move |_k| {
            let counter = counter2.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        pool.enqueue(1).await;
        pool.enqueue(1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
