//! Drone Op Lock (§4.2): a keyed FIFO mutex serializing container-affecting
//! work per drone. Reads (status polling, list) never take this lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct DroneOpLock {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DroneOpLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the lock for `key`, run `fn`, release on drop. Tokio's mutex
    /// queues waiters FIFO, matching the §4.2 contract.
    pub async fn with_lock<F, Fut, R>(&self, key: &str, f: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = R>,
    {
        let mutex = self.entry(key);
        let _guard: OwnedMutexGuard<()> = mutex.lock_owned().await;
        f().await
    }

    pub fn drone_key(id: &str) -> String {
        format!("drone:{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn serializes_concurrent_holders_of_same_key() {
        let lock = Arc::new(DroneOpLock::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for i in 0..5 {
            let lock = lock.clone();
            let order = order.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                lock.with_lock("drone:d1", || async {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    order.lock().unwrap().push((i, n));
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let lock = DroneOpLock::new();
        let a = lock.with_lock("drone:a", || async { 1 });
        let b = lock.with_lock("drone:b", || async { 2 });
        let (a, b) = tokio::join!(a, b);
        assert_eq!((a, b), (1, 2));
    }
}
