/*!
 * Distributed Lock
 * Mutual exclusion over the shared lock store
 */

use super::store::{LockHandle, LockStore};
use crate::core::errors::{LockError, PipelineError};
use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Distributed mutual exclusion built on the two-command store protocol
///
/// A fresh random owner token is generated per acquire attempt; release goes
/// through compare-then-delete so a late cleanup can never clobber a key that
/// expired and was re-acquired by another holder.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn LockStore>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Up to `retry_count` acquire attempts with a fixed delay between them
    pub async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        retry_count: u32,
        retry_delay: Duration,
    ) -> Result<LockHandle, LockError> {
        let attempts = retry_count.max(1);
        for attempt in 0..attempts {
            let token = Uuid::new_v4();
            if self.store.set_if_absent(key, token, ttl) {
                debug!("Acquired lock '{}' on attempt {}", key, attempt + 1);
                return Ok(LockHandle {
                    key: key.to_string(),
                    owner_token: token,
                    expires_at: Instant::now() + ttl,
                });
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(retry_delay).await;
            }
        }
        Err(LockError::AcquisitionFailed {
            key: key.to_string(),
            attempts,
        })
    }

    /// Release by owner token; failure is logged, never raised
    pub fn release(&self, handle: &LockHandle) {
        if !self.store.compare_delete(&handle.key, handle.owner_token) {
            warn!(
                "Lock '{}' no longer owned at release (TTL expiry or re-acquisition)",
                handle.key
            );
        }
    }

    /// Acquire, run `body`, release on both success and failure paths
    pub async fn with_lock<T, F>(
        &self,
        key: &str,
        ttl: Duration,
        retry_count: u32,
        retry_delay: Duration,
        body: F,
    ) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Result<T, PipelineError>,
    {
        let handle = self.acquire(key, ttl, retry_count, retry_delay).await?;
        let result = body();
        self.release(&handle);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::MethodError;
    use crate::lock::MemoryLockStore;

    fn lock() -> (DistributedLock, Arc<MemoryLockStore>) {
        let store = Arc::new(MemoryLockStore::new());
        (DistributedLock::new(Arc::clone(&store) as Arc<dyn LockStore>), store)
    }

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let (lock, store) = lock();
        let handle = lock
            .acquire("k", Duration::from_secs(5), 3, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(store.is_held("k"));
        lock.release(&handle);
        assert!(!store.is_held("k"));
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let (lock, _store) = lock();
        let _holder = lock
            .acquire("k", Duration::from_secs(30), 1, Duration::from_millis(1))
            .await
            .unwrap();

        let start = Instant::now();
        let result = lock
            .acquire("k", Duration::from_secs(30), 3, Duration::from_millis(20))
            .await;
        assert!(matches!(
            result,
            Err(LockError::AcquisitionFailed { attempts: 3, .. })
        ));
        // Two inter-attempt delays for three attempts
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_body_failure_still_releases() {
        let (lock, store) = lock();
        let result: Result<(), PipelineError> = lock
            .with_lock(
                "order:7",
                Duration::from_secs(10),
                3,
                Duration::from_millis(20),
                || Err(MethodError::new("biz", "boom").into()),
            )
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.as_inner().unwrap().message, "boom");
        // Lock immediately acquirable by another caller
        assert!(!store.is_held("order:7"));
        assert!(lock
            .acquire("order:7", Duration::from_secs(1), 1, Duration::from_millis(1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_stale_release_does_not_clobber_new_holder() {
        let (lock, store) = lock();
        let stale = lock
            .acquire("k", Duration::from_millis(0), 1, Duration::from_millis(1))
            .await
            .unwrap();

        // TTL elapsed; another holder re-acquires the same key
        let fresh = lock
            .acquire("k", Duration::from_secs(30), 1, Duration::from_millis(1))
            .await
            .unwrap();

        lock.release(&stale);
        assert!(store.is_held("k"));
        lock.release(&fresh);
        assert!(!store.is_held("k"));
    }
}
