/*!
 * Process-Local Lock Table
 * In-process mutual exclusion with acquire timeout and lazy TTL expiry
 */

use super::store::LockHandle;
use crate::core::errors::{LockError, PipelineError};
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, warn};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How often a blocked acquirer re-checks the table
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
struct LocalClaim {
    token: Uuid,
    expires_at: Instant,
}

/// In-process lock table with the same outer shape as the distributed lock
///
/// Adds an acquire timeout distinct from TTL: a blocked caller polls in a
/// bounded loop until the key frees up or the timeout elapses. A stuck holder
/// cannot deadlock the table: TTL expiry is checked by monotonic-clock
/// comparison at every access, so an expired claim is simply overwritten.
/// Token comparison on release keeps a late cleanup from clobbering a key
/// re-acquired under the same name.
pub struct LocalLockTable {
    claims: DashMap<String, LocalClaim, RandomState>,
}

impl LocalLockTable {
    pub fn new() -> Self {
        Self {
            claims: DashMap::with_hasher(RandomState::new()),
        }
    }

    fn try_acquire(&self, key: &str, ttl: Duration) -> Option<LockHandle> {
        let now = Instant::now();
        let claim = LocalClaim {
            token: Uuid::new_v4(),
            expires_at: now + ttl,
        };
        let claimed = match self.claims.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at <= now {
                    occupied.insert(claim);
                    true
                } else {
                    false
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(claim);
                true
            }
        };
        claimed.then(|| LockHandle {
            key: key.to_string(),
            owner_token: claim.token,
            expires_at: claim.expires_at,
        })
    }

    /// One bounded acquire attempt: poll until acquired or the timeout elapses
    async fn acquire_within(
        &self,
        key: &str,
        ttl: Duration,
        acquire_timeout: Option<Duration>,
    ) -> Option<LockHandle> {
        let deadline = acquire_timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(handle) = self.try_acquire(key, ttl) {
                return Some(handle);
            }
            match deadline {
                Some(deadline) if Instant::now() + POLL_INTERVAL < deadline => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                _ => return None,
            }
        }
    }

    /// Up to `retry_count` bounded attempts with a fixed delay between them
    pub async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        acquire_timeout: Option<Duration>,
        retry_count: u32,
        retry_delay: Duration,
    ) -> Result<LockHandle, LockError> {
        let attempts = retry_count.max(1);
        for attempt in 0..attempts {
            if let Some(handle) = self.acquire_within(key, ttl, acquire_timeout).await {
                debug!("Acquired local lock '{}' on attempt {}", key, attempt + 1);
                return Ok(handle);
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

    /// Release by owner token; mismatches are logged and ignored
    pub fn release(&self, handle: &LockHandle) {
        let removed = self
            .claims
            .remove_if(&handle.key, |_, claim| claim.token == handle.owner_token)
            .is_some();
        if !removed {
            warn!(
                "Local lock '{}' no longer owned at release (TTL expiry or re-acquisition)",
                handle.key
            );
        }
    }

    /// Whether a live claim currently holds the key
    pub fn is_locked(&self, key: &str) -> bool {
        self.claims
            .get(key)
            .map(|claim| claim.expires_at > Instant::now())
            .unwrap_or(false)
    }

    /// Optional background sweep; lazy expiry already guarantees progress
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.claims.len();
        self.claims.retain(|_, claim| claim.expires_at > now);
        before - self.claims.len()
    }

    /// Acquire, run `body`, release on both success and failure paths
    pub async fn with_lock<T, F>(
        &self,
        key: &str,
        ttl: Duration,
        acquire_timeout: Option<Duration>,
        retry_count: u32,
        retry_delay: Duration,
        body: F,
    ) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Result<T, PipelineError>,
    {
        let handle = self
            .acquire(key, ttl, acquire_timeout, retry_count, retry_delay)
            .await?;
        let result = body();
        self.release(&handle);
        result
    }
}

impl Default for LocalLockTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_caller_blocked_then_acquires() {
        let table = LocalLockTable::new();
        let first = table
            .acquire("k", Duration::from_secs(30), None, 1, Duration::from_millis(1))
            .await
            .unwrap();

        // Immediate attempt fails while held
        assert!(table.try_acquire("k", Duration::from_secs(30)).is_none());

        table.release(&first);
        assert!(table.try_acquire("k", Duration::from_secs(30)).is_some());
    }

    #[tokio::test]
    async fn test_acquire_timeout_bounds_the_wait() {
        let table = LocalLockTable::new();
        let _held = table.try_acquire("k", Duration::from_secs(30)).unwrap();

        let start = Instant::now();
        let result = table
            .acquire(
                "k",
                Duration::from_secs(30),
                Some(Duration::from_millis(60)),
                1,
                Duration::from_millis(1),
            )
            .await;
        assert!(result.is_err());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(40));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_expired_never_released_lock_is_reusable() {
        let table = LocalLockTable::new();
        // Holder "gets stuck": never releases, TTL is the only way out
        let _stuck = table.try_acquire("k", Duration::from_millis(20)).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!table.is_locked("k"));
        assert!(table.try_acquire("k", Duration::from_secs(5)).is_some());
    }

    #[tokio::test]
    async fn test_stale_release_does_not_clobber_new_holder() {
        let table = LocalLockTable::new();
        let stale = table.try_acquire("k", Duration::from_millis(0)).unwrap();
        let fresh = table.try_acquire("k", Duration::from_secs(30)).unwrap();

        table.release(&stale);
        assert!(table.is_locked("k"));
        table.release(&fresh);
        assert!(!table.is_locked("k"));
    }

    #[tokio::test]
    async fn test_waiting_caller_proceeds_after_release() {
        use std::sync::Arc;
        let table = Arc::new(LocalLockTable::new());
        let held = table.try_acquire("k", Duration::from_secs(30)).unwrap();

        let waiter = {
            let table = Arc::clone(&table);
            tokio::spawn(async move {
                table
                    .acquire(
                        "k",
                        Duration::from_secs(30),
                        Some(Duration::from_secs(2)),
                        1,
                        Duration::from_millis(1),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        table.release(&held);

        let handle = waiter.await.unwrap().unwrap();
        table.release(&handle);
    }

    #[test]
    fn test_sweep_counts_expired() {
        let table = LocalLockTable::new();
        table.try_acquire("dead", Duration::from_millis(0));
        table.try_acquire("live", Duration::from_secs(60));
        assert_eq!(table.sweep(), 1);
        assert!(table.is_locked("live"));
    }
}
