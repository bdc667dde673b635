/*!
 * Lock Store Protocol
 * Atomic set-if-absent-with-TTL and compare-then-delete primitives
 */

use ahash::RandomState;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Proof of lock ownership; release is guarded by the token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub key: String,
    pub owner_token: Uuid,
    pub expires_at: Instant,
}

/// Shared lock store protocol
///
/// Exactly two atomic commands, mirroring the external KV store: a single
/// set-if-absent-with-expiry (never exists+set as two calls) and a single
/// compare-value-then-delete.
pub trait LockStore: Send + Sync {
    /// Atomically claim `key` for `token` unless a live claim exists.
    /// Returns `true` on success.
    fn set_if_absent(&self, key: &str, token: Uuid, ttl: Duration) -> bool;

    /// Atomically delete `key` only if it is still owned by `token`.
    /// Returns `true` if the entry was removed.
    fn compare_delete(&self, key: &str, token: Uuid) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct StoredClaim {
    token: Uuid,
    expires_at: Instant,
}

/// In-memory reference implementation of the store protocol
///
/// Stands in for the shared KV store in tests and single-process deployments.
/// Expiry is lazy: a dead claim is detected by monotonic-clock comparison at
/// the next access, never by a timer.
pub struct MemoryLockStore {
    claims: DashMap<String, StoredClaim, RandomState>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self {
            claims: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Whether a live (unexpired) claim currently holds the key
    pub fn is_held(&self, key: &str) -> bool {
        self.claims
            .get(key)
            .map(|claim| claim.expires_at > Instant::now())
            .unwrap_or(false)
    }

    /// Drop expired claims; optional housekeeping, not required for correctness
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.claims.len();
        self.claims.retain(|_, claim| claim.expires_at > now);
        before - self.claims.len()
    }
}

impl Default for MemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LockStore for MemoryLockStore {
    fn set_if_absent(&self, key: &str, token: Uuid, ttl: Duration) -> bool {
        let now = Instant::now();
        let claim = StoredClaim {
            token,
            expires_at: now + ttl,
        };
        match self.claims.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at <= now {
                    // Stale claim: TTL already elapsed, the key is free
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
        }
    }

    fn compare_delete(&self, key: &str, token: Uuid) -> bool {
        self.claims
            .remove_if(key, |_, claim| claim.token == token)
            .is_some()
    }
}
