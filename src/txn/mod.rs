/*!
 * Transaction Boundary
 * Database collaborator traits and the commit/rollback wrapper
 */

use crate::core::errors::{PipelineError, TransactionError};
use crate::core::types::InlineString;
use crate::stage::TransactionDesc;
use log::{debug, error, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// One open transaction on a session
pub trait TransactionHandle: Send {
    fn commit(self: Box<Self>) -> Result<(), TransactionError>;
    fn rollback(self: Box<Self>) -> Result<(), TransactionError>;

    /// Current session lock-wait timeout in seconds
    fn lock_wait_timeout(&self) -> Result<u64, TransactionError>;
    fn set_lock_wait_timeout(&mut self, secs: u64) -> Result<(), TransactionError>;
}

/// Transactional database collaborator
pub trait Database: Send + Sync {
    fn begin(
        &self,
        db_name: &str,
        isolation: Option<IsolationLevel>,
    ) -> Result<Box<dyn TransactionHandle>, TransactionError>;
}

/// Wrap `body` in a transaction: begin, execute, commit on Ok, rollback and
/// re-propagate on Err.
///
/// A configured lock-wait-timeout override reads the original session value
/// once, overrides it, and restores it afterwards; restoration failures are
/// logged only. A rollback failure is likewise logged so it never masks the
/// primary error.
pub fn run_in_transaction<T, F>(
    db: &dyn Database,
    desc: &TransactionDesc,
    body: F,
) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError>,
{
    let mut tx = db.begin(&desc.db_name, desc.isolation)?;

    let saved_timeout = match desc.timeout_secs {
        Some(override_secs) => {
            let original = tx.lock_wait_timeout()?;
            if let Err(e) = tx.set_lock_wait_timeout(override_secs) {
                if let Err(re) = tx.rollback() {
                    error!("Rollback after timeout-override failure also failed: {}", re);
                }
                return Err(e.into());
            }
            Some(original)
        }
        None => None,
    };

    let result = body();

    if let Some(original) = saved_timeout {
        if let Err(e) = tx.set_lock_wait_timeout(original) {
            warn!("Failed to restore session lock-wait timeout: {}", e);
        }
    }

    match result {
        Ok(value) => {
            tx.commit()?;
            if desc.log_enabled {
                debug!("Transaction on '{}' committed", desc.db_name);
            }
            Ok(value)
        }
        Err(primary) => {
            if let Err(e) = tx.rollback() {
                error!("Rollback on '{}' failed: {}", desc.db_name, e);
            } else if desc.log_enabled {
                debug!("Transaction on '{}' rolled back", desc.db_name);
            }
            Err(primary)
        }
    }
}

/// Recorded transaction event, for assertions and auditing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnEvent {
    Begin(InlineString),
    SetTimeout(u64),
    Commit,
    Rollback,
}

/// Recording in-memory database, the reference `Database` implementation
///
/// Stands in for the real transactional handle in tests and examples; records
/// every boundary event and supports commit-failure injection.
pub struct MemoryDatabase {
    events: Arc<Mutex<Vec<TxnEvent>>>,
    session_timeout: Arc<AtomicU64>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            session_timeout: Arc::new(AtomicU64::new(50)),
            fail_next_commit: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn events(&self) -> Vec<TxnEvent> {
        self.events.lock().clone()
    }

    pub fn session_timeout(&self) -> u64 {
        self.session_timeout.load(Ordering::SeqCst)
    }

    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryDatabase {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
            session_timeout: Arc::clone(&self.session_timeout),
            fail_next_commit: Arc::clone(&self.fail_next_commit),
        }
    }
}

struct MemoryTransaction {
    events: Arc<Mutex<Vec<TxnEvent>>>,
    session_timeout: Arc<AtomicU64>,
    fail_commit: bool,
}

impl TransactionHandle for MemoryTransaction {
    fn commit(self: Box<Self>) -> Result<(), TransactionError> {
        if self.fail_commit {
            return Err(TransactionError::CommitFailed("injected failure".into()));
        }
        self.events.lock().push(TxnEvent::Commit);
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
        self.events.lock().push(TxnEvent::Rollback);
        Ok(())
    }

    fn lock_wait_timeout(&self) -> Result<u64, TransactionError> {
        Ok(self.session_timeout.load(Ordering::SeqCst))
    }

    fn set_lock_wait_timeout(&mut self, secs: u64) -> Result<(), TransactionError> {
        self.session_timeout.store(secs, Ordering::SeqCst);
        self.events.lock().push(TxnEvent::SetTimeout(secs));
        Ok(())
    }
}

impl Database for MemoryDatabase {
    fn begin(
        &self,
        db_name: &str,
        _isolation: Option<IsolationLevel>,
    ) -> Result<Box<dyn TransactionHandle>, TransactionError> {
        self.events
            .lock()
            .push(TxnEvent::Begin(InlineString::from(db_name)));
        Ok(Box::new(MemoryTransaction {
            events: Arc::clone(&self.events),
            session_timeout: Arc::clone(&self.session_timeout),
            fail_commit: self.fail_next_commit.swap(false, Ordering::SeqCst),
        }))
    }
}
