/*!
 * Stage Descriptors
 * Declarative metadata attached to an intercepted method
 */

use crate::aspect::AspectConfig;
use crate::core::types::InlineString;
use crate::txn::IsolationLevel;
use serde::{Deserialize, Serialize};

/// One cross-cutting behavior attached to a method call
///
/// Descriptors are pure data: resolved once per method, cached for process
/// lifetime, safe to construct twice in a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// Ordering among outer stages (lock/transaction/terminal). The aspect
    /// lifecycle keeps declaration order and ignores priority.
    pub priority: i32,
    /// Whether the stage redirects execution off the caller's coroutine.
    /// Terminal stages are inherently asynchronous.
    pub asynchronous: bool,
    pub kind: StageKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageKind {
    Aspect(AspectDesc),
    Transaction(TransactionDesc),
    Lock(LockDesc),
    Queue(QueueDesc),
    Task(TaskDesc),
    Coroutine(CoroutineDesc),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectDesc {
    pub tag: InlineString,
    #[serde(default)]
    pub config: AspectConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDesc {
    pub db_name: InlineString,
    pub isolation: Option<IsolationLevel>,
    /// Session lock-wait timeout override, restored after the transaction
    pub timeout_secs: Option<u64>,
    pub log_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockDesc {
    /// Shared-store lock vs process-local table
    pub distributed: bool,
    /// Declared parameter whose scalar value becomes the key suffix
    pub key_template: Option<InlineString>,
    pub ttl_ms: u64,
    /// Bounded acquire polling; process-local locks only
    pub acquire_timeout_ms: Option<u64>,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDesc {
    pub delay_secs: u64,
    pub max_retry: u32,
    pub retry_intervals_secs: Vec<u64>,
    /// Remove pending jobs sharing the dedupe key before enqueueing
    pub clear_prior_copies: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDesc {
    /// Monitoring hint only; long-running work is flagged, not cancelled
    pub timeout_secs: Option<u64>,
    pub name: InlineString,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoroutineDesc {
    pub name: InlineString,
}

impl StageDescriptor {
    pub fn aspect(tag: impl Into<InlineString>, config: AspectConfig) -> Self {
        Self {
            priority: 0,
            asynchronous: false,
            kind: StageKind::Aspect(AspectDesc {
                tag: tag.into(),
                config,
            }),
        }
    }

    pub fn transaction(desc: TransactionDesc) -> Self {
        Self {
            priority: 0,
            asynchronous: false,
            kind: StageKind::Transaction(desc),
        }
    }

    pub fn lock(desc: LockDesc) -> Self {
        Self {
            priority: 0,
            asynchronous: false,
            kind: StageKind::Lock(desc),
        }
    }

    pub fn queue(desc: QueueDesc) -> Self {
        Self {
            priority: 0,
            asynchronous: true,
            kind: StageKind::Queue(desc),
        }
    }

    pub fn task(desc: TaskDesc) -> Self {
        Self {
            priority: 0,
            asynchronous: true,
            kind: StageKind::Task(desc),
        }
    }

    pub fn coroutine(desc: CoroutineDesc) -> Self {
        Self {
            priority: 0,
            asynchronous: true,
            kind: StageKind::Coroutine(desc),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for TransactionDesc {
    fn default() -> Self {
        Self {
            db_name: "default".into(),
            isolation: None,
            timeout_secs: None,
            log_enabled: false,
        }
    }
}

impl Default for LockDesc {
    fn default() -> Self {
        Self {
            distributed: false,
            key_template: None,
            ttl_ms: 3_000,
            acquire_timeout_ms: None,
            retry_count: 3,
            retry_delay_ms: 200,
        }
    }
}

impl Default for QueueDesc {
    fn default() -> Self {
        Self {
            delay_secs: 0,
            max_retry: 0,
            retry_intervals_secs: Vec::new(),
            clear_prior_copies: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_descriptors_are_asynchronous() {
        assert!(StageDescriptor::queue(QueueDesc::default()).asynchronous);
        assert!(StageDescriptor::task(TaskDesc {
            timeout_secs: None,
            name: "t".into()
        })
        .asynchronous);
        assert!(StageDescriptor::coroutine(CoroutineDesc { name: "c".into() }).asynchronous);
        assert!(!StageDescriptor::transaction(TransactionDesc::default()).asynchronous);
    }

    #[test]
    fn test_descriptor_serde() {
        let desc = StageDescriptor::lock(LockDesc {
            distributed: true,
            key_template: Some("order_id".into()),
            ttl_ms: 5_000,
            acquire_timeout_ms: None,
            retry_count: 3,
            retry_delay_ms: 200,
        })
        .with_priority(10);

        let json = serde_json::to_string(&desc).unwrap();
        let back: StageDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(desc, back);
    }
}
