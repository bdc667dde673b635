/*!
 * Pipeline Outcome
 * Result value or mode-specific dispatch sentinel
 */

use crate::core::types::{InlineString, Value};
use uuid::Uuid;

/// Where a terminal stage redirected the call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Scheduled on an in-process cooperative task; fire-and-forget
    Coroutine { name: InlineString },
    /// Appended to the durable queue; cancellable by id before consumption
    Queued { job_id: Uuid },
    /// Handed to the worker pool, or run inline when the caller was a worker
    Task { inline: bool },
}

/// What `invoke` produced: a real result, or proof that the call was
/// redirected and the body will not run in the caller's flow
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Value),
    Dispatched(Dispatch),
}

impl Outcome {
    pub fn value(self) -> Option<Value> {
        match self {
            Outcome::Value(v) => Some(v),
            Outcome::Dispatched(_) => None,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, Outcome::Dispatched(_))
    }

    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            Outcome::Dispatched(Dispatch::Queued { job_id }) => Some(*job_id),
            _ => None,
        }
    }
}
