/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::InlineString;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stage resolution and setup errors
///
/// These fail fast, before any side effect (no partial lock, no enqueue).
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum StageError {
    #[error("Lock key template names unknown parameter '{parameter}' on {method}")]
    #[diagnostic(
        code(stage::argument_binding),
        help("The key template must name a declared parameter of the method.")
    )]
    ArgumentBinding {
        parameter: InlineString,
        method: InlineString,
    },

    #[error("Argument index {index} out of bounds on {method}")]
    #[diagnostic(
        code(stage::argument_index),
        help("JoinPoint arguments are addressed by declared position.")
    )]
    ArgumentIndex { index: usize, method: InlineString },

    #[error("Conflicting stage descriptors: {0}")]
    #[diagnostic(
        code(stage::conflicting_descriptors),
        help("A method takes at most one transaction, one lock, and one terminal stage.")
    )]
    ConflictingDescriptors(InlineString),

    #[error("No aspect registered under tag '{0}'")]
    #[diagnostic(
        code(stage::unknown_aspect),
        help("Register a factory for this tag on the AspectRegistry before resolving.")
    )]
    UnknownAspect(InlineString),

    #[error("Method {0} not registered")]
    #[diagnostic(
        code(stage::method_not_found),
        help("Register the method body on the MethodRegistry before invoking.")
    )]
    MethodNotFound(InlineString),
}

/// Lock acquisition errors; release failures are logged, never raised
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum LockError {
    #[error("Failed to acquire lock '{key}' after {attempts} attempts")]
    #[diagnostic(
        code(lock::acquisition_failed),
        help("Another holder owns the key. Retries and delays are configured on the descriptor.")
    )]
    AcquisitionFailed { key: String, attempts: u32 },
}

/// Transaction boundary errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum TransactionError {
    #[error("Failed to begin transaction on '{0}'")]
    #[diagnostic(
        code(txn::begin_failed),
        help("Check database connectivity and the configured database name.")
    )]
    BeginFailed(InlineString),

    #[error("Commit failed: {0}")]
    #[diagnostic(code(txn::commit_failed), help("The unit of work was not persisted."))]
    CommitFailed(InlineString),

    #[error("Rollback failed: {0}")]
    #[diagnostic(
        code(txn::rollback_failed),
        help("The session may be left in an inconsistent state.")
    )]
    RollbackFailed(InlineString),

    #[error("Session timeout operation failed: {0}")]
    #[diagnostic(
        code(txn::session_timeout),
        help("Reading or overriding the session lock-wait timeout failed.")
    )]
    SessionTimeout(InlineString),
}

/// Queue dispatch errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum QueueError {
    #[error("Argument {index} of {method} is not serializable")]
    #[diagnostic(
        code(queue::not_serializable),
        help("Queued jobs carry data only. Opaque handles cannot cross the queue boundary.")
    )]
    NotSerializable { method: InlineString, index: usize },

    #[error("Queued job {0} not found")]
    #[diagnostic(
        code(queue::job_not_found),
        help("The job may already be consumed, cancelled, or acknowledged.")
    )]
    JobNotFound(InlineString),

    #[error("Queue store rejected the job: {0}")]
    #[diagnostic(code(queue::store_rejected), help("Check queue store capacity and state."))]
    StoreRejected(InlineString),
}

/// A business-level failure raised by a method body or aspect hook
///
/// Propagated through the pipeline by value, never rewrapped: callers observe
/// the same kind and message the business code produced.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[error("{message}")]
pub struct MethodError {
    pub kind: InlineString,
    pub message: String,
}

impl MethodError {
    pub fn new(kind: impl Into<InlineString>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Unified pipeline error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum PipelineError {
    #[error("Stage error: {0}")]
    #[diagnostic(transparent)]
    Stage(#[from] StageError),

    #[error("Lock error: {0}")]
    #[diagnostic(transparent)]
    Lock(#[from] LockError),

    #[error("Transaction error: {0}")]
    #[diagnostic(transparent)]
    Transaction(#[from] TransactionError),

    #[error("Queue error: {0}")]
    #[diagnostic(transparent)]
    Queue(#[from] QueueError),

    // Business failures pass through unmodified in kind and message
    #[error(transparent)]
    #[diagnostic(transparent)]
    Inner(#[from] MethodError),

    #[error("Dispatch failed: {0}")]
    #[diagnostic(
        code(pipeline::dispatch_failed),
        help("The execution substrate rejected the hand-off. Check worker pool state.")
    )]
    Dispatch(InlineString),
}

impl PipelineError {
    /// The business failure carried by this error, if it is one
    pub fn as_inner(&self) -> Option<&MethodError> {
        match self {
            PipelineError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
