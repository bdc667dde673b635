/*!
 * Core Module
 * Shared types and error taxonomy
 */

pub mod errors;
pub mod types;

pub use errors::{
    LockError, MethodError, PipelineError, QueueError, Result, StageError, TransactionError,
};
pub use types::{InlineString, MethodId, OpaqueRef, Value};
