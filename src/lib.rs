/*!
 * Crosscut
 * Attribute-driven method interception and execution dispatch
 *
 * An ordinary registered method can acquire a lock, run inside a database
 * transaction, emit before/around/after/afterThrowing aspect events, or be
 * rerouted to an asynchronous substrate (in-process coroutine, durable retry
 * queue, worker-process pool) without its body branching on any of it.
 * Behavior is attached declaratively as stage descriptors, resolved once per
 * method, and cached for the process lifetime.
 */

pub mod aspect;
pub mod context;
pub mod core;
pub mod dispatch;
pub mod lock;
pub mod method;
pub mod pipeline;
pub mod stage;
pub mod txn;

// Re-exports
pub use aspect::{Aspect, AspectConfig, AspectRegistry, JoinPoint};
pub use context::{ContextSnapshot, ExecutionContext, TargetRef};
pub use crate::core::errors::{
    LockError, MethodError, PipelineError, QueueError, Result, StageError, TransactionError,
};
pub use crate::core::types::{InlineString, MethodId, OpaqueRef, Value};
pub use dispatch::{QueueConsumer, QueueDispatcher, QueueStore, QueuedJob, WorkerPool};
pub use lock::{DistributedLock, LocalLockTable, LockHandle, LockStore};
pub use method::MethodRegistry;
pub use pipeline::{Dispatch, Outcome, PipelineBuilder, PipelineExecutor};
pub use stage::{StageDescriptor, StageRegistry};
pub use txn::{Database, IsolationLevel};
