/*!
 * Stage Module
 * Descriptors, resolution cache, and lock-key derivation
 */

mod descriptor;
mod key;
mod resolver;

pub use descriptor::{
    AspectDesc, CoroutineDesc, LockDesc, QueueDesc, StageDescriptor, StageKind, TaskDesc,
    TransactionDesc,
};
pub use key::derive_lock_key;
pub use resolver::{PlanStats, StagePlan, StageRegistry, TerminalDesc};
