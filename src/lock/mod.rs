/*!
 * Lock Primitives
 * Distributed and process-local mutual exclusion
 */

mod distributed;
mod local;
mod store;

pub use distributed::DistributedLock;
pub use local::LocalLockTable;
pub use store::{LockHandle, LockStore, MemoryLockStore};
