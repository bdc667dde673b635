/*!
 * Execution-Mode Dispatch
 * Terminal stages: coroutine, durable queue, worker-pool task
 */

mod coroutine;
mod queue;
mod task;

pub use coroutine::CoroutineDispatcher;
pub use queue::{
    now_ms, JobState, MemoryQueueStore, QueueConsumer, QueueDispatcher, QueueStore, QueuedJob,
};
pub use task::{TaskJob, WorkerPool};
