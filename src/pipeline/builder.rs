/*!
 * Pipeline Builder
 * Wires registries, stores, and substrates into an executor
 */

use super::executor::PipelineExecutor;
use crate::aspect::AspectRegistry;
use crate::dispatch::{CoroutineDispatcher, MemoryQueueStore, QueueDispatcher, WorkerPool};
use crate::lock::{DistributedLock, LocalLockTable, LockStore, MemoryLockStore};
use crate::method::MethodRegistry;
use crate::stage::StageRegistry;
use crate::txn::{Database, MemoryDatabase};
use crate::dispatch::QueueStore;
use std::sync::Arc;

/// Builder over the executor's collaborators
///
/// Every collaborator defaults to its in-memory reference implementation, so
/// a bare `PipelineBuilder::new().build()` is fully functional in one process.
/// Production deployments swap in real `LockStore`, `QueueStore`, and
/// `Database` implementations.
pub struct PipelineBuilder {
    stages: Arc<StageRegistry>,
    methods: Arc<MethodRegistry>,
    aspects: Arc<AspectRegistry>,
    database: Option<Arc<dyn Database>>,
    lock_store: Option<Arc<dyn LockStore>>,
    queue_store: Option<Arc<dyn QueueStore>>,
    worker_count: usize,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            stages: Arc::new(StageRegistry::new()),
            methods: Arc::new(MethodRegistry::new()),
            aspects: Arc::new(AspectRegistry::new()),
            database: None,
            lock_store: None,
            queue_store: None,
            worker_count: 0,
        }
    }

    pub fn stages(mut self, stages: Arc<StageRegistry>) -> Self {
        self.stages = stages;
        self
    }

    pub fn methods(mut self, methods: Arc<MethodRegistry>) -> Self {
        self.methods = methods;
        self
    }

    pub fn aspects(mut self, aspects: Arc<AspectRegistry>) -> Self {
        self.aspects = aspects;
        self
    }

    pub fn database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn lock_store(mut self, store: Arc<dyn LockStore>) -> Self {
        self.lock_store = Some(store);
        self
    }

    pub fn queue_store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.queue_store = Some(store);
        self
    }

    /// Number of task workers to spawn at build time
    pub fn workers(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn build(self) -> PipelineExecutor {
        let database = self
            .database
            .unwrap_or_else(|| Arc::new(MemoryDatabase::new()));
        let lock_store = self
            .lock_store
            .unwrap_or_else(|| Arc::new(MemoryLockStore::new()));
        let queue_store = self
            .queue_store
            .unwrap_or_else(|| Arc::new(MemoryQueueStore::new()));

        let workers = Arc::new(WorkerPool::new(Arc::clone(&self.methods)));
        if self.worker_count > 0 {
            workers.spawn_workers(self.worker_count);
        }

        PipelineExecutor::new(
            self.stages,
            Arc::clone(&self.methods),
            self.aspects,
            database,
            DistributedLock::new(lock_store),
            Arc::new(LocalLockTable::new()),
            QueueDispatcher::new(queue_store),
            workers,
            CoroutineDispatcher::new(self.methods),
        )
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
