/*!
 * Continuation Pipeline Executor
 * Resolves the stage plan and runs or redirects one call
 */

use super::outcome::{Dispatch, Outcome};
use crate::aspect::{run_lifecycle, Aspect, AspectRegistry, JoinPoint};
use crate::context::ExecutionContext;
use crate::core::errors::{Result, StageError};
use crate::core::types::InlineString;
use crate::dispatch::{CoroutineDispatcher, QueueDispatcher, WorkerPool};
use crate::lock::{DistributedLock, LocalLockTable};
use crate::method::{MethodRegistry, MethodSpec};
use crate::stage::{derive_lock_key, LockDesc, StagePlan, StageRegistry, TerminalDesc};
use crate::txn::{run_in_transaction, Database};
use log::trace;
use std::sync::Arc;
use std::time::Duration;

/// Drives one intercepted call through its resolved stage plan.
///
/// Empty plan: direct call, behaviorally identical to not intercepting.
/// Terminal stage: redirect to the chosen substrate and return a sentinel;
/// the body never runs synchronously in the caller's flow. Otherwise the
/// nesting is lock (outermost) -> aspect lifecycle -> transaction (innermost)
/// -> inner call.
pub struct PipelineExecutor {
    stages: Arc<StageRegistry>,
    methods: Arc<MethodRegistry>,
    aspects: Arc<AspectRegistry>,
    database: Arc<dyn Database>,
    distributed_lock: DistributedLock,
    local_locks: Arc<LocalLockTable>,
    queue: QueueDispatcher,
    workers: Arc<WorkerPool>,
    coroutines: CoroutineDispatcher,
}

impl PipelineExecutor {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        stages: Arc<StageRegistry>,
        methods: Arc<MethodRegistry>,
        aspects: Arc<AspectRegistry>,
        database: Arc<dyn Database>,
        distributed_lock: DistributedLock,
        local_locks: Arc<LocalLockTable>,
        queue: QueueDispatcher,
        workers: Arc<WorkerPool>,
        coroutines: CoroutineDispatcher,
    ) -> Self {
        Self {
            stages,
            methods,
            aspects,
            database,
            distributed_lock,
            local_locks,
            queue,
            workers,
            coroutines,
        }
    }

    pub fn stages(&self) -> &Arc<StageRegistry> {
        &self.stages
    }

    pub fn methods(&self) -> &Arc<MethodRegistry> {
        &self.methods
    }

    pub fn queue(&self) -> &QueueDispatcher {
        &self.queue
    }

    pub fn local_locks(&self) -> &Arc<LocalLockTable> {
        &self.local_locks
    }

    /// Run one call through its stage plan
    pub async fn invoke(&self, mut ctx: ExecutionContext) -> Result<Outcome> {
        let plan = self.stages.resolve(ctx.method())?;
        let spec = self.methods.get(ctx.method()).ok_or_else(|| {
            StageError::MethodNotFound(InlineString::from(ctx.method().to_string().as_str()))
        })?;

        // Fast path: nothing attached, plain direct call
        if plan.is_empty() {
            trace!("{}: empty plan, direct call", ctx.method());
            let mut jp = JoinPoint::with_context(
                ctx.target().clone(),
                Arc::clone(&spec),
                ctx.take_args(),
                ctx.full_snapshot(),
            );
            return spec
                .invoke(&mut jp)
                .map(Outcome::Value)
                .map_err(Into::into);
        }

        if let Some(terminal) = &plan.terminal {
            return self.dispatch_terminal(terminal, ctx);
        }

        // Setup failures (unknown aspect tag, key-binding errors) surface
        // here, before any lock is taken or transaction begun.
        let aspects = self.instantiate_aspects(&plan)?;

        match &plan.lock {
            Some(lock) => {
                let key = derive_lock_key(lock, ctx.method(), spec.params(), ctx.args())?;
                self.run_locked(lock, &key, &plan, &aspects, spec, ctx).await
            }
            None => self.run_stages(&plan, &aspects, spec, ctx),
        }
    }

    fn instantiate_aspects(&self, plan: &StagePlan) -> Result<Vec<Arc<dyn Aspect>>> {
        plan.aspects
            .iter()
            .map(|desc| {
                self.aspects
                    .instantiate(&desc.tag, &desc.config)
                    .map_err(Into::into)
            })
            .collect()
    }

    async fn run_locked(
        &self,
        lock: &LockDesc,
        key: &str,
        plan: &StagePlan,
        aspects: &[Arc<dyn Aspect>],
        spec: Arc<MethodSpec>,
        ctx: ExecutionContext,
    ) -> Result<Outcome> {
        let ttl = Duration::from_millis(lock.ttl_ms);
        let retry_delay = Duration::from_millis(lock.retry_delay_ms);
        if lock.distributed {
            self.distributed_lock
                .with_lock(key, ttl, lock.retry_count, retry_delay, || {
                    self.run_stages(plan, aspects, spec, ctx)
                })
                .await
        } else {
            let acquire_timeout = lock.acquire_timeout_ms.map(Duration::from_millis);
            self.local_locks
                .with_lock(key, ttl, acquire_timeout, lock.retry_count, retry_delay, || {
                    self.run_stages(plan, aspects, spec, ctx)
                })
                .await
        }
    }

    /// Aspect lifecycle around the (optionally transactional) inner call
    fn run_stages(
        &self,
        plan: &StagePlan,
        aspects: &[Arc<dyn Aspect>],
        spec: Arc<MethodSpec>,
        mut ctx: ExecutionContext,
    ) -> Result<Outcome> {
        let mut jp = JoinPoint::with_context(
            ctx.target().clone(),
            Arc::clone(&spec),
            ctx.take_args(),
            ctx.full_snapshot(),
        );

        let result = run_lifecycle(aspects, &mut jp, |jp| match &plan.transaction {
            // Transaction sits innermost: an around short-circuit never opens one
            Some(txn) => run_in_transaction(&*self.database, txn, || {
                spec.invoke(jp).map_err(Into::into)
            }),
            None => spec.invoke(jp).map_err(Into::into),
        })?;

        Ok(Outcome::Value(result))
    }

    fn dispatch_terminal(
        &self,
        terminal: &TerminalDesc,
        mut ctx: ExecutionContext,
    ) -> Result<Outcome> {
        match terminal {
            TerminalDesc::Queue(desc) => {
                let job_id = self.queue.enqueue(desc, ctx.method(), ctx.args())?;
                trace!("{}: queued as {}", ctx.method(), job_id);
                Ok(Outcome::Dispatched(Dispatch::Queued { job_id }))
            }
            TerminalDesc::Task(desc) => {
                let inline = self.workers.dispatch(
                    desc,
                    ctx.is_worker(),
                    ctx.method().clone(),
                    ctx.take_args(),
                )?;
                Ok(Outcome::Dispatched(Dispatch::Task { inline }))
            }
            TerminalDesc::Coroutine(desc) => {
                let snapshot = ctx.snapshot();
                let method = ctx.method().clone();
                self.coroutines
                    .spawn(desc, snapshot, method, ctx.take_args())?;
                Ok(Outcome::Dispatched(Dispatch::Coroutine {
                    name: desc.name.clone(),
                }))
            }
        }
    }
}
