/*!
 * Task Dispatch
 * Worker-pool hand-off over a message channel
 */

use crate::aspect::JoinPoint;
use crate::context::TargetRef;
use crate::core::errors::PipelineError;
use crate::core::types::{InlineString, MethodId, Value};
use crate::method::MethodRegistry;
use crate::stage::TaskDesc;
use log::{debug, error, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One forwarded call
#[derive(Debug, Clone)]
pub struct TaskJob {
    pub method: MethodId,
    pub args: Vec<Value>,
    /// Monitoring hint: long-running work is flagged in the log, not cancelled
    pub timeout: Option<Duration>,
    pub name: InlineString,
}

/// Pool of worker tasks draining a shared dispatch channel
///
/// Callers already running inside a worker execute inline instead of
/// forwarding, so a worker can never deadlock waiting on its own pool.
pub struct WorkerPool {
    tx: flume::Sender<TaskJob>,
    rx: flume::Receiver<TaskJob>,
    methods: Arc<MethodRegistry>,
    workers: parking_lot::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(methods: Arc<MethodRegistry>) -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            methods,
            workers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Spawn `count` workers draining the channel
    pub fn spawn_workers(&self, count: usize) {
        let mut workers = self.workers.lock();
        for index in 0..count {
            let rx = self.rx.clone();
            let methods = Arc::clone(&self.methods);
            workers.push(tokio::spawn(async move {
                debug!("Task worker {} started", index);
                while let Ok(job) = rx.recv_async().await {
                    Self::execute(&methods, job);
                }
                debug!("Task worker {} stopped", index);
            }));
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Hand a call to the pool, or run it inline when the caller is itself a
    /// worker. Fire-and-forget either way; the result is never observable.
    pub fn dispatch(
        &self,
        desc: &TaskDesc,
        caller_is_worker: bool,
        method: MethodId,
        args: Vec<Value>,
    ) -> Result<bool, PipelineError> {
        let job = TaskJob {
            method,
            args,
            timeout: desc.timeout_secs.map(Duration::from_secs),
            name: desc.name.clone(),
        };
        if caller_is_worker {
            debug!("Caller is a worker, executing task '{}' inline", job.name);
            Self::execute(&self.methods, job);
            return Ok(true);
        }
        self.tx
            .send(job)
            .map_err(|_| PipelineError::Dispatch("worker channel closed".into()))?;
        Ok(false)
    }

    fn execute(methods: &MethodRegistry, job: TaskJob) {
        let Some(spec) = methods.get(&job.method) else {
            error!("Task '{}' references unknown method {}", job.name, job.method);
            return;
        };
        let started = Instant::now();
        let mut jp = JoinPoint::new(TargetRef::Static, spec.clone(), job.args);
        if let Err(e) = spec.invoke(&mut jp) {
            error!("Task '{}' ({}) failed: {}", job.name, job.method, e);
        }
        if let Some(timeout) = job.timeout {
            let elapsed = started.elapsed();
            if elapsed > timeout {
                warn!(
                    "Task '{}' ({}) ran {:?}, exceeding its {:?} hint",
                    job.name, job.method, elapsed, timeout
                );
            }
        }
    }

    /// Stop accepting work and abort the workers
    pub fn shutdown(&self) {
        for worker in self.workers.lock().drain(..) {
            worker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn counted_registry() -> (Arc<MethodRegistry>, MethodId, Arc<Mutex<Vec<i64>>>) {
        let methods = Arc::new(MethodRegistry::new());
        let method = MethodId::new("Job", "crunch");
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            methods.register(method.clone(), &["n"], move |jp| {
                if let Some(Value::Int(n)) = jp.arg(0) {
                    seen.lock().push(*n);
                }
                Ok(Value::Null)
            });
        }
        (methods, method, seen)
    }

    fn desc() -> TaskDesc {
        TaskDesc {
            timeout_secs: None,
            name: "crunch".into(),
        }
    }

    #[tokio::test]
    async fn test_forwarded_job_runs_on_worker() {
        let (methods, method, seen) = counted_registry();
        let pool = WorkerPool::new(Arc::clone(&methods));
        pool.spawn_workers(2);

        let inline = pool
            .dispatch(&desc(), false, method, vec![Value::Int(7)])
            .unwrap();
        assert!(!inline);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock(), vec![7]);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_worker_caller_executes_inline() {
        let (methods, method, seen) = counted_registry();
        let pool = WorkerPool::new(Arc::clone(&methods));
        // No workers spawned: a forwarded job would never run

        let inline = pool
            .dispatch(&desc(), true, method, vec![Value::Int(9)])
            .unwrap();
        assert!(inline);
        assert_eq!(*seen.lock(), vec![9]);
    }

    #[tokio::test]
    async fn test_unknown_method_is_logged_not_fatal() {
        let methods = Arc::new(MethodRegistry::new());
        let pool = WorkerPool::new(methods);
        let result = pool.dispatch(
            &desc(),
            true,
            MethodId::new("Ghost", "run"),
            vec![],
        );
        assert!(result.is_ok());
    }
}
