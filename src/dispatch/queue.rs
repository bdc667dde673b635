/*!
 * Queue Dispatch
 * Durable retry queue: serialized jobs, dedupe-replace, bounded backoff
 */

use crate::aspect::JoinPoint;
use crate::context::TargetRef;
use crate::core::errors::{PipelineError, QueueError};
use crate::core::types::{InlineString, MethodId, Value};
use crate::method::MethodRegistry;
use crate::stage::QueueDesc;
use ahash::RandomState;
use dashmap::DashMap;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Fallback backoff when a job has fewer configured intervals than retries
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 60;

/// Wall-clock milliseconds since the epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for its eligible time
    Pending,
    /// Claimed by a consumer
    InFlight,
    /// Consumed and acknowledged
    Done,
    /// Retries exhausted; kept, never silently dropped
    Failed,
}

/// One durable job: pure data, serializable end to end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    pub method: MethodId,
    pub args: Vec<serde_json::Value>,
    /// Earliest eligible wall-clock time, epoch millis
    pub execute_at_ms: u64,
    /// Retries already scheduled (0 on first delivery)
    pub attempt: u32,
    pub max_retry: u32,
    pub retry_intervals_secs: Vec<u64>,
    pub dedupe_key: Option<String>,
    pub state: JobState,
}

impl QueuedJob {
    /// Backoff for the retry after `attempt` failures
    fn retry_interval_secs(&self, attempt: u32) -> u64 {
        self.retry_intervals_secs
            .get(attempt as usize)
            .or_else(|| self.retry_intervals_secs.last())
            .copied()
            .unwrap_or(DEFAULT_RETRY_INTERVAL_SECS)
    }
}

/// Durable queue store protocol
pub trait QueueStore: Send + Sync {
    fn append(&self, job: QueuedJob) -> Result<(), QueueError>;

    /// Claim every pending job whose eligible time has passed
    fn poll_due(&self, now_ms: u64) -> Vec<QueuedJob>;

    /// Remove pending jobs sharing the dedupe key; returns how many
    fn delete_by_dedupe(&self, dedupe_key: &str) -> usize;

    fn ack(&self, id: Uuid);

    /// Re-enqueue a claimed job for its next eligible time
    fn retry(&self, id: Uuid, attempt: u32, next_eligible_ms: u64);

    fn mark_failed(&self, id: Uuid);

    /// Cancel a still-pending job; returns whether anything was cancelled
    fn cancel(&self, id: Uuid) -> bool;

    fn get(&self, id: Uuid) -> Option<QueuedJob>;
}

/// In-memory reference implementation of the queue store
pub struct MemoryQueueStore {
    jobs: DashMap<Uuid, QueuedJob, RandomState>,
    seq: AtomicU64,
    order: DashMap<Uuid, u64, RandomState>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::with_hasher(RandomState::new()),
            seq: AtomicU64::new(0),
            order: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Pending jobs sharing a dedupe key, oldest first
    pub fn pending_for_dedupe(&self, dedupe_key: &str) -> Vec<QueuedJob> {
        let mut pending: Vec<QueuedJob> = self
            .jobs
            .iter()
            .filter(|entry| {
                entry.state == JobState::Pending
                    && entry.dedupe_key.as_deref() == Some(dedupe_key)
            })
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|job| self.order.get(&job.id).map(|s| *s).unwrap_or(u64::MAX));
        pending
    }
}

impl Default for MemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore for MemoryQueueStore {
    fn append(&self, job: QueuedJob) -> Result<(), QueueError> {
        self.order
            .insert(job.id, self.seq.fetch_add(1, Ordering::SeqCst));
        self.jobs.insert(job.id, job);
        Ok(())
    }

    fn poll_due(&self, now_ms: u64) -> Vec<QueuedJob> {
        let mut due: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|entry| entry.state == JobState::Pending && entry.execute_at_ms <= now_ms)
            .map(|entry| entry.id)
            .collect();
        due.sort_by_key(|id| self.order.get(id).map(|s| *s).unwrap_or(u64::MAX));

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(mut entry) = self.jobs.get_mut(&id) {
                if entry.state == JobState::Pending {
                    entry.state = JobState::InFlight;
                    claimed.push(entry.clone());
                }
            }
        }
        claimed
    }

    fn delete_by_dedupe(&self, dedupe_key: &str) -> usize {
        let stale: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|entry| {
                entry.state == JobState::Pending
                    && entry.dedupe_key.as_deref() == Some(dedupe_key)
            })
            .map(|entry| entry.id)
            .collect();
        for id in &stale {
            self.jobs.remove(id);
            self.order.remove(id);
        }
        stale.len()
    }

    fn ack(&self, id: Uuid) {
        if let Some(mut entry) = self.jobs.get_mut(&id) {
            entry.state = JobState::Done;
        }
    }

    fn retry(&self, id: Uuid, attempt: u32, next_eligible_ms: u64) {
        if let Some(mut entry) = self.jobs.get_mut(&id) {
            entry.attempt = attempt;
            entry.execute_at_ms = next_eligible_ms;
            entry.state = JobState::Pending;
        }
    }

    fn mark_failed(&self, id: Uuid) {
        if let Some(mut entry) = self.jobs.get_mut(&id) {
            entry.state = JobState::Failed;
        }
    }

    fn cancel(&self, id: Uuid) -> bool {
        self.jobs
            .remove_if(&id, |_, job| job.state == JobState::Pending)
            .map(|_| {
                self.order.remove(&id);
            })
            .is_some()
    }

    fn get(&self, id: Uuid) -> Option<QueuedJob> {
        self.jobs.get(&id).map(|entry| entry.value().clone())
    }
}

/// Producer side: validates, dedupes, and appends jobs
#[derive(Clone)]
pub struct QueueDispatcher {
    store: Arc<dyn QueueStore>,
}

impl QueueDispatcher {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Serialize the call into a durable job; returns the cancellable job id.
    ///
    /// Arguments are validated serializable before any store mutation, so a
    /// bad payload leaves no partial state behind.
    pub fn enqueue(
        &self,
        desc: &QueueDesc,
        method: &MethodId,
        args: &[Value],
    ) -> Result<Uuid, QueueError> {
        let mut payload = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            match arg.to_json() {
                Some(json) => payload.push(json),
                None => {
                    return Err(QueueError::NotSerializable {
                        method: InlineString::from(method.to_string().as_str()),
                        index,
                    })
                }
            }
        }

        let dedupe_key = method.dedupe_key();
        if desc.clear_prior_copies {
            let cleared = self.store.delete_by_dedupe(&dedupe_key);
            if cleared > 0 {
                info!("Cleared {} prior queued copies of {}", cleared, method);
            }
        }

        let job = QueuedJob {
            id: Uuid::new_v4(),
            method: method.clone(),
            args: payload,
            execute_at_ms: now_ms() + desc.delay_secs * 1_000,
            attempt: 0,
            max_retry: desc.max_retry,
            retry_intervals_secs: desc.retry_intervals_secs.clone(),
            dedupe_key: Some(dedupe_key),
            state: JobState::Pending,
        };
        let id = job.id;
        self.store.append(job)?;
        Ok(id)
    }

    /// Cancel a pending job by id, before consumption
    pub fn cancel(&self, id: Uuid) -> bool {
        self.store.cancel(id)
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }
}

/// Consumer side: drains due jobs through the method registry
#[derive(Clone)]
pub struct QueueConsumer {
    store: Arc<dyn QueueStore>,
    methods: Arc<MethodRegistry>,
}

impl QueueConsumer {
    pub fn new(store: Arc<dyn QueueStore>, methods: Arc<MethodRegistry>) -> Self {
        Self { store, methods }
    }

    /// One drain pass: claim due jobs, execute, ack or schedule the retry.
    /// Returns how many jobs were executed.
    pub fn run_once(&self) -> usize {
        let now = now_ms();
        let due = self.store.poll_due(now);
        let count = due.len();
        for job in due {
            match self.execute(&job) {
                Ok(_) => self.store.ack(job.id),
                Err(e) => self.handle_failure(&job, now, &e),
            }
        }
        count
    }

    fn handle_failure(&self, job: &QueuedJob, now: u64, error: &PipelineError) {
        if job.attempt < job.max_retry {
            let interval = job.retry_interval_secs(job.attempt);
            let next = now + interval * 1_000;
            warn!(
                "Job {} ({}) failed ({}), retry {}/{} in {}s",
                job.id,
                job.method,
                error,
                job.attempt + 1,
                job.max_retry,
                interval
            );
            self.store.retry(job.id, job.attempt + 1, next);
        } else {
            error!(
                "Job {} ({}) permanently failed after {} retries: {}",
                job.id, job.method, job.max_retry, error
            );
            self.store.mark_failed(job.id);
        }
    }

    fn execute(&self, job: &QueuedJob) -> Result<Value, PipelineError> {
        let spec = self.methods.get(&job.method).ok_or_else(|| {
            crate::core::errors::StageError::MethodNotFound(InlineString::from(
                job.method.to_string().as_str(),
            ))
        })?;
        let args: Vec<Value> = job.args.iter().cloned().map(Value::from_json).collect();
        let mut jp = JoinPoint::new(TargetRef::Static, Arc::clone(&spec), args);
        spec.invoke(&mut jp).map_err(PipelineError::from)
    }
}
