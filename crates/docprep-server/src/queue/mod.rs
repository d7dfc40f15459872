//! In-process job queue with bounded retries and revocation.
//!
//! Jobs are dispatched to a fixed pool of workers over an mpsc channel.
//! Every enqueued job gets a [`TaskId`] and a cancellation token; revoking
//! the task cancels the running future at the next await point. A job that
//! fails with [`JobError::Retry`] is re-run on the same worker after a
//! backoff delay, up to the policy's attempt bound.

mod retry;

pub use retry::RetryPolicy;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What a job should do with its pipeline item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Run the item through the processing pipeline.
    Process,
    /// Purge the item's derived data and remove its record.
    Delete,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Process => write!(f, "process"),
            JobKind::Delete => write!(f, "delete"),
        }
    }
}

/// A unit of queued work, addressed by pipeline item id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub kind: JobKind,
    pub item_id: Uuid,
}

impl Job {
    pub fn process(item_id: Uuid) -> Self {
        Self {
            kind: JobKind::Process,
            item_id,
        }
    }

    pub fn delete(item_id: Uuid) -> Self {
        Self {
            kind: JobKind::Delete,
            item_id,
        }
    }
}

/// Opaque handle for a queued job, used to revoke it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failure modes a handler can report.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Transient failure; the queue re-runs the job until attempts run out.
    #[error("{0}")]
    Retry(anyhow::Error),
    /// Permanent failure; the job is dropped without further attempts.
    #[error("{0}")]
    Fatal(anyhow::Error),
}

impl JobError {
    pub fn retry(err: impl Into<anyhow::Error>) -> Self {
        Self::Retry(err.into())
    }

    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        Self::Fatal(err.into())
    }
}

/// Executes jobs pulled off the queue.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

struct QueuedJob {
    job: Job,
    task_id: TaskId,
    cancel: CancellationToken,
}

type Registry = Arc<Mutex<HashMap<TaskId, CancellationToken>>>;

/// Handle to the worker pool.
///
/// Cloneable; all clones feed the same workers.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
    registry: Registry,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl JobQueue {
    /// Spawn `worker_count` workers driving the given handler.
    pub fn start(handler: Arc<dyn JobHandler>, policy: RetryPolicy, worker_count: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<QueuedJob>();
        let rx = Arc::new(Mutex::new(rx));
        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();

        for worker in 0..worker_count.max(1) {
            let rx = Arc::clone(&rx);
            let registry = Arc::clone(&registry);
            let handler = Arc::clone(&handler);
            let shutdown = shutdown.clone();
            tracker.spawn(async move {
                worker_loop(worker, rx, registry, handler, policy, shutdown).await;
            });
        }

        Self {
            tx,
            registry,
            tracker,
            shutdown,
        }
    }

    /// Queue a job and return the handle that can revoke it.
    pub async fn enqueue(&self, job: Job) -> anyhow::Result<TaskId> {
        let task_id = TaskId::new();
        let cancel = CancellationToken::new();
        self.registry.lock().await.insert(task_id, cancel.clone());

        let queued = QueuedJob {
            job,
            task_id,
            cancel,
        };
        if self.tx.send(queued).is_err() {
            self.registry.lock().await.remove(&task_id);
            anyhow::bail!("job queue is shut down");
        }

        debug!(%task_id, kind = %job.kind, item_id = %job.item_id, "job enqueued");
        Ok(task_id)
    }

    /// Cancel a pending or running job. Returns false when the task is
    /// unknown (already finished or never queued).
    pub async fn revoke(&self, task_id: TaskId) -> bool {
        match self.registry.lock().await.remove(&task_id) {
            Some(cancel) => {
                cancel.cancel();
                info!(%task_id, "job revoked");
                true
            }
            None => false,
        }
    }

    /// Number of jobs queued or running.
    pub async fn active_jobs(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Stop accepting work and wait for in-flight jobs to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<QueuedJob>>>,
    registry: Registry,
    handler: Arc<dyn JobHandler>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
) {
    debug!(worker, "queue worker started");
    loop {
        let queued = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => None,
                queued = rx.recv() => queued,
            }
        };
        let Some(queued) = queued else {
            break;
        };

        run_job(&queued, handler.as_ref(), policy).await;
        registry.lock().await.remove(&queued.task_id);
    }
    debug!(worker, "queue worker stopped");
}

async fn run_job(queued: &QueuedJob, handler: &dyn JobHandler, policy: RetryPolicy) {
    let task_id = queued.task_id;
    let mut attempt = 1u32;

    loop {
        if queued.cancel.is_cancelled() {
            info!(%task_id, "job cancelled before execution");
            return;
        }

        let outcome = tokio::select! {
            _ = queued.cancel.cancelled() => {
                info!(%task_id, attempt, "job cancelled mid-execution");
                return;
            }
            outcome = handler.handle(&queued.job) => outcome,
        };

        match outcome {
            Ok(()) => {
                debug!(%task_id, attempt, "job finished");
                return;
            }
            Err(JobError::Fatal(err)) => {
                error!(%task_id, attempt, error = %err, "job failed permanently");
                return;
            }
            Err(JobError::Retry(err)) => {
                if attempt >= policy.max_attempts {
                    error!(
                        %task_id,
                        attempt,
                        error = %err,
                        "job failed, attempts exhausted"
                    );
                    return;
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    %task_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "job failed, retrying"
                );
                tokio::select! {
                    _ = queued.cancel.cancelled() => {
                        info!(%task_id, "job cancelled during backoff");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}
