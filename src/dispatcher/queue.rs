//! Task queue seam and the in-process worker pool behind it
//!
//! The dispatcher only needs "run this job id now" with a correlation id
//! back. [`WorkerPool`] provides that with a bounded channel drained by N
//! worker tasks; each worker runs one job start to finish before taking the
//! next.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::executor::JobExecutor;
use crate::error::{EngineError, EngineResult};

/// Work queue the dispatcher submits job ids to.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue `job_id` and return a correlation id. Must not wait for the
    /// job to run.
    async fn submit(&self, job_id: Uuid) -> EngineResult<String>;
}

struct Envelope {
    task_id: String,
    job_id: Uuid,
}

/// Bounded in-process queue drained by a fixed set of workers.
pub struct WorkerPool {
    sender: mpsc::Sender<Envelope>,
    cancel_token: CancellationToken,
    workers: Mutex<JoinSet<usize>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks on the current runtime.
    pub fn start(executor: Arc<JobExecutor>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Envelope>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let cancel_token = CancellationToken::new();

        let mut set = JoinSet::new();
        for worker_id in 0..workers.max(1) {
            set.spawn(run_worker(
                worker_id,
                Arc::clone(&executor),
                Arc::clone(&receiver),
                cancel_token.clone(),
            ));
        }
        info!("[WorkerPool] Started {} worker(s), queue capacity {}", workers.max(1), capacity.max(1));

        Self {
            sender,
            cancel_token,
            workers: Mutex::new(set),
        }
    }

    /// Token observed by every worker; cancelling it stops the pool after
    /// the jobs in flight finish.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stop accepting work and wait for the workers to exit. Jobs still
    /// queued stay PENDING.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let mut set = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        let mut total = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(jobs_run) => total += jobs_run,
                Err(e) => error!("[WorkerPool] Worker panicked: {}", e),
            }
        }
        info!("[WorkerPool] Shutdown complete after {} job(s)", total);
    }
}

#[async_trait]
impl TaskQueue for WorkerPool {
    async fn submit(&self, job_id: Uuid) -> EngineResult<String> {
        if self.cancel_token.is_cancelled() {
            return Err(EngineError::Submission("worker pool is shut down".to_string()));
        }
        let task_id = format!("task-{}", Uuid::new_v4());
        self.sender
            .send(Envelope {
                task_id: task_id.clone(),
                job_id,
            })
            .await
            .map_err(|_| EngineError::Submission("worker queue is closed".to_string()))?;
        debug!(job_id = %job_id, task_id = %task_id, "Job queued");
        Ok(task_id)
    }
}

/// Worker loop. Returns how many jobs it ran.
async fn run_worker(
    worker_id: usize,
    executor: Arc<JobExecutor>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Envelope>>>,
    cancel_token: CancellationToken,
) -> usize {
    let mut jobs_run = 0usize;
    loop {
        let next = tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("[Worker {}] Shutdown signal received", worker_id);
                break;
            }
            envelope = async { receiver.lock().await.recv().await } => envelope,
        };

        let Some(envelope) = next else {
            warn!("[Worker {}] Queue closed", worker_id);
            break;
        };

        debug!(
            job_id = %envelope.job_id,
            task_id = %envelope.task_id,
            "[Worker {}] Picked up job",
            worker_id
        );
        let outcome = executor.execute(envelope.job_id).await;
        jobs_run += 1;
        debug!(job_id = %envelope.job_id, ?outcome, "[Worker {}] Job finished", worker_id);
    }
    jobs_run
}
