//! Job executor: drives one job through the state machine
//!
//! ```text
//! claim (PENDING -> RUNNING)
//!   -> spawn_blocking { read_file -> run_analysis -> generate_plot } under timeout
//!   -> still RUNNING? spawn_blocking { materialize plot, data, stats }
//!   -> terminal write, applied only while the row is still RUNNING
//! ```
//!
//! Cancellation is best-effort. A cancelled job keeps its FAILED state
//! because every write after the claim re-reads the row and backs off
//! unless it is still RUNNING.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backends::{PlotArtifact, RawResult};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::results::{MaterializeReport, ResultMaterializer};
use crate::storage::{JobUpdate, Persistence, PersistenceError};
use crate::types::{AnalysisJob, AnalysisType, BackendKind, JobStatus, Parameters};

/// How one delivery of a job id ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Job reached SUCCESS.
    Succeeded,
    /// Job reached FAILED through this execution.
    Failed,
    /// Job was not PENDING at pickup (duplicate delivery, cancelled, unknown).
    Skipped,
    /// Job left RUNNING while this execution was in flight.
    Superseded,
}

/// Runs jobs against a store and a results directory.
pub struct JobExecutor {
    store: Arc<dyn Persistence>,
    materializer: Arc<ResultMaterializer>,
    timeout: Duration,
}

impl JobExecutor {
    pub fn new(store: Arc<dyn Persistence>, results_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        let materializer = Arc::new(ResultMaterializer::new(Arc::clone(&store), results_dir));
        Self {
            store,
            materializer,
            timeout,
        }
    }

    /// Executor using `[storage].results_dir` and `[workers].job_timeout_secs`.
    pub fn from_config(store: Arc<dyn Persistence>, config: &EngineConfig) -> Self {
        Self::new(
            store,
            config.storage.results_dir.clone(),
            Duration::from_secs(config.workers.job_timeout_secs),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one job to a terminal state. Never returns an error; failures are
    /// recorded on the job.
    pub async fn execute(&self, job_id: Uuid) -> ExecutionOutcome {
        let job = match self.claim(job_id) {
            Some(job) => job,
            None => return ExecutionOutcome::Skipped,
        };
        info!(
            job_id = %job.id,
            analysis = %job.analysis_type,
            backend = %job.backend,
            "Job running"
        );

        let (raw, plot) = match self.compute(&job).await {
            Ok(output) => output,
            Err(e) => return self.finish_failed(job_id, &e.to_string()),
        };

        match self.store.get_job(job_id) {
            Ok(Some(current)) if current.status == JobStatus::Running => {}
            Ok(current) => {
                info!(
                    job_id = %job_id,
                    status = ?current.map(|j| j.status),
                    "Job left RUNNING during execution, discarding output"
                );
                return ExecutionOutcome::Superseded;
            }
            Err(e) => return self.finish_failed(job_id, &EngineError::from(e).to_string()),
        }

        let report = match self.materialize(job, raw, plot).await {
            Ok(report) => report,
            Err(e) => return self.finish_failed(job_id, &e.to_string()),
        };
        match report.failure_summary() {
            None => self.finish_succeeded(job_id),
            Some(summary) => self.finish_failed(job_id, &summary),
        }
    }

    /// PENDING -> RUNNING. `None` when the job is missing or already claimed.
    fn claim(&self, job_id: Uuid) -> Option<AnalysisJob> {
        let now = Utc::now();
        match self.store.update_job(job_id, &mut |job| job.start(now).is_ok()) {
            Ok(JobUpdate::Applied(job)) => Some(job),
            Ok(JobUpdate::Skipped(job)) => {
                debug!(job_id = %job_id, status = %job.status, "Job not pending, skipping");
                None
            }
            Err(PersistenceError::NotFound(_)) => {
                warn!(job_id = %job_id, "Delivered job does not exist");
                None
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to claim job");
                None
            }
        }
    }

    async fn compute(&self, job: &AnalysisJob) -> EngineResult<(RawResult, PlotArtifact)> {
        let file = self
            .store
            .get_data_file(job.data_file_id)?
            .ok_or(EngineError::DataFileNotFound(job.data_file_id))?;

        let backend = job.backend;
        let analysis_type = job.analysis_type;
        let params = job.parameters.clone();
        let path = file.path;
        let task = tokio::task::spawn_blocking(move || run_chain(backend, analysis_type, &path, &params));

        // A timed-out chain keeps its blocking thread until it returns; its
        // output is dropped.
        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(EngineError::Timeout(self.timeout.as_secs())),
            Ok(Err(join_error)) => Err(EngineError::Execution(format!(
                "analysis task aborted: {join_error}"
            ))),
            Ok(Ok(output)) => output,
        }
    }

    /// File writes and result inserts, off the async worker.
    async fn materialize(
        &self,
        job: AnalysisJob,
        raw: RawResult,
        plot: PlotArtifact,
    ) -> EngineResult<MaterializeReport> {
        let materializer = Arc::clone(&self.materializer);
        tokio::task::spawn_blocking(move || materializer.materialize(&job, &raw, Some(&plot)))
            .await
            .map_err(|join_error| {
                EngineError::Execution(format!("result materialization aborted: {join_error}"))
            })
    }

    fn finish_succeeded(&self, job_id: Uuid) -> ExecutionOutcome {
        let now = Utc::now();
        let outcome = self.store.update_job(job_id, &mut |job| {
            job.status == JobStatus::Running && job.succeed(now).is_ok()
        });
        match outcome {
            Ok(JobUpdate::Applied(_)) => {
                info!(job_id = %job_id, "Job succeeded");
                ExecutionOutcome::Succeeded
            }
            Ok(JobUpdate::Skipped(job)) => {
                info!(job_id = %job_id, status = %job.status, "Job left RUNNING before completion was recorded");
                ExecutionOutcome::Superseded
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to record job success");
                ExecutionOutcome::Failed
            }
        }
    }

    /// Best-effort FAILED write. Errors are logged, never raised.
    fn finish_failed(&self, job_id: Uuid, message: &str) -> ExecutionOutcome {
        error!(job_id = %job_id, error = %message, "Job failed");
        let now = Utc::now();
        let outcome = self.store.update_job(job_id, &mut |job| {
            job.status == JobStatus::Running && job.fail(now, message).is_ok()
        });
        match outcome {
            Ok(JobUpdate::Applied(_)) => ExecutionOutcome::Failed,
            Ok(JobUpdate::Skipped(job)) => {
                info!(job_id = %job_id, status = %job.status, "Job left RUNNING, failure not recorded");
                ExecutionOutcome::Superseded
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to record job failure");
                ExecutionOutcome::Failed
            }
        }
    }
}

/// Backend call chain of one job. Runs on a blocking thread.
fn run_chain(
    backend: BackendKind,
    analysis_type: AnalysisType,
    path: &Path,
    params: &Parameters,
) -> EngineResult<(RawResult, PlotArtifact)> {
    let backend = backend.create();
    debug!(backend = backend.name(), path = %path.display(), "Reading data file");
    let data = backend.read_file(path)?;
    debug!(backend = backend.name(), points = data.len(), analysis = %analysis_type, "Running analysis");
    let raw = backend.run_analysis(analysis_type, &data, params)?;
    let plot = backend.generate_plot(analysis_type, &raw)?;
    Ok((raw, plot))
}
