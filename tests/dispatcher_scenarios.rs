//! Dispatcher Scenario Tests
//!
//! End-to-end runs through the in-process engine: job creation, worker
//! execution, materialized results, failure recording and cancellation.

use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use vast_engine::{
    AnalysisJob, DataFile, Engine, EngineConfig, EngineError, InMemoryStore, JobStatus, ResultType,
};

struct Harness {
    engine: Engine,
    dir: tempfile::TempDir,
    user: Uuid,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.results_dir = dir.path().join("results");
        config.workers.count = 2;
        config.workers.job_timeout_secs = 30;
        let engine = Engine::with_store(Arc::new(InMemoryStore::new()), &config);
        Self {
            engine,
            dir,
            user: Uuid::new_v4(),
        }
    }

    fn register(&self, name: &str, contents: &str) -> DataFile {
        let path: PathBuf = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        self.engine
            .dispatcher()
            .register_data_file(self.user, path, false)
            .unwrap()
    }

    async fn submit(&self, file: &DataFile, analysis: &str, backend: &str, params: Value) -> AnalysisJob {
        self.engine
            .dispatcher()
            .create_job(self.user, file.id, analysis, backend, params)
            .await
            .unwrap()
    }

    async fn wait(&self, job: &AnalysisJob) -> AnalysisJob {
        tokio::time::timeout(
            Duration::from_secs(20),
            self.engine
                .dispatcher()
                .wait_until_terminal(job.id, Duration::from_millis(10)),
        )
        .await
        .expect("job did not finish in time")
        .unwrap()
    }
}

fn constant_series(points: usize, value: f64) -> String {
    (0..points).map(|i| format!("{i}.0 {value}\n")).collect()
}

fn sine_series(points: usize, dt: f64) -> String {
    (0..points)
        .map(|i| {
            let t = i as f64 * dt;
            format!("{t} {}\n", 4.0 + (2.0 * std::f64::consts::PI * 0.1 * t).sin())
        })
        .collect()
}

#[tokio::test]
async fn test_rebin_mean_of_constant_series() {
    let h = Harness::new();
    let file = h.register("constant.txt", &constant_series(10, 5.0));

    let job = h
        .submit(&file, "rebin", "stingray", json!({"bin_time": 2.0, "method": "mean"}))
        .await;
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.task_id.is_some());

    let done = h.wait(&job).await;
    assert_eq!(done.status, JobStatus::Success, "error: {:?}", done.error_message);
    assert!(done.started_at.is_some() && done.finished_at.is_some());
    assert!(done.error_message.is_none());

    let results = h.engine.dispatcher().list_results(job.id).unwrap();
    let count = |kind: ResultType| results.iter().filter(|r| r.result_type == kind).count();
    assert_eq!(count(ResultType::Data), 1);
    assert_eq!(count(ResultType::Stats), 1);

    let stats = results
        .iter()
        .find(|r| r.result_type == ResultType::Stats)
        .and_then(|r| r.content.clone())
        .unwrap();
    assert_eq!(stats["mean_counts"], json!(5.0));
    assert_eq!(stats["n_bins"], json!(5));

    let data = results.iter().find(|r| r.result_type == ResultType::Data).unwrap();
    assert!(data.content.is_none());
    let bytes = h.engine.dispatcher().read_result_file(data.id).unwrap();
    let payload: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(payload["counts"].as_array().unwrap().len(), 5);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_unknown_backend_rejected_before_pending() {
    let h = Harness::new();
    let file = h.register("constant.txt", &constant_series(10, 5.0));

    let err = h
        .engine
        .dispatcher()
        .create_job(h.user, file.id, "rebin", "matplotlib", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownBackend(ref name) if name == "matplotlib"));
    assert!(h.engine.dispatcher().list_jobs(h.user).unwrap().is_empty());

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_extension_fails_job_without_results() {
    let h = Harness::new();
    let file = h.register("table.xlsx", "0 1\n1 2\n");

    let job = h.submit(&file, "rebin", "astropy", json!({"bin_time": 1.0})).await;
    let done = h.wait(&job).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert!(done.started_at.is_some());
    let message = done.error_message.unwrap();
    assert!(message.contains("Unsupported file format"), "got: {message}");
    assert!(h.engine.dispatcher().list_results(job.id).unwrap().is_empty());

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_submission_after_shutdown_fails_job() {
    let h = Harness::new();
    let file = h.register("constant.txt", &constant_series(10, 5.0));

    // A stopped pool refuses new work.
    h.engine.shutdown().await;
    let err = h
        .engine
        .dispatcher()
        .create_job(h.user, file.id, "rebin", "stingray", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Submission(_)));

    let jobs = h.engine.dispatcher().list_jobs(h.user).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert!(matches!(
        h.engine.dispatcher().cancel(jobs[0].id),
        Err(EngineError::NotCancellable { .. })
    ));
}

#[tokio::test]
async fn test_cancel_after_success_is_rejected() {
    let h = Harness::new();
    let file = h.register("sine.txt", &sine_series(200, 0.5));

    let job = h.submit(&file, "lomb_scargle", "lightkurve", Value::Null).await;
    let done = h.wait(&job).await;
    assert_eq!(done.status, JobStatus::Success, "error: {:?}", done.error_message);

    let err = h.engine.dispatcher().cancel(job.id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::NotCancellable {
            status: JobStatus::Success,
            ..
        }
    ));
    let after = h.engine.dispatcher().get_job(job.id).unwrap();
    assert_eq!(after, done);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_status_view_tracks_job() {
    let h = Harness::new();
    let file = h.register("sine.txt", &sine_series(64, 1.0));

    let job = h.submit(&file, "fourier_transform", "astropy", Value::Null).await;
    let done = h.wait(&job).await;

    let view = h.engine.dispatcher().get_status(job.id).unwrap();
    assert_eq!(view.status, done.status);
    assert_eq!(view.finished_at, done.finished_at);
    assert!(matches!(
        h.engine.dispatcher().get_status(Uuid::new_v4()),
        Err(EngineError::JobNotFound(_))
    ));

    h.engine.shutdown().await;
}
