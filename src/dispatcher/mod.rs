//! Job dispatcher
//!
//! [`Dispatcher`] is the surface an API layer talks to: it validates and
//! stores new jobs, hands them to a [`TaskQueue`], answers status polls,
//! cancels, and serves schemas, results, parameter sets and data files.
//! [`JobExecutor`] is the worker side that drives a job to a terminal state.
//!
//! [`Engine`] wires a store, an executor and a [`WorkerPool`] together for
//! in-process use.

pub mod executor;
pub mod queue;

pub use executor::{ExecutionOutcome, JobExecutor};
pub use queue::{TaskQueue, WorkerPool};

use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::schema::{self, Schema};
use crate::storage::{self, JobUpdate, Persistence, PersistenceError};
use crate::types::{
    AnalysisJob, AnalysisResult, AnalysisType, BackendKind, DataFile, JobStatusView, ParameterSet,
    Parameters,
};

/// Accept `null` as "no parameters"; anything other than an object is
/// rejected.
fn parameters_from(value: Value, name: &str) -> EngineResult<Parameters> {
    match value {
        Value::Null => Ok(Parameters::new()),
        Value::Object(map) => Ok(map),
        other => Err(EngineError::invalid_param(
            name,
            format!("expected a JSON object, got {other}"),
        )),
    }
}

fn job_not_found(job_id: Uuid) -> impl FnOnce(PersistenceError) -> EngineError {
    move |e| match e {
        PersistenceError::NotFound(_) => EngineError::JobNotFound(job_id),
        other => other.into(),
    }
}

/// API-facing job operations over a store and a task queue.
pub struct Dispatcher {
    store: Arc<dyn Persistence>,
    queue: Arc<dyn TaskQueue>,
    /// Held from a job's data-file check until its insert, and across a
    /// data-file delete.
    file_guard: Mutex<()>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Persistence>, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            store,
            queue,
            file_guard: Mutex::new(()),
        }
    }

    fn lock_files(&self) -> MutexGuard<'_, ()> {
        self.file_guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self) -> &Arc<dyn Persistence> {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------------

    /// Validate, store as PENDING and submit. Rejections happen before the
    /// job exists. If the queue refuses the job it is stored as FAILED and the
    /// submission error is returned.
    pub async fn create_job(
        &self,
        user_id: Uuid,
        data_file_id: Uuid,
        analysis_type: &str,
        backend: &str,
        parameters: Value,
    ) -> EngineResult<AnalysisJob> {
        let analysis_type: AnalysisType = analysis_type.parse()?;
        let backend: BackendKind = backend.parse()?;
        let mut parameters = parameters_from(parameters, "parameters")?;

        if schema::definitions::definitions(analysis_type).is_some() {
            let filled = schema::fill_defaults(analysis_type, &mut parameters)?;
            debug!(analysis = %analysis_type, filled, "Filled parameter defaults");
        }

        let job = {
            let _files = self.lock_files();
            match self.store.get_data_file(data_file_id)? {
                Some(file) if file.accessible_by(user_id) => {}
                _ => return Err(EngineError::DataFileNotFound(data_file_id)),
            }
            let job = AnalysisJob::new(user_id, data_file_id, analysis_type, backend, parameters);
            self.store.insert_job(&job)?;
            job
        };
        info!(job_id = %job.id, analysis = %analysis_type, backend = %backend, "Job created");

        match self.queue.submit(job.id).await {
            Ok(task_id) => {
                let update = self.store.update_job(job.id, &mut |j| {
                    if j.is_terminal() {
                        return false;
                    }
                    j.task_id = Some(task_id.clone());
                    true
                });
                match update {
                    Ok(update) => Ok(update.job().clone()),
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "Failed to record task id");
                        Ok(job)
                    }
                }
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Job submission failed");
                let message = e.to_string();
                let now = Utc::now();
                if let Err(write_err) = self
                    .store
                    .update_job(job.id, &mut |j| j.fail(now, message.as_str()).is_ok())
                {
                    error!(job_id = %job.id, error = %write_err, "Failed to record submission failure");
                }
                Err(e)
            }
        }
    }

    /// Create a job from a stored parameter set. `overrides` win over the
    /// set's values.
    pub async fn create_job_from_parameter_set(
        &self,
        user_id: Uuid,
        data_file_id: Uuid,
        parameter_set_id: Uuid,
        backend: &str,
        overrides: Value,
    ) -> EngineResult<AnalysisJob> {
        let set = self
            .store
            .get_parameter_set(parameter_set_id)?
            .filter(|s| s.visible_to(user_id))
            .ok_or(EngineError::ParameterSetNotFound(parameter_set_id))?;

        let mut parameters = set.parameters.clone();
        parameters.extend(parameters_from(overrides, "overrides")?);
        debug!(parameter_set = %set.name, "Creating job from parameter set");

        self.create_job(
            user_id,
            data_file_id,
            set.analysis_type.as_str(),
            backend,
            Value::Object(parameters),
        )
        .await
    }

    pub fn get_job(&self, job_id: Uuid) -> EngineResult<AnalysisJob> {
        self.store
            .get_job(job_id)?
            .ok_or(EngineError::JobNotFound(job_id))
    }

    pub fn get_status(&self, job_id: Uuid) -> EngineResult<JobStatusView> {
        Ok(self.get_job(job_id)?.status_view())
    }

    /// The user's jobs, newest first.
    pub fn list_jobs(&self, user_id: Uuid) -> EngineResult<Vec<AnalysisJob>> {
        Ok(self.store.list_jobs(user_id)?)
    }

    /// PENDING or RUNNING -> FAILED("cancelled by user"). A running backend
    /// call is not interrupted.
    pub fn cancel(&self, job_id: Uuid) -> EngineResult<AnalysisJob> {
        let now = Utc::now();
        let update = self
            .store
            .update_job(job_id, &mut |j| j.cancel(now).is_ok())
            .map_err(job_not_found(job_id))?;
        match update {
            JobUpdate::Applied(job) => {
                info!(job_id = %job_id, "Job cancelled");
                Ok(job)
            }
            JobUpdate::Skipped(job) => Err(EngineError::NotCancellable {
                job_id,
                status: job.status,
            }),
        }
    }

    /// Poll until the job is terminal.
    pub async fn wait_until_terminal(&self, job_id: Uuid, poll: Duration) -> EngineResult<AnalysisJob> {
        loop {
            let job = self.get_job(job_id)?;
            if job.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll).await;
        }
    }

    // ------------------------------------------------------------------------
    // Schemas
    // ------------------------------------------------------------------------

    pub fn get_schema(&self, analysis_type: &str) -> EngineResult<Schema> {
        schema::get_schema_by_name(analysis_type)
    }

    pub fn list_schemas(&self) -> BTreeMap<&'static str, Schema> {
        schema::list_schemas()
    }

    // ------------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------------

    /// Results of an existing job in persisted order.
    pub fn list_results(&self, job_id: Uuid) -> EngineResult<Vec<AnalysisResult>> {
        self.get_job(job_id)?;
        Ok(self.store.list_results(job_id)?)
    }

    pub fn get_result(&self, result_id: Uuid) -> EngineResult<AnalysisResult> {
        self.store
            .get_result(result_id)?
            .ok_or_else(|| EngineError::ResultNotFound(result_id.to_string()))
    }

    /// Contents of the file behind a result.
    pub fn read_result_file(&self, result_id: Uuid) -> EngineResult<Vec<u8>> {
        let result = self.get_result(result_id)?;
        let path = result
            .file_path
            .ok_or_else(|| EngineError::ResultNotFound(format!("{result_id} has no file")))?;
        Ok(std::fs::read(path)?)
    }

    // ------------------------------------------------------------------------
    // Parameter sets
    // ------------------------------------------------------------------------

    pub fn save_parameter_set(
        &self,
        user_id: Uuid,
        name: &str,
        analysis_type: &str,
        parameters: Value,
        is_public: bool,
        description: Option<&str>,
    ) -> EngineResult<ParameterSet> {
        let analysis_type: AnalysisType = analysis_type.parse()?;
        let mut set = ParameterSet::new(
            name,
            Some(user_id),
            analysis_type,
            parameters_from(parameters, "parameters")?,
            is_public,
        );
        if let Some(text) = description {
            set = set.with_description(text);
        }
        self.store.insert_parameter_set(&set)?;
        info!(parameter_set = %set.name, analysis = %analysis_type, "Parameter set saved");
        Ok(set)
    }

    /// The user's own sets plus public ones.
    pub fn parameter_sets_for(
        &self,
        user_id: Uuid,
        analysis_type: Option<&str>,
    ) -> EngineResult<Vec<ParameterSet>> {
        let analysis_type = analysis_type.map(str::parse::<AnalysisType>).transpose()?;
        Ok(self.store.list_parameter_sets(user_id, analysis_type)?)
    }

    // ------------------------------------------------------------------------
    // Data files
    // ------------------------------------------------------------------------

    /// Record a file already on disk.
    pub fn register_data_file(
        &self,
        user_id: Uuid,
        path: impl Into<PathBuf>,
        is_public: bool,
    ) -> EngineResult<DataFile> {
        let path = path.into();
        let size = std::fs::metadata(&path)?.len();
        let file = DataFile::new(user_id, path, size, is_public);
        self.store.insert_data_file(&file)?;
        info!(data_file = %file.id, name = %file.name, size, "Data file registered");
        Ok(file)
    }

    pub fn get_data_file(&self, user_id: Uuid, file_id: Uuid) -> EngineResult<DataFile> {
        self.store
            .get_data_file(file_id)?
            .filter(|f| f.accessible_by(user_id))
            .ok_or(EngineError::DataFileNotFound(file_id))
    }

    /// Remove the owner's data file record. Refused while jobs reference it.
    pub fn delete_data_file(&self, user_id: Uuid, file_id: Uuid) -> EngineResult<DataFile> {
        let _files = self.lock_files();
        match self.store.get_data_file(file_id)? {
            Some(file) if file.user_id == user_id => {}
            _ => return Err(EngineError::DataFileNotFound(file_id)),
        }
        let removed = self.store.delete_data_file(file_id)?;
        info!(data_file = %file_id, "Data file deleted");
        Ok(removed)
    }
}

// ============================================================================
// In-process engine
// ============================================================================

/// Store, worker pool and dispatcher running in one process.
pub struct Engine {
    dispatcher: Dispatcher,
    pool: Arc<WorkerPool>,
}

impl Engine {
    /// Open the configured store and start the workers.
    pub fn start(config: &EngineConfig) -> EngineResult<Self> {
        let store = storage::open_store(config.storage.backend, &config.storage.data_dir)?;
        Ok(Self::with_store(store, config))
    }

    /// Start the workers over an existing store.
    pub fn with_store(store: Arc<dyn Persistence>, config: &EngineConfig) -> Self {
        let executor = Arc::new(JobExecutor::from_config(Arc::clone(&store), config));
        let pool = Arc::new(WorkerPool::start(
            executor,
            config.workers.count,
            config.workers.queue_capacity,
        ));
        let queue: Arc<dyn TaskQueue> = pool.clone();
        Self {
            dispatcher: Dispatcher::new(store, queue),
            pool,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Stop the workers once their current jobs finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use crate::types::JobStatus;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Queue that records submissions without running anything.
    #[derive(Default)]
    struct RecordingQueue {
        submitted: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl TaskQueue for RecordingQueue {
        async fn submit(&self, job_id: Uuid) -> EngineResult<String> {
            self.submitted.lock().unwrap().push(job_id);
            Ok(format!("recorded-{job_id}"))
        }
    }

    struct RefusingQueue;

    #[async_trait]
    impl TaskQueue for RefusingQueue {
        async fn submit(&self, _job_id: Uuid) -> EngineResult<String> {
            Err(EngineError::Submission("broker unavailable".to_string()))
        }
    }

    fn setup(queue: Arc<dyn TaskQueue>) -> (Dispatcher, Uuid, DataFile, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lc.txt");
        std::fs::write(&path, "0 1\n1 2\n2 3\n").unwrap();
        let store: Arc<dyn Persistence> = Arc::new(InMemoryStore::new());
        let dispatcher = Dispatcher::new(store, queue);
        let user = Uuid::new_v4();
        let file = dispatcher.register_data_file(user, path, false).unwrap();
        (dispatcher, user, file, dir)
    }

    #[tokio::test]
    async fn test_create_job_fills_defaults_and_records_task() {
        let queue = Arc::new(RecordingQueue::default());
        let (dispatcher, user, file, _dir) = setup(queue.clone());

        let job = dispatcher
            .create_job(user, file.id, "rebin", "stingray", json!({"bin_time": 2.0}))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.parameters["method"], json!("sum"));
        assert_eq!(job.parameters["bin_time"], json!(2.0));
        assert_eq!(job.task_id, Some(format!("recorded-{}", job.id)));
        assert_eq!(*queue.submitted.lock().unwrap(), vec![job.id]);
    }

    #[test]
    fn test_light_curve_jobs_keep_parameters_verbatim() {
        let (dispatcher, user, file, _dir) = setup(Arc::new(RecordingQueue::default()));
        let job = tokio_test::block_on(dispatcher.create_job(
            user,
            file.id,
            "light_curve",
            "lightkurve",
            json!({"quality_bitmask": "default"}),
        ))
        .unwrap();
        assert_eq!(job.parameters.len(), 1);
        assert_eq!(dispatcher.get_status(job.id).unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_rejections_never_reach_pending() {
        let queue = Arc::new(RecordingQueue::default());
        let (dispatcher, user, file, _dir) = setup(queue.clone());

        let unknown_backend = dispatcher
            .create_job(user, file.id, "rebin", "scipy", Value::Null)
            .await;
        assert!(matches!(unknown_backend, Err(EngineError::UnknownBackend(_))));

        let unknown_type = dispatcher
            .create_job(user, file.id, "wavelet", "stingray", Value::Null)
            .await;
        assert!(matches!(unknown_type, Err(EngineError::UnknownAnalysisType(_))));

        let bad_params = dispatcher
            .create_job(user, file.id, "rebin", "stingray", json!([1, 2]))
            .await;
        assert!(matches!(bad_params, Err(EngineError::InvalidParameter { .. })));

        let stranger = dispatcher
            .create_job(Uuid::new_v4(), file.id, "rebin", "stingray", Value::Null)
            .await;
        assert!(matches!(stranger, Err(EngineError::DataFileNotFound(_))));

        assert!(dispatcher.list_jobs(user).unwrap().is_empty());
        assert!(queue.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refused_submission_marks_job_failed() {
        let (dispatcher, user, file, _dir) = setup(Arc::new(RefusingQueue));

        let err = dispatcher
            .create_job(user, file.id, "lomb_scargle", "astropy", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Submission(_)));

        let jobs = dispatcher.list_jobs(user).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert!(jobs[0].error_message.as_ref().unwrap().contains("broker unavailable"));
    }

    #[tokio::test]
    async fn test_cancel_pending_then_terminal() {
        let (dispatcher, user, file, _dir) = setup(Arc::new(RecordingQueue::default()));
        let job = dispatcher
            .create_job(user, file.id, "rebin", "astropy", Value::Null)
            .await
            .unwrap();

        let cancelled = dispatcher.cancel(job.id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Failed);
        assert_eq!(cancelled.error_message.as_deref(), Some("cancelled by user"));

        assert!(matches!(
            dispatcher.cancel(job.id),
            Err(EngineError::NotCancellable { status: JobStatus::Failed, .. })
        ));
        assert!(matches!(
            dispatcher.cancel(Uuid::new_v4()),
            Err(EngineError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_parameter_set_overrides() {
        let (dispatcher, user, file, _dir) = setup(Arc::new(RecordingQueue::default()));
        let set = dispatcher
            .save_parameter_set(
                user,
                "coarse",
                "rebin",
                json!({"bin_time": 10.0, "method": "mean"}),
                false,
                Some("ten second bins"),
            )
            .unwrap();

        let job = dispatcher
            .create_job_from_parameter_set(user, file.id, set.id, "stingray", json!({"bin_time": 5.0}))
            .await
            .unwrap();
        assert_eq!(job.analysis_type, AnalysisType::Rebin);
        assert_eq!(job.parameters["bin_time"], json!(5.0));
        assert_eq!(job.parameters["method"], json!("mean"));

        let other_user = Uuid::new_v4();
        assert!(matches!(
            dispatcher
                .create_job_from_parameter_set(other_user, file.id, set.id, "stingray", Value::Null)
                .await,
            Err(EngineError::ParameterSetNotFound(_))
        ));
        assert!(matches!(
            dispatcher.save_parameter_set(user, "coarse", "rebin", Value::Null, true, None),
            Err(EngineError::DuplicateParameterSet(_))
        ));
    }

    #[tokio::test]
    async fn test_data_file_deletion_guarded() {
        let (dispatcher, user, file, _dir) = setup(Arc::new(RecordingQueue::default()));
        assert!(file.size > 0);

        dispatcher
            .create_job(user, file.id, "rebin", "stingray", Value::Null)
            .await
            .unwrap();
        assert!(matches!(
            dispatcher.delete_data_file(user, file.id),
            Err(EngineError::DataFileInUse { job_count: 1, .. })
        ));
        assert!(matches!(
            dispatcher.delete_data_file(Uuid::new_v4(), file.id),
            Err(EngineError::DataFileNotFound(_))
        ));
    }

    /// Store whose job inserts lag behind the data-file check and which
    /// reports when that check has happened.
    struct SlowInsertStore {
        inner: InMemoryStore,
        file_checked: Mutex<Option<std::sync::mpsc::Sender<()>>>,
    }

    impl Persistence for SlowInsertStore {
        fn insert_job(&self, job: &AnalysisJob) -> Result<(), PersistenceError> {
            std::thread::sleep(Duration::from_millis(100));
            self.inner.insert_job(job)
        }

        fn get_job(&self, id: Uuid) -> Result<Option<AnalysisJob>, PersistenceError> {
            self.inner.get_job(id)
        }

        fn update_job(
            &self,
            id: Uuid,
            mutator: &mut dyn FnMut(&mut AnalysisJob) -> bool,
        ) -> Result<JobUpdate, PersistenceError> {
            self.inner.update_job(id, mutator)
        }

        fn list_jobs(&self, user_id: Uuid) -> Result<Vec<AnalysisJob>, PersistenceError> {
            self.inner.list_jobs(user_id)
        }

        fn insert_result(&self, result: &AnalysisResult) -> Result<(), PersistenceError> {
            self.inner.insert_result(result)
        }

        fn list_results(&self, job_id: Uuid) -> Result<Vec<AnalysisResult>, PersistenceError> {
            self.inner.list_results(job_id)
        }

        fn get_result(&self, id: Uuid) -> Result<Option<AnalysisResult>, PersistenceError> {
            self.inner.get_result(id)
        }

        fn insert_parameter_set(&self, set: &ParameterSet) -> Result<(), PersistenceError> {
            self.inner.insert_parameter_set(set)
        }

        fn get_parameter_set(&self, id: Uuid) -> Result<Option<ParameterSet>, PersistenceError> {
            self.inner.get_parameter_set(id)
        }

        fn list_parameter_sets(
            &self,
            user_id: Uuid,
            analysis_type: Option<AnalysisType>,
        ) -> Result<Vec<ParameterSet>, PersistenceError> {
            self.inner.list_parameter_sets(user_id, analysis_type)
        }

        fn insert_data_file(&self, file: &DataFile) -> Result<(), PersistenceError> {
            self.inner.insert_data_file(file)
        }

        fn get_data_file(&self, id: Uuid) -> Result<Option<DataFile>, PersistenceError> {
            let found = self.inner.get_data_file(id);
            if let Some(tx) = self.file_checked.lock().unwrap().take() {
                tx.send(()).unwrap();
            }
            found
        }

        fn delete_data_file(&self, id: Uuid) -> Result<DataFile, PersistenceError> {
            self.inner.delete_data_file(id)
        }

        fn backend_name(&self) -> &'static str {
            "SlowInsert"
        }
    }

    #[test]
    fn test_delete_waits_for_job_being_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lc.txt");
        std::fs::write(&path, "0 1\n1 2\n").unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let store = Arc::new(SlowInsertStore {
            inner: InMemoryStore::new(),
            file_checked: Mutex::new(Some(tx)),
        });
        let dispatcher = Dispatcher::new(store, Arc::new(RecordingQueue::default()));
        let user = Uuid::new_v4();
        let file = dispatcher.register_data_file(user, &path, false).unwrap();

        let (created, deleted) = std::thread::scope(|scope| {
            let creator = scope.spawn(|| {
                tokio_test::block_on(dispatcher.create_job(user, file.id, "rebin", "stingray", Value::Null))
            });
            // The creator has passed its data-file check but not yet inserted.
            rx.recv().unwrap();
            let deleted = dispatcher.delete_data_file(user, file.id);
            (creator.join().unwrap(), deleted)
        });

        let job = created.unwrap();
        assert!(matches!(deleted, Err(EngineError::DataFileInUse { job_count: 1, .. })));
        assert_eq!(dispatcher.get_data_file(user, job.data_file_id).unwrap().id, file.id);
    }

    #[tokio::test]
    async fn test_result_lookups() {
        let (dispatcher, _user, _file, _dir) = setup(Arc::new(RecordingQueue::default()));
        assert!(matches!(
            dispatcher.list_results(Uuid::new_v4()),
            Err(EngineError::JobNotFound(_))
        ));

        let stats = AnalysisResult::stats(Uuid::new_v4(), json!({"mean": 1.0}));
        dispatcher.store().insert_result(&stats).unwrap();
        assert_eq!(dispatcher.get_result(stats.id).unwrap(), stats);
        assert!(matches!(
            dispatcher.read_result_file(stats.id),
            Err(EngineError::ResultNotFound(_))
        ));
    }
}
