//! Persistence for jobs, results, parameter sets and data files
//!
//! [`Persistence`] abstracts the record store so the dispatcher and executor
//! can be exercised against either backend:
//! - [`InMemoryStore`]: `RwLock`-guarded maps for tests and one-shot runs
//! - [`SledStore`]: durable sled trees holding JSON records

pub mod memory;
pub mod sled_store;

pub use memory::InMemoryStore;
pub use sled_store::SledStore;

use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::StoreKind;
use crate::types::{AnalysisJob, AnalysisResult, AnalysisType, DataFile, ParameterSet};

/// Outcome of [`Persistence::update_job`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// The mutator accepted the row; the stored job is returned.
    Applied(AnalysisJob),
    /// The mutator declined; the row is unchanged and returned as read.
    Skipped(AnalysisJob),
}

impl JobUpdate {
    pub fn job(&self) -> &AnalysisJob {
        match self {
            JobUpdate::Applied(job) | JobUpdate::Skipped(job) => job,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, JobUpdate::Applied(_))
    }
}

/// Record store used by the engine.
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across worker tasks.
pub trait Persistence: Send + Sync {
    fn insert_job(&self, job: &AnalysisJob) -> Result<(), PersistenceError>;

    fn get_job(&self, id: Uuid) -> Result<Option<AnalysisJob>, PersistenceError>;

    /// Atomic read-modify-write of one job. `mutator` returns `false` to
    /// leave the row untouched. It may run more than once when a concurrent
    /// writer wins the race, so it must only depend on the job it is given.
    fn update_job(
        &self,
        id: Uuid,
        mutator: &mut dyn FnMut(&mut AnalysisJob) -> bool,
    ) -> Result<JobUpdate, PersistenceError>;

    /// Jobs owned by `user_id`, newest first.
    fn list_jobs(&self, user_id: Uuid) -> Result<Vec<AnalysisJob>, PersistenceError>;

    /// Append a result row. Rows are write-once.
    fn insert_result(&self, result: &AnalysisResult) -> Result<(), PersistenceError>;

    /// Results of one job in insertion order.
    fn list_results(&self, job_id: Uuid) -> Result<Vec<AnalysisResult>, PersistenceError>;

    fn get_result(&self, id: Uuid) -> Result<Option<AnalysisResult>, PersistenceError>;

    /// Fails with [`PersistenceError::Duplicate`] when `(name, user,
    /// analysis_type)` is taken.
    fn insert_parameter_set(&self, set: &ParameterSet) -> Result<(), PersistenceError>;

    fn get_parameter_set(&self, id: Uuid) -> Result<Option<ParameterSet>, PersistenceError>;

    /// The user's own sets plus public ones, optionally for one type.
    fn list_parameter_sets(
        &self,
        user_id: Uuid,
        analysis_type: Option<AnalysisType>,
    ) -> Result<Vec<ParameterSet>, PersistenceError>;

    fn insert_data_file(&self, file: &DataFile) -> Result<(), PersistenceError>;

    fn get_data_file(&self, id: Uuid) -> Result<Option<DataFile>, PersistenceError>;

    /// Remove a data file record. Refused with [`PersistenceError::InUse`]
    /// while any job references it. The check is not serialized against
    /// [`Persistence::insert_job`]; the dispatcher holds its file lock
    /// around both.
    fn delete_data_file(&self, id: Uuid) -> Result<DataFile, PersistenceError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("'{0}' already exists")]
    Duplicate(String),
    #[error("data file {file_id} is referenced by {job_count} job(s)")]
    InUse { file_id: Uuid, job_count: usize },
}

/// Open the store selected in `[storage]`.
pub fn open_store(kind: StoreKind, data_dir: &Path) -> Result<Arc<dyn Persistence>, PersistenceError> {
    let store: Arc<dyn Persistence> = match kind {
        StoreKind::Memory => Arc::new(InMemoryStore::new()),
        StoreKind::Sled => Arc::new(SledStore::open(data_dir.join("engine.sled"))?),
    };
    tracing::info!(backend = store.backend_name(), "Persistence ready");
    Ok(store)
}
