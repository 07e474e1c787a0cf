//! In-memory persistence for tests and one-shot CLI runs
//!
//! Thread-safe via `RwLock`. Not durable, data is lost on restart.

use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::{JobUpdate, Persistence, PersistenceError};
use crate::types::{AnalysisJob, AnalysisResult, AnalysisType, DataFile, ParameterSet};

fn poisoned(e: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::Storage(e.to_string())
}

/// `RwLock`-guarded collections. When two locks are needed, `data_files` is
/// taken before `jobs`.
pub struct InMemoryStore {
    jobs: RwLock<HashMap<Uuid, AnalysisJob>>,
    results: RwLock<Vec<AnalysisResult>>,
    parameter_sets: RwLock<Vec<ParameterSet>>,
    data_files: RwLock<HashMap<Uuid, DataFile>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            results: RwLock::new(Vec::new()),
            parameter_sets: RwLock::new(Vec::new()),
            data_files: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Persistence for InMemoryStore {
    fn insert_job(&self, job: &AnalysisJob) -> Result<(), PersistenceError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn get_job(&self, id: Uuid) -> Result<Option<AnalysisJob>, PersistenceError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.get(&id).cloned())
    }

    fn update_job(
        &self,
        id: Uuid,
        mutator: &mut dyn FnMut(&mut AnalysisJob) -> bool,
    ) -> Result<JobUpdate, PersistenceError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let stored = jobs
            .get_mut(&id)
            .ok_or_else(|| PersistenceError::NotFound(format!("job {id}")))?;
        // Mutate a copy so a declined update leaves no partial edits behind.
        let mut candidate = stored.clone();
        if mutator(&mut candidate) {
            *stored = candidate.clone();
            Ok(JobUpdate::Applied(candidate))
        } else {
            Ok(JobUpdate::Skipped(stored.clone()))
        }
    }

    fn list_jobs(&self, user_id: Uuid) -> Result<Vec<AnalysisJob>, PersistenceError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut owned: Vec<AnalysisJob> = jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(owned)
    }

    fn insert_result(&self, result: &AnalysisResult) -> Result<(), PersistenceError> {
        let mut results = self.results.write().map_err(poisoned)?;
        if results.iter().any(|r| r.id == result.id) {
            return Err(PersistenceError::Storage(format!(
                "result {} already written",
                result.id
            )));
        }
        results.push(result.clone());
        Ok(())
    }

    fn list_results(&self, job_id: Uuid) -> Result<Vec<AnalysisResult>, PersistenceError> {
        let results = self.results.read().map_err(poisoned)?;
        Ok(results.iter().filter(|r| r.job_id == job_id).cloned().collect())
    }

    fn get_result(&self, id: Uuid) -> Result<Option<AnalysisResult>, PersistenceError> {
        let results = self.results.read().map_err(poisoned)?;
        Ok(results.iter().find(|r| r.id == id).cloned())
    }

    fn insert_parameter_set(&self, set: &ParameterSet) -> Result<(), PersistenceError> {
        let mut sets = self.parameter_sets.write().map_err(poisoned)?;
        if sets.iter().any(|s| s.collides_with(set)) {
            return Err(PersistenceError::Duplicate(set.name.clone()));
        }
        sets.push(set.clone());
        Ok(())
    }

    fn get_parameter_set(&self, id: Uuid) -> Result<Option<ParameterSet>, PersistenceError> {
        let sets = self.parameter_sets.read().map_err(poisoned)?;
        Ok(sets.iter().find(|s| s.id == id).cloned())
    }

    fn list_parameter_sets(
        &self,
        user_id: Uuid,
        analysis_type: Option<AnalysisType>,
    ) -> Result<Vec<ParameterSet>, PersistenceError> {
        let sets = self.parameter_sets.read().map_err(poisoned)?;
        Ok(sets
            .iter()
            .filter(|s| s.visible_to(user_id))
            .filter(|s| analysis_type.map_or(true, |t| s.analysis_type == t))
            .cloned()
            .collect())
    }

    fn insert_data_file(&self, file: &DataFile) -> Result<(), PersistenceError> {
        let mut files = self.data_files.write().map_err(poisoned)?;
        files.insert(file.id, file.clone());
        Ok(())
    }

    fn get_data_file(&self, id: Uuid) -> Result<Option<DataFile>, PersistenceError> {
        let files = self.data_files.read().map_err(poisoned)?;
        Ok(files.get(&id).cloned())
    }

    fn delete_data_file(&self, id: Uuid) -> Result<DataFile, PersistenceError> {
        let mut files = self.data_files.write().map_err(poisoned)?;
        if !files.contains_key(&id) {
            return Err(PersistenceError::NotFound(format!("data file {id}")));
        }
        // Keep jobs read-locked until the file is gone so no insert lands in between.
        let jobs = self.jobs.read().map_err(poisoned)?;
        let job_count = jobs.values().filter(|j| j.data_file_id == id).count();
        if job_count > 0 {
            return Err(PersistenceError::InUse {
                file_id: id,
                job_count,
            });
        }
        files
            .remove(&id)
            .ok_or_else(|| PersistenceError::NotFound(format!("data file {id}")))
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BackendKind, JobStatus, Parameters};
    use std::path::PathBuf;

    fn job_for(user: Uuid, file: Uuid) -> AnalysisJob {
        AnalysisJob::new(user, file, AnalysisType::Rebin, BackendKind::Stingray, Parameters::new())
    }

    #[test]
    fn test_declined_update_leaves_row() {
        let store = InMemoryStore::new();
        let job = job_for(Uuid::new_v4(), Uuid::new_v4());
        store.insert_job(&job).unwrap();

        let outcome = store
            .update_job(job.id, &mut |j| {
                j.error_message = Some("scribble".to_string());
                false
            })
            .unwrap();
        assert!(!outcome.is_applied());
        assert_eq!(store.get_job(job.id).unwrap().unwrap().error_message, None);
    }

    #[test]
    fn test_applied_update_persists() {
        let store = InMemoryStore::new();
        let job = job_for(Uuid::new_v4(), Uuid::new_v4());
        store.insert_job(&job).unwrap();
        let outcome = store
            .update_job(job.id, &mut |j| j.start(chrono::Utc::now()).is_ok())
            .unwrap();
        assert!(outcome.is_applied());
        assert_eq!(store.get_job(job.id).unwrap().unwrap().status, JobStatus::Running);
    }

    #[test]
    fn test_update_missing_job() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.update_job(Uuid::new_v4(), &mut |_| true),
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[test]
    fn test_data_file_in_use_is_protected() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let file = DataFile::new(user, PathBuf::from("/tmp/lc.csv"), 10, false);
        store.insert_data_file(&file).unwrap();
        store.insert_job(&job_for(user, file.id)).unwrap();

        assert!(matches!(
            store.delete_data_file(file.id),
            Err(PersistenceError::InUse { job_count: 1, .. })
        ));
    }

    #[test]
    fn test_trait_object() {
        let store: Box<dyn Persistence> = Box::new(InMemoryStore::default());
        assert_eq!(store.backend_name(), "InMemory");
    }
}
