//! Durable persistence on sled
//!
//! One tree per record kind, values stored as JSON:
//! - `jobs`: job id → job
//! - `results`: job id ‖ sequence → result (prefix scan yields insertion order)
//! - `result_keys`: result id → key in `results`
//! - `parameter_sets`: set id → set
//! - `parameter_set_names`: owner ‖ type ‖ name → set id (uniqueness index)
//! - `data_files`: file id → file

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::{JobUpdate, Persistence, PersistenceError};
use crate::types::{AnalysisJob, AnalysisResult, AnalysisType, DataFile, ParameterSet};

const JOBS: &str = "jobs";
const RESULTS: &str = "results";
const RESULT_KEYS: &str = "result_keys";
const PARAMETER_SETS: &str = "parameter_sets";
const PARAMETER_SET_NAMES: &str = "parameter_set_names";
const DATA_FILES: &str = "data_files";

fn storage(e: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec(value).map_err(|e| PersistenceError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PersistenceError> {
    serde_json::from_slice(bytes).map_err(|e| PersistenceError::Serialization(e.to_string()))
}

/// Uniqueness key of a parameter set.
fn name_key(set: &ParameterSet) -> Vec<u8> {
    let owner = set.user_id.map(|u| u.to_string()).unwrap_or_default();
    format!("{owner}\0{}\0{}", set.analysis_type.as_str(), set.name).into_bytes()
}

/// sled-backed store. Cheap to clone.
#[derive(Clone)]
pub struct SledStore {
    db: Arc<sled::Db>,
}

impl SledStore {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref).map_err(storage)?;
        tracing::info!(path = %path_ref.display(), "Sled store opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Throwaway database removed on drop.
    pub fn temporary() -> Result<Self, PersistenceError> {
        let db = sled::Config::new().temporary(true).open().map_err(storage)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn tree(&self, name: &str) -> Result<sled::Tree, PersistenceError> {
        self.db.open_tree(name).map_err(storage)
    }

    fn get_json<T: DeserializeOwned>(&self, tree: &str, key: &[u8]) -> Result<Option<T>, PersistenceError> {
        match self.tree(tree)?.get(key).map_err(storage)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Decode every value of a tree, skipping rows that fail to decode.
    fn scan<T: DeserializeOwned>(&self, tree: &str) -> Result<Vec<T>, PersistenceError> {
        let mut out = Vec::new();
        for item in self.tree(tree)?.iter() {
            let (_key, value) = item.map_err(storage)?;
            match decode(&value) {
                Ok(record) => out.push(record),
                Err(e) => tracing::warn!(tree, error = %e, "Skipping undecodable record"),
            }
        }
        Ok(out)
    }
}

impl Persistence for SledStore {
    fn insert_job(&self, job: &AnalysisJob) -> Result<(), PersistenceError> {
        self.tree(JOBS)?
            .insert(job.id.as_bytes(), encode(job)?)
            .map_err(storage)?;
        Ok(())
    }

    fn get_job(&self, id: Uuid) -> Result<Option<AnalysisJob>, PersistenceError> {
        self.get_json(JOBS, id.as_bytes())
    }

    fn update_job(
        &self,
        id: Uuid,
        mutator: &mut dyn FnMut(&mut AnalysisJob) -> bool,
    ) -> Result<JobUpdate, PersistenceError> {
        let tree = self.tree(JOBS)?;
        loop {
            let current = tree
                .get(id.as_bytes())
                .map_err(storage)?
                .ok_or_else(|| PersistenceError::NotFound(format!("job {id}")))?;
            let mut job: AnalysisJob = decode(&current)?;
            if !mutator(&mut job) {
                let unchanged = decode(&current)?;
                return Ok(JobUpdate::Skipped(unchanged));
            }
            let swapped = tree
                .compare_and_swap(id.as_bytes(), Some(current.as_ref()), Some(encode(&job)?))
                .map_err(storage)?;
            match swapped {
                Ok(()) => return Ok(JobUpdate::Applied(job)),
                Err(_) => tracing::debug!(job_id = %id, "Concurrent job write, retrying update"),
            }
        }
    }

    fn list_jobs(&self, user_id: Uuid) -> Result<Vec<AnalysisJob>, PersistenceError> {
        let mut jobs: Vec<AnalysisJob> = self
            .scan::<AnalysisJob>(JOBS)?
            .into_iter()
            .filter(|j| j.user_id == user_id)
            .collect();
        jobs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(jobs)
    }

    fn insert_result(&self, result: &AnalysisResult) -> Result<(), PersistenceError> {
        let seq = self.db.generate_id().map_err(storage)?;
        let mut key = result.job_id.as_bytes().to_vec();
        key.extend_from_slice(&seq.to_be_bytes());

        let index = self.tree(RESULT_KEYS)?;
        let claimed = index
            .compare_and_swap(result.id.as_bytes(), None as Option<&[u8]>, Some(key.clone()))
            .map_err(storage)?;
        if claimed.is_err() {
            return Err(PersistenceError::Storage(format!(
                "result {} already written",
                result.id
            )));
        }
        self.tree(RESULTS)?.insert(key, encode(result)?).map_err(storage)?;
        Ok(())
    }

    fn list_results(&self, job_id: Uuid) -> Result<Vec<AnalysisResult>, PersistenceError> {
        let mut out = Vec::new();
        for item in self.tree(RESULTS)?.scan_prefix(job_id.as_bytes()) {
            let (_key, value) = item.map_err(storage)?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    fn get_result(&self, id: Uuid) -> Result<Option<AnalysisResult>, PersistenceError> {
        match self.tree(RESULT_KEYS)?.get(id.as_bytes()).map_err(storage)? {
            Some(key) => self.get_json(RESULTS, &key),
            None => Ok(None),
        }
    }

    fn insert_parameter_set(&self, set: &ParameterSet) -> Result<(), PersistenceError> {
        let names = self.tree(PARAMETER_SET_NAMES)?;
        let claimed = names
            .compare_and_swap(name_key(set), None as Option<&[u8]>, Some(set.id.as_bytes().to_vec()))
            .map_err(storage)?;
        if claimed.is_err() {
            return Err(PersistenceError::Duplicate(set.name.clone()));
        }
        self.tree(PARAMETER_SETS)?
            .insert(set.id.as_bytes(), encode(set)?)
            .map_err(storage)?;
        Ok(())
    }

    fn get_parameter_set(&self, id: Uuid) -> Result<Option<ParameterSet>, PersistenceError> {
        self.get_json(PARAMETER_SETS, id.as_bytes())
    }

    fn list_parameter_sets(
        &self,
        user_id: Uuid,
        analysis_type: Option<AnalysisType>,
    ) -> Result<Vec<ParameterSet>, PersistenceError> {
        let mut sets: Vec<ParameterSet> = self
            .scan::<ParameterSet>(PARAMETER_SETS)?
            .into_iter()
            .filter(|s| s.visible_to(user_id))
            .filter(|s| analysis_type.map_or(true, |t| s.analysis_type == t))
            .collect();
        sets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sets)
    }

    fn insert_data_file(&self, file: &DataFile) -> Result<(), PersistenceError> {
        self.tree(DATA_FILES)?
            .insert(file.id.as_bytes(), encode(file)?)
            .map_err(storage)?;
        Ok(())
    }

    fn get_data_file(&self, id: Uuid) -> Result<Option<DataFile>, PersistenceError> {
        self.get_json(DATA_FILES, id.as_bytes())
    }

    fn delete_data_file(&self, id: Uuid) -> Result<DataFile, PersistenceError> {
        let file: DataFile = self
            .get_json(DATA_FILES, id.as_bytes())?
            .ok_or_else(|| PersistenceError::NotFound(format!("data file {id}")))?;
        let job_count = self
            .scan::<AnalysisJob>(JOBS)?
            .iter()
            .filter(|j| j.data_file_id == id)
            .count();
        if job_count > 0 {
            return Err(PersistenceError::InUse {
                file_id: id,
                job_count,
            });
        }
        self.tree(DATA_FILES)?.remove(id.as_bytes()).map_err(storage)?;
        Ok(file)
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}
