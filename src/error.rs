//! Engine error taxonomy
//!
//! Every failure the engine can surface funnels into [`EngineError`]. Errors
//! raised during job execution are caught by the executor and recorded on the
//! job as a human-readable `error_message`; errors raised synchronously by the
//! dispatcher (bad analysis type, unknown backend, terminal cancel) are
//! returned to the caller directly.

use thiserror::Error;
use uuid::Uuid;

use crate::processing::ProcessingError;
use crate::storage::PersistenceError;
use crate::types::JobStatus;

/// Convenience alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by the analysis engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Unreadable or unsupported input file.
    #[error("data format error: {0}")]
    DataFormat(String),

    /// The backend does not implement the requested analysis type.
    #[error("analysis '{analysis_type}' is not supported by the {backend} backend{}", detail_suffix(.detail))]
    UnsupportedAnalysis {
        backend: String,
        analysis_type: String,
        detail: Option<String>,
    },

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("unknown analysis type: {0}")]
    UnknownAnalysisType(String),

    /// Catch-all for failures inside the read/analyze/plot/persist chain.
    #[error("execution failure: {0}")]
    Execution(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("job {job_id} cannot be cancelled in state {status}")]
    NotCancellable { job_id: Uuid, status: JobStatus },

    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    #[error("result not found: {0}")]
    ResultNotFound(String),

    #[error("data file not found: {0}")]
    DataFileNotFound(Uuid),

    #[error("parameter set not found: {0}")]
    ParameterSetNotFound(Uuid),

    #[error("data file {file_id} is referenced by {job_count} analysis job(s)")]
    DataFileInUse { file_id: Uuid, job_count: usize },

    #[error("parameter set '{0}' already exists for this user and analysis type")]
    DuplicateParameterSet(String),

    #[error("execution timed out after {0} s")]
    Timeout(u64),

    #[error("task submission failed: {0}")]
    Submission(String),

    #[error(transparent)]
    Persistence(PersistenceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

impl EngineError {
    /// Shorthand for an unsupported backend/type combination.
    pub fn unsupported(backend: impl Into<String>, analysis_type: impl Into<String>) -> Self {
        Self::UnsupportedAnalysis {
            backend: backend.into(),
            analysis_type: analysis_type.into(),
            detail: None,
        }
    }

    /// Unsupported combination with an explanatory note.
    pub fn unsupported_because(
        backend: impl Into<String>,
        analysis_type: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::UnsupportedAnalysis {
            backend: backend.into(),
            analysis_type: analysis_type.into(),
            detail: Some(detail.into()),
        }
    }

    pub fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<PersistenceError> for EngineError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Duplicate(name) => EngineError::DuplicateParameterSet(name),
            PersistenceError::InUse { file_id, job_count } => {
                EngineError::DataFileInUse { file_id, job_count }
            }
            other => EngineError::Persistence(other),
        }
    }
}

impl From<ProcessingError> for EngineError {
    fn from(err: ProcessingError) -> Self {
        EngineError::Execution(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_message_includes_detail() {
        let err = EngineError::unsupported_because(
            "stingray",
            "cross_spectrum",
            "cross spectrum analysis requires two light curves",
        );
        let msg = err.to_string();
        assert!(msg.contains("cross_spectrum"));
        assert!(msg.contains("stingray"));
        assert!(msg.contains("two light curves"));
    }

    #[test]
    fn test_unsupported_message_without_detail() {
        let err = EngineError::unsupported("astropy", "pds_simulation");
        assert_eq!(
            err.to_string(),
            "analysis 'pds_simulation' is not supported by the astropy backend"
        );
    }

    #[test]
    fn test_processing_error_becomes_execution_failure() {
        let err: EngineError = ProcessingError::InsufficientData {
            needed: 2,
            available: 1,
        }
        .into();
        assert!(matches!(err, EngineError::Execution(_)));
    }

    #[test]
    fn test_store_conflicts_map_to_engine_errors() {
        let err: EngineError = PersistenceError::Duplicate("fast".to_string()).into();
        assert!(matches!(err, EngineError::DuplicateParameterSet(_)));
        let err: EngineError = PersistenceError::Storage("disk full".to_string()).into();
        assert!(matches!(err, EngineError::Persistence(_)));
    }
}
