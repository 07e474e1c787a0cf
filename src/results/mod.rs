//! Result materialization
//!
//! Turns a backend's [`RawResult`] and [`PlotArtifact`] into persisted
//! [`AnalysisResult`] rows, in the order plot, data, stats. Each row is
//! attempted independently; a failed row is reported but never stops the
//! rows after it, and rows already written are kept.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backends::{PlotArtifact, RawResult};
use crate::config::defaults::RESULT_TIMESTAMP_FORMAT;
use crate::error::EngineResult;
use crate::storage::Persistence;
use crate::types::{AnalysisJob, AnalysisResult, ResultType};

/// What one materialization pass achieved.
#[derive(Debug, Default)]
pub struct MaterializeReport {
    pub persisted: Vec<AnalysisResult>,
    pub failures: Vec<(ResultType, String)>,
}

impl MaterializeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// One-line description of the failed rows, `None` when all succeeded.
    pub fn failure_summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .failures
            .iter()
            .map(|(kind, err)| format!("{kind} ({err})"))
            .collect();
        Some(format!("failed to persist results: {}", parts.join("; ")))
    }
}

/// Writes result files under `results_dir` and result rows to the store.
pub struct ResultMaterializer {
    store: Arc<dyn Persistence>,
    results_dir: PathBuf,
}

impl ResultMaterializer {
    pub fn new(store: Arc<dyn Persistence>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            results_dir: results_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Persist every section that is present.
    pub fn materialize(
        &self,
        job: &AnalysisJob,
        raw: &RawResult,
        plot: Option<&PlotArtifact>,
    ) -> MaterializeReport {
        let stem = format!(
            "{}_{}_{}",
            job.id,
            job.analysis_type.as_str(),
            Utc::now().format(RESULT_TIMESTAMP_FORMAT)
        );
        let mut report = MaterializeReport::default();

        if let Some(artifact) = plot {
            let outcome = self.persist_plot(job, &stem, artifact);
            self.record(job, ResultType::Plot, outcome, &mut report);
        }
        let outcome = self.persist_data(job, &stem, raw);
        self.record(job, ResultType::Data, outcome, &mut report);
        if let Some(stats) = raw.stats() {
            let outcome = self.insert(AnalysisResult::stats(job.id, stats));
            self.record(job, ResultType::Stats, outcome, &mut report);
        }

        info!(
            job_id = %job.id,
            persisted = report.persisted.len(),
            failed = report.failures.len(),
            "Materialized results"
        );
        report
    }

    fn persist_plot(
        &self,
        job: &AnalysisJob,
        stem: &str,
        artifact: &PlotArtifact,
    ) -> EngineResult<AnalysisResult> {
        let path = self.write_file(&format!("{stem}.html"), artifact.html.as_bytes())?;
        self.insert(AnalysisResult::plot(job.id, path, artifact.json_data.clone()))
    }

    fn persist_data(&self, job: &AnalysisJob, stem: &str, raw: &RawResult) -> EngineResult<AnalysisResult> {
        let bytes = serde_json::to_vec(&raw.data())?;
        let path = self.write_file(&format!("{stem}.json"), &bytes)?;
        self.insert(AnalysisResult::data(job.id, path))
    }

    fn write_file(&self, name: &str, bytes: &[u8]) -> EngineResult<PathBuf> {
        fs::create_dir_all(&self.results_dir)?;
        let path = self.results_dir.join(name);
        fs::write(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote result file");
        Ok(path)
    }

    fn insert(&self, result: AnalysisResult) -> EngineResult<AnalysisResult> {
        self.store.insert_result(&result)?;
        Ok(result)
    }

    fn record(
        &self,
        job: &AnalysisJob,
        kind: ResultType,
        outcome: EngineResult<AnalysisResult>,
        report: &mut MaterializeReport,
    ) {
        match outcome {
            Ok(result) => report.persisted.push(result),
            Err(e) => {
                warn!(job_id = %job.id, result_type = %kind, error = %e, "Result row not persisted");
                report.failures.push((kind, e.to_string()));
            }
        }
    }
}
