//! Analysis job entity and its lifecycle
//!
//! ```text
//!   PENDING ──pickup──▶ RUNNING ──ok──▶ SUCCESS
//!      │                   │
//!      └──cancel──┐        ├──error──▶ FAILED
//!                 ▼        │
//!               FAILED ◀───┘ (cancel)
//! ```
//!
//! SUCCESS and FAILED are terminal. The transition methods on [`AnalysisJob`]
//! are the only way the dispatcher mutates a job, so the timestamp and
//! `error_message` invariants hold by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::EngineError;

/// Error message recorded on a job cancelled by its owner.
pub const CANCELLED_MESSAGE: &str = "cancelled by user";

// ============================================================================
// Analysis Types
// ============================================================================

/// Closed set of analyses a job may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    PowerSpectrum,
    FourierTransform,
    LightCurve,
    Rebin,
    CrossSpectrum,
    PdsSimulation,
    LombScargle,
    Custom,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 8] = [
        AnalysisType::PowerSpectrum,
        AnalysisType::FourierTransform,
        AnalysisType::LightCurve,
        AnalysisType::Rebin,
        AnalysisType::CrossSpectrum,
        AnalysisType::PdsSimulation,
        AnalysisType::LombScargle,
        AnalysisType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::PowerSpectrum => "power_spectrum",
            AnalysisType::FourierTransform => "fourier_transform",
            AnalysisType::LightCurve => "light_curve",
            AnalysisType::Rebin => "rebin",
            AnalysisType::CrossSpectrum => "cross_spectrum",
            AnalysisType::PdsSimulation => "pds_simulation",
            AnalysisType::LombScargle => "lomb_scargle",
            AnalysisType::Custom => "custom",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisType::PowerSpectrum => "Power Spectrum",
            AnalysisType::FourierTransform => "Fourier Transform",
            AnalysisType::LightCurve => "Light Curve",
            AnalysisType::Rebin => "Rebin",
            AnalysisType::CrossSpectrum => "Cross Spectrum",
            AnalysisType::PdsSimulation => "PDS Simulation",
            AnalysisType::LombScargle => "Lomb-Scargle Periodogram",
            AnalysisType::Custom => "Custom Pipeline",
        }
    }

    /// Whether results of this analysis are indexed by frequency.
    pub fn is_frequency_domain(&self) -> bool {
        matches!(
            self,
            AnalysisType::PowerSpectrum
                | AnalysisType::FourierTransform
                | AnalysisType::LombScargle
                | AnalysisType::CrossSpectrum
        )
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EngineError::UnknownAnalysisType(s.to_string()))
    }
}

// ============================================================================
// Backend Names
// ============================================================================

/// Registered analysis backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Stingray,
    Lightkurve,
    Astropy,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Stingray,
        BackendKind::Lightkurve,
        BackendKind::Astropy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Stingray => "stingray",
            BackendKind::Lightkurve => "lightkurve",
            BackendKind::Astropy => "astropy",
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Stingray
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendKind::ALL
            .iter()
            .copied()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| EngineError::UnknownBackend(s.to_string()))
    }
}

// ============================================================================
// Job Status
// ============================================================================

/// Lifecycle state of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }

    /// Transition table: which target states are reachable from `self`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Success)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

// ============================================================================
// Analysis Job
// ============================================================================

/// JSON-compatible analysis parameters.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// One requested analysis of one data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub data_file_id: Uuid,
    pub analysis_type: AnalysisType,
    pub backend: BackendKind,
    #[serde(default)]
    pub parameters: Parameters,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Correlation id returned by the task queue.
    pub task_id: Option<String>,
}

impl AnalysisJob {
    /// New job in PENDING.
    pub fn new(
        user_id: Uuid,
        data_file_id: Uuid,
        analysis_type: AnalysisType,
        backend: BackendKind,
        parameters: Parameters,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            data_file_id,
            analysis_type,
            backend,
            parameters,
            status: JobStatus::Pending,
            error_message: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            task_id: None,
        }
    }

    fn check(&self, to: JobStatus) -> Result<(), InvalidTransition> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.status,
                to,
            })
        }
    }

    /// PENDING → RUNNING.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.check(JobStatus::Running)?;
        self.status = JobStatus::Running;
        self.started_at = Some(now);
        Ok(())
    }

    /// RUNNING → SUCCESS.
    pub fn succeed(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.check(JobStatus::Success)?;
        self.status = JobStatus::Success;
        self.finished_at = Some(now);
        self.error_message = None;
        Ok(())
    }

    /// PENDING/RUNNING → FAILED. An empty message is replaced so that
    /// `error_message` is always non-empty on a failed job.
    pub fn fail(
        &mut self,
        now: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Result<(), InvalidTransition> {
        self.check(JobStatus::Failed)?;
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "unknown error".to_string();
        }
        self.status = JobStatus::Failed;
        self.finished_at = Some(now);
        self.error_message = Some(message);
        Ok(())
    }

    /// Owner-requested cancellation.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.fail(now, CANCELLED_MESSAGE)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Status projection returned to polling callers.
    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            status: self.status,
            started_at: self.started_at,
            finished_at: self.finished_at,
            error_message: self.error_message.clone(),
        }
    }
}

impl fmt::Display for AnalysisJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} via {} ({})",
            self.analysis_type, self.data_file_id, self.backend, self.status
        )
    }
}

/// Snapshot of a job's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}
