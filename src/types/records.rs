//! Persisted records around a job: results, parameter sets, data files

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::job::{AnalysisType, Parameters};

// ============================================================================
// Analysis Results
// ============================================================================

/// Closed set of persisted result shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Plot,
    Data,
    Stats,
}

impl ResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultType::Plot => "plot",
            ResultType::Data => "data",
            ResultType::Stats => "stats",
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted output of a job. Write-once.
///
/// A plot row carries both the rendered HTML file and the figure JSON; a data
/// row only a file; a stats row only inline content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub job_id: Uuid,
    pub result_type: ResultType,
    pub file_path: Option<PathBuf>,
    pub content: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn plot(job_id: Uuid, html_path: PathBuf, figure: serde_json::Value) -> Self {
        Self::build(job_id, ResultType::Plot, Some(html_path), Some(figure))
    }

    pub fn data(job_id: Uuid, path: PathBuf) -> Self {
        Self::build(job_id, ResultType::Data, Some(path), None)
    }

    pub fn stats(job_id: Uuid, content: serde_json::Value) -> Self {
        Self::build(job_id, ResultType::Stats, None, Some(content))
    }

    fn build(
        job_id: Uuid,
        result_type: ResultType,
        file_path: Option<PathBuf>,
        content: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            result_type,
            file_path,
            content,
            created_at: Utc::now(),
        }
    }

    /// A result row must reference something.
    pub fn has_payload(&self) -> bool {
        self.file_path.is_some() || self.content.is_some()
    }
}

// ============================================================================
// Parameter Sets
// ============================================================================

/// Named, reusable parameter bundle scoped to one analysis type.
///
/// `user_id == None` marks a system-level set. `(name, user_id, analysis_type)`
/// is unique across the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub id: Uuid,
    pub name: String,
    pub user_id: Option<Uuid>,
    pub analysis_type: AnalysisType,
    #[serde(default)]
    pub description: String,
    pub parameters: Parameters,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl ParameterSet {
    pub fn new(
        name: impl Into<String>,
        user_id: Option<Uuid>,
        analysis_type: AnalysisType,
        parameters: Parameters,
        is_public: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            user_id,
            analysis_type,
            description: String::new(),
            parameters,
            is_public,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Same uniqueness key as `other`.
    pub fn collides_with(&self, other: &ParameterSet) -> bool {
        self.name == other.name
            && self.user_id == other.user_id
            && self.analysis_type == other.analysis_type
    }

    /// Visible to `user` when owned by them or public.
    pub fn visible_to(&self, user: Uuid) -> bool {
        self.is_public || self.user_id == Some(user)
    }
}

// ============================================================================
// Data Files
// ============================================================================

/// Input file format recorded at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    Fits,
    Csv,
    Txt,
    Ascii,
}

impl FileType {
    /// Classify by extension; anything unrecognised is plain ASCII.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("fits") | Some("fit") | Some("fts") => FileType::Fits,
            Some("csv") => FileType::Csv,
            Some("txt") => FileType::Txt,
            _ => FileType::Ascii,
        }
    }
}

/// An uploaded time-series file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub path: PathBuf,
    pub file_type: FileType,
    /// Size in bytes.
    pub size: u64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub is_public: bool,
    pub uploaded_at: DateTime<Utc>,
}

impl DataFile {
    pub fn new(user_id: Uuid, path: PathBuf, size: u64, is_public: bool) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            file_type: FileType::from_path(&path),
            path,
            size,
            metadata: serde_json::Map::new(),
            is_public,
            uploaded_at: Utc::now(),
        }
    }

    pub fn accessible_by(&self, user: Uuid) -> bool {
        self.is_public || self.user_id == user
    }
}
