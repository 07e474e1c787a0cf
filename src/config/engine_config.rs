//! Engine Configuration - storage, workers, plotting and analysis tunables
//!
//! Each section implements `Default` with the values in [`super::defaults`],
//! so an empty or missing file behaves exactly like the built-in setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of the analysis engine.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$VAST_CONFIG` env var
/// 2. `./vast.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub plot: PlotConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$VAST_CONFIG` environment variable
    /// 2. `./vast.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded engine config from VAST_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from VAST_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "VAST_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded engine config from ./vast.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./vast.toml, using defaults");
                }
            }
        }

        info!("No vast.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for w in super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check every section, collecting all violations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.storage.results_dir.as_os_str().is_empty() {
            errors.push("storage.results_dir must not be empty".to_string());
        }
        if self.storage.backend == StoreKind::Sled && self.storage.data_dir.as_os_str().is_empty()
        {
            errors.push("storage.data_dir must not be empty with the sled backend".to_string());
        }

        let w = &self.workers;
        if w.count == 0 {
            errors.push("workers.count must be > 0".to_string());
        }
        if w.queue_capacity == 0 {
            errors.push("workers.queue_capacity must be > 0".to_string());
        }
        if w.job_timeout_secs == 0 {
            errors.push("workers.job_timeout_secs must be > 0".to_string());
        }

        let p = &self.plot;
        if p.width == 0 || p.height == 0 || p.panel_height == 0 {
            errors.push("plot.width, plot.height and plot.panel_height must be > 0".to_string());
        }
        for (name, color) in [("plot.line_color", &p.line_color), ("plot.peak_color", &p.peak_color)]
        {
            if color.trim().is_empty() {
                errors.push(format!("{name} must not be empty"));
            }
        }

        let a = &self.analysis;
        if a.max_peaks == 0 || a.max_peaks > defaults::MAX_PEAKS {
            errors.push(format!(
                "analysis.max_peaks must be within 1..={} (got {})",
                defaults::MAX_PEAKS,
                a.max_peaks
            ));
        }
        if !(a.peak_height_fraction.is_finite() && (0.0..=1.0).contains(&a.peak_height_fraction))
        {
            errors.push(format!(
                "analysis.peak_height_fraction must be within [0, 1] (got {})",
                a.peak_height_fraction
            ));
        }
        if a.dt_sample_limit < 2 {
            errors.push("analysis.dt_sample_limit must be >= 2".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Storage
// ============================================================================

/// Which persistence implementation backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Sled,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where plot HTML and data JSON files are written.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    #[serde(default = "default_store_kind")]
    pub backend: StoreKind,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DATA_DIR)
}

fn default_results_dir() -> PathBuf {
    PathBuf::from(defaults::RESULTS_DIR)
}

fn default_store_kind() -> StoreKind {
    StoreKind::Sled
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            results_dir: default_results_dir(),
            backend: default_store_kind(),
        }
    }
}

// ============================================================================
// Workers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Hard limit on one job's compute chain.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

fn default_worker_count() -> usize {
    defaults::WORKER_COUNT
}

fn default_queue_capacity() -> usize {
    defaults::QUEUE_CAPACITY
}

fn default_job_timeout_secs() -> u64 {
    defaults::JOB_TIMEOUT_SECS
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

// ============================================================================
// Plotting
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotConfig {
    #[serde(default = "default_plot_width")]
    pub width: u32,

    #[serde(default = "default_plot_height")]
    pub height: u32,

    /// Height of each panel in multi-panel figures.
    #[serde(default = "default_panel_height")]
    pub panel_height: u32,

    #[serde(default = "default_line_color")]
    pub line_color: String,

    #[serde(default = "default_peak_color")]
    pub peak_color: String,

    #[serde(default = "default_tools")]
    pub tools: Vec<String>,
}

fn default_plot_width() -> u32 {
    defaults::PLOT_WIDTH
}

fn default_plot_height() -> u32 {
    defaults::PLOT_HEIGHT
}

fn default_panel_height() -> u32 {
    defaults::PLOT_PANEL_HEIGHT
}

fn default_line_color() -> String {
    defaults::PLOT_LINE_COLOR.to_string()
}

fn default_peak_color() -> String {
    defaults::PLOT_ACCENT_COLOR.to_string()
}

fn default_tools() -> Vec<String> {
    defaults::PLOT_TOOLS.iter().map(|t| t.to_string()).collect()
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: default_plot_width(),
            height: default_plot_height(),
            panel_height: default_panel_height(),
            line_color: default_line_color(),
            peak_color: default_peak_color(),
            tools: default_tools(),
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_max_peaks")]
    pub max_peaks: usize,

    #[serde(default = "default_peak_height_fraction")]
    pub peak_height_fraction: f64,

    #[serde(default = "default_dt_sample_limit")]
    pub dt_sample_limit: usize,
}

fn default_max_peaks() -> usize {
    defaults::MAX_PEAKS
}

fn default_peak_height_fraction() -> f64 {
    defaults::PEAK_HEIGHT_FRACTION
}

fn default_dt_sample_limit() -> usize {
    defaults::DT_SAMPLE_LIMIT
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_peaks: default_max_peaks(),
            peak_height_fraction: default_peak_height_fraction(),
            dt_sample_limit: default_dt_sample_limit(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: EngineConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.workers.job_timeout_secs, 600);
        assert_eq!(config.analysis.max_peaks, 5);
        assert_eq!(config.plot.width, 700);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[storage]
backend = "memory"

[workers]
count = 8
"#;
        let config: EngineConfig = toml::from_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.storage.backend, StoreKind::Memory);
        assert_eq!(config.workers.count, 8);
        assert_eq!(config.workers.queue_capacity, defaults::QUEUE_CAPACITY);
        assert_eq!(config.plot.tools.len(), 4);
    }

    #[test]
    fn test_validation_collects_every_violation() {
        let mut config = EngineConfig::default();
        config.workers.count = 0;
        config.analysis.peak_height_fraction = 1.5;
        config.analysis.max_peaks = 0;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 3);
                assert!(errors.iter().any(|e| e.contains("workers.count")));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_toml_roundtrip_preserves_values() {
        let mut config = EngineConfig::default();
        config.plot.line_color = "black".to_string();
        let text = config.to_toml().unwrap();
        let back: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
