//! System-wide default constants.
//!
//! Centralises magic numbers used across the engine.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Storage
// ============================================================================

/// Directory holding the sled database and uploaded data files.
pub const DATA_DIR: &str = "./data";

/// Directory the result materializer writes plot and data files into.
pub const RESULTS_DIR: &str = "./data/results";

/// Config file looked up in the working directory when `$VAST_CONFIG` is unset.
pub const CONFIG_FILE_NAME: &str = "vast.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "VAST_CONFIG";

/// Timestamp format embedded in result file names (`%Y%m%d%H%M%S`).
pub const RESULT_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

// ============================================================================
// Workers
// ============================================================================

/// Number of concurrent job workers.
pub const WORKER_COUNT: usize = 4;

/// Bounded queue depth between the dispatcher and the worker pool.
pub const QUEUE_CAPACITY: usize = 256;

/// Hard limit on one job's read/analyze/plot chain (seconds).
///
/// 600 = 10 minutes.
pub const JOB_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Analysis
// ============================================================================

/// Maximum number of periodogram peaks reported (also the configurable ceiling).
pub const MAX_PEAKS: usize = 5;

/// Minimum peak height as a fraction of the periodogram maximum.
pub const PEAK_HEIGHT_FRACTION: f64 = 0.1;

/// Points sampled when estimating the sampling interval of long series.
pub const DT_SAMPLE_LIMIT: usize = 10_000;

/// Bin-width growth factor of logarithmic power-spectrum rebinning.
pub const LOG_REBIN_FACTOR: f64 = 0.01;

/// Upper bound on the bins any rebin or event histogram may allocate. 2^24 ≈ 16.7 M.
pub const MAX_BINS: usize = 1 << 24;

/// Upper bound on simulated light-curve length (bins).
pub const MAX_SIMULATION_BINS: usize = MAX_BINS;

// ============================================================================
// Plotting
// ============================================================================

pub const PLOT_WIDTH: u32 = 700;

/// Height of a single-panel figure (px).
pub const PLOT_HEIGHT: u32 = 400;

/// Height of each panel in a multi-panel figure (px).
pub const PLOT_PANEL_HEIGHT: u32 = 300;

pub const PLOT_LINE_COLOR: &str = "#1f77b4";

/// Peak markers and imaginary-part traces.
pub const PLOT_ACCENT_COLOR: &str = "#d62728";

/// Interactive tools advertised in the figure JSON.
pub const PLOT_TOOLS: &[&str] = &["hover", "box_zoom", "reset", "save"];

/// Points drawn per SVG series before decimation; JSON keeps every point.
pub const PLOT_MAX_SVG_POINTS: usize = 5_000;
