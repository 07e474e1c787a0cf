//! Engine Configuration Module
//!
//! Process-wide settings loaded from TOML, covering where results land,
//! how many workers run jobs, how figures look, and the analysis tunables.
//!
//! ## Loading Order
//!
//! 1. `VAST_CONFIG` environment variable (path to TOML file)
//! 2. `vast.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(EngineConfig::load());
//!
//! // Anywhere in the codebase:
//! let limit = config::get().analysis.max_peaks;
//! ```

mod engine_config;
pub mod defaults;
pub mod validation;

pub use engine_config::*;

use std::sync::OnceLock;

/// Global engine configuration, initialized once at startup.
static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize the global engine configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: EngineConfig) {
    if ENGINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global engine configuration.
///
/// Library consumers and tests that never call `init()` get the defaults.
pub fn get() -> &'static EngineConfig {
    ENGINE_CONFIG.get_or_init(|| {
        tracing::debug!("config::get() before config::init(), using defaults");
        EngineConfig::default()
    })
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    ENGINE_CONFIG.get().is_some()
}
