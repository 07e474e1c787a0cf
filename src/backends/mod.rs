//! Pluggable analysis backends
//!
//! Every backend adapts one family of analysis routines to the same three
//! operations: read a data file into a [`TimeSeries`], run an analysis into
//! a [`RawResult`], and render a [`PlotArtifact`]. Backends are stateless
//! unit structs, so callers create one per job with [`get_backend`].
//!
//! ## Backends
//!
//! 1. **stingray** - event lists, averaged power spectra, simulation
//! 2. **lightkurve** - flux light curves, Lomb-Scargle periodograms
//! 3. **astropy** - generic tables, Lomb-Scargle with measurement errors

pub mod astropy;
pub mod lightkurve;
pub(crate) mod params;
pub mod raw;
mod shared;
pub mod stingray;

pub use astropy::AstropyBackend;
pub use lightkurve::LightkurveBackend;
pub use raw::{
    FourierResult, LightCurveResult, PeriodogramResult, RawResult, SimulationResult,
    SpectrumResult, ValueKind,
};
pub use stingray::StingrayBackend;

pub use crate::plot::PlotArtifact;

use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::types::{AnalysisType, BackendKind, Parameters, TimeSeries};

/// Contract shared by all analysis backends.
pub trait AnalysisBackend: Send + Sync {
    /// Registry name (e.g. "stingray").
    fn name(&self) -> &'static str;

    fn kind(&self) -> BackendKind;

    /// Whether `run_analysis` implements `analysis_type`.
    fn supports(&self, analysis_type: AnalysisType) -> bool;

    /// Parse a data file. Fails with `DataFormat` for unsupported extensions
    /// or when no data columns can be identified.
    fn read_file(&self, path: &Path) -> EngineResult<TimeSeries>;

    /// Run one analysis. Fails with `UnsupportedAnalysis` when the type is
    /// outside this backend's subset; never returns an empty result.
    fn run_analysis(
        &self,
        analysis_type: AnalysisType,
        data: &TimeSeries,
        params: &Parameters,
    ) -> EngineResult<RawResult>;

    /// Render a result produced by `run_analysis` for the same type.
    fn generate_plot(
        &self,
        analysis_type: AnalysisType,
        raw: &RawResult,
    ) -> EngineResult<PlotArtifact>;
}

impl BackendKind {
    /// Instantiate the backend for this variant.
    pub fn create(self) -> Box<dyn AnalysisBackend> {
        match self {
            BackendKind::Stingray => Box::new(StingrayBackend),
            BackendKind::Lightkurve => Box::new(LightkurveBackend),
            BackendKind::Astropy => Box::new(AstropyBackend),
        }
    }
}

/// Look up a backend by registry name.
pub fn get_backend(name: &str) -> EngineResult<Box<dyn AnalysisBackend>> {
    let kind: BackendKind = name.parse()?;
    Ok(kind.create())
}

/// One instance of every registered backend.
pub fn all_backends() -> Vec<Box<dyn AnalysisBackend>> {
    BackendKind::ALL.iter().map(|k| k.create()).collect()
}

/// Reject empty outputs so no backend can hand the materializer a result
/// without data.
pub(crate) fn ensure_non_empty(
    backend: &str,
    analysis_type: AnalysisType,
    raw: RawResult,
) -> EngineResult<RawResult> {
    if raw.is_empty() {
        return Err(EngineError::Execution(format!(
            "{backend} produced an empty {} result",
            analysis_type.as_str()
        )));
    }
    Ok(raw)
}
