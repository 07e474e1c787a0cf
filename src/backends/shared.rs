//! Building blocks reused by more than one backend

use tracing::{debug, warn};

use super::params::Params;
use super::raw::{FourierResult, RawResult};
use crate::config;
use crate::error::{EngineError, EngineResult};
use crate::plot::{charts, PlotArtifact};
use crate::processing::{
    bin_aggregate, detrend_linear, detrend_mean, estimate_dt_with_limit, find_peaks,
    fourier_transform, Aggregation, BinnedSeries, FrequencyGrid, Peak, ProcessingError, Window,
};
use crate::types::{AnalysisType, Metadata, TimeSeries};

/// Sampling interval: explicit parameter, then `dt` recorded by the reader,
/// then the median spacing of the time column.
pub(crate) fn sampling_interval(data: &TimeSeries, explicit: Option<f64>) -> EngineResult<f64> {
    if let Some(dt) = explicit {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(EngineError::invalid_param("dt", format!("must be positive, got {dt}")));
        }
        return Ok(dt);
    }
    if let Some(dt) = data.meta_f64("dt").filter(|d| d.is_finite() && *d > 0.0) {
        return Ok(dt);
    }
    let limit = config::get().analysis.dt_sample_limit;
    Ok(estimate_dt_with_limit(data.time(), limit)?)
}

/// Lomb-Scargle frequency grid from `minimum_frequency`,
/// `maximum_frequency`, `samples_per_peak` and `nyquist_factor`. An explicit
/// linear grid needs both bounds; otherwise the automatic grid is used.
pub(crate) fn frequency_grid(p: &Params<'_>) -> EngineResult<FrequencyGrid> {
    let samples_per_peak = p.usize_or("samples_per_peak", 5)?;
    if samples_per_peak == 0 {
        return Err(EngineError::invalid_param("samples_per_peak", "must be at least 1"));
    }
    let nyquist_factor = p.f64_or("nyquist_factor", 1.0)?;
    if !(nyquist_factor.is_finite() && nyquist_factor > 0.0) {
        return Err(EngineError::invalid_param(
            "nyquist_factor",
            format!("must be positive, got {nyquist_factor}"),
        ));
    }

    let grid = match (p.opt_f64("minimum_frequency")?, p.opt_f64("maximum_frequency")?) {
        (Some(minimum), Some(maximum)) => FrequencyGrid::Linear {
            minimum,
            maximum,
            samples_per_peak: samples_per_peak as f64,
        },
        _ => FrequencyGrid::Auto {
            samples_per_peak: samples_per_peak as f64,
            nyquist_factor,
        },
    };
    Ok(grid)
}

/// Dominant peaks with the configured height threshold and count limit.
pub(crate) fn dominant_peaks(frequency: &[f64], power: &[f64]) -> Vec<Peak> {
    let analysis = &config::get().analysis;
    find_peaks(frequency, power, analysis.peak_height_fraction, analysis.max_peaks)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Detrend {
    Mean,
    Linear,
}

/// Windowed complex FFT of the value column.
pub(crate) fn fourier(
    data: &TimeSeries,
    dt: f64,
    window: Window,
    detrend: Option<Detrend>,
) -> EngineResult<FourierResult> {
    let mut values = match detrend {
        Some(Detrend::Mean) => detrend_mean(data.values()),
        Some(Detrend::Linear) => detrend_linear(data.values()),
        None => data.values().to_vec(),
    };
    window.apply(&mut values);
    let spectrum = fourier_transform(&values, dt)?;

    let mut metadata = Metadata::new();
    metadata.insert("dt".to_string(), dt.into());
    metadata.insert("window".to_string(), window.as_str().into());
    metadata.insert("detrended".to_string(), detrend.is_some().into());

    Ok(FourierResult {
        frequency: spectrum.frequency,
        real: spectrum.real,
        imag: spectrum.imag,
        amplitude: spectrum.amplitude,
        metadata,
    })
}

/// `bin_time` and `method` of a rebin request.
pub(crate) fn rebin_request(p: &Params<'_>) -> EngineResult<(f64, Aggregation)> {
    let bin_time = p.f64_or("bin_time", 1.0)?;
    if !(bin_time.is_finite() && bin_time > 0.0) {
        return Err(EngineError::invalid_param(
            "bin_time",
            format!("must be positive, got {bin_time}"),
        ));
    }
    let method = p.parse_or("method", Aggregation::Sum)?;
    Ok((bin_time, method))
}

/// Keep the primary rebin when it produced bins; otherwise fall back to
/// [`bin_aggregate`]. The flag is `true` when the fallback ran.
pub(crate) fn rebin_or_fallback(
    backend: &str,
    data: &TimeSeries,
    bin_time: f64,
    method: Aggregation,
    primary: Result<BinnedSeries, ProcessingError>,
) -> EngineResult<(BinnedSeries, bool)> {
    match primary {
        Ok(binned) if !binned.is_empty() => {
            debug!(backend, bins = binned.len(), "Primary rebin succeeded");
            Ok((binned, false))
        }
        outcome => {
            let reason = match outcome {
                Err(e) => e.to_string(),
                Ok(_) => "no bins produced".to_string(),
            };
            warn!(backend, bin_time, reason = %reason, "Primary rebin failed, using bin-and-aggregate fallback");
            let binned = bin_aggregate(data.time(), data.values(), data.errors(), bin_time, method)?;
            Ok((binned, true))
        }
    }
}

/// Render any result family. `light_curve_title` names the rebin figure,
/// which differs between backends.
pub(crate) fn render(
    backend: &str,
    analysis_type: AnalysisType,
    raw: &RawResult,
    light_curve_title: &str,
) -> EngineResult<PlotArtifact> {
    let figure = match raw {
        RawResult::Spectrum(r) => {
            charts::power_spectrum("Power Spectrum", &r.frequency, &r.power, Some(&r.power_err))
        }
        RawResult::Fourier(r) => charts::fourier_transform(&r.frequency, &r.amplitude, &r.real, &r.imag),
        RawResult::Periodogram(r) => charts::periodogram(r.title, &r.frequency, &r.power, &r.peaks, r.log_x),
        RawResult::LightCurve(r) => charts::light_curve(
            light_curve_title,
            &r.time,
            &r.values,
            r.errors.as_deref(),
            r.kind.label(),
        ),
        RawResult::Simulation(r) => charts::simulation(&r.time, &r.counts, &r.frequency, &r.power),
    };
    debug!(backend, analysis_type = %analysis_type.as_str(), family = raw.family(), "Rendering plot");
    PlotArtifact::render(&figure)
}

/// Error for a result whose family does not belong to `analysis_type`.
pub(crate) fn mismatched(backend: &str, analysis_type: AnalysisType, raw: &RawResult) -> EngineError {
    EngineError::Execution(format!(
        "{backend} cannot plot a {} result as {}",
        raw.family(),
        analysis_type.as_str()
    ))
}
