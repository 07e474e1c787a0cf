//! Stingray backend: X-ray timing on binned counts
//!
//! FITS event lists are binned into a counts light curve at the estimated
//! event spacing; text files are read headerless by column position.
//! This is the only backend that simulates light curves.

use std::path::Path;

use tracing::debug;

use super::params::Params;
use super::raw::{
    LightCurveResult, PeriodogramResult, RawResult, SimulationResult, SpectrumResult, ValueKind,
};
use super::shared::{self, Detrend};
use super::{ensure_non_empty, AnalysisBackend, PlotArtifact};
use crate::config::{self, defaults::LOG_REBIN_FACTOR};
use crate::error::{EngineError, EngineResult};
use crate::io::{self, FitsFile, HeaderMode};
use crate::processing::{
    averaged_power_spectrum, bin_events, estimate_dt_with_limit, group_rebin,
    simulate_lightcurve, AveragedSpectrum, LombScargle, LsNormalization, PowerNorm,
    ProcessingError, SimulationModel, SimulationSpec, Window,
};
use crate::types::{AnalysisType, BackendKind, Metadata, Parameters, TimeSeries};

const NAME: &str = "stingray";

/// Counts-based timing backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct StingrayBackend;

impl StingrayBackend {
    fn read_event_list(&self, path: &Path) -> EngineResult<TimeSeries> {
        let file = FitsFile::open(path)?;
        let table = file
            .table_named("EVENTS")
            .filter(|t| t.column("TIME").is_some())
            .or_else(|| file.tables().find(|t| t.column("TIME").is_some()))
            .ok_or_else(|| {
                EngineError::DataFormat("no event table with a TIME column found".to_string())
            })?;

        let mut events: Vec<f64> = table
            .column("TIME")
            .map(|c| c.values.iter().copied().filter(|t| t.is_finite()).collect())
            .unwrap_or_default();
        events.sort_by(f64::total_cmp);

        let dt = estimate_dt_with_limit(&events, config::get().analysis.dt_sample_limit)
            .map_err(|e| EngineError::DataFormat(format!("cannot bin event list: {e}")))?;
        let binned = bin_events(&events, dt)?;
        debug!(events = events.len(), bins = binned.len(), dt, "Binned event list");

        let mut metadata = Metadata::new();
        metadata.insert("dt".to_string(), dt.into());
        metadata.insert("format".to_string(), "fits".into());
        TimeSeries::new(binned.time, binned.values, None, metadata)
    }

    fn power_spectrum(&self, data: &TimeSeries, p: &Params<'_>) -> EngineResult<RawResult> {
        let dt = shared::sampling_interval(data, p.opt_f64("dt")?)?;
        let segment_length = p.usize_or("segment_length", 1024)?;
        if segment_length == 0 {
            return Err(EngineError::invalid_param("segment_length", "must be at least 1"));
        }
        let norm = p.parse_or("norm", PowerNorm::Leahy)?;
        let average = p.bool_or("average", true)?;
        let (f_min, f_max) = p.range("freq_range")?;

        // A non-finite segment length means one segment over the whole series.
        let segment_secs = if average {
            segment_length as f64
        } else {
            f64::INFINITY
        };
        let mut spectrum = match p.intervals("gti")? {
            Some(gti) => spectrum_within_gti(data, &gti, dt, segment_secs, norm)?,
            None => averaged_power_spectrum(data.values(), dt, segment_secs, norm)?,
        };
        if f_min != 0.0 || f_max.is_some() {
            spectrum = spectrum.rebin_log(LOG_REBIN_FACTOR, Some(f_min), f_max)?;
        }

        let mut metadata = Metadata::new();
        metadata.insert("dt".to_string(), dt.into());
        metadata.insert("n_segments".to_string(), (spectrum.n_segments as i64).into());
        metadata.insert("norm".to_string(), norm.as_str().into());
        Ok(RawResult::Spectrum(SpectrumResult {
            frequency: spectrum.frequency,
            power: spectrum.power,
            power_err: spectrum.power_err,
            metadata,
        }))
    }

    fn fourier_transform(&self, data: &TimeSeries, p: &Params<'_>) -> EngineResult<RawResult> {
        let dt = shared::sampling_interval(data, p.opt_f64("dt")?)?;
        let window = p.parse_or("window", Window::Hanning)?;
        let detrend = p.bool_or("detrend", true)?.then_some(Detrend::Mean);
        Ok(RawResult::Fourier(shared::fourier(data, dt, window, detrend)?))
    }

    fn lomb_scargle(&self, data: &TimeSeries, p: &Params<'_>) -> EngineResult<RawResult> {
        let grid = shared::frequency_grid(p)?;
        let normalization = p.parse_or("normalization", LsNormalization::Standard)?;
        let ls = LombScargle::new(data.time(), data.values(), None)?;
        let frequency = ls.frequencies(grid)?;
        let power = ls.power(&frequency, normalization);
        let peaks = shared::dominant_peaks(&frequency, &power);

        let mut metadata = Metadata::new();
        metadata.insert("normalization".to_string(), normalization.as_str().into());
        metadata.insert(
            "samples_per_peak".to_string(),
            (p.usize_or("samples_per_peak", 5)? as i64).into(),
        );
        Ok(RawResult::Periodogram(PeriodogramResult {
            frequency,
            power,
            peaks,
            metadata,
            title: "Lomb-Scargle Periodogram",
            log_x: false,
        }))
    }

    fn rebin(&self, data: &TimeSeries, p: &Params<'_>) -> EngineResult<RawResult> {
        let (bin_time, method) = shared::rebin_request(p)?;
        let original_dt = shared::sampling_interval(data, None).ok();
        let primary = match original_dt {
            Some(dt) => group_rebin(data.time(), data.values(), data.errors(), dt, bin_time, method),
            None => Err(ProcessingError::InvalidInput(
                "sampling interval could not be determined".to_string(),
            )),
        };
        let (binned, _) = shared::rebin_or_fallback(NAME, data, bin_time, method, primary)?;

        let mut metadata = Metadata::new();
        metadata.insert("original_dt".to_string(), original_dt.into());
        metadata.insert("new_dt".to_string(), bin_time.into());
        metadata.insert("method".to_string(), method.as_str().into());
        Ok(RawResult::LightCurve(LightCurveResult {
            time: binned.time,
            values: binned.values,
            errors: binned.errors,
            kind: ValueKind::Counts,
            metadata,
        }))
    }

    /// Simulate a light curve from a model power spectrum. The input series
    /// is not used.
    fn pds_simulation(&self, p: &Params<'_>) -> EngineResult<RawResult> {
        let index = p.f64_or("red_noise_index", 1.0)?;
        let model_name = p.str_or("model", "powerlaw")?;
        let model = match model_name {
            "powerlaw" => SimulationModel::Powerlaw { index },
            "broken_powerlaw" => {
                let break_freq = p
                    .opt_f64("break_freq")?
                    .ok_or_else(|| EngineError::MissingParameter("break_freq".to_string()))?;
                SimulationModel::BrokenPowerlaw { index, break_freq }
            }
            "lorentzian" => SimulationModel::Lorentzian {
                centroid: p.f64_or("centroid", 0.1)?,
                width: p.f64_or("width", 0.01)?,
            },
            other => {
                return Err(EngineError::invalid_param(
                    "model",
                    format!("unsupported model type '{other}'"),
                ))
            }
        };
        let spec = SimulationSpec {
            model,
            dt: p.f64_or("dt", 0.001)?,
            tlen: p.f64_or("tlen", 1000.0)?,
            mean: p.f64_or("mean", 100.0)?,
            rms: p.f64_or("rms", 0.1)?,
            seed: p.opt_u64("seed")?,
        };
        let simulated = simulate_lightcurve(&spec)?;
        let spectrum = averaged_power_spectrum(&simulated.counts, spec.dt, f64::INFINITY, PowerNorm::Leahy)?;

        let mut metadata = Metadata::new();
        metadata.insert("model".to_string(), model_name.into());
        metadata.insert("dt".to_string(), spec.dt.into());
        metadata.insert("tlen".to_string(), spec.tlen.into());
        metadata.insert("mean".to_string(), spec.mean.into());
        metadata.insert("rms".to_string(), spec.rms.into());
        metadata.insert("red_noise_index".to_string(), index.into());
        Ok(RawResult::Simulation(SimulationResult {
            time: simulated.time,
            counts: simulated.counts,
            frequency: spectrum.frequency,
            power: spectrum.power,
            metadata,
        }))
    }
}

/// Average segments that lie inside good time intervals. With a finite
/// `segment_secs`, intervals shorter than one segment are skipped and the
/// per-interval spectra are combined weighted by segment count; otherwise
/// all in-interval samples form one series.
fn spectrum_within_gti(
    data: &TimeSeries,
    gti: &[(f64, f64)],
    dt: f64,
    segment_secs: f64,
    norm: PowerNorm,
) -> EngineResult<AveragedSpectrum> {
    let inside = |t: f64, (start, stop): (f64, f64)| t >= start && t < stop;
    let chunk = |interval: (f64, f64)| -> Vec<f64> {
        data.time()
            .iter()
            .zip(data.values())
            .filter(|(t, _)| inside(**t, interval))
            .map(|(_, v)| *v)
            .collect()
    };

    if !segment_secs.is_finite() {
        let values: Vec<f64> = gti.iter().flat_map(|&interval| chunk(interval)).collect();
        return Ok(averaged_power_spectrum(&values, dt, segment_secs, norm)?);
    }

    let bins_per_segment = (segment_secs / dt).floor() as usize;
    let mut combined: Option<AveragedSpectrum> = None;
    for &interval in gti {
        let values = chunk(interval);
        if values.len() < bins_per_segment {
            debug!(start = interval.0, stop = interval.1, "GTI shorter than one segment, skipped");
            continue;
        }
        let part = averaged_power_spectrum(&values, dt, segment_secs, norm)?;
        combined = Some(match combined {
            None => part,
            Some(acc) => merge_spectra(acc, part),
        });
    }
    combined.ok_or_else(|| {
        EngineError::invalid_param("gti", "no good time interval is as long as one segment")
    })
}

fn merge_spectra(a: AveragedSpectrum, b: AveragedSpectrum) -> AveragedSpectrum {
    let (na, nb) = (a.n_segments as f64, b.n_segments as f64);
    let total = na + nb;
    let power: Vec<f64> = a
        .power
        .iter()
        .zip(&b.power)
        .map(|(pa, pb)| (pa * na + pb * nb) / total)
        .collect();
    let power_err = power.iter().map(|p| p / total.sqrt()).collect();
    AveragedSpectrum {
        frequency: a.frequency,
        power,
        power_err,
        n_segments: a.n_segments + b.n_segments,
        df: a.df,
    }
}

impl AnalysisBackend for StingrayBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Stingray
    }

    fn supports(&self, analysis_type: AnalysisType) -> bool {
        matches!(
            analysis_type,
            AnalysisType::PowerSpectrum
                | AnalysisType::FourierTransform
                | AnalysisType::LombScargle
                | AnalysisType::Rebin
                | AnalysisType::PdsSimulation
        )
    }

    fn read_file(&self, path: &Path) -> EngineResult<TimeSeries> {
        match io::extension_of(path).as_str() {
            "fits" | "fit" | "evt" => self.read_event_list(path),
            "txt" | "csv" | "dat" => io::read_text_series(path, HeaderMode::Absent),
            other => Err(io::unsupported_format(other)),
        }
    }

    fn run_analysis(
        &self,
        analysis_type: AnalysisType,
        data: &TimeSeries,
        params: &Parameters,
    ) -> EngineResult<RawResult> {
        let p = Params::new(params);
        let raw = match analysis_type {
            AnalysisType::PowerSpectrum => self.power_spectrum(data, &p)?,
            AnalysisType::FourierTransform => self.fourier_transform(data, &p)?,
            AnalysisType::LombScargle => self.lomb_scargle(data, &p)?,
            AnalysisType::Rebin => self.rebin(data, &p)?,
            AnalysisType::PdsSimulation => self.pds_simulation(&p)?,
            AnalysisType::CrossSpectrum => {
                return Err(EngineError::unsupported_because(
                    NAME,
                    analysis_type.as_str(),
                    "Cross spectrum analysis requires two light curves",
                ))
            }
            other => return Err(EngineError::unsupported(NAME, other.as_str())),
        };
        ensure_non_empty(NAME, analysis_type, raw)
    }

    fn generate_plot(
        &self,
        analysis_type: AnalysisType,
        raw: &RawResult,
    ) -> EngineResult<PlotArtifact> {
        match (analysis_type, raw) {
            (AnalysisType::PowerSpectrum, RawResult::Spectrum(_))
            | (AnalysisType::FourierTransform, RawResult::Fourier(_))
            | (AnalysisType::LombScargle, RawResult::Periodogram(_))
            | (AnalysisType::Rebin, RawResult::LightCurve(_))
            | (AnalysisType::PdsSimulation, RawResult::Simulation(_)) => {
                shared::render(NAME, analysis_type, raw, "Light Curve")
            }
            (t, _) if !self.supports(t) => Err(EngineError::unsupported(NAME, t.as_str())),
            (t, raw) => Err(shared::mismatched(NAME, t, raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fits::testing;
    use serde_json::json;
    use std::io::Write;

    fn params(v: serde_json::Value) -> Parameters {
        v.as_object().cloned().unwrap()
    }

    fn sine_series(n: usize, dt: f64, freq: f64) -> TimeSeries {
        let time: Vec<f64> = (0..n).map(|i| i as f64 * dt).collect();
        let values = time
            .iter()
            .map(|t| 100.0 + 20.0 * (2.0 * std::f64::consts::PI * freq * t).sin())
            .collect();
        TimeSeries::from_columns(time, values).unwrap()
    }

    #[test]
    fn test_reads_headerless_text() {
        let mut f = tempfile::Builder::new().suffix(".dat").tempfile().unwrap();
        f.write_all(b"# time counts\n0 10\n1 12\n2 11\n").unwrap();
        let ts = StingrayBackend.read_file(f.path()).unwrap();
        assert_eq!(ts.len(), 3);
        assert_eq!(ts.metadata()["format"].as_str(), Some("dat"));
    }

    #[test]
    fn test_rebin_with_tiny_bin_time_fails_cleanly() {
        let ts = TimeSeries::from_columns(vec![0.0, 2.0e4], vec![1.0, 1.0]).unwrap();
        let err = StingrayBackend
            .run_analysis(AnalysisType::Rebin, &ts, &params(json!({"bin_time": 1.0e-9})))
            .unwrap_err();
        assert!(err.to_string().contains("Too many bins"), "got: {err}");
    }

    #[test]
    fn test_event_list_with_tiny_spacing_is_refused() {
        let events = [0.0, 1.0e-9, 2.0e-9, 2.0e4];
        let bytes = testing::bintable_file(&[], "EVENTS", &[("TIME", &events), ("PI", &[1.0; 4])]);
        let mut f = tempfile::Builder::new().suffix(".fits").tempfile().unwrap();
        f.write_all(&bytes).unwrap();

        let err = StingrayBackend.read_file(f.path()).unwrap_err();
        assert!(err.to_string().contains("Too many bins"), "got: {err}");
    }

    #[test]
    fn test_reads_event_list() {
        let events = [0.0, 0.5, 1.0, 1.2, 2.0, 3.5];
        let bytes = testing::bintable_file(&[], "EVENTS", &[("TIME", &events), ("PI", &[1.0; 6])]);
        let mut f = tempfile::Builder::new().suffix(".fits").tempfile().unwrap();
        f.write_all(&bytes).unwrap();

        let ts = StingrayBackend.read_file(f.path()).unwrap();
        assert_eq!(ts.values().iter().sum::<f64>(), 6.0);
        assert_eq!(ts.meta_f64("dt"), Some(0.5));
        assert_eq!(ts.metadata()["format"].as_str(), Some("fits"));
    }

    #[test]
    fn test_unknown_extension_is_data_format_error() {
        let f = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        assert!(matches!(
            StingrayBackend.read_file(f.path()),
            Err(EngineError::DataFormat(_))
        ));
    }

    #[test]
    fn test_power_spectrum_peaks_at_signal() {
        let data = sine_series(1024, 0.125, 1.25);
        let p = params(json!({"segment_length": 64, "norm": "leahy"}));
        let raw = StingrayBackend
            .run_analysis(AnalysisType::PowerSpectrum, &data, &p)
            .unwrap();
        let stats = raw.stats().unwrap();
        assert!((stats["max_power_freq"].as_f64().unwrap() - 1.25).abs() < 0.05);
        assert_eq!(raw.metadata()["n_segments"].as_f64(), Some(2.0));
    }

    #[test]
    fn test_gti_restricts_segments() {
        let data = sine_series(1000, 1.0, 0.05);
        let p = params(json!({
            "segment_length": 100,
            "gti": [[0, 250], [400, 460], [500, 800]]
        }));
        let raw = StingrayBackend
            .run_analysis(AnalysisType::PowerSpectrum, &data, &p)
            .unwrap();
        // 2 segments from the first interval, none from the second, 3 from the third
        assert_eq!(raw.metadata()["n_segments"].as_f64(), Some(5.0));
    }

    #[test]
    fn test_rebin_mean_of_constant_series() {
        let data = TimeSeries::from_columns((0..10).map(f64::from).collect(), vec![5.0; 10]).unwrap();
        let p = params(json!({"bin_time": 2.0, "method": "mean"}));
        let raw = StingrayBackend.run_analysis(AnalysisType::Rebin, &data, &p).unwrap();
        let stats = raw.stats().unwrap();
        assert_eq!(stats["mean_counts"], 5.0);
        assert_eq!(stats["n_bins"], 5);
    }

    #[test]
    fn test_rebin_falls_back_for_uneven_sampling() {
        let data = TimeSeries::from_columns(vec![0.0, 0.7, 1.1, 2.9, 4.0], vec![1.0; 5]).unwrap();
        let p = params(json!({"bin_time": 2.0}));
        let raw = StingrayBackend.run_analysis(AnalysisType::Rebin, &data, &p).unwrap();
        assert_eq!(raw.data()["counts"], json!([3.0, 1.0, 1.0]));
    }

    #[test]
    fn test_cross_spectrum_explains_itself() {
        let data = sine_series(16, 1.0, 0.1);
        let err = StingrayBackend
            .run_analysis(AnalysisType::CrossSpectrum, &data, &Parameters::new())
            .unwrap_err();
        assert!(err.to_string().contains("requires two light curves"));
    }

    #[test]
    fn test_simulation_is_reproducible_with_seed() {
        let data = sine_series(16, 1.0, 0.1);
        let p = params(json!({"dt": 0.1, "tlen": 102.4, "seed": 7}));
        let a = StingrayBackend.run_analysis(AnalysisType::PdsSimulation, &data, &p).unwrap();
        let b = StingrayBackend.run_analysis(AnalysisType::PdsSimulation, &data, &p).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.metadata()["model"].as_str(), Some("powerlaw"));
    }

    #[test]
    fn test_broken_powerlaw_needs_break_frequency() {
        let data = sine_series(16, 1.0, 0.1);
        let p = params(json!({"model": "broken_powerlaw"}));
        assert!(matches!(
            StingrayBackend.run_analysis(AnalysisType::PdsSimulation, &data, &p),
            Err(EngineError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_plot_rejects_mismatched_family() {
        let data = TimeSeries::from_columns((0..10).map(f64::from).collect(), vec![5.0; 10]).unwrap();
        let raw = StingrayBackend
            .run_analysis(AnalysisType::Rebin, &data, &Parameters::new())
            .unwrap();
        assert!(StingrayBackend.generate_plot(AnalysisType::Rebin, &raw).is_ok());
        assert!(StingrayBackend.generate_plot(AnalysisType::PowerSpectrum, &raw).is_err());
    }
}
