//! Lightkurve backend: flux light curves from survey photometry
//!
//! Every frequency-domain request is answered with a Lomb-Scargle
//! periodogram, amplitude-normalized unless asked otherwise.

use std::path::Path;
use std::str::FromStr;

use super::params::Params;
use super::raw::{LightCurveResult, PeriodogramResult, RawResult, ValueKind};
use super::shared;
use super::{ensure_non_empty, AnalysisBackend, PlotArtifact};
use crate::error::{EngineError, EngineResult};
use crate::io::{self, FitsFile, HeaderMode};
use crate::processing::{downsample, BinStamp, LombScargle, LsNormalization, ProcessingError};
use crate::types::{AnalysisType, BackendKind, Metadata, Parameters, TimeSeries};

const NAME: &str = "lightkurve";

/// Flux columns in order of preference.
const FLUX_COLUMNS: [&str; 3] = ["PDCSAP_FLUX", "SAP_FLUX", "FLUX"];

/// Periodogram normalization: `amplitude` or any Lomb-Scargle one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodogramNorm {
    /// Semi-amplitude of the best-fit sinusoid, in flux units.
    Amplitude,
    Ls(LsNormalization),
}

impl PeriodogramNorm {
    fn as_str(&self) -> &'static str {
        match self {
            PeriodogramNorm::Amplitude => "amplitude",
            PeriodogramNorm::Ls(n) => n.as_str(),
        }
    }
}

impl FromStr for PeriodogramNorm {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amplitude" => Ok(PeriodogramNorm::Amplitude),
            other => other.parse().map(PeriodogramNorm::Ls),
        }
    }
}

/// Flux-based photometry backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightkurveBackend;

impl LightkurveBackend {
    fn read_light_curve(&self, path: &Path) -> EngineResult<TimeSeries> {
        let file = FitsFile::open(path)?;
        let table = file
            .table_named("LIGHTCURVE")
            .filter(|t| t.column("TIME").is_some())
            .or_else(|| file.tables().find(|t| t.column("TIME").is_some()))
            .ok_or_else(|| {
                EngineError::DataFormat("no light curve table with a TIME column found".to_string())
            })?;
        let time = table
            .column("TIME")
            .ok_or_else(|| EngineError::DataFormat("TIME column missing".to_string()))?;
        let flux = FLUX_COLUMNS
            .iter()
            .find_map(|name| table.column(name))
            .or_else(|| table.column_containing(&["FLUX", "COUNTS", "RATE"]))
            .ok_or_else(|| {
                EngineError::DataFormat("no flux or counts column found".to_string())
            })?;
        let flux_err = table.column(&format!("{}_ERR", flux.name));
        tracing::debug!(flux = %flux.name, has_errors = flux_err.is_some(), "Selected flux column");

        let mut metadata = Metadata::new();
        metadata.insert("mission".to_string(), io::keyword_meta(&file, &["MISSION", "TELESCOP"]));
        metadata.insert("target".to_string(), io::keyword_meta(&file, &["OBJECT"]));
        metadata.insert("exptime".to_string(), io::keyword_meta(&file, &["EXPOSURE"]));
        metadata.insert("format".to_string(), "fits".into());
        io::assemble_series(
            &time.values,
            &flux.values,
            flux_err.map(|c| c.values.as_slice()),
            metadata,
        )
    }

    fn periodogram(&self, data: &TimeSeries, p: &Params<'_>) -> EngineResult<RawResult> {
        let grid = shared::frequency_grid(p)?;
        let norm = p.parse_or("normalization", PeriodogramNorm::Amplitude)?;
        let ls = LombScargle::new(data.time(), data.values(), data.errors())?;
        let frequency = ls.frequencies(grid)?;
        let power = match norm {
            PeriodogramNorm::Ls(n) => ls.power(&frequency, n),
            PeriodogramNorm::Amplitude => {
                let n = data.len() as f64;
                ls.power(&frequency, LsNormalization::Psd)
                    .into_iter()
                    .map(|psd| (4.0 * psd / n).sqrt())
                    .collect()
            }
        };
        let peaks = shared::dominant_peaks(&frequency, &power);

        let mut metadata = Metadata::new();
        metadata.insert("normalization".to_string(), norm.as_str().into());
        metadata.insert("minimum_frequency".to_string(), frequency.first().copied().into());
        metadata.insert("maximum_frequency".to_string(), frequency.last().copied().into());
        Ok(RawResult::Periodogram(PeriodogramResult {
            frequency,
            power,
            peaks,
            metadata,
            title: "Periodogram",
            log_x: true,
        }))
    }

    fn rebin(&self, data: &TimeSeries, p: &Params<'_>) -> EngineResult<RawResult> {
        let (bin_time, method) = shared::rebin_request(p)?;
        let primary = downsample(
            data.time(),
            data.values(),
            data.errors(),
            bin_time,
            method,
            BinStamp::Mid,
        );
        let (binned, _) = shared::rebin_or_fallback(NAME, data, bin_time, method, primary)?;

        let mut metadata = Metadata::new();
        metadata.insert("bin_size".to_string(), bin_time.into());
        metadata.insert("method".to_string(), method.as_str().into());
        Ok(RawResult::LightCurve(LightCurveResult {
            time: binned.time,
            values: binned.values,
            errors: binned.errors,
            kind: ValueKind::Flux,
            metadata,
        }))
    }
}

impl AnalysisBackend for LightkurveBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Lightkurve
    }

    fn supports(&self, analysis_type: AnalysisType) -> bool {
        matches!(
            analysis_type,
            AnalysisType::PowerSpectrum
                | AnalysisType::FourierTransform
                | AnalysisType::LombScargle
                | AnalysisType::Rebin
        )
    }

    fn read_file(&self, path: &Path) -> EngineResult<TimeSeries> {
        match io::extension_of(path).as_str() {
            "fits" | "fit" => self.read_light_curve(path),
            "csv" | "txt" => io::read_text_series(path, HeaderMode::Detect),
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
            AnalysisType::PowerSpectrum
            | AnalysisType::FourierTransform
            | AnalysisType::LombScargle => self.periodogram(data, &p)?,
            AnalysisType::Rebin => self.rebin(data, &p)?,
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
            (
                AnalysisType::PowerSpectrum
                | AnalysisType::FourierTransform
                | AnalysisType::LombScargle,
                RawResult::Periodogram(_),
            )
            | (AnalysisType::Rebin, RawResult::LightCurve(_)) => {
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
    use std::f64::consts::PI;
    use std::io::Write;

    fn params(v: serde_json::Value) -> Parameters {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_prefers_pdcsap_flux() {
        let time = [0.0, 1.0, 2.0, 3.0];
        let sap = [1.0, 1.0, 1.0, 1.0];
        let pdc = [2.0, 2.0, 2.0, 2.0];
        let pdc_err = [0.1, 0.1, 0.1, 0.1];
        let bytes = testing::bintable_file(
            &[("MISSION", "TESS"), ("OBJECT", "TIC 1")],
            "LIGHTCURVE",
            &[
                ("TIME", &time),
                ("SAP_FLUX", &sap),
                ("PDCSAP_FLUX", &pdc),
                ("PDCSAP_FLUX_ERR", &pdc_err),
            ],
        );
        let mut f = tempfile::Builder::new().suffix(".fits").tempfile().unwrap();
        f.write_all(&bytes).unwrap();

        let ts = LightkurveBackend.read_file(f.path()).unwrap();
        assert_eq!(ts.values(), &pdc);
        assert_eq!(ts.errors().unwrap(), &pdc_err);
        assert_eq!(ts.metadata()["mission"].as_str(), Some("TESS"));
        assert_eq!(ts.metadata()["target"].as_str(), Some("TIC 1"));
    }

    #[test]
    fn test_amplitude_periodogram_recovers_amplitude() {
        let time: Vec<f64> = (0..400).map(|i| i as f64 * 0.25).collect();
        let flux = time.iter().map(|t| 1.0 + 0.3 * (2.0 * PI * 0.5 * t).sin()).collect();
        let data = TimeSeries::from_columns(time, flux).unwrap();

        let raw = LightkurveBackend
            .run_analysis(AnalysisType::LombScargle, &data, &Parameters::new())
            .unwrap();
        let peaks = raw.peaks().unwrap();
        assert!((peaks[0].frequency - 0.5).abs() < 0.01);
        assert!((peaks[0].power - 0.3).abs() < 0.03);
        assert_eq!(raw.metadata()["normalization"].as_str(), Some("amplitude"));
    }

    #[test]
    fn test_fourier_request_is_a_periodogram() {
        let data = TimeSeries::from_columns(
            (0..50).map(f64::from).collect(),
            (0..50).map(|i| (i as f64 * 0.7).sin()).collect(),
        )
        .unwrap();
        let raw = LightkurveBackend
            .run_analysis(AnalysisType::FourierTransform, &data, &Parameters::new())
            .unwrap();
        assert_eq!(raw.family(), "periodogram");
    }

    #[test]
    fn test_rebin_reports_flux() {
        let data = TimeSeries::from_columns((0..10).map(f64::from).collect(), vec![5.0; 10]).unwrap();
        let p = params(json!({"bin_time": 2.0, "method": "mean"}));
        let raw = LightkurveBackend.run_analysis(AnalysisType::Rebin, &data, &p).unwrap();
        let stats = raw.stats().unwrap();
        assert_eq!(stats["mean_flux"], 5.0);
        assert_eq!(stats["n_bins"], 5);
        assert!(raw.data().get("flux_err").is_some());
    }

    #[test]
    fn test_simulation_unsupported() {
        let data = TimeSeries::from_columns(vec![0.0, 1.0], vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            LightkurveBackend.run_analysis(AnalysisType::PdsSimulation, &data, &Parameters::new()),
            Err(EngineError::UnsupportedAnalysis { .. })
        ));
    }
}
