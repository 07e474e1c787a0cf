//! Astropy backend: generic tables and error-weighted periodograms

use std::path::Path;

use super::params::Params;
use super::raw::{LightCurveResult, PeriodogramResult, RawResult, ValueKind};
use super::shared::{self, Detrend};
use super::{ensure_non_empty, AnalysisBackend, PlotArtifact};
use crate::error::{EngineError, EngineResult};
use crate::io::{self, FitsFile, HeaderMode};
use crate::processing::{downsample, BinStamp, LombScargle, LsNormalization, Window};
use crate::types::{AnalysisType, BackendKind, Metadata, Parameters, TimeSeries};

const NAME: &str = "astropy";

/// General-purpose table backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct AstropyBackend;

impl AstropyBackend {
    /// First binary table; columns picked by name with positional fallback.
    fn read_table_hdu(&self, path: &Path) -> EngineResult<TimeSeries> {
        let file = FitsFile::open(path)?;
        let table = file
            .tables()
            .next()
            .ok_or_else(|| EngineError::DataFormat("no binary table found".to_string()))?;
        if table.columns.len() < 2 {
            return Err(EngineError::DataFormat(format!(
                "expected at least two numeric columns, found {}",
                table.columns.len()
            )));
        }
        let time = table
            .column_containing(&["TIME"])
            .unwrap_or(&table.columns[0]);
        let value = table
            .column_containing(&["FLUX", "COUNTS"])
            .unwrap_or(&table.columns[1]);
        let error = table.column_containing(&["ERR"]);

        let mut metadata = Metadata::new();
        metadata.insert("telescope".to_string(), io::keyword_meta(&file, &["TELESCOP"]));
        metadata.insert("target".to_string(), io::keyword_meta(&file, &["OBJECT"]));
        metadata.insert("format".to_string(), "fits".into());
        io::assemble_series(
            &time.values,
            &value.values,
            error.map(|c| c.values.as_slice()),
            metadata,
        )
    }

    fn lomb_scargle(&self, data: &TimeSeries, p: &Params<'_>) -> EngineResult<RawResult> {
        let grid = shared::frequency_grid(p)?;
        let normalization = p.parse_or("normalization", LsNormalization::Standard)?;
        let ls = LombScargle::new(data.time(), data.values(), data.errors())?;
        let frequency = ls.frequencies(grid)?;
        let power = ls.power(&frequency, normalization);
        let peaks = shared::dominant_peaks(&frequency, &power);

        let mut metadata = Metadata::new();
        metadata.insert("normalization".to_string(), normalization.as_str().into());
        Ok(RawResult::Periodogram(PeriodogramResult {
            frequency,
            power,
            peaks,
            metadata,
            title: "Lomb-Scargle Periodogram",
            log_x: false,
        }))
    }

    fn fourier_transform(&self, data: &TimeSeries, p: &Params<'_>) -> EngineResult<RawResult> {
        let dt = shared::sampling_interval(data, None)?;
        let window = p.parse_or("window", Window::Hanning)?;
        let detrend = p.bool_or("detrend", true)?.then_some(Detrend::Linear);
        Ok(RawResult::Fourier(shared::fourier(data, dt, window, detrend)?))
    }

    /// Bins stamped at their start time. Errors are not carried.
    fn rebin(&self, data: &TimeSeries, p: &Params<'_>) -> EngineResult<RawResult> {
        let (bin_time, method) = shared::rebin_request(p)?;
        let primary = downsample(
            data.time(),
            data.values(),
            None,
            bin_time,
            method,
            BinStamp::Start,
        );
        let (binned, fallback) = shared::rebin_or_fallback(NAME, data, bin_time, method, primary)?;

        let mut metadata = Metadata::new();
        metadata.insert("bin_size".to_string(), bin_time.into());
        metadata.insert("method".to_string(), method.as_str().into());
        if fallback {
            metadata.insert("note".to_string(), "Fallback binning method used".into());
        }
        Ok(RawResult::LightCurve(LightCurveResult {
            time: binned.time,
            values: binned.values,
            errors: None,
            kind: ValueKind::Flux,
            metadata,
        }))
    }
}

impl AnalysisBackend for AstropyBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Astropy
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
            "fits" | "fit" => self.read_table_hdu(path),
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
            AnalysisType::LombScargle | AnalysisType::PowerSpectrum => self.lomb_scargle(data, &p)?,
            AnalysisType::FourierTransform => self.fourier_transform(data, &p)?,
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
            (AnalysisType::LombScargle | AnalysisType::PowerSpectrum, RawResult::Periodogram(_))
            | (AnalysisType::FourierTransform, RawResult::Fourier(_))
            | (AnalysisType::Rebin, RawResult::LightCurve(_)) => {
                shared::render(NAME, analysis_type, raw, "Binned Light Curve")
            }
            (t, _) if !self.supports(t) => Err(EngineError::unsupported(NAME, t.as_str())),
            (t, raw) => Err(shared::mismatched(NAME, t, raw)),
        }
    }
}
