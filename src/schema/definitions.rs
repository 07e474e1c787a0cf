//! Declarative parameter definitions per analysis type

use crate::types::AnalysisType;

/// Declared value type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ParamKind {
    Integer,
    Number,
    /// One of `allowed_values`.
    ObjectSelector,
    Boolean,
    Array,
    /// `[low, high]`, `high` may be null.
    Range,
}

/// Default value in a form usable in `static` tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    None,
    Int(i64),
    Num(f64),
    Bool(bool),
    Str(&'static str),
    Range(f64, Option<f64>),
}

/// One declared parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDef {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: DefaultValue,
    pub doc: &'static str,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub allowed: &'static [&'static str],
}

impl ParamDef {
    const fn new(name: &'static str, kind: ParamKind, default: DefaultValue, doc: &'static str) -> Self {
        Self {
            name,
            kind,
            default,
            doc,
            min: None,
            max: None,
            allowed: &[],
        }
    }

    const fn bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    const fn choices(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }
}

use DefaultValue as D;
use ParamKind as K;

const POWER_SPECTRUM: &[ParamDef] = &[
    ParamDef::new("segment_length", K::Integer, D::Int(1024), "Length of segments in seconds")
        .bounds(Some(1.0), None),
    ParamDef::new("norm", K::ObjectSelector, D::Str("leahy"), "Normalization method")
        .choices(&["leahy", "rms", "none"]),
    ParamDef::new("dt", K::Number, D::None, "Time resolution (if None, estimated from data)"),
    ParamDef::new("gti", K::Array, D::None, "Good Time Intervals"),
    ParamDef::new("average", K::Boolean, D::Bool(true), "Whether to average over segments"),
    ParamDef::new("freq_range", K::Range, D::Range(0.0, None), "Frequency range to compute"),
];

const FOURIER_TRANSFORM: &[ParamDef] = &[
    ParamDef::new("segment_length", K::Integer, D::Int(1024), "Length of segments")
        .bounds(Some(1.0), None),
    ParamDef::new("window", K::ObjectSelector, D::Str("hanning"), "Window function to apply")
        .choices(&["hanning", "hamming", "blackman", "bartlett", "none"]),
    ParamDef::new("detrend", K::Boolean, D::Bool(true), "Whether to remove the trend before the transform"),
];

const LOMB_SCARGLE: &[ParamDef] = &[
    ParamDef::new("minimum_frequency", K::Number, D::None, "Minimum frequency to compute"),
    ParamDef::new("maximum_frequency", K::Number, D::None, "Maximum frequency to compute"),
    ParamDef::new("nyquist_factor", K::Number, D::Num(1.0), "Factor to multiply the Nyquist frequency by")
        .bounds(Some(0.1), Some(10.0)),
    ParamDef::new("samples_per_peak", K::Integer, D::Int(5), "Number of samples per peak")
        .bounds(Some(1.0), Some(100.0)),
    ParamDef::new("normalization", K::ObjectSelector, D::Str("standard"), "Normalization method")
        .choices(&["standard", "model", "log", "psd"]),
];

const REBIN: &[ParamDef] = &[
    ParamDef::new("bin_time", K::Number, D::Num(1.0), "New bin time in seconds")
        .bounds(Some(0.0), None),
    ParamDef::new("method", K::ObjectSelector, D::Str("sum"), "Method for combining bins")
        .choices(&["sum", "mean", "average"]),
];

const PDS_SIMULATION: &[ParamDef] = &[
    ParamDef::new("model", K::ObjectSelector, D::Str("powerlaw"), "Model for the power spectrum")
        .choices(&["powerlaw", "broken_powerlaw", "lorentzian"]),
    ParamDef::new("mean", K::Number, D::Num(100.0), "Mean count rate"),
    ParamDef::new("rms", K::Number, D::Num(0.1), "Fractional RMS amplitude")
        .bounds(Some(0.0), Some(1.0)),
    ParamDef::new("red_noise_index", K::Number, D::Num(1.0), "Power law index for red noise"),
    ParamDef::new("dt", K::Number, D::Num(0.001), "Time resolution in seconds")
        .bounds(Some(0.0), None),
    ParamDef::new("tlen", K::Number, D::Num(1000.0), "Length of the light curve in seconds")
        .bounds(Some(0.0), None),
    ParamDef::new("break_freq", K::Number, D::None, "Break frequency for the broken power law"),
    ParamDef::new("centroid", K::Number, D::Num(0.1), "Lorentzian centroid frequency"),
    ParamDef::new("width", K::Number, D::Num(0.01), "Lorentzian width"),
    ParamDef::new("seed", K::Integer, D::None, "Random seed for a reproducible simulation"),
];

const CROSS_SPECTRUM: &[ParamDef] = &[
    ParamDef::new("segment_length", K::Integer, D::Int(1024), "Length of segments in seconds")
        .bounds(Some(1.0), None),
    ParamDef::new("norm", K::ObjectSelector, D::Str("none"), "Normalization method")
        .choices(&["none", "leahy", "frac"]),
    ParamDef::new("gti", K::Array, D::None, "Good Time Intervals"),
    ParamDef::new("dt", K::Number, D::None, "Time resolution (if None, estimated from data)"),
];

/// Declared parameters of `analysis_type`; `None` for types without a
/// registered schema.
pub fn definitions(analysis_type: AnalysisType) -> Option<&'static [ParamDef]> {
    match analysis_type {
        AnalysisType::PowerSpectrum => Some(POWER_SPECTRUM),
        AnalysisType::FourierTransform => Some(FOURIER_TRANSFORM),
        AnalysisType::LombScargle => Some(LOMB_SCARGLE),
        AnalysisType::Rebin => Some(REBIN),
        AnalysisType::PdsSimulation => Some(PDS_SIMULATION),
        AnalysisType::CrossSpectrum => Some(CROSS_SPECTRUM),
        AnalysisType::LightCurve | AnalysisType::Custom => None,
    }
}
