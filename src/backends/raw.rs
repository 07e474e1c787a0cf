//! Backend output shapes
//!
//! [`RawResult`] is a closed sum over the result families the backends
//! produce. Each family knows how to present its `data` section (named
//! numeric sequences) and its `stats` section (named scalars); fields used
//! only for plotting stay private to the crate and are never persisted.

use serde::Serialize;
use serde_json::{json, Value};

use crate::processing::{argmax, stats, Peak};
use crate::types::Metadata;

/// Whether a light curve column holds counts or flux; decides the
/// `data`/`stats` key names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Counts,
    Flux,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Counts => "counts",
            ValueKind::Flux => "flux",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ValueKind::Counts => "Counts",
            ValueKind::Flux => "Flux",
        }
    }
}

/// Averaged power spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumResult {
    pub frequency: Vec<f64>,
    pub power: Vec<f64>,
    pub power_err: Vec<f64>,
    pub metadata: Metadata,
}

/// Full complex Fourier transform, ascending frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct FourierResult {
    pub frequency: Vec<f64>,
    pub real: Vec<f64>,
    pub imag: Vec<f64>,
    pub amplitude: Vec<f64>,
    pub metadata: Metadata,
}

/// Periodogram with its dominant peaks.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodogramResult {
    pub frequency: Vec<f64>,
    pub power: Vec<f64>,
    pub peaks: Vec<Peak>,
    pub metadata: Metadata,
    pub(crate) title: &'static str,
    pub(crate) log_x: bool,
}

/// Rebinned light curve.
#[derive(Debug, Clone, PartialEq)]
pub struct LightCurveResult {
    pub time: Vec<f64>,
    pub values: Vec<f64>,
    pub errors: Option<Vec<f64>>,
    pub kind: ValueKind,
    pub metadata: Metadata,
}

/// Simulated light curve and its periodogram.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub time: Vec<f64>,
    pub counts: Vec<f64>,
    pub frequency: Vec<f64>,
    pub power: Vec<f64>,
    pub metadata: Metadata,
}

/// Backend output, pre-materialization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    Spectrum(SpectrumResult),
    Fourier(FourierResult),
    Periodogram(PeriodogramResult),
    LightCurve(LightCurveResult),
    Simulation(SimulationResult),
}

/// `(max, frequency at max)`; NaNs when `power` is empty.
fn peak_of(frequency: &[f64], power: &[f64]) -> (f64, f64) {
    match argmax(power) {
        Some(i) => (power[i], frequency.get(i).copied().unwrap_or(f64::NAN)),
        None => (f64::NAN, f64::NAN),
    }
}

impl RawResult {
    pub fn family(&self) -> &'static str {
        match self {
            RawResult::Spectrum(_) => "spectrum",
            RawResult::Fourier(_) => "fourier",
            RawResult::Periodogram(_) => "periodogram",
            RawResult::LightCurve(_) => "light_curve",
            RawResult::Simulation(_) => "simulation",
        }
    }

    /// Length of the primary axis.
    pub fn n_bins(&self) -> usize {
        match self {
            RawResult::Spectrum(r) => r.frequency.len(),
            RawResult::Fourier(r) => r.frequency.len(),
            RawResult::Periodogram(r) => r.frequency.len(),
            RawResult::LightCurve(r) => r.time.len(),
            RawResult::Simulation(r) => r.time.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.n_bins() == 0
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            RawResult::Spectrum(r) => &r.metadata,
            RawResult::Fourier(r) => &r.metadata,
            RawResult::Periodogram(r) => &r.metadata,
            RawResult::LightCurve(r) => &r.metadata,
            RawResult::Simulation(r) => &r.metadata,
        }
    }

    /// Frequency axis of frequency-domain families.
    pub fn frequency(&self) -> Option<&[f64]> {
        match self {
            RawResult::Spectrum(r) => Some(&r.frequency),
            RawResult::Fourier(r) => Some(&r.frequency),
            RawResult::Periodogram(r) => Some(&r.frequency),
            RawResult::Simulation(r) => Some(&r.frequency),
            RawResult::LightCurve(_) => None,
        }
    }

    pub fn peaks(&self) -> Option<&[Peak]> {
        match self {
            RawResult::Periodogram(r) => Some(&r.peaks),
            _ => None,
        }
    }

    /// The `data` section: named numeric sequences.
    pub fn data(&self) -> Value {
        match self {
            RawResult::Spectrum(r) => json!({
                "frequency": r.frequency,
                "power": r.power,
                "power_err": r.power_err,
            }),
            RawResult::Fourier(r) => json!({
                "frequency": r.frequency,
                "real": r.real,
                "imag": r.imag,
                "amplitude": r.amplitude,
            }),
            RawResult::Periodogram(r) => json!({
                "frequency": r.frequency,
                "power": r.power,
            }),
            RawResult::LightCurve(r) => {
                let key = r.kind.as_str();
                json!({
                    "time": r.time,
                    key: r.values,
                    format!("{key}_err"): r.errors,
                })
            }
            RawResult::Simulation(r) => json!({
                "time": r.time,
                "counts": r.counts,
                "frequency": r.frequency,
                "power": r.power,
            }),
        }
    }

    /// The `stats` section: named scalars (and the peak list).
    pub fn stats(&self) -> Option<Value> {
        let stats = match self {
            RawResult::Spectrum(r) => {
                let (max_power, max_power_freq) = peak_of(&r.frequency, &r.power);
                json!({
                    "mean_power": stats::mean(&r.power),
                    "max_power": max_power,
                    "max_power_freq": max_power_freq,
                    "n_bins": r.frequency.len(),
                })
            }
            RawResult::Fourier(r) => {
                let (max_amplitude, max_amplitude_freq) = peak_of(&r.frequency, &r.amplitude);
                json!({
                    "max_amplitude": max_amplitude,
                    "max_amplitude_freq": max_amplitude_freq,
                    "n_bins": r.frequency.len(),
                })
            }
            RawResult::Periodogram(r) => {
                let (max_power, max_power_freq) = peak_of(&r.frequency, &r.power);
                json!({
                    "mean_power": stats::mean(&r.power),
                    "max_power": max_power,
                    "max_power_freq": max_power_freq,
                    "n_bins": r.frequency.len(),
                    "top_peaks": r.peaks,
                })
            }
            RawResult::LightCurve(r) => match r.kind {
                ValueKind::Counts => json!({
                    "mean_counts": stats::mean(&r.values),
                    "total_counts": stats::sum(&r.values),
                    "n_bins": r.time.len(),
                }),
                ValueKind::Flux => json!({
                    "mean_flux": stats::mean(&r.values),
                    "n_bins": r.time.len(),
                }),
            },
            RawResult::Simulation(r) => {
                let mean = stats::mean(&r.counts);
                json!({
                    "mean_counts": mean,
                    "total_counts": stats::sum(&r.counts),
                    "rms_measured": stats::population_std(&r.counts) / mean,
                    "n_bins": r.time.len(),
                })
            }
        };
        Some(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light_curve(kind: ValueKind) -> RawResult {
        RawResult::LightCurve(LightCurveResult {
            time: vec![1.0, 3.0],
            values: vec![5.0, 5.0],
            errors: None,
            kind,
            metadata: Metadata::new(),
        })
    }

    #[test]
    fn test_counts_light_curve_sections() {
        let raw = light_curve(ValueKind::Counts);
        let data = raw.data();
        assert_eq!(data["counts"][0], 5.0);
        assert!(data["counts_err"].is_null());
        let stats = raw.stats().unwrap();
        assert_eq!(stats["mean_counts"], 5.0);
        assert_eq!(stats["total_counts"], 10.0);
        assert_eq!(stats["n_bins"], 2);
    }

    #[test]
    fn test_flux_light_curve_keys() {
        let stats = light_curve(ValueKind::Flux).stats().unwrap();
        assert_eq!(stats["mean_flux"], 5.0);
        assert!(stats.get("total_counts").is_none());
    }

    #[test]
    fn test_periodogram_stats_include_peaks() {
        let raw = RawResult::Periodogram(PeriodogramResult {
            frequency: vec![0.1, 0.2, 0.3],
            power: vec![0.2, 0.9, 0.1],
            peaks: vec![Peak {
                frequency: 0.2,
                power: 0.9,
                period: Some(5.0),
            }],
            metadata: Metadata::new(),
            title: "Lomb-Scargle Periodogram",
            log_x: false,
        });
        let stats = raw.stats().unwrap();
        assert_eq!(stats["max_power_freq"], 0.2);
        assert_eq!(stats["top_peaks"].as_array().unwrap().len(), 1);
        assert_eq!(raw.peaks().unwrap().len(), 1);
    }
}
