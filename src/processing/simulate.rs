//! Light-curve simulation from a power density spectrum model
//!
//! Timmer & König (1995): draw Gaussian real and imaginary Fourier
//! components with variance proportional to the model spectrum, inverse
//! transform, then rescale to the requested mean and fractional rms.

use num_complex::Complex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::fft::FftProcessor;
use super::ProcessingError;
use crate::config::defaults::MAX_SIMULATION_BINS;

/// Spectral shape of the simulated variability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SimulationModel {
    /// `P(f) ∝ f^-index`.
    Powerlaw { index: f64 },
    /// Flat below `break_freq`, `f^-index` above it.
    BrokenPowerlaw { index: f64, break_freq: f64 },
    /// Lorentzian profile at `centroid` with full width `width`.
    Lorentzian { centroid: f64, width: f64 },
}

impl SimulationModel {
    pub fn name(&self) -> &'static str {
        match self {
            SimulationModel::Powerlaw { .. } => "powerlaw",
            SimulationModel::BrokenPowerlaw { .. } => "broken_powerlaw",
            SimulationModel::Lorentzian { .. } => "lorentzian",
        }
    }

    /// Model power at a positive frequency.
    pub fn power_at(&self, f: f64) -> f64 {
        match *self {
            SimulationModel::Powerlaw { index } => f.powf(-index),
            SimulationModel::BrokenPowerlaw { index, break_freq } => {
                if f <= break_freq {
                    1.0
                } else {
                    (f / break_freq).powf(-index)
                }
            }
            SimulationModel::Lorentzian { centroid, width } => {
                let half = width / 2.0;
                (half / PI) / ((f - centroid).powi(2) + half * half)
            }
        }
    }
}

/// Everything needed to simulate one light curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSpec {
    pub model: SimulationModel,
    pub dt: f64,
    pub tlen: f64,
    pub mean: f64,
    /// Fractional rms amplitude.
    pub rms: f64,
    pub seed: Option<u64>,
}

/// Simulated light curve.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedLightCurve {
    pub time: Vec<f64>,
    pub counts: Vec<f64>,
}

pub fn simulate_lightcurve(spec: &SimulationSpec) -> Result<SimulatedLightCurve, ProcessingError> {
    if !(spec.dt.is_finite() && spec.dt > 0.0) {
        return Err(ProcessingError::InvalidSamplingRate(spec.dt));
    }
    if !(spec.tlen.is_finite() && spec.tlen > 0.0) {
        return Err(ProcessingError::InvalidInput(format!(
            "tlen must be positive, got {}",
            spec.tlen
        )));
    }
    let n = (spec.tlen / spec.dt).round() as usize;
    if n < 4 {
        return Err(ProcessingError::InsufficientData {
            needed: 4,
            available: n,
        });
    }
    if n > MAX_SIMULATION_BINS {
        return Err(ProcessingError::InvalidInput(format!(
            "simulation of {n} bins exceeds the limit of {MAX_SIMULATION_BINS}"
        )));
    }

    let mut rng = match spec.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| ProcessingError::InvalidInput(format!("normal distribution: {e}")))?;

    // Hermitian spectrum: fill positive frequencies, mirror the negatives.
    let mut spectrum = vec![Complex::new(0.0, 0.0); n];
    let n_half = n / 2;
    for k in 1..=n_half {
        let f = k as f64 / (n as f64 * spec.dt);
        let amp = (0.5 * spec.model.power_at(f)).sqrt();
        let amp = if amp.is_finite() { amp } else { 0.0 };
        let re = normal.sample(&mut rng) * amp;
        // Nyquist bin of an even-length series is real.
        let im = if n % 2 == 0 && k == n_half {
            0.0
        } else {
            normal.sample(&mut rng) * amp
        };
        spectrum[k] = Complex::new(re, im);
        if k != n - k {
            spectrum[n - k] = Complex::new(re, -im);
        }
    }

    let processor = FftProcessor::new(n)?;
    let raw: Vec<f64> = processor.inverse(spectrum)?.iter().map(|c| c.re).collect();

    let raw_mean = raw.iter().sum::<f64>() / n as f64;
    let raw_std = (raw.iter().map(|x| (x - raw_mean).powi(2)).sum::<f64>() / n as f64).sqrt();
    let target_std = spec.mean * spec.rms;

    let counts = raw
        .iter()
        .map(|x| {
            let scaled = if raw_std > 0.0 {
                (x - raw_mean) / raw_std * target_std + spec.mean
            } else {
                spec.mean
            };
            scaled.max(0.0)
        })
        .collect();
    let time = (0..n).map(|i| i as f64 * spec.dt).collect();

    Ok(SimulatedLightCurve { time, counts })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(model: SimulationModel, seed: Option<u64>) -> SimulationSpec {
        SimulationSpec {
            model,
            dt: 0.1,
            tlen: 102.4,
            mean: 100.0,
            rms: 0.1,
            seed,
        }
    }

    #[test]
    fn test_seeded_simulation_is_reproducible() {
        let s = spec(SimulationModel::Powerlaw { index: 1.0 }, Some(42));
        let a = simulate_lightcurve(&s).unwrap();
        let b = simulate_lightcurve(&s).unwrap();
        assert_eq!(a.counts, b.counts);
        assert_eq!(a.time.len(), 1024);
    }

    #[test]
    fn test_mean_and_rms_match_request() {
        let s = spec(SimulationModel::Powerlaw { index: 1.0 }, Some(7));
        let lc = simulate_lightcurve(&s).unwrap();
        let n = lc.counts.len() as f64;
        let mean = lc.counts.iter().sum::<f64>() / n;
        let std = (lc.counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert!((mean - 100.0).abs() < 1.0);
        assert!((std / mean - 0.1).abs() < 0.02);
        assert!(lc.counts.iter().all(|c| *c >= 0.0));
    }

    #[test]
    fn test_other_models_run() {
        for model in [
            SimulationModel::BrokenPowerlaw {
                index: 2.0,
                break_freq: 0.5,
            },
            SimulationModel::Lorentzian {
                centroid: 1.0,
                width: 0.1,
            },
        ] {
            let lc = simulate_lightcurve(&spec(model, Some(1))).unwrap();
            assert!(lc.counts.iter().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn test_rejects_degenerate_lengths() {
        let mut s = spec(SimulationModel::Powerlaw { index: 1.0 }, None);
        s.tlen = 0.2;
        assert!(simulate_lightcurve(&s).is_err());
        s.dt = 0.0;
        assert!(simulate_lightcurve(&s).is_err());
    }
}
