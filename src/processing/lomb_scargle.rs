//! Generalised Lomb-Scargle periodogram
//!
//! Floating-mean formulation (Zechmeister & Kürster 2009) with optional
//! per-sample uncertainties. Works on unevenly sampled data. The
//! per-frequency sums are independent, so the grid is evaluated with rayon.
//!
//! ## Frequency grids
//!
//! - [`FrequencyGrid::Auto`]: `df = 1/(samples_per_peak * T)`, starting at
//!   `df/2`, up to `nyquist_factor` times the average Nyquist frequency
//! - [`FrequencyGrid::Linear`]: `int((max-min) * samples_per_peak)` evenly
//!   spaced points between the given bounds, at least two

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;

use super::ProcessingError;

/// Output normalisation of the periodogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LsNormalization {
    /// Fraction of variance explained, in [0, 1].
    Standard,
    /// `p / (1 - p)`.
    Model,
    /// `-ln(1 - p)`.
    Log,
    /// Power spectral density, scaled by the data variance.
    Psd,
}

impl LsNormalization {
    pub fn as_str(&self) -> &'static str {
        match self {
            LsNormalization::Standard => "standard",
            LsNormalization::Model => "model",
            LsNormalization::Log => "log",
            LsNormalization::Psd => "psd",
        }
    }
}

impl FromStr for LsNormalization {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(LsNormalization::Standard),
            "model" => Ok(LsNormalization::Model),
            "log" => Ok(LsNormalization::Log),
            "psd" => Ok(LsNormalization::Psd),
            other => Err(ProcessingError::InvalidInput(format!(
                "unknown Lomb-Scargle normalization '{other}'"
            ))),
        }
    }
}

/// How the evaluated frequencies are chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrequencyGrid {
    Auto {
        samples_per_peak: f64,
        nyquist_factor: f64,
    },
    Linear {
        minimum: f64,
        maximum: f64,
        samples_per_peak: f64,
    },
}

/// A prepared periodogram over one time series.
pub struct LombScargle<'a> {
    time: &'a [f64],
    /// Weighted-mean-subtracted values.
    centered: Vec<f64>,
    /// Weights normalised to sum to one.
    weights: Vec<f64>,
    /// Σw·y² over the centred data (normalised weights).
    yy: f64,
    /// Sum of the raw (unnormalised) weights.
    weight_total: f64,
}

impl<'a> LombScargle<'a> {
    pub fn new(
        time: &'a [f64],
        values: &[f64],
        errors: Option<&[f64]>,
    ) -> Result<Self, ProcessingError> {
        if time.len() != values.len() {
            return Err(ProcessingError::InvalidInput(format!(
                "time has {} samples but values has {}",
                time.len(),
                values.len()
            )));
        }
        if time.len() < 2 {
            return Err(ProcessingError::InsufficientData {
                needed: 2,
                available: time.len(),
            });
        }

        let raw: Vec<f64> = match errors {
            Some(dy) if dy.len() == values.len() && dy.iter().all(|e| *e > 0.0) => {
                dy.iter().map(|e| 1.0 / (e * e)).collect()
            }
            Some(dy) if dy.len() != values.len() => {
                return Err(ProcessingError::InvalidInput(
                    "uncertainties do not match values".to_string(),
                ));
            }
            // Non-positive uncertainties: fall back to uniform weights.
            _ => vec![1.0; values.len()],
        };
        let weight_total: f64 = raw.iter().sum();
        let weights: Vec<f64> = raw.iter().map(|w| w / weight_total).collect();

        let mean: f64 = weights.iter().zip(values).map(|(w, y)| w * y).sum();
        let centered: Vec<f64> = values.iter().map(|y| y - mean).collect();
        let mut yy: f64 = weights.iter().zip(&centered).map(|(w, y)| w * y * y).sum();
        // Rounding residue of a constant series.
        if yy <= 1e-20 * (1.0 + mean * mean) {
            yy = 0.0;
        }

        Ok(Self {
            time,
            centered,
            weights,
            yy,
            weight_total,
        })
    }

    /// Observation baseline `max(t) - min(t)`.
    pub fn baseline(&self) -> f64 {
        let (lo, hi) = self
            .time
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| {
                (lo.min(t), hi.max(t))
            });
        hi - lo
    }

    /// Materialise a frequency grid for this series.
    pub fn frequencies(&self, grid: FrequencyGrid) -> Result<Vec<f64>, ProcessingError> {
        match grid {
            FrequencyGrid::Auto {
                samples_per_peak,
                nyquist_factor,
            } => {
                let baseline = self.baseline();
                if !(baseline > 0.0) {
                    return Err(ProcessingError::InvalidInput(
                        "all samples share one timestamp".to_string(),
                    ));
                }
                let spp = samples_per_peak.max(1.0);
                let df = 1.0 / (spp * baseline);
                let f_min = 0.5 * df;
                let avg_nyquist = 0.5 * self.time.len() as f64 / baseline;
                let f_max = f_min + nyquist_factor * avg_nyquist;
                let n = 1 + ((f_max - f_min) / df).round() as usize;
                Ok((0..n).map(|i| f_min + df * i as f64).collect())
            }
            FrequencyGrid::Linear {
                minimum,
                maximum,
                samples_per_peak,
            } => {
                if !(maximum > minimum) {
                    return Err(ProcessingError::InvalidInput(format!(
                        "maximum_frequency {maximum} must exceed minimum_frequency {minimum}"
                    )));
                }
                let n = (((maximum - minimum) * samples_per_peak) as usize).max(2);
                let step = (maximum - minimum) / (n - 1) as f64;
                Ok((0..n).map(|i| minimum + step * i as f64).collect())
            }
        }
    }

    /// Periodogram power at each frequency.
    pub fn power(&self, frequencies: &[f64], norm: LsNormalization) -> Vec<f64> {
        frequencies
            .par_iter()
            .map(|&f| self.power_at(f, norm))
            .collect()
    }

    fn power_at(&self, frequency: f64, norm: LsNormalization) -> f64 {
        let omega = 2.0 * PI * frequency;
        if self.yy <= 0.0 || omega == 0.0 || !omega.is_finite() {
            return 0.0;
        }

        // Phase offset tau that decouples the sine and cosine terms.
        let (mut c, mut s, mut c2, mut s2) = (0.0, 0.0, 0.0, 0.0);
        for (&t, &w) in self.time.iter().zip(&self.weights) {
            let (sin, cos) = (omega * t).sin_cos();
            let (sin2, cos2) = (2.0 * omega * t).sin_cos();
            c += w * cos;
            s += w * sin;
            c2 += w * cos2;
            s2 += w * sin2;
        }
        let tan_num = s2 - 2.0 * c * s;
        let tan_den = c2 - (c * c - s * s);
        let tau = tan_num.atan2(tan_den) / (2.0 * omega);

        let (mut ct, mut st, mut cct, mut sst, mut yct, mut yst) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        for ((&t, &w), &y) in self.time.iter().zip(&self.weights).zip(&self.centered) {
            let (sin, cos) = (omega * (t - tau)).sin_cos();
            ct += w * cos;
            st += w * sin;
            cct += w * cos * cos;
            sst += w * sin * sin;
            yct += w * y * cos;
            yst += w * y * sin;
        }
        let cc = cct - ct * ct;
        let ss = sst - st * st;
        let term = |num: f64, den: f64| if den > 1e-12 { num * num / den } else { 0.0 };
        let explained = term(yct, cc) + term(yst, ss);
        let p = (explained / self.yy).clamp(0.0, 1.0);

        match norm {
            LsNormalization::Standard => p,
            LsNormalization::Model => p / (1.0 - p).max(f64::EPSILON),
            LsNormalization::Log => -(1.0 - p).max(f64::EPSILON).ln(),
            LsNormalization::Psd => 0.5 * explained * self.weight_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_series(n: usize, freq: f64) -> (Vec<f64>, Vec<f64>) {
        // Slightly jittered sampling to exercise the uneven case.
        let time: Vec<f64> = (0..n)
            .map(|i| i as f64 * 0.5 + 0.07 * ((i * 7) % 5) as f64)
            .collect();
        let values = time
            .iter()
            .map(|t| 10.0 + 3.0 * (2.0 * PI * freq * t).sin())
            .collect();
        (time, values)
    }

    #[test]
    fn test_recovers_injected_frequency() {
        let (time, values) = sine_series(400, 0.2);
        let ls = LombScargle::new(&time, &values, None).unwrap();
        let freqs = ls
            .frequencies(FrequencyGrid::Auto {
                samples_per_peak: 5.0,
                nyquist_factor: 1.0,
            })
            .unwrap();
        let power = ls.power(&freqs, LsNormalization::Standard);

        assert!(freqs.windows(2).all(|w| w[0] < w[1]));
        let best = crate::processing::argmax(&power).unwrap();
        assert!((freqs[best] - 0.2).abs() < 0.01, "peak at {}", freqs[best]);
        assert!(power.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(power[best] > 0.9);
    }

    #[test]
    fn test_linear_grid_bounds() {
        let (time, values) = sine_series(50, 0.2);
        let ls = LombScargle::new(&time, &values, None).unwrap();
        let freqs = ls
            .frequencies(FrequencyGrid::Linear {
                minimum: 0.1,
                maximum: 0.3,
                samples_per_peak: 5.0,
            })
            .unwrap();
        // int(0.2 * 5) == 1, raised to the two-point minimum
        assert_eq!(freqs.len(), 2);
        assert!((freqs[0] - 0.1).abs() < 1e-12);
        assert!((freqs[1] - 0.3).abs() < 1e-12);

        assert!(ls
            .frequencies(FrequencyGrid::Linear {
                minimum: 1.0,
                maximum: 0.5,
                samples_per_peak: 5.0,
            })
            .is_err());
    }

    #[test]
    fn test_constant_series_has_zero_power() {
        let time: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let values = vec![4.0; 20];
        let ls = LombScargle::new(&time, &values, None).unwrap();
        let power = ls.power(&[0.1, 0.2], LsNormalization::Standard);
        assert!(power.iter().all(|p| *p == 0.0));
    }

    #[test]
    fn test_model_and_log_are_monotone_in_standard() {
        let (time, values) = sine_series(100, 0.2);
        let ls = LombScargle::new(&time, &values, Some(&[0.5; 100][..])).unwrap();
        let freqs = [0.05, 0.2];
        let std = ls.power(&freqs, LsNormalization::Standard);
        let model = ls.power(&freqs, LsNormalization::Model);
        let log = ls.power(&freqs, LsNormalization::Log);
        assert!(std[1] > std[0]);
        assert!(model[1] > model[0]);
        assert!(log[1] > log[0]);
    }

    #[test]
    fn test_parse_normalization() {
        assert_eq!("psd".parse::<LsNormalization>().unwrap(), LsNormalization::Psd);
        assert!("amplitude".parse::<LsNormalization>().is_err());
    }
}
