//! FFT computation using rustfft
//!
//! Full complex transforms (for the Fourier-transform analysis) and averaged
//! one-sided periodograms (for power spectra) over evenly sampled series.
//!
//! # Example
//!
//! ```ignore
//! use vast_engine::processing::{averaged_power_spectrum, PowerNorm};
//!
//! let counts: Vec<f64> = load_counts();
//! let pds = averaged_power_spectrum(&counts, 0.01, 16.0, PowerNorm::Leahy)?;
//! println!("{} segments, {} bins", pds.n_segments, pds.frequency.len());
//! ```

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use super::ProcessingError;

// ============================================================================
// FFT Processor (Pre-planned for repeated use)
// ============================================================================

/// FFT processor with pre-planned forward and inverse transforms.
///
/// Use this when computing many FFTs of the same size, e.g. one per
/// periodogram segment.
pub struct FftProcessor {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    size: usize,
}

impl FftProcessor {
    /// Plan transforms of exactly `size` points (no padding).
    pub fn new(size: usize) -> Result<Self, ProcessingError> {
        if size == 0 {
            return Err(ProcessingError::InsufficientData {
                needed: 1,
                available: 0,
            });
        }
        let mut planner = FftPlanner::new();
        Ok(Self {
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
            size,
        })
    }

    /// Forward transform of a real signal, unnormalised.
    pub fn forward(&self, signal: &[f64]) -> Result<Vec<Complex<f64>>, ProcessingError> {
        if signal.len() != self.size {
            return Err(ProcessingError::FftError(format!(
                "planned for {} points, got {}",
                self.size,
                signal.len()
            )));
        }
        let mut buffer: Vec<Complex<f64>> =
            signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
        self.forward.process(&mut buffer);
        Ok(buffer)
    }

    /// Inverse transform, normalised by 1/N.
    pub fn inverse(
        &self,
        mut spectrum: Vec<Complex<f64>>,
    ) -> Result<Vec<Complex<f64>>, ProcessingError> {
        if spectrum.len() != self.size {
            return Err(ProcessingError::FftError(format!(
                "planned for {} points, got {}",
                self.size,
                spectrum.len()
            )));
        }
        self.inverse.process(&mut spectrum);
        let scale = 1.0 / self.size as f64;
        for c in spectrum.iter_mut() {
            *c *= scale;
        }
        Ok(spectrum)
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Sample frequencies in FFT output order: `0, 1, ..., -2, -1` over `n*dt`.
pub fn fftfreq(n: usize, dt: f64) -> Vec<f64> {
    let n_positive = (n + 1) / 2;
    let scale = 1.0 / (n as f64 * dt);
    (0..n)
        .map(|i| {
            let k = if i < n_positive {
                i as f64
            } else {
                i as f64 - n as f64
            };
            k * scale
        })
        .collect()
}

// ============================================================================
// Complex Fourier Transform
// ============================================================================

/// Full FFT of a series, reordered by ascending frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FourierSpectrum {
    pub frequency: Vec<f64>,
    pub real: Vec<f64>,
    pub imag: Vec<f64>,
    pub amplitude: Vec<f64>,
}

/// Transform `values` sampled every `dt` seconds. Callers window and
/// detrend beforehand.
pub fn fourier_transform(values: &[f64], dt: f64) -> Result<FourierSpectrum, ProcessingError> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(ProcessingError::InvalidSamplingRate(dt));
    }
    let n = values.len();
    let processor = FftProcessor::new(n)?;
    let coeffs = processor.forward(values)?;
    let freqs = fftfreq(n, dt);

    // Negative half first, then DC and positives: ascending order.
    let n_positive = (n + 1) / 2;
    let order = (n_positive..n).chain(0..n_positive);

    let mut out = FourierSpectrum {
        frequency: Vec::with_capacity(n),
        real: Vec::with_capacity(n),
        imag: Vec::with_capacity(n),
        amplitude: Vec::with_capacity(n),
    };
    for i in order {
        out.frequency.push(freqs[i]);
        out.real.push(coeffs[i].re);
        out.imag.push(coeffs[i].im);
        out.amplitude.push(coeffs[i].norm());
    }
    Ok(out)
}

// ============================================================================
// Averaged Power Spectrum
// ============================================================================

/// Power spectrum normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerNorm {
    /// 2|F|²/N_photons; white Poisson noise averages to 2.
    Leahy,
    /// Fractional rms² per Hz.
    Rms,
    /// Raw |F|².
    None,
}

impl PowerNorm {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerNorm::Leahy => "leahy",
            PowerNorm::Rms => "rms",
            PowerNorm::None => "none",
        }
    }
}

impl FromStr for PowerNorm {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leahy" => Ok(PowerNorm::Leahy),
            "rms" | "frac" => Ok(PowerNorm::Rms),
            "none" => Ok(PowerNorm::None),
            other => Err(ProcessingError::InvalidInput(format!(
                "unknown power normalization '{other}'"
            ))),
        }
    }
}

/// Segment-averaged one-sided periodogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragedSpectrum {
    pub frequency: Vec<f64>,
    pub power: Vec<f64>,
    pub power_err: Vec<f64>,
    pub n_segments: usize,
    /// Frequency resolution of the unbinned spectrum.
    pub df: f64,
}

/// Average the periodograms of consecutive `segment_length`-second segments
/// of `counts`. A segment longer than the data collapses to one segment of
/// the whole series; trailing samples that do not fill a segment are dropped.
pub fn averaged_power_spectrum(
    counts: &[f64],
    dt: f64,
    segment_length: f64,
    norm: PowerNorm,
) -> Result<AveragedSpectrum, ProcessingError> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(ProcessingError::InvalidSamplingRate(dt));
    }
    let n = counts.len();
    let requested = if segment_length.is_finite() && segment_length > 0.0 {
        (segment_length / dt).floor() as usize
    } else {
        n
    };
    let seg = if requested == 0 || requested > n { n } else { requested };
    // Positive, non-Nyquist bins: 1..(seg+1)/2 must be non-empty.
    if seg < 3 {
        return Err(ProcessingError::InsufficientData {
            needed: 3,
            available: seg,
        });
    }

    let processor = FftProcessor::new(seg)?;
    let n_bins = (seg + 1) / 2 - 1;
    let n_segments = n / seg;
    let mut total = vec![0.0; n_bins];

    for segment in counts.chunks_exact(seg) {
        let coeffs = processor.forward(segment)?;
        let n_photons: f64 = segment.iter().sum();
        let scale = match norm {
            PowerNorm::None => 1.0,
            PowerNorm::Leahy | PowerNorm::Rms if n_photons <= 0.0 => {
                return Err(ProcessingError::InvalidInput(format!(
                    "{} normalization needs positive total counts per segment",
                    norm.as_str()
                )));
            }
            PowerNorm::Leahy => 2.0 / n_photons,
            PowerNorm::Rms => {
                let mean = n_photons / seg as f64;
                2.0 * dt / (mean * mean * seg as f64)
            }
        };
        for (k, acc) in total.iter_mut().enumerate() {
            *acc += coeffs[k + 1].norm_sqr() * scale;
        }
    }

    let m = n_segments as f64;
    let power: Vec<f64> = total.iter().map(|p| p / m).collect();
    let power_err = power.iter().map(|p| p / m.sqrt()).collect();
    let df = 1.0 / (seg as f64 * dt);
    let frequency = (1..=n_bins).map(|k| k as f64 * df).collect();

    Ok(AveragedSpectrum {
        frequency,
        power,
        power_err,
        n_segments,
        df,
    })
}

impl AveragedSpectrum {
    /// Logarithmic rebinning: each bin is `1 + factor` times wider than the
    /// previous, starting at the native resolution. Restricted to
    /// `[f_min, f_max]` when given.
    pub fn rebin_log(
        &self,
        factor: f64,
        f_min: Option<f64>,
        f_max: Option<f64>,
    ) -> Result<AveragedSpectrum, ProcessingError> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(ProcessingError::InvalidInput(format!(
                "log rebin factor must be positive, got {factor}"
            )));
        }
        let lo_cut = f_min.unwrap_or(f64::NEG_INFINITY);
        let hi_cut = f_max.unwrap_or(f64::INFINITY);
        let selected: Vec<usize> = (0..self.frequency.len())
            .filter(|&i| self.frequency[i] >= lo_cut && self.frequency[i] <= hi_cut)
            .collect();
        let Some(&first) = selected.first() else {
            return Err(ProcessingError::InvalidInput(format!(
                "no frequencies inside range [{lo_cut}, {hi_cut}]"
            )));
        };

        let mut out = AveragedSpectrum {
            frequency: Vec::new(),
            power: Vec::new(),
            power_err: Vec::new(),
            n_segments: self.n_segments,
            df: self.df,
        };

        let mut lo = self.frequency[first] - self.df / 2.0;
        let mut width = self.df;
        let mut cursor = 0;
        while cursor < selected.len() {
            let hi = lo + width;
            let (mut f_sum, mut p_sum, mut e_sq, mut count) = (0.0, 0.0, 0.0, 0usize);
            while cursor < selected.len() && self.frequency[selected[cursor]] < hi {
                let i = selected[cursor];
                f_sum += self.frequency[i];
                p_sum += self.power[i];
                e_sq += self.power_err[i].powi(2);
                count += 1;
                cursor += 1;
            }
            if count > 0 {
                let c = count as f64;
                out.frequency.push(f_sum / c);
                out.power.push(p_sum / c);
                out.power_err.push(e_sq.sqrt() / c);
            }
            lo = hi;
            width *= 1.0 + factor;
        }
        Ok(out)
    }
}

// ============================================================================
// Tests
// ============================================================================
