//! Numeric kernels shared by the analysis backends
//!
//! Backends never do arithmetic themselves; they adapt a [`crate::types::TimeSeries`]
//! into the inputs these kernels want and shape the outputs into a
//! [`crate::backends::RawResult`].
//!
//! - [`fft`]: complex FFT, `fftfreq` grids, averaged periodograms
//! - [`lomb_scargle`]: generalised Lomb-Scargle periodogram
//! - [`peaks`]: top-N local maxima above a relative height
//! - [`rebin`]: group-and-sum rebinning and the generic bin/aggregate fallback
//! - [`simulate`]: Timmer & König light-curve simulation
//! - [`stats`]: descriptive statistics and sampling-interval estimation
//! - [`windows`]: taper windows and detrending

pub mod fft;
pub mod lomb_scargle;
pub mod peaks;
pub mod rebin;
pub mod simulate;
pub mod stats;
pub mod windows;

pub use fft::{
    averaged_power_spectrum, fftfreq, fourier_transform, AveragedSpectrum, FftProcessor,
    FourierSpectrum, PowerNorm,
};
pub use lomb_scargle::{FrequencyGrid, LombScargle, LsNormalization};
pub use peaks::{find_peaks, Peak};
pub use rebin::{
    bin_aggregate, bin_events, downsample, group_rebin, Aggregation, BinStamp, BinnedSeries,
};
pub use simulate::{simulate_lightcurve, SimulatedLightCurve, SimulationModel, SimulationSpec};
pub use stats::{estimate_dt, estimate_dt_with_limit};
pub use windows::{detrend_linear, detrend_mean, Window};

use thiserror::Error;

/// Errors in signal processing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    #[error("Insufficient data: need {needed}, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("FFT error: {0}")]
    FftError(String),

    #[error("Invalid sampling rate: {0}")]
    InvalidSamplingRate(f64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Too many bins: {requested} requested, limit is {limit}")]
    TooManyBins { requested: f64, limit: usize },
}

/// Index of the first largest finite value, if any.
pub(crate) fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_skips_nan() {
        assert_eq!(argmax(&[1.0, f64::NAN, 3.0, 2.0]), Some(2));
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f64::NAN]), None);
    }
}
