//! Descriptive statistics and sampling-interval estimation

use statrs::statistics::{Data, Median, Statistics};

use super::ProcessingError;
use crate::config::defaults::DT_SAMPLE_LIMIT;

/// Arithmetic mean; NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().mean()
}

/// Population standard deviation (divides by N).
pub fn population_std(values: &[f64]) -> f64 {
    values.iter().population_std_dev()
}

pub fn median(values: &[f64]) -> f64 {
    Data::new(values.to_vec()).median()
}

pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Largest value; NaN for an empty slice.
pub fn max(values: &[f64]) -> f64 {
    Statistics::max(values.iter())
}

/// Estimate the sampling interval of `time` as the median spacing of the
/// sorted samples. Long series are thinned to [`DT_SAMPLE_LIMIT`] evenly
/// spaced points first.
pub fn estimate_dt(time: &[f64]) -> Result<f64, ProcessingError> {
    estimate_dt_with_limit(time, DT_SAMPLE_LIMIT)
}

pub fn estimate_dt_with_limit(time: &[f64], limit: usize) -> Result<f64, ProcessingError> {
    if time.len() < 2 {
        return Err(ProcessingError::InsufficientData {
            needed: 2,
            available: time.len(),
        });
    }

    let limit = limit.max(2);
    let mut sample: Vec<f64> = if time.len() > limit {
        // Same index selection as linspace(0, n-1, limit) truncated to int.
        let last = (time.len() - 1) as f64;
        (0..limit)
            .map(|i| time[(i as f64 * last / (limit - 1) as f64) as usize])
            .collect()
    } else {
        time.to_vec()
    };
    sample.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let diffs: Vec<f64> = sample.windows(2).map(|w| w[1] - w[0]).collect();
    let dt = median(&diffs);
    if !dt.is_finite() || dt <= 0.0 {
        return Err(ProcessingError::InvalidSamplingRate(dt));
    }
    Ok(dt)
}

/// Whether every successive spacing equals `dt` within a relative tolerance.
pub fn is_evenly_sampled(time: &[f64], dt: f64) -> bool {
    let tol = dt.abs() * 1e-6;
    time.windows(2).all(|w| ((w[1] - w[0]) - dt).abs() <= tol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_dt_regular() {
        let time: Vec<f64> = (0..100).map(|i| i as f64 * 0.25).collect();
        assert!((estimate_dt(&time).unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_estimate_dt_unsorted_with_gap() {
        let time = vec![3.0, 0.0, 1.0, 2.0, 10.0];
        assert!((estimate_dt(&time).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_estimate_dt_needs_two_points() {
        assert_eq!(
            estimate_dt(&[1.0]),
            Err(ProcessingError::InsufficientData {
                needed: 2,
                available: 1
            })
        );
    }

    #[test]
    fn test_estimate_dt_thinned() {
        let time: Vec<f64> = (0..50_000).map(|i| i as f64).collect();
        let dt = estimate_dt_with_limit(&time, 1000).unwrap();
        assert!(dt > 1.0 && dt < 60.0);
    }

    #[test]
    fn test_descriptive() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((mean(&v) - 2.5).abs() < 1e-12);
        assert!((median(&v) - 2.5).abs() < 1e-12);
        assert!((population_std(&v) - 1.25f64.sqrt()).abs() < 1e-12);
        assert!((sum(&v) - 10.0).abs() < 1e-12);
        assert!(is_evenly_sampled(&[0.0, 1.0, 2.0], 1.0));
        assert!(!is_evenly_sampled(&[0.0, 1.0, 2.5], 1.0));
    }
}
