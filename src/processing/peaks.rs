//! Peak detection in periodograms

use serde::{Deserialize, Serialize};

/// A periodogram peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub frequency: f64,
    pub power: f64,
    /// `1/frequency`; `None` for non-positive frequencies.
    pub period: Option<f64>,
}

impl Peak {
    fn new(frequency: f64, power: f64) -> Self {
        Self {
            frequency,
            power,
            period: (frequency > 0.0).then(|| 1.0 / frequency),
        }
    }
}

/// Find dominant peaks using true peak detection.
///
/// Identifies local maxima (higher than both neighbours) whose power is at
/// least `height_fraction` of the global maximum, then returns the top
/// `max_peaks` by power, descending.
pub fn find_peaks(
    frequency: &[f64],
    power: &[f64],
    height_fraction: f64,
    max_peaks: usize,
) -> Vec<Peak> {
    let n = frequency.len().min(power.len());
    if n < 3 || max_peaks == 0 {
        return Vec::new();
    }

    let global_max = power[..n]
        .iter()
        .copied()
        .filter(|p| p.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !global_max.is_finite() {
        return Vec::new();
    }
    let height = height_fraction * global_max;

    let mut peaks: Vec<Peak> = (1..n - 1)
        .filter(|&i| {
            let (prev, curr, next) = (power[i - 1], power[i], power[i + 1]);
            curr > prev && curr > next && curr >= height
        })
        .map(|i| Peak::new(frequency[i], power[i]))
        .collect();

    // Sort by power descending
    peaks.sort_by(|a, b| {
        b.power
            .partial_cmp(&a.power)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    peaks.truncate(max_peaks);
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_peaks_sorted_and_truncated() {
        let freq: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        // Seven isolated bumps of increasing height.
        let mut power = vec![0.0; 20];
        for (k, i) in [1, 3, 5, 7, 9, 11, 13].iter().enumerate() {
            power[*i] = (k + 1) as f64;
        }
        let peaks = find_peaks(&freq, &power, 0.1, 5);

        assert_eq!(peaks.len(), 5);
        assert!(peaks.windows(2).all(|w| w[0].power >= w[1].power));
        assert!((peaks[0].frequency - 1.3).abs() < 1e-12);
        assert!((peaks[0].period.unwrap() - 1.0 / 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_height_threshold_filters_small_bumps() {
        let freq = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let power = [0.0, 10.0, 0.0, 0.5, 0.0, 0.0];
        let peaks = find_peaks(&freq, &power, 0.1, 5);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].power, 10.0);
    }

    #[test]
    fn test_edges_and_short_input() {
        assert!(find_peaks(&[1.0, 2.0], &[3.0, 1.0], 0.1, 5).is_empty());
        // Monotone: the maximum sits on the edge and is not a local peak.
        assert!(find_peaks(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], 0.1, 5).is_empty());
    }

    #[test]
    fn test_zero_frequency_has_no_period() {
        let p = Peak::new(0.0, 1.0);
        assert!(p.period.is_none());
    }
}
