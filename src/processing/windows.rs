//! Taper windows and detrending applied before a Fourier transform

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;

use super::ProcessingError;

/// Symmetric taper windows (numpy definitions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Hanning,
    Hamming,
    Blackman,
    Bartlett,
    None,
}

impl Window {
    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Hanning => "hanning",
            Window::Hamming => "hamming",
            Window::Blackman => "blackman",
            Window::Bartlett => "bartlett",
            Window::None => "none",
        }
    }

    /// Window coefficients for `n` samples.
    pub fn coefficients(&self, n: usize) -> Vec<f64> {
        if n == 0 {
            return Vec::new();
        }
        if n == 1 {
            return vec![1.0];
        }
        let m = (n - 1) as f64;
        (0..n)
            .map(|i| {
                let x = i as f64;
                match self {
                    Window::Hanning => 0.5 - 0.5 * (2.0 * PI * x / m).cos(),
                    Window::Hamming => 0.54 - 0.46 * (2.0 * PI * x / m).cos(),
                    Window::Blackman => {
                        0.42 - 0.5 * (2.0 * PI * x / m).cos() + 0.08 * (4.0 * PI * x / m).cos()
                    }
                    Window::Bartlett => 1.0 - (2.0 * x / m - 1.0).abs(),
                    Window::None => 1.0,
                }
            })
            .collect()
    }

    /// Multiply `values` by the window in place.
    pub fn apply(&self, values: &mut [f64]) {
        if *self == Window::None {
            return;
        }
        let coefficients = self.coefficients(values.len());
        for (v, w) in values.iter_mut().zip(coefficients) {
            *v *= w;
        }
    }
}

impl FromStr for Window {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hanning" | "hann" => Ok(Window::Hanning),
            "hamming" => Ok(Window::Hamming),
            "blackman" => Ok(Window::Blackman),
            "bartlett" => Ok(Window::Bartlett),
            "none" => Ok(Window::None),
            other => Err(ProcessingError::InvalidInput(format!(
                "unknown window '{other}'"
            ))),
        }
    }
}

/// Subtract the mean.
pub fn detrend_mean(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| v - mean).collect()
}

/// Subtract the least-squares straight line fitted against sample index.
pub fn detrend_linear(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return detrend_mean(values);
    }
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / nf;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = y_mean - slope * x_mean;

    values
        .iter()
        .enumerate()
        .map(|(i, &y)| y - (intercept + slope * i as f64))
        .collect()
}
