//! Chart builders for each result family, styled by the process theme

use super::figure::{Figure, Panel, Series};
use super::theme::{self, PlotTheme};
use crate::processing::Peak;

const FREQ_LABEL: &str = "Frequency (Hz)";

fn single(theme: &PlotTheme, title: &str, panel: Panel) -> Figure {
    Figure::new(title, &theme.tools).with_panel(panel)
}

/// Time series as a line, with error bars when errors are known.
pub fn light_curve(title: &str, time: &[f64], values: &[f64], errors: Option<&[f64]>, y_label: &str) -> Figure {
    let t = theme::get();
    let mut panel = Panel::new(title, "Time", y_label, t.width, t.height)
        .with(Series::line("value", &t.line_color, time, values));
    if let Some(err) = errors {
        panel = panel.with(Series::error_bars("error", &t.line_color, time, values, err));
    }
    single(t, title, panel)
}

/// Log-log power spectrum with optional error bars.
pub fn power_spectrum(title: &str, frequency: &[f64], power: &[f64], errors: Option<&[f64]>) -> Figure {
    let t = theme::get();
    let mut panel = Panel::new(title, FREQ_LABEL, "Power", t.width, t.height)
        .log_log()
        .with(Series::line("power", &t.line_color, frequency, power));
    if let Some(err) = errors {
        panel = panel.with(Series::error_bars("error", &t.line_color, frequency, power, err));
    }
    single(t, title, panel)
}

/// Periodogram with peak markers, optionally on a log frequency axis.
pub fn periodogram(title: &str, frequency: &[f64], power: &[f64], peaks: &[Peak], log_x: bool) -> Figure {
    let t = theme::get();
    let mut panel = Panel::new(title, FREQ_LABEL, "Power", t.width, t.height)
        .with(Series::line("power", &t.line_color, frequency, power));
    panel.x_log = log_x;
    if !peaks.is_empty() {
        let px: Vec<f64> = peaks.iter().map(|p| p.frequency).collect();
        let py: Vec<f64> = peaks.iter().map(|p| p.power).collect();
        panel = panel.with(Series::crosses("Peaks", &t.peak_color, &px, &py));
    }
    single(t, title, panel)
}

/// Amplitude panel followed by real and imaginary parts.
pub fn fourier_transform(frequency: &[f64], amplitude: &[f64], real: &[f64], imag: &[f64]) -> Figure {
    let t = theme::get();
    Figure::new("Fourier Transform", &t.tools)
        .with_panel(
            Panel::new("Fourier Transform", FREQ_LABEL, "Amplitude", t.width, t.height)
                .with(Series::line("amplitude", &t.line_color, frequency, amplitude)),
        )
        .with_panel(
            Panel::new("Real Part", FREQ_LABEL, "Value", t.width, t.panel_height)
                .with(Series::line("real", &t.line_color, frequency, real)),
        )
        .with_panel(
            Panel::new("Imaginary Part", FREQ_LABEL, "Value", t.width, t.panel_height)
                .with(Series::line("imag", &t.peak_color, frequency, imag)),
        )
}

/// Simulated light curve above its log-log power spectrum.
pub fn simulation(time: &[f64], counts: &[f64], frequency: &[f64], power: &[f64]) -> Figure {
    let t = theme::get();
    Figure::new("PDS Simulation", &t.tools)
        .with_panel(
            Panel::new("Simulated Light Curve", "Time (s)", "Counts", t.width, t.panel_height)
                .with(Series::line("counts", &t.line_color, time, counts)),
        )
        .with_panel(
            Panel::new("Power Spectrum of Simulation", FREQ_LABEL, "Power", t.width, t.panel_height)
                .log_log()
                .with(Series::line("power", &t.line_color, frequency, power)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourier_has_three_panels() {
        let f = [0.1, 0.2];
        let fig = fourier_transform(&f, &f, &f, &f);
        let titles: Vec<&str> = fig.panels.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Fourier Transform", "Real Part", "Imaginary Part"]);
        assert_eq!(fig.panels[1].height, theme::get().panel_height);
    }

    #[test]
    fn test_periodogram_marks_peaks() {
        let peaks = vec![Peak {
            frequency: 0.2,
            power: 3.0,
            period: Some(5.0),
        }];
        let fig = periodogram("Lomb-Scargle Periodogram", &[0.1, 0.2, 0.3], &[1.0, 3.0, 1.0], &peaks, false);
        assert_eq!(fig.panels[0].series.len(), 2);
        assert_eq!(fig.panels[0].series[1].label, "Peaks");
    }

    #[test]
    fn test_power_spectrum_is_log_log() {
        let fig = power_spectrum("Power Spectrum", &[1.0], &[2.0], None);
        assert!(fig.panels[0].x_log && fig.panels[0].y_log);
    }
}
