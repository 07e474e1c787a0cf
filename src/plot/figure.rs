//! Figure model and its two renderings
//!
//! A [`Figure`] is a title plus vertically stacked [`Panel`]s, each holding
//! line, marker or error-bar [`Series`]. It serialises to JSON as-is and
//! renders to a standalone HTML page with one inline SVG per panel.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::config::defaults::PLOT_MAX_SVG_POINTS;
use crate::error::EngineResult;

const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 32.0;
const MARGIN_BOTTOM: f64 = 48.0;
const N_TICKS: usize = 5;

/// How a series is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Line,
    /// `x` markers, used for periodogram peaks.
    Cross,
    /// Vertical bars of `y ± y_err`.
    ErrorBars,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub label: String,
    pub kind: SeriesKind,
    pub color: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_err: Option<Vec<f64>>,
}

impl Series {
    pub fn line(label: &str, color: &str, x: &[f64], y: &[f64]) -> Self {
        Self {
            label: label.to_string(),
            kind: SeriesKind::Line,
            color: color.to_string(),
            x: x.to_vec(),
            y: y.to_vec(),
            y_err: None,
        }
    }

    pub fn crosses(label: &str, color: &str, x: &[f64], y: &[f64]) -> Self {
        Self {
            kind: SeriesKind::Cross,
            ..Self::line(label, color, x, y)
        }
    }

    pub fn error_bars(label: &str, color: &str, x: &[f64], y: &[f64], err: &[f64]) -> Self {
        Self {
            kind: SeriesKind::ErrorBars,
            y_err: Some(err.to_vec()),
            ..Self::line(label, color, x, y)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x_log: bool,
    pub y_log: bool,
    pub width: u32,
    pub height: u32,
    pub series: Vec<Series>,
}

impl Panel {
    pub fn new(title: &str, x_label: &str, y_label: &str, width: u32, height: u32) -> Self {
        Self {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            x_log: false,
            y_log: false,
            width,
            height,
            series: Vec::new(),
        }
    }

    pub fn log_log(mut self) -> Self {
        self.x_log = true;
        self.y_log = true;
        self
    }

    pub fn with(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub title: String,
    pub tools: Vec<String>,
    pub panels: Vec<Panel>,
}

impl Figure {
    pub fn new(title: &str, tools: &[String]) -> Self {
        Self {
            title: title.to_string(),
            tools: tools.to_vec(),
            panels: Vec::new(),
        }
    }

    pub fn with_panel(mut self, panel: Panel) -> Self {
        self.panels.push(panel);
        self
    }

    pub fn to_json(&self) -> EngineResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Standalone HTML page: one SVG per panel plus the figure JSON.
    pub fn to_html(&self) -> EngineResult<String> {
        let json = serde_json::to_string(self)?.replace("</", "<\\/");
        let mut html = String::new();
        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n\
             <style>body{{font-family:sans-serif}} .panel{{margin:8px 0}}</style>\n</head>\n<body>\n\
             <div class=\"figure\" data-tools=\"{}\">\n",
            escape(&self.title),
            escape(&self.tools.join(","))
        );
        for panel in &self.panels {
            html.push_str("<div class=\"panel\">\n");
            html.push_str(&render_panel(panel));
            html.push_str("</div>\n");
        }
        let _ = write!(
            html,
            "</div>\n<script type=\"application/json\" id=\"figure-data\">{json}</script>\n</body>\n</html>\n"
        );
        Ok(html)
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// One axis: data-space bounds after the optional log transform.
#[derive(Debug, Clone, Copy)]
struct Axis {
    lo: f64,
    hi: f64,
    log: bool,
}

impl Axis {
    fn transform(&self, v: f64) -> Option<f64> {
        if !v.is_finite() {
            return None;
        }
        if self.log {
            (v > 0.0).then(|| v.log10())
        } else {
            Some(v)
        }
    }

    fn fit(values: impl Iterator<Item = f64>, log: bool) -> Self {
        let probe = Axis {
            lo: 0.0,
            hi: 1.0,
            log,
        };
        let (lo, hi) = values
            .filter_map(|v| probe.transform(v))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if !lo.is_finite() {
            return Axis { lo: 0.0, hi: 1.0, log };
        }
        if hi - lo <= f64::EPSILON * lo.abs().max(1.0) {
            let pad = if lo == 0.0 { 0.5 } else { lo.abs() * 0.1 };
            return Axis {
                lo: lo - pad,
                hi: hi + pad,
                log,
            };
        }
        Axis { lo, hi, log }
    }

    /// Map a transformed value into `[start, start + length]`.
    fn scale(&self, t: f64, start: f64, length: f64) -> f64 {
        start + (t - self.lo) / (self.hi - self.lo) * length
    }

    fn tick_label(&self, t: f64) -> String {
        let v = if self.log { 10f64.powf(t) } else { t };
        format_number(v)
    }
}

fn format_number(v: f64) -> String {
    let a = v.abs();
    if v == 0.0 {
        "0".to_string()
    } else if !(1e-3..1e4).contains(&a) {
        format!("{v:.1e}")
    } else {
        let s = format!("{v:.3}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Indices drawn for a series of `n` points.
fn decimated(n: usize) -> impl Iterator<Item = usize> {
    let step = n.div_ceil(PLOT_MAX_SVG_POINTS).max(1);
    (0..n).step_by(step)
}

fn render_panel(panel: &Panel) -> String {
    let w = f64::from(panel.width);
    let h = f64::from(panel.height);
    let plot_w = (w - MARGIN_LEFT - MARGIN_RIGHT).max(1.0);
    let plot_h = (h - MARGIN_TOP - MARGIN_BOTTOM).max(1.0);

    let x_axis = Axis::fit(
        panel.series.iter().flat_map(|s| s.x.iter().copied()),
        panel.x_log,
    );
    let y_axis = Axis::fit(
        panel.series.iter().flat_map(|s| {
            let errs = s.y_err.as_deref();
            s.y.iter().enumerate().flat_map(move |(i, &y)| {
                let e = errs.and_then(|e| e.get(i)).copied().unwrap_or(0.0);
                [y - e, y + e]
            })
        }),
        panel.y_log,
    );
    let px = |t: f64| x_axis.scale(t, MARGIN_LEFT, plot_w);
    let py = |t: f64| y_axis.scale(t, MARGIN_TOP + plot_h, -plot_h);

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\">",
        panel.width, panel.height, panel.width, panel.height
    );
    let _ = writeln!(
        svg,
        "<text x=\"{:.1}\" y=\"20\" text-anchor=\"middle\" font-size=\"14\">{}</text>",
        w / 2.0,
        escape(&panel.title)
    );
    let _ = writeln!(
        svg,
        "<rect x=\"{MARGIN_LEFT}\" y=\"{MARGIN_TOP}\" width=\"{plot_w:.1}\" height=\"{plot_h:.1}\" fill=\"none\" stroke=\"#444\"/>"
    );

    for i in 0..N_TICKS {
        let frac = i as f64 / (N_TICKS - 1) as f64;
        let tx = x_axis.lo + frac * (x_axis.hi - x_axis.lo);
        let ty = y_axis.lo + frac * (y_axis.hi - y_axis.lo);
        let _ = writeln!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"10\">{}</text>",
            px(tx),
            MARGIN_TOP + plot_h + 14.0,
            x_axis.tick_label(tx)
        );
        let _ = writeln!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\" font-size=\"10\">{}</text>",
            MARGIN_LEFT - 4.0,
            py(ty) + 3.0,
            y_axis.tick_label(ty)
        );
    }
    let _ = writeln!(
        svg,
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"12\">{}</text>",
        MARGIN_LEFT + plot_w / 2.0,
        h - 8.0,
        escape(&panel.x_label)
    );
    let _ = writeln!(
        svg,
        "<text x=\"14\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"12\" transform=\"rotate(-90 14 {:.1})\">{}</text>",
        MARGIN_TOP + plot_h / 2.0,
        MARGIN_TOP + plot_h / 2.0,
        escape(&panel.y_label)
    );

    for series in &panel.series {
        let color = escape(&series.color);
        let point = |i: usize| -> Option<(f64, f64)> {
            let x = x_axis.transform(*series.x.get(i)?)?;
            let y = y_axis.transform(*series.y.get(i)?)?;
            Some((px(x), py(y)))
        };
        match series.kind {
            SeriesKind::Line => {
                // Break the polyline wherever a point cannot be drawn.
                let mut segments: Vec<Vec<(f64, f64)>> = vec![Vec::new()];
                for i in decimated(series.x.len()) {
                    match point(i) {
                        Some(p) => {
                            if let Some(seg) = segments.last_mut() {
                                seg.push(p);
                            }
                        }
                        None => segments.push(Vec::new()),
                    }
                }
                for seg in segments.iter().filter(|s| !s.is_empty()) {
                    let pts: Vec<String> =
                        seg.iter().map(|(x, y)| format!("{x:.2},{y:.2}")).collect();
                    let _ = writeln!(
                        svg,
                        "<polyline fill=\"none\" stroke=\"{color}\" stroke-width=\"1.5\" points=\"{}\"/>",
                        pts.join(" ")
                    );
                }
            }
            SeriesKind::Cross => {
                for (x, y) in (0..series.x.len()).filter_map(point) {
                    let _ = writeln!(
                        svg,
                        "<path d=\"M{:.2},{:.2} L{:.2},{:.2} M{:.2},{:.2} L{:.2},{:.2}\" stroke=\"{color}\" stroke-width=\"2\"/>",
                        x - 5.0, y - 5.0, x + 5.0, y + 5.0, x - 5.0, y + 5.0, x + 5.0, y - 5.0
                    );
                }
            }
            SeriesKind::ErrorBars => {
                let errs = series.y_err.as_deref().unwrap_or(&[]);
                for i in decimated(series.x.len()) {
                    let (Some(&x), Some(&y), Some(&e)) =
                        (series.x.get(i), series.y.get(i), errs.get(i))
                    else {
                        continue;
                    };
                    let (Some(tx), Some(lo), Some(hi)) = (
                        x_axis.transform(x),
                        y_axis.transform(y - e),
                        y_axis.transform(y + e),
                    ) else {
                        continue;
                    };
                    let _ = writeln!(
                        svg,
                        "<line x1=\"{0:.2}\" y1=\"{1:.2}\" x2=\"{0:.2}\" y2=\"{2:.2}\" stroke=\"{color}\" stroke-width=\"1\"/>",
                        px(tx),
                        py(lo),
                        py(hi)
                    );
                }
            }
        }
    }

    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools() -> Vec<String> {
        vec!["hover".to_string(), "save".to_string()]
    }

    #[test]
    fn test_html_contains_panels_and_json() {
        let x = [1.0, 2.0, 3.0];
        let y = [4.0, 5.0, 6.0];
        let fig = Figure::new("Light <Curve>", &tools())
            .with_panel(Panel::new("Top", "Time", "Counts", 700, 400).with(Series::line("lc", "#000", &x, &y)))
            .with_panel(Panel::new("Bottom", "Time", "Counts", 700, 300));
        let html = fig.to_html().unwrap();
        assert_eq!(html.matches("<svg").count(), 2);
        assert!(html.contains("Light &lt;Curve&gt;"));
        assert!(html.contains("figure-data"));
        assert!(html.contains("<polyline"));
    }

    #[test]
    fn test_log_axes_skip_non_positive_points() {
        let x = [0.0, 1.0, 10.0, 100.0];
        let y = [1.0, -1.0, 10.0, 100.0];
        let fig = Figure::new("PSD", &tools()).with_panel(
            Panel::new("PSD", "f", "P", 700, 400)
                .log_log()
                .with(Series::line("p", "#000", &x, &y)),
        );
        let html = fig.to_html().unwrap();
        assert!(!html.contains("NaN"));
        assert!(!html.contains("inf"));
        // The two drawable points form one segment after the break.
        assert_eq!(html.matches("<polyline").count(), 1);
    }

    #[test]
    fn test_json_keeps_all_points() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let fig = Figure::new("t", &tools())
            .with_panel(Panel::new("p", "x", "y", 700, 400).with(Series::line("s", "#000", &x, &x)));
        let json = fig.to_json().unwrap();
        assert_eq!(json["panels"][0]["series"][0]["x"].as_array().unwrap().len(), 10);
        assert_eq!(json["panels"][0]["series"][0]["kind"], "line");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(12345.0), "1.2e4");
    }

    #[test]
    fn test_constant_series_gets_padded_axis() {
        let axis = Axis::fit([5.0, 5.0].into_iter(), false);
        assert!(axis.hi > axis.lo);
    }
}
