//! Time-axis rebinning
//!
//! Two routines:
//!
//! - [`group_rebin`]: combine every `k` consecutive samples of an evenly
//!   sampled series, where `k = bin_time / dt` must be a whole number
//! - [`bin_aggregate`]: the generic fallback; explicit edges from
//!   `min(time)` in steps of `bin_time` covering `[min, max + bin_time)`
//!
//! - [`downsample`]: fixed-width time bins anchored at the first sample of a
//!   strictly increasing series, stamped at the bin start or midpoint
//!
//! Plus [`bin_events`], which histograms photon arrival times into counts.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::ProcessingError;
use crate::config::defaults::MAX_BINS;

/// How samples falling in one bin are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    #[serde(alias = "average")]
    Mean,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
        }
    }
}

impl FromStr for Aggregation {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(Aggregation::Sum),
            "mean" | "average" => Ok(Aggregation::Mean),
            other => Err(ProcessingError::InvalidInput(format!(
                "unknown rebin method '{other}'"
            ))),
        }
    }
}

/// Rebinned series. `errors` is present when the input carried errors or
/// the routine derives them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedSeries {
    pub time: Vec<f64>,
    pub values: Vec<f64>,
    pub errors: Option<Vec<f64>>,
    pub dt: f64,
}

impl BinnedSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

fn validate(
    time: &[f64],
    values: &[f64],
    errors: Option<&[f64]>,
    bin_time: f64,
) -> Result<(), ProcessingError> {
    if !(bin_time.is_finite() && bin_time > 0.0) {
        return Err(ProcessingError::InvalidInput(format!(
            "bin_time must be positive, got {bin_time}"
        )));
    }
    let mismatched = values.len() != time.len()
        || errors.map_or(false, |e| e.len() != time.len());
    if mismatched {
        return Err(ProcessingError::InvalidInput(
            "time, value and error columns differ in length".to_string(),
        ));
    }
    Ok(())
}

/// Number of bins of `width` needed to cover `span`, counting the bin that
/// holds the right endpoint. Fails above [`MAX_BINS`] before anything is
/// allocated.
fn bin_count(span: f64, width: f64) -> Result<usize, ProcessingError> {
    let bins = (span / width).floor() + 1.0;
    if !bins.is_finite() || bins > MAX_BINS as f64 {
        return Err(ProcessingError::TooManyBins {
            requested: bins,
            limit: MAX_BINS,
        });
    }
    Ok(bins.max(1.0) as usize)
}

/// Combine groups of `bin_time / dt` consecutive samples of an evenly
/// sampled series. A trailing partial group is dropped.
///
/// Errors combine in quadrature; without input errors, Poisson errors
/// (`sqrt(sum)`) are derived. With [`Aggregation::Mean`] both values and
/// errors are divided by the group size.
pub fn group_rebin(
    time: &[f64],
    values: &[f64],
    errors: Option<&[f64]>,
    dt: f64,
    bin_time: f64,
    aggregation: Aggregation,
) -> Result<BinnedSeries, ProcessingError> {
    validate(time, values, errors, bin_time)?;
    if !(dt.is_finite() && dt > 0.0) {
        return Err(ProcessingError::InvalidSamplingRate(dt));
    }
    let ratio = bin_time / dt;
    let k = ratio.round();
    if k < 1.0 || (ratio - k).abs() > 1e-6 * ratio.max(1.0) {
        return Err(ProcessingError::InvalidInput(format!(
            "bin_time {bin_time} is not a whole multiple of dt {dt}"
        )));
    }
    if !super::stats::is_evenly_sampled(time, dt) {
        return Err(ProcessingError::InvalidInput(
            "series is not evenly sampled".to_string(),
        ));
    }
    let k = k as usize;
    if values.len() < k {
        return Err(ProcessingError::InsufficientData {
            needed: k,
            available: values.len(),
        });
    }

    let scale = match aggregation {
        Aggregation::Sum => 1.0,
        Aggregation::Mean => 1.0 / k as f64,
    };

    let mut out = BinnedSeries {
        time: Vec::with_capacity(values.len() / k),
        values: Vec::with_capacity(values.len() / k),
        errors: Some(Vec::with_capacity(values.len() / k)),
        dt: bin_time,
    };
    for (g, chunk) in values.chunks_exact(k).enumerate() {
        let start = g * k;
        let t_mid = time[start..start + k].iter().sum::<f64>() / k as f64;
        let total: f64 = chunk.iter().sum();
        let err = match errors {
            Some(e) => e[start..start + k].iter().map(|x| x * x).sum::<f64>().sqrt(),
            None => total.max(0.0).sqrt(),
        };
        out.time.push(t_mid);
        out.values.push(total * scale);
        if let Some(errs) = out.errors.as_mut() {
            errs.push(err * scale);
        }
    }
    Ok(out)
}

/// Generic bin-and-aggregate over explicit edges.
///
/// Edges start at `min(time)` and step by `bin_time` while below
/// `max(time) + bin_time`. Bins are left-closed; the last bin is also closed
/// on the right so `max(time)` always lands in a bin. Output time is the bin
/// midpoint; empty bins are dropped. Errors, when given, combine in
/// quadrature (divided by the count for a mean).
pub fn bin_aggregate(
    time: &[f64],
    values: &[f64],
    errors: Option<&[f64]>,
    bin_time: f64,
    aggregation: Aggregation,
) -> Result<BinnedSeries, ProcessingError> {
    validate(time, values, errors, bin_time)?;
    if time.is_empty() {
        return Err(ProcessingError::InsufficientData {
            needed: 1,
            available: 0,
        });
    }
    let (min, max) = time
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| {
            (lo.min(t), hi.max(t))
        });
    let expected = bin_count(max - min, bin_time)?;

    let mut edges: Vec<f64> = Vec::with_capacity(expected + 1);
    let mut i = 0usize;
    loop {
        let edge = min + i as f64 * bin_time;
        if edge >= max + bin_time {
            break;
        }
        edges.push(edge);
        i += 1;
    }
    if edges.last().map_or(true, |&last| last <= max) {
        edges.push(min + edges.len() as f64 * bin_time);
    }
    let n_bins = edges.len() - 1;

    let mut sums = vec![0.0; n_bins];
    let mut err_sq = vec![0.0; n_bins];
    let mut counts = vec![0usize; n_bins];
    for (j, (&t, &v)) in time.iter().zip(values).enumerate() {
        let idx = (((t - min) / bin_time).floor() as usize).min(n_bins - 1);
        sums[idx] += v;
        counts[idx] += 1;
        if let Some(e) = errors {
            err_sq[idx] += e[j] * e[j];
        }
    }

    let mut out = BinnedSeries {
        time: Vec::new(),
        values: Vec::new(),
        errors: errors.map(|_| Vec::new()),
        dt: bin_time,
    };
    for b in (0..n_bins).filter(|&b| counts[b] > 0) {
        let c = counts[b] as f64;
        let (value, err) = match aggregation {
            Aggregation::Sum => (sums[b], err_sq[b].sqrt()),
            Aggregation::Mean => (sums[b] / c, err_sq[b].sqrt() / c),
        };
        out.time.push(0.5 * (edges[b] + edges[b + 1]));
        out.values.push(value);
        if let Some(errs) = out.errors.as_mut() {
            errs.push(err);
        }
    }
    Ok(out)
}

/// Where a [`downsample`] bin is placed on the time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinStamp {
    Start,
    Mid,
}

/// Downsample a strictly increasing series into bins of `bin_time` starting
/// at the first sample. Empty bins are dropped.
///
/// Errors are always produced: input errors combine in quadrature, otherwise
/// they are estimated from the in-bin scatter (`std/sqrt(n)` for a mean,
/// `std*sqrt(n)` for a sum).
pub fn downsample(
    time: &[f64],
    values: &[f64],
    errors: Option<&[f64]>,
    bin_time: f64,
    aggregation: Aggregation,
    stamp: BinStamp,
) -> Result<BinnedSeries, ProcessingError> {
    validate(time, values, errors, bin_time)?;
    let Some(&start) = time.first() else {
        return Err(ProcessingError::InsufficientData {
            needed: 1,
            available: 0,
        });
    };
    if time.windows(2).any(|w| !(w[1] > w[0])) {
        return Err(ProcessingError::InvalidInput(
            "time must be strictly increasing".to_string(),
        ));
    }

    let mut out = BinnedSeries {
        time: Vec::new(),
        values: Vec::new(),
        errors: Some(Vec::new()),
        dt: bin_time,
    };
    let mut lo = 0usize;
    while lo < time.len() {
        let bin = ((time[lo] - start) / bin_time).floor();
        let bin_end = start + (bin + 1.0) * bin_time;
        let hi = lo + time[lo..].iter().take_while(|&&t| t < bin_end).count().max(1);

        let chunk = &values[lo..hi];
        let n = chunk.len() as f64;
        let total: f64 = chunk.iter().sum();
        let mean = total / n;
        let err = match errors {
            Some(e) => {
                let q = e[lo..hi].iter().map(|x| x * x).sum::<f64>().sqrt();
                match aggregation {
                    Aggregation::Sum => q,
                    Aggregation::Mean => q / n,
                }
            }
            None => {
                let std = (chunk.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
                match aggregation {
                    Aggregation::Sum => std * n.sqrt(),
                    Aggregation::Mean => std / n.sqrt(),
                }
            }
        };
        let bin_start = start + bin * bin_time;
        out.time.push(match stamp {
            BinStamp::Start => bin_start,
            BinStamp::Mid => bin_start + 0.5 * bin_time,
        });
        out.values.push(match aggregation {
            Aggregation::Sum => total,
            Aggregation::Mean => mean,
        });
        if let Some(errs) = out.errors.as_mut() {
            errs.push(err);
        }
        lo = hi;
    }
    Ok(out)
}

/// Histogram photon arrival times into a counts light curve with bins of
/// width `dt` starting at the earliest event. Times are bin centres.
pub fn bin_events(events: &[f64], dt: f64) -> Result<BinnedSeries, ProcessingError> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(ProcessingError::InvalidSamplingRate(dt));
    }
    let finite: Vec<f64> = events.iter().copied().filter(|t| t.is_finite()).collect();
    if finite.is_empty() {
        return Err(ProcessingError::InsufficientData {
            needed: 1,
            available: 0,
        });
    }
    let (start, stop) = finite
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| {
            (lo.min(t), hi.max(t))
        });
    let n_bins = bin_count(stop - start, dt)?;

    let mut counts = vec![0.0; n_bins];
    for t in finite {
        let idx = (((t - start) / dt).floor() as usize).min(n_bins - 1);
        counts[idx] += 1.0;
    }
    Ok(BinnedSeries {
        time: (0..n_bins).map(|i| start + (i as f64 + 0.5) * dt).collect(),
        values: counts,
        errors: None,
        dt,
    })
}
