//! Canonical in-memory time series
//!
//! Every backend's `read_file` produces a [`TimeSeries`] and every
//! `run_analysis` consumes one. The struct is immutable once built: the only
//! way to obtain one is through [`TimeSeries::new`], which enforces the
//! length invariants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};

/// Scalar metadata value attached to a time series (mission, target, dt, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Float(v) => Some(*v),
            MetaValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

impl<T: Into<MetaValue>> From<Option<T>> for MetaValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(MetaValue::Null)
    }
}

/// Ordered metadata mapping.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Loaded time-series data: sample times, values, optional errors, metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    time: Vec<f64>,
    values: Vec<f64>,
    errors: Option<Vec<f64>>,
    metadata: Metadata,
}

impl TimeSeries {
    /// Build a time series, rejecting mismatched column lengths.
    pub fn new(
        time: Vec<f64>,
        values: Vec<f64>,
        errors: Option<Vec<f64>>,
        metadata: Metadata,
    ) -> EngineResult<Self> {
        if values.len() != time.len() {
            return Err(EngineError::DataFormat(format!(
                "value column has {} samples but time column has {}",
                values.len(),
                time.len()
            )));
        }
        if let Some(err) = &errors {
            if err.len() != time.len() {
                return Err(EngineError::DataFormat(format!(
                    "error column has {} samples but time column has {}",
                    err.len(),
                    time.len()
                )));
            }
        }
        Ok(Self {
            time,
            values,
            errors,
            metadata,
        })
    }

    /// Time series without errors or metadata.
    pub fn from_columns(time: Vec<f64>, values: Vec<f64>) -> EngineResult<Self> {
        Self::new(time, values, None, Metadata::new())
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn errors(&self) -> Option<&[f64]> {
        self.errors.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Numeric metadata lookup (e.g. `dt`).
    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(MetaValue::as_f64)
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Time span covered by the samples (`max - min`), 0 for fewer than 2 points.
    pub fn span(&self) -> f64 {
        let (min, max) = self
            .time
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| {
                (lo.min(t), hi.max(t))
            });
        if self.time.len() < 2 {
            0.0
        } else {
            max - min
        }
    }

    /// Consume into raw columns.
    pub fn into_parts(self) -> (Vec<f64>, Vec<f64>, Option<Vec<f64>>, Metadata) {
        (self.time, self.values, self.errors, self.metadata)
    }
}
