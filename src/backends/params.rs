//! Typed access to a job's JSON parameter map
//!
//! A missing key or an explicit `null` yields the caller's default; a value
//! of the wrong JSON type is an [`EngineError::InvalidParameter`].

use serde_json::Value;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};
use crate::types::Parameters;

pub(crate) struct Params<'a> {
    map: &'a Parameters,
}

impl<'a> Params<'a> {
    pub(crate) fn new(map: &'a Parameters) -> Self {
        Self { map }
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.map.get(name).filter(|v| !v.is_null())
    }

    pub(crate) fn opt_f64(&self, name: &str) -> EngineResult<Option<f64>> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| EngineError::invalid_param(name, format!("expected a number, got {v}"))),
        }
    }

    pub(crate) fn f64_or(&self, name: &str, default: f64) -> EngineResult<f64> {
        Ok(self.opt_f64(name)?.unwrap_or(default))
    }

    /// Non-negative integer. Whole floats such as `5.0` are accepted.
    pub(crate) fn usize_or(&self, name: &str, default: usize) -> EngineResult<usize> {
        let Some(v) = self.get(name) else {
            return Ok(default);
        };
        if let Some(n) = v.as_u64() {
            return usize::try_from(n)
                .map_err(|_| EngineError::invalid_param(name, format!("{n} is too large")));
        }
        match v.as_f64() {
            Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= usize::MAX as f64 => Ok(f as usize),
            _ => Err(EngineError::invalid_param(
                name,
                format!("expected a non-negative integer, got {v}"),
            )),
        }
    }

    pub(crate) fn opt_u64(&self, name: &str) -> EngineResult<Option<u64>> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v.as_u64().map(Some).ok_or_else(|| {
                EngineError::invalid_param(name, format!("expected a non-negative integer, got {v}"))
            }),
        }
    }

    pub(crate) fn bool_or(&self, name: &str, default: bool) -> EngineResult<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| EngineError::invalid_param(name, format!("expected a boolean, got {v}"))),
        }
    }

    pub(crate) fn str_or(&self, name: &str, default: &'a str) -> EngineResult<&'a str> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_str()
                .ok_or_else(|| EngineError::invalid_param(name, format!("expected a string, got {v}"))),
        }
    }

    /// Parse a string option such as a window or normalization name.
    pub(crate) fn parse_or<T>(&self, name: &str, default: T) -> EngineResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(default),
            Some(_) => {
                let raw = self.str_or(name, "")?;
                raw.parse::<T>()
                    .map_err(|e| EngineError::invalid_param(name, e.to_string()))
            }
        }
    }

    /// `[low, high]` pair where `high` may be `null`. A missing parameter
    /// gives `(0, None)`.
    pub(crate) fn range(&self, name: &str) -> EngineResult<(f64, Option<f64>)> {
        let Some(v) = self.get(name) else {
            return Ok((0.0, None));
        };
        let bad = || EngineError::invalid_param(name, format!("expected [low, high], got {v}"));
        let items = v.as_array().ok_or_else(bad)?;
        if items.len() != 2 {
            return Err(bad());
        }
        let low = if items[0].is_null() {
            0.0
        } else {
            items[0].as_f64().ok_or_else(bad)?
        };
        let high = if items[1].is_null() {
            None
        } else {
            Some(items[1].as_f64().ok_or_else(bad)?)
        };
        Ok((low, high))
    }

    /// List of `[start, stop]` intervals such as good time intervals.
    pub(crate) fn intervals(&self, name: &str) -> EngineResult<Option<Vec<(f64, f64)>>> {
        let Some(v) = self.get(name) else {
            return Ok(None);
        };
        let bad = || {
            EngineError::invalid_param(name, format!("expected [[start, stop], ...], got {v}"))
        };
        let items = v.as_array().ok_or_else(bad)?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let pair = item.as_array().filter(|p| p.len() == 2).ok_or_else(bad)?;
            let start = pair[0].as_f64().ok_or_else(bad)?;
            let stop = pair[1].as_f64().ok_or_else(bad)?;
            if stop <= start {
                return Err(EngineError::invalid_param(
                    name,
                    format!("interval [{start}, {stop}] is empty"),
                ));
            }
            out.push((start, stop));
        }
        Ok(Some(out))
    }
}
