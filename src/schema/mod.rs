//! Parameter schema registry
//!
//! Schemas are derived from the declarative tables in [`definitions`]. They
//! are advisory: the dispatcher uses them to fill missing parameters, and
//! callers use them to build forms. Values are never rejected here.

pub mod definitions;

pub use definitions::{DefaultValue, ParamDef, ParamKind};

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};
use crate::types::{AnalysisType, Parameters};

/// Schema entry of one parameter, as presented to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub kind: ParamKind,
    pub default: Value,
    pub doc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
}

/// Parameter name to spec.
pub type Schema = BTreeMap<String, ParamSpec>;

impl DefaultValue {
    pub fn to_json(self) -> Value {
        match self {
            DefaultValue::None => Value::Null,
            DefaultValue::Int(i) => json!(i),
            DefaultValue::Num(f) => json!(f),
            DefaultValue::Bool(b) => json!(b),
            DefaultValue::Str(s) => json!(s),
            DefaultValue::Range(low, high) => json!([low, high]),
        }
    }
}

impl From<&ParamDef> for ParamSpec {
    fn from(def: &ParamDef) -> Self {
        Self {
            kind: def.kind,
            default: def.default.to_json(),
            doc: def.doc.to_string(),
            min: def.min,
            max: def.max,
            allowed_values: (!def.allowed.is_empty())
                .then(|| def.allowed.iter().map(|s| s.to_string()).collect()),
        }
    }
}

fn registered(analysis_type: AnalysisType) -> EngineResult<&'static [ParamDef]> {
    definitions::definitions(analysis_type)
        .ok_or_else(|| EngineError::UnknownAnalysisType(analysis_type.as_str().to_string()))
}

/// Schema of a registered analysis type.
pub fn get_schema(analysis_type: AnalysisType) -> EngineResult<Schema> {
    Ok(registered(analysis_type)?
        .iter()
        .map(|def| (def.name.to_string(), ParamSpec::from(def)))
        .collect())
}

/// Schema looked up by analysis type name.
pub fn get_schema_by_name(name: &str) -> EngineResult<Schema> {
    get_schema(name.parse()?)
}

/// Analysis types with a registered schema.
pub fn registered_types() -> Vec<AnalysisType> {
    AnalysisType::ALL
        .iter()
        .copied()
        .filter(|t| definitions::definitions(*t).is_some())
        .collect()
}

/// Every registered schema, keyed by analysis type name.
pub fn list_schemas() -> BTreeMap<&'static str, Schema> {
    registered_types()
        .into_iter()
        .filter_map(|t| get_schema(t).ok().map(|s| (t.as_str(), s)))
        .collect()
}

/// Insert declared defaults for parameters the caller left out. Parameters
/// whose default is `None` stay absent. Returns how many were filled.
pub fn fill_defaults(analysis_type: AnalysisType, params: &mut Parameters) -> EngineResult<usize> {
    let mut filled = 0;
    for def in registered(analysis_type)? {
        if def.default == DefaultValue::None || params.contains_key(def.name) {
            continue;
        }
        params.insert(def.name.to_string(), def.default.to_json());
        filled += 1;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebin_schema_entries() {
        let schema = get_schema(AnalysisType::Rebin).unwrap();
        let bin_time = &schema["bin_time"];
        assert_eq!(bin_time.kind, ParamKind::Number);
        assert_eq!(bin_time.default, json!(1.0));
        assert_eq!(bin_time.min, Some(0.0));
        let method = &schema["method"];
        assert_eq!(
            method.allowed_values.as_deref(),
            Some(&["sum".to_string(), "mean".to_string(), "average".to_string()][..])
        );
    }

    #[test]
    fn test_schema_serializes_type_key() {
        let schema = get_schema(AnalysisType::PowerSpectrum).unwrap();
        let v = serde_json::to_value(&schema).unwrap();
        assert_eq!(v["freq_range"]["type"], "Range");
        assert_eq!(v["freq_range"]["default"], json!([0.0, null]));
        assert!(v["dt"].get("min").is_none());
    }

    #[test]
    fn test_unregistered_type_rejected() {
        assert!(matches!(
            get_schema(AnalysisType::Custom),
            Err(EngineError::UnknownAnalysisType(_))
        ));
        assert!(matches!(
            get_schema_by_name("wavelet"),
            Err(EngineError::UnknownAnalysisType(_))
        ));
    }

    #[test]
    fn test_fill_defaults_keeps_caller_values() {
        let mut params = Parameters::new();
        params.insert("bin_time".to_string(), json!(2.0));
        let filled = fill_defaults(AnalysisType::Rebin, &mut params).unwrap();
        assert_eq!(filled, 1);
        assert_eq!(params["bin_time"], json!(2.0));
        assert_eq!(params["method"], json!("sum"));
    }

    #[test]
    fn test_list_schemas_covers_registered_types() {
        let all = list_schemas();
        assert_eq!(all.len(), 6);
        assert!(all.contains_key("lomb_scargle"));
        assert!(!all.contains_key("light_curve"));
    }
}
