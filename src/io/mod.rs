//! File readers shared by the backends
//!
//! Backends decide which columns mean what; this module only gets numbers
//! off disk and assembles them into a [`TimeSeries`].

pub mod fits;
pub mod text;

pub use fits::{BinTable, FitsFile, Header, HeaderValue};
pub use text::{read_table, HeaderMode, TextTable};

use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::types::{MetaValue, Metadata, TimeSeries};

/// Lower-cased extension without the dot (`""` when absent).
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Error for an extension the reader does not handle.
pub fn unsupported_format(ext: &str) -> EngineError {
    let shown = if ext.is_empty() {
        "(none)".to_string()
    } else {
        format!(".{ext}")
    };
    EngineError::DataFormat(format!("Unsupported file format: {shown}"))
}

/// First header keyword among `keys` found anywhere in the file, as a
/// metadata value (`Null` when absent).
pub fn keyword_meta(file: &FitsFile, keys: &[&str]) -> MetaValue {
    match keys.iter().find_map(|k| file.keyword(k)) {
        Some(HeaderValue::Text(s)) => MetaValue::Text(s.clone()),
        Some(HeaderValue::Logical(b)) => MetaValue::Bool(*b),
        Some(HeaderValue::Int(i)) => MetaValue::Int(*i),
        Some(HeaderValue::Float(f)) => MetaValue::Float(*f),
        None => MetaValue::Null,
    }
}

/// Assemble a series, dropping rows whose time is non-finite or whose value
/// is NaN.
pub fn assemble_series(
    time: &[f64],
    values: &[f64],
    errors: Option<&[f64]>,
    metadata: Metadata,
) -> EngineResult<TimeSeries> {
    if time.len() != values.len() {
        return Err(EngineError::DataFormat(format!(
            "time column has {} rows but value column has {}",
            time.len(),
            values.len()
        )));
    }
    let keep: Vec<usize> = (0..time.len())
        .filter(|&i| time[i].is_finite() && !values[i].is_nan())
        .collect();
    if keep.is_empty() {
        return Err(EngineError::DataFormat(
            "no finite samples found in data columns".to_string(),
        ));
    }
    if keep.len() < time.len() {
        tracing::debug!(dropped = time.len() - keep.len(), "Dropped non-finite rows");
    }

    let t = keep.iter().map(|&i| time[i]).collect();
    let v = keep.iter().map(|&i| values[i]).collect();
    let e = errors.map(|err| keep.iter().map(|&i| err.get(i).copied().unwrap_or(f64::NAN)).collect());
    TimeSeries::new(t, v, e, metadata)
}

/// Positional mapping of a text table: 1st column time, 2nd value,
/// optional 3rd error.
pub fn series_from_table(table: &TextTable, metadata: Metadata) -> EngineResult<TimeSeries> {
    if table.n_columns() < 2 {
        return Err(EngineError::DataFormat(format!(
            "expected at least two numeric columns, found {}",
            table.n_columns()
        )));
    }
    assemble_series(
        &table.columns[0],
        &table.columns[1],
        table.columns.get(2).map(Vec::as_slice),
        metadata,
    )
}

/// Read a delimited text file by column position, tagging `format` with the
/// file extension.
pub fn read_text_series(path: &Path, header: HeaderMode) -> EngineResult<TimeSeries> {
    let table = read_table(path, header)?;
    let mut metadata = Metadata::new();
    metadata.insert("format".to_string(), extension_of(path).into());
    series_from_table(&table, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_extension_is_lowercased() {
        assert_eq!(extension_of(Path::new("/a/B.FITS")), "fits");
        assert_eq!(extension_of(Path::new("noext")), "");
    }

    #[test]
    fn test_assemble_drops_nan_rows() {
        let ts = assemble_series(
            &[0.0, f64::NAN, 2.0, 3.0],
            &[1.0, 2.0, f64::NAN, 4.0],
            Some(&[0.1, 0.2, 0.3, 0.4]),
            Metadata::new(),
        )
        .unwrap();
        assert_eq!(ts.time(), &[0.0, 3.0]);
        assert_eq!(ts.errors().unwrap(), &[0.1, 0.4]);
    }

    #[test]
    fn test_single_column_rejected() {
        let mut f = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        f.write_all(b"1\n2\n3\n").unwrap();
        let err = read_text_series(f.path(), HeaderMode::Absent).unwrap_err();
        assert!(err.to_string().contains("two numeric columns"));
    }

    #[test]
    fn test_text_series_positions() {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(b"t,flux,err\n0,5,0.5\n1,6,0.5\n").unwrap();
        let ts = read_text_series(f.path(), HeaderMode::Detect).unwrap();
        assert_eq!(ts.values(), &[5.0, 6.0]);
        assert_eq!(ts.metadata()["format"].as_str(), Some("csv"));
    }
}
