//! Delimited text tables (`.txt`, `.csv`, `.dat`)
//!
//! Columns are separated by commas or whitespace, `#` starts a comment.
//! Every data row must carry the same number of numeric fields as the first.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Whether the first non-comment line names the columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    /// Every line is data (loadtxt style).
    Absent,
    /// The first line is a header unless it parses as numbers.
    Detect,
}

/// A parsed numeric table, column-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TextTable {
    pub names: Option<Vec<String>>,
    pub columns: Vec<Vec<f64>>,
}

impl TextTable {
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

fn split_fields(line: &str) -> Vec<&str> {
    if line.contains(',') {
        line.split(',').map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    }
}

fn parse_row(fields: &[&str]) -> Option<Vec<f64>> {
    fields.iter().map(|f| f.parse::<f64>().ok()).collect()
}

/// Read a delimited numeric table.
pub fn read_table(path: &Path, header: HeaderMode) -> EngineResult<TextTable> {
    let file = File::open(path).map_err(|e| {
        EngineError::DataFormat(format!("could not open {}: {e}", path.display()))
    })?;
    let reader = BufReader::new(file);

    let mut names: Option<Vec<String>> = None;
    let mut columns: Vec<Vec<f64>> = Vec::new();
    let mut seen_first = false;

    for (idx, line) in reader.lines().enumerate() {
        let line_num = idx + 1;
        let line = line.map_err(|e| {
            EngineError::DataFormat(format!("could not read text file line {line_num}: {e}"))
        })?;
        let content = line.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        let fields = split_fields(content);

        if !seen_first {
            seen_first = true;
            match parse_row(&fields) {
                Some(row) => {
                    columns = row.into_iter().map(|v| vec![v]).collect();
                }
                None if header == HeaderMode::Detect => {
                    names = Some(fields.iter().map(|f| f.trim_matches('"').to_string()).collect());
                    columns = vec![Vec::new(); fields.len()];
                }
                None => {
                    return Err(EngineError::DataFormat(format!(
                        "could not read text file: non-numeric value on line {line_num}"
                    )));
                }
            }
            continue;
        }

        let row = parse_row(&fields).ok_or_else(|| {
            EngineError::DataFormat(format!(
                "could not read text file: non-numeric value on line {line_num}"
            ))
        })?;
        if row.len() != columns.len() {
            return Err(EngineError::DataFormat(format!(
                "could not read text file: line {line_num} has {} columns, expected {}",
                row.len(),
                columns.len()
            )));
        }
        for (col, v) in columns.iter_mut().zip(row) {
            col.push(v);
        }
    }

    tracing::debug!(
        path = %path.display(),
        columns = columns.len(),
        rows = columns.first().map_or(0, Vec::len),
        "Parsed text table"
    );
    Ok(TextTable { names, columns })
}
