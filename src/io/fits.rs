//! Minimal FITS reader
//!
//! Enough of the FITS standard to pull light curves and event lists out of
//! mission products:
//!
//! - 2880-byte blocks of 80-character header cards, terminated by `END`
//! - every HDU's data size from `BITPIX`/`NAXISn`/`PCOUNT`/`GCOUNT`, so
//!   images and unknown extensions are skipped rather than misread
//! - `BINTABLE` extensions with big-endian scalar columns
//!   (`B`, `I`, `J`, `K`, `E`, `D`), `TSCALn`/`TZEROn` applied
//!
//! Vector, string, bit and variable-length columns are stepped over.

use regex::Regex;
use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// FITS logical record length.
pub const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;

/// A typed header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Text(String),
    Logical(bool),
    Int(i64),
    Float(f64),
}

/// Ordered header cards of one HDU.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<(String, HeaderValue)>,
}

impl Header {
    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            HeaderValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn require_i64(&self, key: &str) -> EngineResult<i64> {
        self.get_i64(key)
            .ok_or_else(|| EngineError::DataFormat(format!("FITS header is missing {key}")))
    }
}

/// One numeric table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

/// Decoded binary table.
#[derive(Debug, Clone, PartialEq)]
pub struct BinTable {
    /// `EXTNAME`, when present.
    pub name: Option<String>,
    pub columns: Vec<Column>,
}

impl BinTable {
    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// First column whose upper-cased name contains any of `needles`.
    pub fn column_containing(&self, needles: &[&str]) -> Option<&Column> {
        self.columns.iter().find(|c| {
            let upper = c.name.to_ascii_uppercase();
            needles.iter().any(|n| upper.contains(n))
        })
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }
}

/// Header-data unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Hdu {
    pub header: Header,
    pub table: Option<BinTable>,
}

/// A parsed FITS file.
#[derive(Debug, Clone, PartialEq)]
pub struct FitsFile {
    pub hdus: Vec<Hdu>,
}

impl FitsFile {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            EngineError::DataFormat(format!("could not read FITS file {}: {e}", path.display()))
        })?;
        let file = Self::parse(&bytes)?;
        tracing::debug!(
            path = %path.display(),
            hdus = file.hdus.len(),
            tables = file.tables().count(),
            "Parsed FITS file"
        );
        Ok(file)
    }

    pub fn parse(bytes: &[u8]) -> EngineResult<Self> {
        if bytes.len() < BLOCK_SIZE || !bytes.starts_with(b"SIMPLE") {
            return Err(EngineError::DataFormat(
                "not a FITS file (missing SIMPLE card)".to_string(),
            ));
        }
        let tform_re = Regex::new(r"^\s*(\d*)([LXBIJKAEDCMPQ])")
            .map_err(|e| EngineError::DataFormat(format!("TFORM pattern: {e}")))?;

        let mut hdus = Vec::new();
        let mut offset = 0usize;
        while offset.checked_add(BLOCK_SIZE).map_or(false, |end| end <= bytes.len()) {
            // Trailing padding or special records after the last extension.
            if !hdus.is_empty() && !bytes[offset..].starts_with(b"XTENSION") {
                break;
            }
            let (header, header_len) = parse_header(&bytes[offset..])?;
            offset += header_len;

            let data_len = data_size(&header)?;
            let is_bintable = header
                .get_str("XTENSION")
                .map_or(false, |x| x.eq_ignore_ascii_case("BINTABLE"));
            let table = if is_bintable {
                let end = offset.checked_add(data_len).filter(|&e| e <= bytes.len());
                let Some(end) = end else {
                    return Err(EngineError::DataFormat(
                        "FITS binary table is truncated".to_string(),
                    ));
                };
                Some(decode_bintable(&header, &bytes[offset..end], &tform_re)?)
            } else {
                None
            };

            hdus.push(Hdu { header, table });
            offset = offset.saturating_add(padded(data_len));
        }

        Ok(Self { hdus })
    }

    pub fn primary_header(&self) -> Option<&Header> {
        self.hdus.first().map(|h| &h.header)
    }

    pub fn tables(&self) -> impl Iterator<Item = &BinTable> {
        self.hdus.iter().filter_map(|h| h.table.as_ref())
    }

    /// Header of the HDU holding `table`.
    pub fn header_of(&self, table: &BinTable) -> Option<&Header> {
        self.hdus
            .iter()
            .find(|h| h.table.as_ref().map_or(false, |t| std::ptr::eq(t, table)))
            .map(|h| &h.header)
    }

    /// Table whose `EXTNAME` matches, case-insensitively.
    pub fn table_named(&self, extname: &str) -> Option<&BinTable> {
        self.tables().find(|t| {
            t.name
                .as_deref()
                .map_or(false, |n| n.eq_ignore_ascii_case(extname))
        })
    }

    /// Look a keyword up in the primary header, then in every extension.
    pub fn keyword(&self, key: &str) -> Option<&HeaderValue> {
        self.hdus.iter().find_map(|h| h.header.get(key))
    }
}

fn padded(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE).saturating_mul(BLOCK_SIZE)
}

/// Parse header cards until `END`; returns the header and the bytes it spans.
fn parse_header(bytes: &[u8]) -> EngineResult<(Header, usize)> {
    let mut header = Header::default();
    let mut pos = 0usize;
    loop {
        if pos + CARD_SIZE > bytes.len() {
            return Err(EngineError::DataFormat(
                "FITS header has no END card".to_string(),
            ));
        }
        let card = String::from_utf8_lossy(&bytes[pos..pos + CARD_SIZE]);
        pos += CARD_SIZE;

        let keyword = card.get(..8).unwrap_or(&card).trim_end();
        if keyword == "END" {
            break;
        }
        if card.get(8..10) == Some("= ") {
            if let Some(value) = parse_value(card.get(10..).unwrap_or("")) {
                header.cards.push((keyword.to_string(), value));
            }
        }
    }
    Ok((header, padded(pos)))
}

fn parse_value(raw: &str) -> Option<HeaderValue> {
    let raw = raw.trim_start();
    if let Some(rest) = raw.strip_prefix('\'') {
        // Quotes inside strings are doubled.
        let mut out = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    out.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        return Some(HeaderValue::Text(out.trim_end().to_string()));
    }

    let token = raw.split('/').next().unwrap_or("").trim();
    match token {
        "" => None,
        "T" => Some(HeaderValue::Logical(true)),
        "F" => Some(HeaderValue::Logical(false)),
        _ => token
            .parse::<i64>()
            .map(HeaderValue::Int)
            .ok()
            .or_else(|| {
                token
                    .replace(['D', 'd'], "E")
                    .parse::<f64>()
                    .ok()
                    .map(HeaderValue::Float)
            }),
    }
}

fn data_size(header: &Header) -> EngineResult<usize> {
    let naxis = header.get_i64("NAXIS").unwrap_or(0);
    if naxis <= 0 {
        return Ok(0);
    }
    let bitpix = header.require_i64("BITPIX")?;
    let mut elements: i64 = 1;
    for i in 1..=naxis {
        elements = elements.saturating_mul(header.require_i64(&format!("NAXIS{i}"))?);
    }
    let pcount = header.get_i64("PCOUNT").unwrap_or(0);
    let gcount = header.get_i64("GCOUNT").unwrap_or(1);
    let bits = bitpix
        .abs()
        .saturating_mul(gcount)
        .saturating_mul(pcount.saturating_add(elements));
    usize::try_from(bits / 8)
        .map_err(|_| EngineError::DataFormat(format!("invalid FITS data size ({bits} bits)")))
}

/// Byte width of one cell and whether it decodes to a scalar number.
/// `None` when the width overflows.
fn field_layout(repeat: usize, code: char) -> Option<(usize, bool)> {
    let width = match code {
        'L' | 'B' | 'A' => Some(repeat),
        'X' => Some(repeat.div_ceil(8)),
        'I' => repeat.checked_mul(2),
        'J' | 'E' => repeat.checked_mul(4),
        'K' | 'D' | 'C' | 'P' => repeat.checked_mul(8),
        'M' | 'Q' => repeat.checked_mul(16),
        _ => Some(0),
    }?;
    let scalar = repeat == 1 && matches!(code, 'B' | 'I' | 'J' | 'K' | 'E' | 'D');
    Some((width, scalar))
}

fn read_scalar(code: char, cell: &[u8]) -> Option<f64> {
    let v = match code {
        'B' => f64::from(*cell.first()?),
        'I' => f64::from(i16::from_be_bytes(cell.get(..2)?.try_into().ok()?)),
        'J' => f64::from(i32::from_be_bytes(cell.get(..4)?.try_into().ok()?)),
        'K' => i64::from_be_bytes(cell.get(..8)?.try_into().ok()?) as f64,
        'E' => f64::from(f32::from_be_bytes(cell.get(..4)?.try_into().ok()?)),
        'D' => f64::from_be_bytes(cell.get(..8)?.try_into().ok()?),
        _ => return None,
    };
    Some(v)
}

fn decode_bintable(header: &Header, data: &[u8], tform_re: &Regex) -> EngineResult<BinTable> {
    let row_bytes = usize::try_from(header.require_i64("NAXIS1")?)
        .map_err(|_| EngineError::DataFormat("negative NAXIS1".to_string()))?;
    let n_rows = usize::try_from(header.require_i64("NAXIS2")?)
        .map_err(|_| EngineError::DataFormat("negative NAXIS2".to_string()))?;
    let n_fields = header.require_i64("TFIELDS")?;

    struct Field {
        name: String,
        code: char,
        offset: usize,
        scale: f64,
        zero: f64,
    }

    let mut fields = Vec::new();
    let mut offset = 0usize;
    for i in 1..=n_fields {
        let tform = header.get_str(&format!("TFORM{i}")).ok_or_else(|| {
            EngineError::DataFormat(format!("FITS binary table is missing TFORM{i}"))
        })?;
        let caps = tform_re.captures(tform).ok_or_else(|| {
            EngineError::DataFormat(format!("unsupported TFORM{i} '{tform}'"))
        })?;
        let repeat = match caps.get(1).map(|m| m.as_str()) {
            Some("") | None => 1,
            Some(digits) => digits.parse::<usize>().map_err(|e| {
                EngineError::DataFormat(format!("bad repeat count in TFORM{i}: {e}"))
            })?,
        };
        let code = caps
            .get(2)
            .and_then(|m| m.as_str().chars().next())
            .unwrap_or('A');
        let (width, scalar) = field_layout(repeat, code).ok_or_else(|| {
            EngineError::DataFormat(format!("TFORM{i} '{tform}' is too wide"))
        })?;
        if scalar {
            fields.push(Field {
                name: header
                    .get_str(&format!("TTYPE{i}"))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("COL{i}")),
                code,
                offset,
                scale: header.get_f64(&format!("TSCAL{i}")).unwrap_or(1.0),
                zero: header.get_f64(&format!("TZERO{i}")).unwrap_or(0.0),
            });
        }
        offset = offset.checked_add(width).ok_or_else(|| {
            EngineError::DataFormat("FITS column widths overflow".to_string())
        })?;
    }
    if offset > row_bytes {
        return Err(EngineError::DataFormat(format!(
            "FITS column widths ({offset} bytes) exceed NAXIS1 ({row_bytes})"
        )));
    }
    if data.len() < row_bytes.saturating_mul(n_rows) {
        return Err(EngineError::DataFormat(
            "FITS binary table is truncated".to_string(),
        ));
    }

    let mut columns: Vec<Column> = fields
        .iter()
        .map(|f| Column {
            name: f.name.clone(),
            values: Vec::with_capacity(n_rows),
        })
        .collect();
    for row in data.chunks_exact(row_bytes.max(1)).take(n_rows) {
        for (field, column) in fields.iter().zip(columns.iter_mut()) {
            let raw = read_scalar(field.code, &row[field.offset..]).unwrap_or(f64::NAN);
            column.values.push(field.zero + field.scale * raw);
        }
    }

    Ok(BinTable {
        name: header.get_str("EXTNAME").map(str::to_string),
        columns,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_kinds() {
        assert_eq!(parse_value(" 'EVENTS  '  / ext"), Some(HeaderValue::Text("EVENTS".into())));
        assert_eq!(parse_value("                   T"), Some(HeaderValue::Logical(true)));
        assert_eq!(parse_value("  42 / answer"), Some(HeaderValue::Int(42)));
        assert_eq!(parse_value("  1.5D2"), Some(HeaderValue::Float(150.0)));
        assert_eq!(parse_value(" 'O''Neil'"), Some(HeaderValue::Text("O'Neil".into())));
    }

    #[test]
    fn test_bintable_roundtrip_through_parser() {
        let time = [0.0, 1.0, 2.0];
        let rate = [10.0, 11.5, 9.25];
        let bytes = testing::bintable_file(
            &[("TELESCOP", "XMM"), ("OBJECT", "M31")],
            "RATE",
            &[("TIME", &time), ("RATE", &rate)],
        );
        let file = FitsFile::parse(&bytes).unwrap();
        assert_eq!(file.hdus.len(), 2);
        assert_eq!(
            file.primary_header().and_then(|h| h.get_str("TELESCOP")),
            Some("XMM")
        );
        let table = file.table_named("rate").unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.column("rate").unwrap().values, rate.to_vec());
        assert!(table.column_containing(&["TIME"]).is_some());
    }

    #[test]
    fn test_rejects_non_fits_bytes() {
        assert!(FitsFile::parse(b"hello world").is_err());
    }

    #[test]
    fn test_field_layout_widths() {
        assert_eq!(field_layout(1, 'D'), Some((8, true)));
        assert_eq!(field_layout(3, 'E'), Some((12, false)));
        assert_eq!(field_layout(20, 'A'), Some((20, false)));
        assert_eq!(field_layout(9, 'X'), Some((2, false)));
        assert_eq!(field_layout(3_000_000_000_000_000_000, 'D'), None);
    }

    #[test]
    fn test_oversized_repeat_count_is_a_format_error() {
        let time = [0.0, 1.0];
        let mut bytes = testing::bintable_file(&[], "RATE", &[("TIME", &time)]);
        testing::replace_string_card(&mut bytes, "TFORM1", "3000000000000000000D");

        let err = FitsFile::parse(&bytes).unwrap_err();
        assert!(matches!(err, EngineError::DataFormat(ref m) if m.contains("too wide")), "got: {err}");
    }

    #[test]
    fn test_column_widths_that_overflow_are_a_format_error() {
        let time = [0.0, 1.0];
        let mut bytes = testing::bintable_file(&[], "RATE", &[("TIME", &time), ("RATE", &time)]);
        testing::replace_string_card(&mut bytes, "TFORM1", "2000000000000000000D");
        testing::replace_string_card(&mut bytes, "TFORM2", "2000000000000000000D");

        let err = FitsFile::parse(&bytes).unwrap_err();
        assert!(matches!(err, EngineError::DataFormat(ref m) if m.contains("overflow")), "got: {err}");
    }
}
