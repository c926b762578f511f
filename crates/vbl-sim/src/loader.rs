//! CSV bar loader (deterministic).
//!
//! CSV format
//!
//! Required columns:
//! - `ts` (RFC 3339 instant)
//! - `open`, `high`, `low`, `close` (decimal)
//! - `volume` (decimal)
//!
//! Optional columns:
//! - `dividend` (decimal per share; blank or absent = none)
//!
//! Blank lines and `#` comments are skipped; a UTF-8 BOM on the header is
//! tolerated. Rows are sorted by timestamp after parsing.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use vbl_ports::HistoricalBar;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    EmptyInput,
    MissingHeader(&'static str),
    ParseDecimal { column: String, value: String, line: usize },
    ParseTimestamp { value: String, line: usize },
    BadRow { line: usize, reason: String },
    Io(String),
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e.to_string())
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::EmptyInput => write!(f, "empty input"),
            LoadError::MissingHeader(h) => write!(f, "missing header: {h}"),
            LoadError::ParseDecimal { column, value, line } => {
                write!(f, "bad decimal in column {column} at line {line}: {value:?}")
            }
            LoadError::ParseTimestamp { value, line } => {
                write!(f, "bad timestamp at line {line}: {value:?}")
            }
            LoadError::BadRow { line, reason } => write!(f, "bad row at line {line}: {reason}"),
            LoadError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Load bars from a CSV file on disk.
pub fn load_csv_file(path: impl AsRef<Path>) -> Result<Vec<HistoricalBar>, LoadError> {
    let s = fs::read_to_string(path)?;
    parse_csv_bars(&s)
}

/// Parse bars from CSV content (pure).
pub fn parse_csv_bars(csv: &str) -> Result<Vec<HistoricalBar>, LoadError> {
    let mut lines = csv.lines();

    let header_line = lines.next().ok_or(LoadError::EmptyInput)?;
    let header_line = header_line.trim().trim_start_matches('\u{feff}');
    if header_line.is_empty() {
        return Err(LoadError::EmptyInput);
    }

    let mut idx: BTreeMap<String, usize> = BTreeMap::new();
    for (i, h) in header_line.split(',').enumerate() {
        idx.insert(h.trim().to_string(), i);
    }

    let col_ts = find_required(&idx, "ts")?;
    let col_open = find_required(&idx, "open")?;
    let col_high = find_required(&idx, "high")?;
    let col_low = find_required(&idx, "low")?;
    let col_close = find_required(&idx, "close")?;
    let col_volume = find_required(&idx, "volume")?;
    let col_dividend = idx.get("dividend").copied();

    let mut out: Vec<HistoricalBar> = Vec::new();

    for (line_idx0, raw) in lines.enumerate() {
        let line_no = line_idx0 + 2; // 1-based, header is line 1

        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = raw.split(',').map(|s| s.trim()).collect();
        let get = |col: usize| -> Result<&str, LoadError> {
            fields.get(col).copied().ok_or(LoadError::BadRow {
                line: line_no,
                reason: format!("expected at least {} fields, got {}", col + 1, fields.len()),
            })
        };

        let ts_raw = get(col_ts)?;
        let timestamp = DateTime::parse_from_rfc3339(ts_raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| LoadError::ParseTimestamp {
                value: ts_raw.to_string(),
                line: line_no,
            })?;

        let parse_dec = |column: &str, value: &str| -> Result<Decimal, LoadError> {
            Decimal::from_str(value).map_err(|_| LoadError::ParseDecimal {
                column: column.to_string(),
                value: value.to_string(),
                line: line_no,
            })
        };

        let dividend = match col_dividend {
            Some(col) => match fields.get(col).copied().unwrap_or("") {
                "" => None,
                v => Some(parse_dec("dividend", v)?),
            },
            None => None,
        };

        out.push(HistoricalBar {
            timestamp,
            open: parse_dec("open", get(col_open)?)?,
            high: parse_dec("high", get(col_high)?)?,
            low: parse_dec("low", get(col_low)?)?,
            close: parse_dec("close", get(col_close)?)?,
            volume: parse_dec("volume", get(col_volume)?)?,
            dividend,
        });
    }

    out.sort_by_key(|b| b.timestamp);
    Ok(out)
}

fn find_required(idx: &BTreeMap<String, usize>, name: &'static str) -> Result<usize, LoadError> {
    idx.get(name).copied().ok_or(LoadError::MissingHeader(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const CSV: &str = "\
ts,open,high,low,close,volume,dividend
2024-01-02T15:00:00Z,100,101,99,100.5,1200,
# midday comment
2024-01-02T16:00:00Z,100.5,102,100,101.75,900,0.25
";

    #[test]
    fn parses_rows_with_optional_dividend() {
        let bars = parse_csv_bars(CSV).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, dec!(100.5));
        assert_eq!(bars[0].dividend, None);
        assert_eq!(bars[1].dividend, Some(dec!(0.25)));
    }

    #[test]
    fn sorts_rows_by_timestamp() {
        let shuffled = "\
ts,open,high,low,close,volume
2024-01-02T16:00:00Z,1,1,1,2,0
2024-01-02T15:00:00Z,1,1,1,1,0
";
        let bars = parse_csv_bars(shuffled).unwrap();
        assert_eq!(bars[0].close, dec!(1));
        assert_eq!(bars[1].close, dec!(2));
    }

    #[test]
    fn missing_header_is_reported() {
        let err = parse_csv_bars("ts,open,high,low,volume\n").unwrap_err();
        assert_eq!(err, LoadError::MissingHeader("close"));
    }

    #[test]
    fn bad_decimal_points_at_line_and_column() {
        let bad = "\
ts,open,high,low,close,volume
2024-01-02T15:00:00Z,100,101,99,abc,0
";
        match parse_csv_bars(bad).unwrap_err() {
            LoadError::ParseDecimal { column, line, .. } => {
                assert_eq!(column, "close");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(parse_csv_bars(""), Err(LoadError::EmptyInput));
    }
}
