//! CSV file data adapter.
//!
//! One file per symbol, `<SYMBOL>.csv`, with a header row and the columns
//! `timestamp,open,high,low,close,volume`. Rows are returned in file order;
//! ordering problems are left for the validator to report.

use crate::domain::error::BacktestError;
use crate::domain::market_bar::{DataSource, MarketBar};
use crate::ports::data_port::DataPort;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` (midnight UTC) and
/// integer unix seconds.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

pub struct CsvAdapter {
    base_path: PathBuf,
    source: DataSource,
}

impl CsvAdapter {
    /// Bars read from `base_path` are tagged with `source`.
    pub fn new(base_path: PathBuf, source: DataSource) -> Self {
        Self { base_path, source }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    fn unavailable(symbol: &str, reason: String) -> BacktestError {
        BacktestError::DataUnavailable {
            symbol: symbol.to_string(),
            reason,
        }
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketBar>, BacktestError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| {
            Self::unavailable(symbol, format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record = result
                .map_err(|e| Self::unavailable(symbol, format!("CSV parse error: {}", e)))?;

            let timestamp = record
                .get(0)
                .and_then(parse_timestamp)
                .ok_or_else(|| {
                    Self::unavailable(symbol, format!("row {}: invalid timestamp", row + 1))
                })?;
            if timestamp < start || timestamp >= end {
                continue;
            }

            let field = |idx: usize| record.get(idx).and_then(|v| v.parse::<f64>().ok());
            let parsed = [field(1), field(2), field(3), field(4), field(5)];
            let complete = parsed.iter().all(Option::is_some);
            let [open, high, low, close, volume] = parsed.map(|v| v.unwrap_or(f64::NAN));
            if !complete {
                debug!(symbol, row = row + 1, "incomplete row kept unvalidated");
            }

            bars.push(MarketBar::new(
                symbol,
                timestamp,
                open,
                high,
                low,
                close,
                volume,
                complete,
                self.source.clone(),
            ));
        }

        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, BacktestError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            Self::unavailable(
                "*",
                format!("failed to read directory {}: {}", self.base_path.display(), e),
            )
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| Self::unavailable("*", format!("directory entry error: {}", e)))?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
