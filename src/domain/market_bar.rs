//! OHLCV bar representation with provenance and content fingerprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Where a bar came from.
///
/// Only [`DataSource::Exchange`] and [`DataSource::Cache`] carry provenance the
/// validator accepts; everything else is flagged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum DataSource {
    Exchange(String),
    Cache(String),
    Synthetic,
    Unknown(String),
}

impl DataSource {
    /// Parse a provenance tag such as `exchange:binance` or `cache:binance`.
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim();
        let lower = tag.to_lowercase();
        if matches!(lower.as_str(), "synthetic" | "mock" | "generated" | "random") {
            return DataSource::Synthetic;
        }
        match lower.split_once(':') {
            Some(("exchange", name)) if !name.trim().is_empty() => {
                DataSource::Exchange(name.trim().to_string())
            }
            Some(("cache", name)) if !name.trim().is_empty() => {
                DataSource::Cache(name.trim().to_string())
            }
            _ => DataSource::Unknown(tag.to_string()),
        }
    }

    pub fn has_provenance(&self) -> bool {
        matches!(self, DataSource::Exchange(_) | DataSource::Cache(_))
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Exchange(name) => write!(f, "exchange:{}", name),
            DataSource::Cache(name) => write!(f, "cache:{}", name),
            DataSource::Synthetic => write!(f, "synthetic"),
            DataSource::Unknown(tag) => write!(f, "unknown:{}", tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub validated: bool,
    pub source: DataSource,
    /// Hex SHA-256 over the canonical bar content.
    pub integrity: String,
}

impl MarketBar {
    /// Build a bar and stamp its integrity fingerprint.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: &str,
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        validated: bool,
        source: DataSource,
    ) -> Self {
        let integrity =
            fingerprint(symbol, timestamp, open, high, low, close, volume, &source);
        MarketBar {
            symbol: symbol.to_string(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            validated,
            source,
            integrity,
        }
    }

    /// Recompute the fingerprint from the current content.
    pub fn compute_integrity(&self) -> String {
        fingerprint(
            &self.symbol,
            self.timestamp,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            &self.source,
        )
    }

    pub fn integrity_matches(&self) -> bool {
        self.integrity == self.compute_integrity()
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

#[allow(clippy::too_many_arguments)]
fn fingerprint(
    symbol: &str,
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    source: &DataSource,
) -> String {
    let canonical = format!(
        "{}|{}|{}|{}|{}|{}|{}|{}",
        symbol,
        timestamp.timestamp(),
        open,
        high,
        low,
        close,
        volume,
        source
    );
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
