//! Historical data fetcher: source retrieval plus integrity validation.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::error::BacktestError;
use super::market_bar::MarketBar;
use super::validation::{DataValidator, ValidationReport};
use crate::ports::data_port::DataPort;

/// Validation report together with the accepted bars.
#[derive(Debug, Clone)]
pub struct FetchedData {
    pub report: ValidationReport,
    pub bars: Vec<MarketBar>,
}

pub struct HistoricalDataFetcher<'a> {
    source: &'a dyn DataPort,
    validator: DataValidator,
}

impl<'a> HistoricalDataFetcher<'a> {
    pub fn new(source: &'a dyn DataPort, validator: DataValidator) -> Self {
        Self { source, validator }
    }

    /// Retrieve bars from the source. Source failure is fatal and never
    /// replaced with partial or fabricated data.
    pub fn fetch_raw(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketBar>, BacktestError> {
        let bars = self.source.fetch_bars(symbol, start, end).map_err(|e| match e {
            err @ BacktestError::DataUnavailable { .. } => err,
            other => BacktestError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: other.to_string(),
            },
        })?;
        info!(symbol, bars = bars.len(), "fetched bars");
        Ok(bars)
    }

    /// Classify `bars` and keep the ones that passed every per-bar check.
    pub fn validate(&self, symbol: &str, bars: &[MarketBar]) -> FetchedData {
        let (report, accepted) = self.validator.validate_and_filter(bars);
        for w in &report.warnings {
            warn!(symbol, "{}", w);
        }
        info!(
            symbol,
            total = report.total_points,
            valid = report.valid_points,
            score = report.integrity_score,
            valid_series = report.is_valid,
            "validated bars"
        );
        FetchedData {
            report,
            bars: accepted,
        }
    }

    pub fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<FetchedData, BacktestError> {
        let raw = self.fetch_raw(symbol, start, end)?;
        Ok(self.validate(symbol, &raw))
    }
}
