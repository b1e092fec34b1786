//! Historical market data port.

use crate::domain::error::BacktestError;
use crate::domain::market_bar::MarketBar;
use chrono::{DateTime, Utc};

pub trait DataPort {
    /// Bars for `symbol` with `start <= timestamp < end`, oldest first.
    ///
    /// Source failures are reported as [`BacktestError::DataUnavailable`].
    fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketBar>, BacktestError>;

    fn list_symbols(&self) -> Result<Vec<String>, BacktestError>;
}
