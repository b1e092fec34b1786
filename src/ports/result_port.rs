//! Result hand-off port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::BacktestError;

/// Destination for finished results (file, store, message bus).
pub trait ResultSink {
    fn write(&self, result: &BacktestResult) -> Result<(), BacktestError>;
}
