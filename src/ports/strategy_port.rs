//! Strategy port: the signal-generation collaborator.

use crate::domain::market_bar::MarketBar;
use crate::domain::signal::TradingSignal;

pub trait Strategy {
    /// Identifier referenced by `BacktestConfig::strategies`.
    fn id(&self) -> &str;

    /// Signals observable at the last bar of `window`.
    ///
    /// `window` holds every accepted bar up to and including the current one;
    /// nothing later is ever visible.
    fn generate_signals(&mut self, window: &[MarketBar]) -> Vec<TradingSignal>;

    /// Clear internal state before a run.
    fn reset(&mut self) {}
}
