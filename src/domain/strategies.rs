//! Built-in signal generators and their construction from config.
//!
//! Each strategy only sees the window handed to it, so a signal at bar `i`
//! depends on bars `0..=i` alone.

use crate::domain::error::BacktestError;
use crate::domain::market_bar::MarketBar;
use crate::domain::signal::{Side, TradingSignal};
use crate::ports::config_port::ConfigPort;
use crate::ports::strategy_port::Strategy;

pub const DEFAULT_RISK_REWARD: f64 = 2.0;

/// Mean close of the `period` bars ending at `end` (inclusive).
pub fn sma(bars: &[MarketBar], period: usize, end: usize) -> Option<f64> {
    if period == 0 || end >= bars.len() || end + 1 < period {
        return None;
    }
    let sum: f64 = bars[end + 1 - period..=end].iter().map(|b| b.close).sum();
    Some(sum / period as f64)
}

fn signal_at(window: &[MarketBar], side: Side, risk_reward: f64) -> Option<TradingSignal> {
    window
        .last()
        .map(|bar| TradingSignal::new(&bar.symbol, side, risk_reward, bar.timestamp))
}

/// Golden cross buys, death cross sells.
#[derive(Debug, Clone)]
pub struct SmaCrossover {
    fast: usize,
    slow: usize,
    risk_reward: f64,
}

impl SmaCrossover {
    pub fn new(fast: usize, slow: usize, risk_reward: f64) -> Result<Self, BacktestError> {
        if fast == 0 {
            return Err(BacktestError::config(
                "strategy.sma_crossover.fast_period",
                "fast_period must be at least 1",
            ));
        }
        if fast >= slow {
            return Err(BacktestError::config(
                "strategy.sma_crossover.fast_period",
                format!("fast_period ({}) must be less than slow_period ({})", fast, slow),
            ));
        }
        check_risk_reward("strategy.sma_crossover.risk_reward", risk_reward)?;
        Ok(SmaCrossover {
            fast,
            slow,
            risk_reward,
        })
    }
}

impl Strategy for SmaCrossover {
    fn id(&self) -> &str {
        "sma_crossover"
    }

    fn generate_signals(&mut self, window: &[MarketBar]) -> Vec<TradingSignal> {
        let n = window.len();
        if n < self.slow + 1 {
            return Vec::new();
        }
        let cur = n - 1;
        let prev = n - 2;
        let (Some(fast_cur), Some(slow_cur), Some(fast_prev), Some(slow_prev)) = (
            sma(window, self.fast, cur),
            sma(window, self.slow, cur),
            sma(window, self.fast, prev),
            sma(window, self.slow, prev),
        ) else {
            return Vec::new();
        };

        let side = if fast_cur > slow_cur && fast_prev <= slow_prev {
            Side::Buy
        } else if fast_cur < slow_cur && fast_prev >= slow_prev {
            Side::Sell
        } else {
            return Vec::new();
        };
        signal_at(window, side, self.risk_reward).into_iter().collect()
    }
}

/// Close beyond the prior `lookback`-bar high or low.
#[derive(Debug, Clone)]
pub struct Breakout {
    lookback: usize,
    risk_reward: f64,
}

impl Breakout {
    pub fn new(lookback: usize, risk_reward: f64) -> Result<Self, BacktestError> {
        if lookback == 0 {
            return Err(BacktestError::config(
                "strategy.breakout.lookback",
                "lookback must be at least 1",
            ));
        }
        check_risk_reward("strategy.breakout.risk_reward", risk_reward)?;
        Ok(Breakout {
            lookback,
            risk_reward,
        })
    }
}

impl Strategy for Breakout {
    fn id(&self) -> &str {
        "breakout"
    }

    fn generate_signals(&mut self, window: &[MarketBar]) -> Vec<TradingSignal> {
        let n = window.len();
        if n < self.lookback + 1 {
            return Vec::new();
        }
        let prior = &window[n - 1 - self.lookback..n - 1];
        let high = prior.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = prior.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let close = window[n - 1].close;

        let side = if close > high {
            Side::Buy
        } else if close < low {
            Side::Sell
        } else {
            return Vec::new();
        };
        signal_at(window, side, self.risk_reward).into_iter().collect()
    }
}

fn check_risk_reward(key: &str, value: f64) -> Result<(), BacktestError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(BacktestError::config(key, "risk_reward must be positive"));
    }
    Ok(())
}

fn period(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<usize, BacktestError> {
    let value = config.get_int(section, key, default);
    usize::try_from(value).map_err(|_| {
        BacktestError::config(&format!("{}.{}", section, key), "must be non-negative")
    })
}

/// Construct the built-in strategy `id`, reading parameters from
/// `[strategy.<id>]`.
pub fn build_strategy(
    id: &str,
    config: &dyn ConfigPort,
) -> Result<Box<dyn Strategy + Send>, BacktestError> {
    let section = format!("strategy.{}", id);
    let risk_reward = config.get_double(&section, "risk_reward", DEFAULT_RISK_REWARD);
    match id {
        "sma_crossover" => {
            let fast = period(config, &section, "fast_period", 10)?;
            let slow = period(config, &section, "slow_period", 30)?;
            Ok(Box::new(SmaCrossover::new(fast, slow, risk_reward)?))
        }
        "breakout" => {
            let lookback = period(config, &section, "lookback", 20)?;
            Ok(Box::new(Breakout::new(lookback, risk_reward)?))
        }
        other => Err(BacktestError::config(
            "backtest.strategies",
            format!("unknown strategy '{}'", other),
        )),
    }
}

pub fn build_strategies(
    ids: &[String],
    config: &dyn ConfigPort,
) -> Result<Vec<Box<dyn Strategy + Send>>, BacktestError> {
    ids.iter().map(|id| build_strategy(id, config)).collect()
}
