#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use sigbench::domain::backtest::BacktestConfig;
use sigbench::domain::engine::CancelHandle;
use sigbench::domain::error::BacktestError;
pub use sigbench::domain::market_bar::{DataSource, MarketBar};
use sigbench::domain::signal::{Side, TradingSignal};
use sigbench::ports::data_port::DataPort;
use sigbench::ports::strategy_port::Strategy;
use std::collections::HashMap;

pub const SYMBOL: &str = "BTCUSDT";

pub struct MockDataPort {
    pub data: HashMap<String, Vec<MarketBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<MarketBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketBar>, BacktestError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(BacktestError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= start && b.timestamp < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, BacktestError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn hour(h: i64) -> DateTime<Utc> {
    t0() + Duration::hours(h)
}

pub fn make_bar(symbol: &str, h: i64, open: f64, close: f64) -> MarketBar {
    let high = open.max(close) * 1.002;
    let low = open.min(close) * 0.998;
    MarketBar::new(
        symbol,
        hour(h),
        open,
        high,
        low,
        close,
        12.5,
        true,
        DataSource::Exchange("binance".into()),
    )
}

/// Hourly bars following `closes`, each opening at the previous close.
pub fn bars_from_closes(symbol: &str, closes: &[f64]) -> Vec<MarketBar> {
    let mut prev = closes.first().copied().unwrap_or(50_000.0);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let bar = make_bar(symbol, i as i64, prev, close);
            prev = close;
            bar
        })
        .collect()
}

/// Deterministic oscillating series around 50 000.
pub fn sine_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            50_000.0 + 1_500.0 * (x / 8.0).sin() + 200.0 * (x * 1.7).cos()
        })
        .collect()
}

pub fn sine_bars(n: usize) -> Vec<MarketBar> {
    bars_from_closes(SYMBOL, &sine_closes(n))
}

pub fn flat_bars(n: usize, price: f64) -> Vec<MarketBar> {
    bars_from_closes(SYMBOL, &vec![price; n])
}

pub fn make_config(bars: usize, strategies: &[&str]) -> BacktestConfig {
    BacktestConfig {
        strategies: strategies.iter().map(|s| s.to_string()).collect(),
        seed: Some(7),
        ..BacktestConfig::new(SYMBOL, t0(), hour(bars as i64), 10_000.0)
    }
}

/// Emits a fixed signal at selected bar indices.
pub struct ScriptedStrategy {
    pub id: String,
    pub script: HashMap<usize, (Side, f64)>,
}

impl ScriptedStrategy {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            script: HashMap::new(),
        }
    }

    pub fn at(mut self, bar: usize, side: Side, risk_reward: f64) -> Self {
        self.script.insert(bar, (side, risk_reward));
        self
    }
}

impl Strategy for ScriptedStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn generate_signals(&mut self, window: &[MarketBar]) -> Vec<TradingSignal> {
        let i = window.len() - 1;
        match (self.script.get(&i), window.last()) {
            (Some(&(side, rr)), Some(bar)) => {
                vec![TradingSignal::new(&bar.symbol, side, rr, bar.timestamp)]
            }
            _ => Vec::new(),
        }
    }
}

/// Alternates buy and sell every `every` bars.
pub struct Alternating {
    pub every: usize,
    pub risk_reward: f64,
}

impl Strategy for Alternating {
    fn id(&self) -> &str {
        "alternating"
    }

    fn generate_signals(&mut self, window: &[MarketBar]) -> Vec<TradingSignal> {
        let i = window.len() - 1;
        if i == 0 || i % self.every != 0 {
            return Vec::new();
        }
        let side = if (i / self.every) % 2 == 1 {
            Side::Buy
        } else {
            Side::Sell
        };
        let bar = &window[i];
        vec![TradingSignal::new(&bar.symbol, side, self.risk_reward, bar.timestamp)]
    }
}

/// Trips a cancel flag once it has seen `at` bars.
pub struct CancelAt {
    pub handle: CancelHandle,
    pub at: usize,
}

impl Strategy for CancelAt {
    fn id(&self) -> &str {
        "cancel_at"
    }

    fn generate_signals(&mut self, window: &[MarketBar]) -> Vec<TradingSignal> {
        if window.len() > self.at {
            self.handle.cancel();
        }
        Vec::new()
    }
}
