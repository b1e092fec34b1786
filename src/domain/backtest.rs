//! Backtest configuration and result types.
//!
//! [`BacktestConfig`] is the immutable input to one run; [`BacktestResult`] is
//! produced once when the run finalizes and is never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::RiskRejection;
use super::ledger::PortfolioSnapshot;
use super::metrics::PerformanceReport;
use super::signal::TradingSignal;
use super::trade::BacktestTrade;
use super::validation::ValidationReport;

pub const RESULT_SCHEMA_VERSION: u32 = 1;

pub const MINUTES_PER_YEAR: f64 = 525_960.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Crosses the spread; pays the taker fee.
    Market,
    /// Rests on the book; pays the maker fee.
    Limit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker: f64,
    pub taker: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule {
            maker: 0.001,
            taker: 0.002,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskManagementConfig {
    pub max_risk_per_trade: f64,
    pub stop_loss_percentage: f64,
    pub min_risk_reward_ratio: f64,
    pub max_drawdown: f64,
    pub max_correlation: f64,
    pub min_quantity: f64,
}

impl Default for RiskManagementConfig {
    fn default() -> Self {
        RiskManagementConfig {
            max_risk_per_trade: 0.02,
            stop_loss_percentage: 0.02,
            min_risk_reward_ratio: 1.5,
            max_drawdown: 0.2,
            max_correlation: 0.7,
            min_quantity: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub symbol: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub initial_balance: f64,
    pub strategies: Vec<String>,
    pub slippage: f64,
    pub fees: FeeSchedule,
    pub order_type: OrderType,
    pub risk_management: RiskManagementConfig,
    pub rejection_probability: f64,
    /// Annual rate.
    pub risk_free_rate: f64,
    pub bar_interval_minutes: i64,
    pub allow_shorting: bool,
    /// Fraction of balance committed at full signal strength.
    pub position_size: f64,
    pub max_gap_fraction: f64,
    pub seed: Option<u64>,
}

impl BacktestConfig {
    pub fn new(
        symbol: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        initial_balance: f64,
    ) -> Self {
        BacktestConfig {
            symbol: symbol.to_string(),
            start_date,
            end_date,
            initial_balance,
            strategies: Vec::new(),
            slippage: 0.001,
            fees: FeeSchedule::default(),
            order_type: OrderType::Market,
            risk_management: RiskManagementConfig::default(),
            rejection_probability: 0.02,
            risk_free_rate: 0.0,
            bar_interval_minutes: 60,
            allow_shorting: true,
            position_size: 0.25,
            max_gap_fraction: 0.1,
            seed: None,
        }
    }

    /// Seed for the run's random stream.
    ///
    /// An explicit `seed` wins; otherwise the seed is derived from the run
    /// identity so the same config always replays the same way.
    pub fn seed(&self) -> u64 {
        if let Some(seed) = self.seed {
            return seed;
        }
        let identity = format!(
            "{}|{}|{}|{}|{}",
            self.symbol,
            self.start_date.timestamp(),
            self.end_date.timestamp(),
            self.initial_balance,
            self.strategies.join(",")
        );
        let digest = Sha256::digest(identity.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes)
    }

    pub fn periods_per_year(&self) -> f64 {
        if self.bar_interval_minutes > 0 {
            MINUTES_PER_YEAR / self.bar_interval_minutes as f64
        } else {
            0.0
        }
    }
}

/// A signal refused by the risk manager, kept for the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRejection {
    pub strategy: String,
    pub signal: TradingSignal,
    pub reason: RiskRejection,
}

/// Non-fatal counters for one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionDetails {
    pub seed: u64,
    pub bars_processed: usize,
    pub signals_received: usize,
    /// Signals with nothing to act on (e.g. a sell with shorting disabled).
    pub signals_ignored: usize,
    pub strategy_exits: usize,
    pub risk_rejections: usize,
    pub risk_adjustments: usize,
    pub execution_rejections: usize,
    pub trades_opened: usize,
    pub trades_closed: usize,
}

impl ExecutionDetails {
    /// Fraction of signals sent to the venue that failed to fill.
    pub fn execution_rejection_rate(&self) -> f64 {
        let attempted = self.trades_opened + self.execution_rejections;
        if attempted == 0 {
            0.0
        } else {
            self.execution_rejections as f64 / attempted as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub schema_version: u32,
    pub config: BacktestConfig,
    /// Closed trades and venue-rejected attempts, in the order they occurred.
    pub trades: Vec<BacktestTrade>,
    pub risk_rejections: Vec<SignalRejection>,
    pub portfolio: Vec<PortfolioSnapshot>,
    pub performance: PerformanceReport,
    pub validation: ValidationReport,
    pub execution_details: ExecutionDetails,
}

impl BacktestResult {
    pub fn closed_trades(&self) -> impl Iterator<Item = &BacktestTrade> {
        self.trades.iter().filter(|t| t.is_closed())
    }

    pub fn final_equity(&self) -> f64 {
        self.portfolio
            .last()
            .map(|s| s.equity)
            .unwrap_or(self.config.initial_balance)
    }
}
