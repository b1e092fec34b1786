//! Simulated position lifecycle.
//!
//! A [`BacktestTrade`] is opened `Open`, and [`BacktestTrade::close`] consumes
//! it to produce the `Closed` record. Venue-rejected attempts are recorded as
//! `Rejected` and never hold quantity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signal::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Signal,
    EndOfData,
}

/// One fill leg as applied to a trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitFill {
    pub time: DateTime<Utc>,
    pub price: f64,
    pub fee: f64,
    pub slippage: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub id: u64,
    pub symbol: String,
    pub strategy: String,
    pub side: Side,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Planned reward/risk at entry.
    pub risk_reward_ratio: f64,
    /// Entry plus exit fees.
    pub fees: f64,
    /// Adverse price impact in quote currency, entry plus exit.
    pub slippage: f64,
    pub status: TradeStatus,
    pub pnl: f64,
    pub pnl_percentage: f64,
    pub exit_reason: Option<ExitReason>,
    pub rejection_reason: Option<String>,
}

impl BacktestTrade {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: u64,
        symbol: &str,
        strategy: &str,
        side: Side,
        entry_time: DateTime<Utc>,
        entry_price: f64,
        quantity: f64,
        stop_loss: f64,
        take_profit: f64,
        entry_fee: f64,
        entry_slippage: f64,
    ) -> Self {
        let risk = (entry_price - stop_loss).abs();
        let reward = (take_profit - entry_price).abs();
        let risk_reward_ratio = if risk > 0.0 { reward / risk } else { 0.0 };
        BacktestTrade {
            id,
            symbol: symbol.to_string(),
            strategy: strategy.to_string(),
            side,
            entry_time,
            exit_time: None,
            entry_price,
            exit_price: None,
            quantity,
            stop_loss,
            take_profit,
            risk_reward_ratio,
            fees: entry_fee,
            slippage: entry_slippage,
            status: TradeStatus::Open,
            pnl: 0.0,
            pnl_percentage: 0.0,
            exit_reason: None,
            rejection_reason: None,
        }
    }

    /// Record an attempt the venue refused.
    pub fn rejected(
        id: u64,
        symbol: &str,
        strategy: &str,
        side: Side,
        time: DateTime<Utc>,
        reference_price: f64,
        reason: String,
    ) -> Self {
        BacktestTrade {
            id,
            symbol: symbol.to_string(),
            strategy: strategy.to_string(),
            side,
            entry_time: time,
            exit_time: None,
            entry_price: reference_price,
            exit_price: None,
            quantity: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            risk_reward_ratio: 0.0,
            fees: 0.0,
            slippage: 0.0,
            status: TradeStatus::Rejected,
            pnl: 0.0,
            pnl_percentage: 0.0,
            exit_reason: None,
            rejection_reason: Some(reason),
        }
    }

    pub fn is_long(&self) -> bool {
        self.side == Side::Buy
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.status == TradeStatus::Closed
    }

    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) * self.quantity
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        if self.stop_loss == 0.0 {
            return false;
        }
        if self.is_long() {
            price <= self.stop_loss
        } else {
            price >= self.stop_loss
        }
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        if self.take_profit == 0.0 {
            return false;
        }
        if self.is_long() {
            price >= self.take_profit
        } else {
            price <= self.take_profit
        }
    }

    /// Close the position. PnL is net of entry and exit fees.
    pub fn close(self, fill: ExitFill) -> BacktestTrade {
        let gross = self.unrealized_pnl(fill.price);
        let fees = self.fees + fill.fee;
        let pnl = gross - fees;
        let notional = self.notional();
        let pnl_percentage = if notional > 0.0 {
            pnl / notional * 100.0
        } else {
            0.0
        };
        BacktestTrade {
            exit_time: Some(fill.time),
            exit_price: Some(fill.price),
            fees,
            slippage: self.slippage + fill.slippage,
            status: TradeStatus::Closed,
            pnl,
            pnl_percentage,
            exit_reason: Some(fill.reason),
            ..self
        }
    }

    pub fn duration_hours(&self) -> f64 {
        match self.exit_time {
            Some(exit) => (exit - self.entry_time).num_seconds() as f64 / 3600.0,
            None => 0.0,
        }
    }
}
