//! Portfolio ledger: balance, open positions and running drawdown.
//!
//! The ledger is append-only. Each call to [`Ledger::mark_to_market`] folds
//! one step into the [`DrawdownState`] and appends a [`PortfolioSnapshot`];
//! earlier snapshots are never revisited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::BacktestError;
use super::trade::{BacktestTrade, ExitFill};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub balance: f64,
    pub equity: f64,
    pub positions: Vec<BacktestTrade>,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub drawdown: f64,
    pub drawdown_percentage: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percentage: f64,
}

/// Running peak and worst drawdown seen so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownState {
    pub peak_equity: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percentage: f64,
}

/// Drawdown figures for a single step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownStep {
    pub drawdown: f64,
    pub drawdown_percentage: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percentage: f64,
}

impl DrawdownState {
    pub fn new(initial_equity: f64) -> Self {
        DrawdownState {
            peak_equity: initial_equity,
            max_drawdown: 0.0,
            max_drawdown_percentage: 0.0,
        }
    }

    /// Fold one equity observation into the state.
    pub fn step(self, equity: f64) -> (DrawdownState, DrawdownStep) {
        let peak_equity = self.peak_equity.max(equity);
        let drawdown = (peak_equity - equity).max(0.0);
        let drawdown_percentage = if peak_equity > 0.0 {
            drawdown / peak_equity * 100.0
        } else {
            0.0
        };
        let next = DrawdownState {
            peak_equity,
            max_drawdown: self.max_drawdown.max(drawdown),
            max_drawdown_percentage: self.max_drawdown_percentage.max(drawdown_percentage),
        };
        (
            next,
            DrawdownStep {
                drawdown,
                drawdown_percentage,
                max_drawdown: next.max_drawdown,
                max_drawdown_percentage: next.max_drawdown_percentage,
            },
        )
    }
}

/// Replay an equity path from `initial_equity`, one step per point.
pub fn drawdown_path(initial_equity: f64, equity: &[f64]) -> Vec<DrawdownStep> {
    equity
        .iter()
        .scan(DrawdownState::new(initial_equity), |state, &e| {
            let (next, step) = state.step(e);
            *state = next;
            Some(step)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Ledger {
    initial_balance: f64,
    balance: f64,
    realized_pnl: f64,
    open: Vec<BacktestTrade>,
    drawdown: DrawdownState,
    last_drawdown_percentage: f64,
    history: Vec<PortfolioSnapshot>,
}

impl Ledger {
    pub fn new(initial_balance: f64) -> Self {
        Ledger {
            initial_balance,
            balance: initial_balance,
            realized_pnl: 0.0,
            open: Vec::new(),
            drawdown: DrawdownState::new(initial_balance),
            last_drawdown_percentage: 0.0,
            history: Vec::new(),
        }
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    /// Equity as of the last snapshot.
    pub fn equity(&self) -> f64 {
        self.history
            .last()
            .map(|s| s.equity)
            .unwrap_or(self.initial_balance)
    }

    /// Drawdown percentage as of the last snapshot.
    pub fn drawdown_percentage(&self) -> f64 {
        self.last_drawdown_percentage
    }

    pub fn open_positions(&self) -> &[BacktestTrade] {
        &self.open
    }

    pub fn position_for(&self, symbol: &str) -> Option<&BacktestTrade> {
        self.open.iter().find(|t| t.symbol == symbol)
    }

    pub fn history(&self) -> &[PortfolioSnapshot] {
        &self.history
    }

    pub fn into_history(self) -> Vec<PortfolioSnapshot> {
        self.history
    }

    /// Book a freshly filled position. The entry fee leaves the balance now.
    pub fn open_position(&mut self, trade: BacktestTrade) {
        self.balance -= trade.fees;
        self.open.push(trade);
    }

    /// Close the open position `id` with `fill`, returning the closed record.
    pub fn close_position(&mut self, id: u64, fill: ExitFill) -> Option<BacktestTrade> {
        let idx = self.open.iter().position(|t| t.id == id)?;
        let trade = self.open.remove(idx);
        let gross = trade.unrealized_pnl(fill.price);
        let closed = trade.close(fill);
        self.balance += gross - fill.fee;
        self.realized_pnl += closed.pnl;
        Some(closed)
    }

    /// Value open positions at `marks` (symbol to price) and append a
    /// snapshot. Positions without a mark are carried at entry.
    pub fn mark_to_market(
        &mut self,
        timestamp: DateTime<Utc>,
        marks: &HashMap<String, f64>,
    ) -> Result<&PortfolioSnapshot, BacktestError> {
        if let Some(prev) = self.history.last() {
            if timestamp <= prev.timestamp {
                return Err(BacktestError::OutOfOrder {
                    previous: prev.timestamp,
                    next: timestamp,
                });
            }
        }

        let unrealized_pnl: f64 = self
            .open
            .iter()
            .map(|t| {
                marks
                    .get(&t.symbol)
                    .map(|&p| t.unrealized_pnl(p))
                    .unwrap_or(0.0)
            })
            .sum();
        let equity = self.balance + unrealized_pnl;
        let (state, step) = self.drawdown.step(equity);
        self.drawdown = state;
        self.last_drawdown_percentage = step.drawdown_percentage;

        self.history.push(PortfolioSnapshot {
            timestamp,
            balance: self.balance,
            equity,
            positions: self.open.clone(),
            unrealized_pnl,
            realized_pnl: self.realized_pnl,
            drawdown: step.drawdown,
            drawdown_percentage: step.drawdown_percentage,
            max_drawdown: step.max_drawdown,
            max_drawdown_percentage: step.max_drawdown_percentage,
        });
        Ok(&self.history[self.history.len() - 1])
    }
}
