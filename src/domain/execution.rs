//! Fill simulation: slippage, maker/taker fees and venue rejection.
//!
//! All randomness comes from the simulator's own seeded generator; two
//! simulators built from the same seed make identical decisions.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::backtest::{BacktestConfig, OrderType};
use super::error::ExecutionRejection;
use super::signal::Side;

/// Upper bound on the per-order rejection probability.
pub const MAX_REJECTION_PROBABILITY: f64 = 0.10;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub slippage: f64,
    pub maker_fee: f64,
    pub taker_fee: f64,
    pub order_type: OrderType,
    pub rejection_probability: f64,
}

impl ExecutionConfig {
    pub fn from_backtest(config: &BacktestConfig) -> Self {
        ExecutionConfig {
            slippage: config.slippage,
            maker_fee: config.fees.maker,
            taker_fee: config.fees.taker,
            order_type: config.order_type,
            rejection_probability: config.rejection_probability,
        }
    }

    pub fn fee_rate(&self, order_type: OrderType) -> f64 {
        match order_type {
            OrderType::Market => self.taker_fee,
            OrderType::Limit => self.maker_fee,
        }
    }
}

/// Move `reference` against the trader: buys fill higher, sells lower.
pub fn apply_slippage(reference: f64, side: Side, slippage: f64) -> f64 {
    reference + side.sign() * reference * slippage
}

/// fee = fill_price * quantity * rate
pub fn calculate_fee(fill_price: f64, quantity: f64, fee_rate: f64) -> f64 {
    fill_price * quantity * fee_rate
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub side: Side,
    pub reference_price: f64,
    pub price: f64,
    pub quantity: f64,
    pub fee: f64,
    /// |price - reference| * quantity
    pub slippage_cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Filled(Fill),
    Rejected(ExecutionRejection),
}

pub struct ExecutionSimulator {
    config: ExecutionConfig,
    rng: StdRng,
}

impl ExecutionSimulator {
    pub fn new(config: ExecutionConfig, seed: u64) -> Self {
        ExecutionSimulator {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Attempt an entry order. One draw from the run's generator decides
    /// whether the venue refuses it.
    pub fn execute_entry(
        &mut self,
        symbol: &str,
        side: Side,
        reference_price: f64,
        quantity: f64,
        timestamp: DateTime<Utc>,
    ) -> ExecutionOutcome {
        let p = self
            .config
            .rejection_probability
            .clamp(0.0, MAX_REJECTION_PROBABILITY);
        let draw: f64 = self.rng.gen_range(0.0..1.0);
        if draw < p {
            return ExecutionOutcome::Rejected(ExecutionRejection {
                symbol: symbol.to_string(),
                timestamp,
                reason: format!("venue refused {} order (draw {:.4} < {:.4})", side, draw, p),
            });
        }
        ExecutionOutcome::Filled(self.fill(side, reference_price, quantity, self.config.order_type))
    }

    /// Exits are always filled as market orders; protective exits are not
    /// subject to venue rejection.
    pub fn execute_exit(&self, position_side: Side, reference_price: f64, quantity: f64) -> Fill {
        self.fill(position_side.opposite(), reference_price, quantity, OrderType::Market)
    }

    fn fill(&self, side: Side, reference_price: f64, quantity: f64, order_type: OrderType) -> Fill {
        let price = apply_slippage(reference_price, side, self.config.slippage);
        let fee = calculate_fee(price, quantity, self.config.fee_rate(order_type));
        Fill {
            side,
            reference_price,
            price,
            quantity,
            fee,
            slippage_cost: (price - reference_price).abs() * quantity,
        }
    }
}
