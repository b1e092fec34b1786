//! Pre-trade risk checks and position sizing.
//!
//! [`RiskManager::evaluate`] is a pure function of the signal, the reference
//! price, the ledger state handed in through [`RiskContext`] and the config.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::backtest::{BacktestConfig, RiskManagementConfig};
use super::error::RiskRejection;
use super::signal::{Side, TradingSignal};
use super::trade::BacktestTrade;

/// Pairwise correlation estimate between two symbols in [-1, 1].
pub trait CorrelationProvider {
    fn correlation(&self, a: &str, b: &str) -> f64;
}

/// Treats a symbol as perfectly correlated with itself and independent of
/// everything else. Substitute a price-history estimator for multi-asset runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolIdentityCorrelation;

impl CorrelationProvider for SymbolIdentityCorrelation {
    fn correlation(&self, a: &str, b: &str) -> f64 {
        if a == b { 1.0 } else { 0.0 }
    }
}

/// Ledger state visible to the risk manager at decision time.
#[derive(Debug, Clone, Copy)]
pub struct RiskContext<'a> {
    pub balance: f64,
    pub drawdown_percentage: f64,
    pub open_positions: &'a [BacktestTrade],
}

/// Sized trade with protective levels expressed as distances from entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub side: Side,
    pub reference_price: f64,
    pub quantity: f64,
    pub stop_distance: f64,
    pub target_distance: f64,
    /// Loss at the stop, `stop_distance * quantity`.
    pub risk_amount: f64,
    pub risk_reward_ratio: f64,
}

impl TradePlan {
    pub fn stop_loss(&self, entry_price: f64) -> f64 {
        entry_price - self.side.sign() * self.stop_distance
    }

    pub fn take_profit(&self, entry_price: f64) -> f64 {
        entry_price + self.side.sign() * self.target_distance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Accept(TradePlan),
    /// Size reduced to fit the per-trade risk budget.
    Adjust {
        plan: TradePlan,
        requested_quantity: f64,
    },
    Reject(RiskRejection),
}

pub struct RiskManager {
    config: RiskManagementConfig,
    initial_balance: f64,
    position_size: f64,
    correlation: Arc<dyn CorrelationProvider + Send + Sync>,
}

impl RiskManager {
    pub fn new(config: RiskManagementConfig, initial_balance: f64, position_size: f64) -> Self {
        RiskManager {
            config,
            initial_balance,
            position_size,
            correlation: Arc::new(SymbolIdentityCorrelation),
        }
    }

    pub fn from_backtest(config: &BacktestConfig) -> Self {
        Self::new(
            config.risk_management.clone(),
            config.initial_balance,
            config.position_size,
        )
    }

    pub fn with_correlation(mut self, provider: Arc<dyn CorrelationProvider + Send + Sync>) -> Self {
        self.correlation = provider;
        self
    }

    /// True while new entries are blocked by the drawdown breaker.
    pub fn breaker_engaged(&self, drawdown_percentage: f64) -> bool {
        drawdown_percentage >= self.config.max_drawdown * 100.0
    }

    pub fn evaluate(
        &self,
        signal: &TradingSignal,
        reference_price: f64,
        ctx: &RiskContext<'_>,
    ) -> RiskDecision {
        if let Err(reason) = check_signal(signal, reference_price) {
            return RiskDecision::Reject(RiskRejection::InvalidSignal { reason });
        }

        if self.breaker_engaged(ctx.drawdown_percentage) {
            return RiskDecision::Reject(RiskRejection::DrawdownBreaker {
                current_pct: ctx.drawdown_percentage,
                limit_pct: self.config.max_drawdown * 100.0,
            });
        }

        let ratio = signal.risk_reward;
        if ratio < self.config.min_risk_reward_ratio {
            return RiskDecision::Reject(RiskRejection::RiskRewardTooLow {
                ratio,
                minimum: self.config.min_risk_reward_ratio,
            });
        }

        for open in ctx.open_positions {
            let c = self.correlation.correlation(&signal.symbol, &open.symbol);
            if c >= self.config.max_correlation {
                return RiskDecision::Reject(RiskRejection::CorrelatedExposure {
                    symbol: open.symbol.clone(),
                    correlation: c,
                });
            }
        }

        let stop_distance = reference_price * self.config.stop_loss_percentage;
        let target_distance = stop_distance * ratio;

        let requested_quantity =
            (ctx.balance * self.position_size * signal.strength.min(1.0)) / reference_price;
        let risk_budget = self.initial_balance * self.config.max_risk_per_trade;
        let max_quantity = risk_budget / stop_distance;
        let quantity = requested_quantity.min(max_quantity);

        if !(quantity >= self.config.min_quantity) {
            return RiskDecision::Reject(RiskRejection::BelowMinimumSize {
                quantity,
                minimum: self.config.min_quantity,
            });
        }

        let plan = TradePlan {
            side: signal.side,
            reference_price,
            quantity,
            stop_distance,
            target_distance,
            risk_amount: stop_distance * quantity,
            risk_reward_ratio: ratio,
        };

        if quantity < requested_quantity {
            RiskDecision::Adjust {
                plan,
                requested_quantity,
            }
        } else {
            RiskDecision::Accept(plan)
        }
    }
}

fn check_signal(signal: &TradingSignal, reference_price: f64) -> Result<(), String> {
    if !reference_price.is_finite() || reference_price <= 0.0 {
        return Err(format!("reference price {} is not positive", reference_price));
    }
    if !signal.risk_reward.is_finite() || signal.risk_reward <= 0.0 {
        return Err(format!("risk/reward {} is not positive", signal.risk_reward));
    }
    if !signal.strength.is_finite() || signal.strength <= 0.0 {
        return Err(format!("strength {} is not positive", signal.strength));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn signal(side: Side, rr: f64) -> TradingSignal {
        TradingSignal::new(
            "BTCUSDT",
            side,
            rr,
            Utc.with_ymd_and_hms(2024, 1, 3, 2, 0, 0).unwrap(),
        )
    }

    fn manager() -> RiskManager {
        RiskManager::new(RiskManagementConfig::default(), 10_000.0, 0.25)
    }

    fn flat(balance: f64) -> RiskContext<'static> {
        RiskContext {
            balance,
            drawdown_percentage: 0.0,
            open_positions: &[],
        }
    }

    #[test]
    fn accepts_within_budget() {
        let decision = manager().evaluate(&signal(Side::Buy, 2.0), 50_000.0, &flat(10_000.0));
        let RiskDecision::Accept(plan) = decision else {
            panic!("expected accept, got {:?}", decision);
        };
        assert!((plan.quantity - 0.05).abs() < 1e-12);
        assert!((plan.stop_distance - 1_000.0).abs() < 1e-9);
        assert!((plan.target_distance - 2_000.0).abs() < 1e-9);
        assert!(plan.risk_amount / 10_000.0 <= 0.02);
        assert!((plan.stop_loss(50_050.0) - 49_050.0).abs() < 1e-9);
        assert!((plan.take_profit(50_050.0) - 52_050.0).abs() < 1e-9);
    }

    #[test]
    fn short_levels_are_mirrored() {
        let RiskDecision::Accept(plan) =
            manager().evaluate(&signal(Side::Sell, 2.0), 100.0, &flat(10_000.0))
        else {
            panic!("expected accept");
        };
        assert!((plan.stop_loss(100.0) - 102.0).abs() < 1e-9);
        assert!((plan.take_profit(100.0) - 96.0).abs() < 1e-9);
    }

    #[test]
    fn oversized_position_is_reduced_to_budget() {
        let config = RiskManagementConfig {
            max_risk_per_trade: 0.001,
            ..Default::default()
        };
        let rm = RiskManager::new(config, 10_000.0, 0.25);
        let decision = rm.evaluate(&signal(Side::Buy, 2.0), 100.0, &flat(10_000.0));
        let RiskDecision::Adjust {
            plan,
            requested_quantity,
        } = decision
        else {
            panic!("expected adjust, got {:?}", decision);
        };
        assert!((requested_quantity - 25.0).abs() < 1e-9);
        // budget 10 / stop distance 2 = 5 units
        assert!((plan.quantity - 5.0).abs() < 1e-9);
        assert!((plan.stop_distance * plan.quantity / 10_000.0 - 0.001).abs() < 1e-12);
        assert!((plan.risk_amount - 10.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_when_minimum_size_cannot_fit() {
        let config = RiskManagementConfig {
            min_quantity: 1.0,
            ..Default::default()
        };
        let rm = RiskManager::new(config, 10_000.0, 0.25);
        let decision = rm.evaluate(&signal(Side::Buy, 2.0), 50_000.0, &flat(10_000.0));
        assert!(matches!(
            decision,
            RiskDecision::Reject(RiskRejection::BelowMinimumSize { .. })
        ));
    }

    #[test]
    fn rejects_low_risk_reward() {
        let decision = manager().evaluate(&signal(Side::Buy, 1.2), 100.0, &flat(10_000.0));
        assert_eq!(
            decision,
            RiskDecision::Reject(RiskRejection::RiskRewardTooLow {
                ratio: 1.2,
                minimum: 1.5
            })
        );
    }

    #[test]
    fn drawdown_breaker_blocks_entries() {
        let ctx = RiskContext {
            drawdown_percentage: 20.0,
            ..flat(8_000.0)
        };
        let decision = manager().evaluate(&signal(Side::Buy, 3.0), 100.0, &ctx);
        assert!(matches!(
            decision,
            RiskDecision::Reject(RiskRejection::DrawdownBreaker { .. })
        ));

        let recovered = RiskContext {
            drawdown_percentage: 19.9,
            ..flat(8_000.0)
        };
        assert!(!matches!(
            manager().evaluate(&signal(Side::Buy, 3.0), 100.0, &recovered),
            RiskDecision::Reject(_)
        ));
    }

    #[test]
    fn correlated_open_position_blocks_entry() {
        let open = vec![BacktestTrade::open(
            1,
            "BTCUSDT",
            "t",
            Side::Buy,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            100.0,
            1.0,
            98.0,
            104.0,
            0.0,
            0.0,
        )];
        let ctx = RiskContext {
            open_positions: &open,
            ..flat(10_000.0)
        };
        let decision = manager().evaluate(&signal(Side::Buy, 2.0), 100.0, &ctx);
        assert!(matches!(
            decision,
            RiskDecision::Reject(RiskRejection::CorrelatedExposure { .. })
        ));
    }

    #[test]
    fn custom_correlation_provider_is_used() {
        struct AllIndependent;
        impl CorrelationProvider for AllIndependent {
            fn correlation(&self, _a: &str, _b: &str) -> f64 {
                0.0
            }
        }
        let open = vec![BacktestTrade::open(
            1,
            "BTCUSDT",
            "t",
            Side::Buy,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            100.0,
            1.0,
            98.0,
            104.0,
            0.0,
            0.0,
        )];
        let ctx = RiskContext {
            open_positions: &open,
            ..flat(10_000.0)
        };
        let rm = manager().with_correlation(Arc::new(AllIndependent));
        assert!(matches!(
            rm.evaluate(&signal(Side::Buy, 2.0), 100.0, &ctx),
            RiskDecision::Accept(_)
        ));
    }

    #[test]
    fn invalid_signals_are_rejected() {
        let mut s = signal(Side::Buy, 2.0);
        s.strength = 0.0;
        assert!(matches!(
            manager().evaluate(&s, 100.0, &flat(10_000.0)),
            RiskDecision::Reject(RiskRejection::InvalidSignal { .. })
        ));
        assert!(matches!(
            manager().evaluate(&signal(Side::Buy, 2.0), 0.0, &flat(10_000.0)),
            RiskDecision::Reject(RiskRejection::InvalidSignal { .. })
        ));
    }

    #[test]
    fn same_inputs_same_decision() {
        let s = signal(Side::Buy, 2.5);
        let a = manager().evaluate(&s, 123.0, &flat(9_000.0));
        let b = manager().evaluate(&s, 123.0, &flat(9_000.0));
        assert_eq!(a, b);
    }
}
