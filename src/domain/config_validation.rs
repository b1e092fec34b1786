//! Configuration validation.
//!
//! Checks every bound of a [`BacktestConfig`] before a run starts; the first
//! violation is returned as [`BacktestError::Configuration`].

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::BacktestError;
use crate::domain::execution::MAX_REJECTION_PROBABILITY;

pub fn validate_backtest_config(config: &BacktestConfig) -> Result<(), BacktestError> {
    validate_symbol(config)?;
    validate_dates(config)?;
    validate_initial_balance(config)?;
    validate_strategies(config)?;
    validate_costs(config)?;
    validate_risk(config)?;
    validate_execution(config)?;
    validate_sizing(config)?;
    Ok(())
}

fn validate_symbol(config: &BacktestConfig) -> Result<(), BacktestError> {
    if config.symbol.trim().is_empty() {
        return Err(BacktestError::config("backtest.symbol", "symbol is required"));
    }
    Ok(())
}

fn validate_dates(config: &BacktestConfig) -> Result<(), BacktestError> {
    if config.start_date >= config.end_date {
        return Err(BacktestError::config(
            "backtest.start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

fn validate_initial_balance(config: &BacktestConfig) -> Result<(), BacktestError> {
    if !(config.initial_balance.is_finite() && config.initial_balance > 0.0) {
        return Err(BacktestError::config(
            "backtest.initial_balance",
            "initial_balance must be positive",
        ));
    }
    Ok(())
}

fn validate_strategies(config: &BacktestConfig) -> Result<(), BacktestError> {
    if config.strategies.iter().all(|s| s.trim().is_empty()) {
        return Err(BacktestError::config(
            "backtest.strategies",
            "at least one strategy is required",
        ));
    }
    Ok(())
}

fn unit_interval(key: &str, value: f64) -> Result<(), BacktestError> {
    if !(0.0..1.0).contains(&value) {
        return Err(BacktestError::config(
            key,
            format!("{} must be in [0, 1), got {}", key, value),
        ));
    }
    Ok(())
}

fn positive_fraction(key: &str, value: f64) -> Result<(), BacktestError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(BacktestError::config(
            key,
            format!("{} must be in (0, 1], got {}", key, value),
        ));
    }
    Ok(())
}

fn validate_costs(config: &BacktestConfig) -> Result<(), BacktestError> {
    unit_interval("backtest.slippage", config.slippage)?;
    unit_interval("fees.maker", config.fees.maker)?;
    unit_interval("fees.taker", config.fees.taker)?;
    if !config.risk_free_rate.is_finite() || config.risk_free_rate < 0.0 {
        return Err(BacktestError::config(
            "backtest.risk_free_rate",
            "risk_free_rate must be non-negative",
        ));
    }
    Ok(())
}

fn validate_risk(config: &BacktestConfig) -> Result<(), BacktestError> {
    let risk = &config.risk_management;
    positive_fraction("risk.max_risk_per_trade", risk.max_risk_per_trade)?;
    positive_fraction("risk.stop_loss_percentage", risk.stop_loss_percentage)?;
    positive_fraction("risk.max_drawdown", risk.max_drawdown)?;
    positive_fraction("risk.max_correlation", risk.max_correlation)?;
    if !(risk.min_risk_reward_ratio.is_finite() && risk.min_risk_reward_ratio > 0.0) {
        return Err(BacktestError::config(
            "risk.min_risk_reward_ratio",
            "min_risk_reward_ratio must be positive",
        ));
    }
    if !(risk.min_quantity.is_finite() && risk.min_quantity > 0.0) {
        return Err(BacktestError::config(
            "risk.min_quantity",
            "min_quantity must be positive",
        ));
    }
    Ok(())
}

fn validate_execution(config: &BacktestConfig) -> Result<(), BacktestError> {
    let p = config.rejection_probability;
    if !(0.0..=MAX_REJECTION_PROBABILITY).contains(&p) {
        return Err(BacktestError::config(
            "execution.rejection_probability",
            format!(
                "rejection_probability must be in [0, {}], got {}",
                MAX_REJECTION_PROBABILITY, p
            ),
        ));
    }
    Ok(())
}

fn validate_sizing(config: &BacktestConfig) -> Result<(), BacktestError> {
    positive_fraction("backtest.position_size", config.position_size)?;
    if config.bar_interval_minutes <= 0 {
        return Err(BacktestError::config(
            "backtest.bar_interval_minutes",
            "bar_interval_minutes must be positive",
        ));
    }
    positive_fraction("data.max_gap_fraction", config.max_gap_fraction)?;
    Ok(())
}
