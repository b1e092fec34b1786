//! Core domain types and logic.

pub mod backtest;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod execution;
pub mod fetcher;
pub mod ledger;
pub mod market_bar;
pub mod metrics;
pub mod risk;
pub mod signal;
pub mod strategies;
pub mod trade;
pub mod validation;
