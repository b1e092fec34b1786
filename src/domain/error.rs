//! Domain error types.
//!
//! Fatal conditions abort a run through [`BacktestError`]. Per-signal
//! conditions ([`RiskRejection`], [`ExecutionRejection`]) are recorded in the
//! result and never abort the simulation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level error type for sigbench.
#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("invalid configuration [{key}]: {reason}")]
    Configuration { key: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("data for {symbol} failed validation: {}", .errors.join("; "))]
    DataValidation { symbol: String, errors: Vec<String> },

    #[error("data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("run cancelled at bar {bar_index}")]
    Cancelled { bar_index: usize },

    #[error("run timed out at bar {bar_index}")]
    TimedOut { bar_index: usize },

    #[error("ledger step at {next} does not follow {previous}")]
    OutOfOrder {
        previous: DateTime<Utc>,
        next: DateTime<Utc>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BacktestError {
    pub fn config(key: &str, reason: impl Into<String>) -> Self {
        BacktestError::Configuration {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn exit_status(&self) -> u8 {
        match self {
            BacktestError::Io(_) | BacktestError::Serialization(_) => 1,
            BacktestError::Configuration { .. } | BacktestError::ConfigParse { .. } => 2,
            BacktestError::DataUnavailable { .. } => 3,
            BacktestError::DataValidation { .. } => 4,
            BacktestError::Cancelled { .. } | BacktestError::TimedOut { .. } => 5,
            BacktestError::OutOfOrder { .. } => 1,
        }
    }

    /// True for conditions a caller may retry without changing inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BacktestError::DataUnavailable { .. } | BacktestError::TimedOut { .. }
        )
    }
}

impl From<&BacktestError> for std::process::ExitCode {
    fn from(err: &BacktestError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}

/// Why the risk manager refused a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskRejection {
    #[error("drawdown {current_pct:.2}% at or above limit {limit_pct:.2}%")]
    DrawdownBreaker { current_pct: f64, limit_pct: f64 },

    #[error("risk/reward {ratio:.2} below minimum {minimum:.2}")]
    RiskRewardTooLow { ratio: f64, minimum: f64 },

    #[error("quantity {quantity} below minimum {minimum} after sizing")]
    BelowMinimumSize { quantity: f64, minimum: f64 },

    #[error("open exposure in {symbol} correlates at {correlation:.2}")]
    CorrelatedExposure { symbol: String, correlation: f64 },

    #[error("invalid signal: {reason}")]
    InvalidSignal { reason: String },
}

/// A signal that cleared risk checks but was not filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("order for {symbol} rejected by venue at {timestamp}: {reason}")]
pub struct ExecutionRejection {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}
