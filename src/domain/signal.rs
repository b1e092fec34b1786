//! Trading signals emitted by strategies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub symbol: String,
    pub side: Side,
    /// Sizing weight in [0, 1].
    pub strength: f64,
    pub confidence: f64,
    /// Target reward as a multiple of the stop distance.
    pub risk_reward: f64,
    pub timestamp: DateTime<Utc>,
}

impl TradingSignal {
    pub fn new(symbol: &str, side: Side, risk_reward: f64, timestamp: DateTime<Utc>) -> Self {
        TradingSignal {
            symbol: symbol.to_string(),
            side,
            strength: 1.0,
            confidence: 1.0,
            risk_reward,
            timestamp,
        }
    }
}
