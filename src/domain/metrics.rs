//! Performance metrics: returns, risk and trade distribution.
//!
//! Everything here is a pure function of the closed trades, the ledger
//! history and the initial balance. Empty input yields zeros.

use serde::{Deserialize, Serialize};

use super::ledger::PortfolioSnapshot;
use super::trade::BacktestTrade;

const VAR_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeStatistics {
    pub total: usize,
    pub winning: usize,
    pub losing: usize,
    pub breakeven: usize,
    /// Percentage in [0, 100].
    pub win_rate: f64,
    pub average_win: f64,
    /// Magnitude of the mean losing trade.
    pub average_loss: f64,
    pub largest_win: f64,
    /// Magnitude of the worst trade.
    pub largest_loss: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    /// Infinite with wins and no losses; written to JSON as `null`.
    #[serde(deserialize_with = "null_as_infinity")]
    pub profit_factor: f64,
    pub expectancy: f64,
    pub average_duration_hours: f64,
}

fn null_as_infinity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub total_return_percentage: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub downside_deviation: f64,
    pub var_95: f64,
    pub cvar_95: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percentage: f64,
    /// Longest run of consecutive snapshots below the running peak.
    pub max_drawdown_duration: usize,
    pub trades: TradeStatistics,
}

impl PerformanceReport {
    /// `risk_free_rate` is annual; it is converted per period with
    /// `periods_per_year`.
    pub fn compute(
        trades: &[BacktestTrade],
        history: &[PortfolioSnapshot],
        initial_balance: f64,
        risk_free_rate: f64,
        periods_per_year: f64,
    ) -> Self {
        let final_equity = history.last().map(|s| s.equity).unwrap_or(initial_balance);
        let total_return = final_equity - initial_balance;
        let total_return_percentage = if initial_balance > 0.0 {
            total_return / initial_balance * 100.0
        } else {
            0.0
        };

        let years = if periods_per_year > 0.0 {
            history.len() as f64 / periods_per_year
        } else {
            0.0
        };
        let annualized_return = annualize(total_return_percentage, years);

        let returns = period_returns(initial_balance, history);
        let volatility = sample_std_dev(&returns);
        let downside_deviation = downside_deviation(&returns);
        let (var_95, cvar_95) = value_at_risk(&returns, VAR_CONFIDENCE);

        let rf_per_period = if periods_per_year > 0.0 {
            risk_free_rate / periods_per_year
        } else {
            0.0
        };
        let excess = mean(&returns) - rf_per_period;
        let sharpe_ratio = ratio_or_zero(excess, volatility);
        let sortino_ratio = ratio_or_zero(excess, downside_deviation);

        let (max_drawdown, max_drawdown_percentage) = history
            .last()
            .map(|s| (s.max_drawdown, s.max_drawdown_percentage))
            .unwrap_or((0.0, 0.0));
        let calmar_ratio = saturate(ratio_or_zero(annualized_return, max_drawdown_percentage));

        PerformanceReport {
            total_return,
            total_return_percentage,
            annualized_return,
            volatility,
            downside_deviation,
            var_95,
            cvar_95,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            max_drawdown,
            max_drawdown_percentage,
            max_drawdown_duration: max_drawdown_duration(history),
            trades: trade_statistics(trades),
        }
    }
}

/// Compound a total percentage return over `years`, as a percentage.
/// A wiped-out account is -100%; compounding that overflows saturates at
/// `f64::MAX` so the report stays finite.
pub fn annualize(total_return_percentage: f64, years: f64) -> f64 {
    if years <= 0.0 {
        return 0.0;
    }
    let growth = 1.0 + total_return_percentage / 100.0;
    if growth <= 0.0 {
        return -100.0;
    }
    saturate((growth.powf(1.0 / years) - 1.0) * 100.0)
}

fn saturate(x: f64) -> f64 {
    x.clamp(-f64::MAX, f64::MAX)
}

/// Simple returns between consecutive snapshots, the first measured
/// against the initial balance.
pub fn period_returns(initial_balance: f64, history: &[PortfolioSnapshot]) -> Vec<f64> {
    let mut prev = initial_balance;
    history
        .iter()
        .map(|s| {
            let r = if prev > 0.0 { (s.equity - prev) / prev } else { 0.0 };
            prev = s.equity;
            r
        })
        .collect()
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn ratio_or_zero(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

/// Sample standard deviation (n - 1).
pub fn sample_std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

/// Deviation contributed by negative returns only, over the same
/// denominator as [`sample_std_dev`], so it never exceeds it.
pub fn downside_deviation(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let ss: f64 = xs
        .iter()
        .filter(|&&x| x < 0.0)
        .map(|x| (x - m).powi(2))
        .sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

/// Historical VaR and CVaR at `confidence`, both reported as values <= 0.
pub fn value_at_risk(xs: &[f64], confidence: f64) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(f64::total_cmp);
    let idx = (((1.0 - confidence) * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    let var = sorted[idx].min(0.0);
    let cvar = mean(&sorted[..=idx]).min(0.0);
    (var, cvar)
}

pub fn max_drawdown_duration(history: &[PortfolioSnapshot]) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    for s in history {
        if s.drawdown > 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Statistics over the closed trades in `trades`; open and rejected
/// records are ignored.
pub fn trade_statistics(trades: &[BacktestTrade]) -> TradeStatistics {
    let mut stats = TradeStatistics::default();
    let mut total_hours = 0.0_f64;
    let mut net = 0.0_f64;

    for trade in trades.iter().filter(|t| t.is_closed()) {
        stats.total += 1;
        let pnl = trade.pnl;
        net += pnl;
        total_hours += trade.duration_hours();
        if pnl > 0.0 {
            stats.winning += 1;
            stats.gross_profit += pnl;
            stats.largest_win = stats.largest_win.max(pnl);
        } else if pnl < 0.0 {
            stats.losing += 1;
            stats.gross_loss += pnl.abs();
            stats.largest_loss = stats.largest_loss.max(pnl.abs());
        } else {
            stats.breakeven += 1;
        }
    }

    if stats.total == 0 {
        return stats;
    }

    let total = stats.total as f64;
    stats.win_rate = stats.winning as f64 / total * 100.0;
    if stats.winning > 0 {
        stats.average_win = stats.gross_profit / stats.winning as f64;
    }
    if stats.losing > 0 {
        stats.average_loss = stats.gross_loss / stats.losing as f64;
    }
    stats.profit_factor = if stats.gross_loss > 0.0 {
        stats.gross_profit / stats.gross_loss
    } else if stats.gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };
    stats.expectancy = net / total;
    stats.average_duration_hours = total_hours / total;
    stats
}
