//! Data integrity validation for bar series.
//!
//! Classifies a candidate series without touching it:
//! - OHLC ordering, finite positive prices, non-negative volume
//! - provenance (`validated` flag, recognised source, fingerprint)
//! - strictly increasing timestamps and symbol consistency
//! - gaps of missing expected bars, escalated when large relative to the range
//!
//! The expected range is half-open: bars are expected at `start`,
//! `start + interval`, ... strictly before `end`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::backtest::BacktestConfig;
use super::market_bar::MarketBar;

/// A contiguous run of missing expected bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataGap {
    /// Last timestamp present before the gap (or the range start).
    pub start: DateTime<Utc>,
    /// First timestamp present after the gap (or the range end).
    pub end: DateTime<Utc>,
    pub missing_bars: usize,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub total_points: usize,
    pub valid_points: usize,
    /// 0..=100
    pub integrity_score: f64,
    pub gaps: Vec<DataGap>,
}

impl ValidationReport {
    pub fn missing_bars(&self) -> usize {
        self.gaps.iter().map(|g| g.missing_bars).sum()
    }
}

#[derive(Debug, Clone)]
pub struct DataValidator {
    pub bar_interval_minutes: i64,
    /// Gaps longer than this fraction of the range are errors, not warnings.
    pub max_gap_fraction: f64,
    pub expected_symbol: Option<String>,
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl DataValidator {
    pub fn new(bar_interval_minutes: i64) -> Self {
        DataValidator {
            bar_interval_minutes,
            max_gap_fraction: 0.1,
            expected_symbol: None,
            range: None,
        }
    }

    pub fn for_config(config: &BacktestConfig) -> Self {
        DataValidator {
            bar_interval_minutes: config.bar_interval_minutes,
            max_gap_fraction: config.max_gap_fraction,
            expected_symbol: Some(config.symbol.clone()),
            range: Some((config.start_date, config.end_date)),
        }
    }

    pub fn validate(&self, bars: &[MarketBar]) -> ValidationReport {
        self.classify(bars).0
    }

    /// Validate and return the bars that passed every per-bar check.
    pub fn validate_and_filter(&self, bars: &[MarketBar]) -> (ValidationReport, Vec<MarketBar>) {
        let (report, accepted) = self.classify(bars);
        let kept = accepted
            .iter()
            .zip(bars)
            .filter(|(ok, _)| **ok)
            .map(|(_, bar)| bar.clone())
            .collect();
        (report, kept)
    }

    fn classify(&self, bars: &[MarketBar]) -> (ValidationReport, Vec<bool>) {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut accepted = vec![true; bars.len()];

        if bars.is_empty() {
            errors.push("no data points".to_string());
            return (
                ValidationReport {
                    is_valid: false,
                    errors,
                    warnings,
                    total_points: 0,
                    valid_points: 0,
                    integrity_score: 0.0,
                    gaps: Vec::new(),
                },
                accepted,
            );
        }

        for (i, bar) in bars.iter().enumerate() {
            let problems = self.check_bar(bar);
            if !problems.is_empty() {
                accepted[i] = false;
                for p in problems {
                    errors.push(format!("bar {} ({}): {}", i, bar.timestamp, p));
                }
            }
        }

        for i in 1..bars.len() {
            if bars[i].timestamp <= bars[i - 1].timestamp {
                accepted[i] = false;
                errors.push(format!(
                    "bar {} ({}): timestamp does not follow previous bar ({})",
                    i,
                    bars[i].timestamp,
                    bars[i - 1].timestamp
                ));
            }
        }

        let gaps = self.detect_gaps(bars, &mut warnings);
        let span = self.span_minutes(bars);
        for gap in &gaps {
            let limit = self.max_gap_fraction * span as f64;
            if span > 0 && gap.duration_minutes as f64 > limit {
                errors.push(format!(
                    "gap of {} minutes between {} and {} exceeds {:.0}% of the range",
                    gap.duration_minutes,
                    gap.start,
                    gap.end,
                    self.max_gap_fraction * 100.0
                ));
            }
        }

        let total_points = bars.len();
        let valid_points = accepted.iter().filter(|ok| **ok).count();
        let missing: usize = gaps.iter().map(|g| g.missing_bars).sum();
        let expected = total_points + missing;
        let integrity_score = (valid_points as f64 / expected as f64 * 100.0).clamp(0.0, 100.0);

        (
            ValidationReport {
                is_valid: errors.is_empty(),
                errors,
                warnings,
                total_points,
                valid_points,
                integrity_score,
                gaps,
            },
            accepted,
        )
    }

    fn check_bar(&self, bar: &MarketBar) -> Vec<String> {
        let mut problems = Vec::new();

        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            problems.push("prices must be finite and positive".to_string());
        } else {
            if bar.high < bar.low {
                problems.push(format!("high {} below low {}", bar.high, bar.low));
            }
            if bar.high < bar.open.max(bar.close) {
                problems.push(format!(
                    "high {} below open/close ({}/{})",
                    bar.high, bar.open, bar.close
                ));
            }
            if bar.low > bar.open.min(bar.close) {
                problems.push(format!(
                    "low {} above open/close ({}/{})",
                    bar.low, bar.open, bar.close
                ));
            }
        }
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            problems.push(format!("invalid volume {}", bar.volume));
        }

        if !bar.validated {
            problems.push("bar has not been validated at its source".to_string());
        }
        if !bar.source.has_provenance() {
            problems.push(format!(
                "source '{}' carries no verifiable provenance",
                bar.source
            ));
        }
        if !bar.integrity_matches() {
            problems.push("integrity fingerprint does not match bar content".to_string());
        }

        if let Some(expected) = &self.expected_symbol {
            if &bar.symbol != expected {
                problems.push(format!(
                    "symbol {} does not match requested {}",
                    bar.symbol, expected
                ));
            }
        }

        problems
    }

    fn detect_gaps(&self, bars: &[MarketBar], warnings: &mut Vec<String>) -> Vec<DataGap> {
        let interval = self.bar_interval_minutes;
        if interval <= 0 {
            return Vec::new();
        }
        let mut gaps = Vec::new();

        if let Some((start, _)) = self.range {
            let first = bars[0].timestamp;
            let lead = (first - start).num_minutes();
            if lead >= interval {
                gaps.push(DataGap {
                    start,
                    end: first,
                    missing_bars: (lead / interval) as usize,
                    duration_minutes: lead,
                });
            }
        }

        for w in bars.windows(2) {
            let delta = (w[1].timestamp - w[0].timestamp).num_minutes();
            if delta <= interval {
                continue;
            }
            let missing = (delta / interval - 1) as usize;
            if missing == 0 {
                warnings.push(format!(
                    "irregular spacing of {} minutes between {} and {}",
                    delta, w[0].timestamp, w[1].timestamp
                ));
                continue;
            }
            gaps.push(DataGap {
                start: w[0].timestamp,
                end: w[1].timestamp,
                missing_bars: missing,
                duration_minutes: delta - interval,
            });
        }

        if let Some((_, end)) = self.range {
            if let Some(last) = bars.last() {
                let tail = (end - last.timestamp).num_minutes();
                let expected_after = ceil_div(tail, interval) - 1;
                if expected_after > 0 {
                    gaps.push(DataGap {
                        start: last.timestamp,
                        end,
                        missing_bars: expected_after as usize,
                        duration_minutes: tail - interval,
                    });
                }
            }
        }

        for gap in &gaps {
            warnings.push(format!(
                "gap of {} missing bars ({} minutes) between {} and {}",
                gap.missing_bars, gap.duration_minutes, gap.start, gap.end
            ));
        }
        gaps
    }

    fn span_minutes(&self, bars: &[MarketBar]) -> i64 {
        match self.range {
            Some((start, end)) => (end - start).num_minutes(),
            None => match (bars.first(), bars.last()) {
                (Some(first), Some(last)) => {
                    (last.timestamp - first.timestamp + Duration::minutes(self.bar_interval_minutes))
                        .num_minutes()
                }
                _ => 0,
            },
        }
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    if a <= 0 {
        return 0;
    }
    (a + b - 1) / b
}
