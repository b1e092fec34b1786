//! Backtest orchestration.
//!
//! A run moves through `Configured -> Fetched -> Validated -> Simulated` as
//! distinct types; each transition consumes the previous phase and only the
//! simulated phase can be finalized into a [`BacktestResult`]. The engine
//! mirrors the progress in an observable [`RunState`].
//!
//! Pipeline per bar: STRATEGY -> RISK -> EXECUTION -> EXITS -> LEDGER.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::backtest::{
    BacktestConfig, BacktestResult, ExecutionDetails, RESULT_SCHEMA_VERSION, SignalRejection,
};
use super::config_validation::validate_backtest_config;
use super::error::{BacktestError, RiskRejection};
use super::execution::{ExecutionConfig, ExecutionOutcome, ExecutionSimulator};
use super::fetcher::{FetchedData, HistoricalDataFetcher};
use super::ledger::{Ledger, PortfolioSnapshot};
use super::market_bar::MarketBar;
use super::metrics::PerformanceReport;
use super::risk::{CorrelationProvider, RiskContext, RiskDecision, RiskManager};
use super::signal::{Side, TradingSignal};
use super::trade::{BacktestTrade, ExitFill, ExitReason};
use super::validation::DataValidator;
use crate::ports::data_port::DataPort;
use crate::ports::strategy_port::Strategy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Configured,
    FetchingData,
    Validating,
    Simulating,
    Finalized,
    Failed(String),
}

/// Cooperative cancellation flag, checked at bar boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct RunGuard {
    cancel: CancelHandle,
    deadline: Option<Instant>,
}

impl RunGuard {
    fn check(&self, bar_index: usize) -> Result<(), BacktestError> {
        if self.cancel.is_cancelled() {
            return Err(BacktestError::Cancelled { bar_index });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(BacktestError::TimedOut { bar_index });
        }
        Ok(())
    }
}

pub struct BacktestEngine<'a> {
    data: &'a dyn DataPort,
    strategies: Vec<Box<dyn Strategy + Send>>,
    correlation: Option<Arc<dyn CorrelationProvider + Send + Sync>>,
    cancel: CancelHandle,
    timeout: Option<Duration>,
    state: RunState,
}

impl<'a> BacktestEngine<'a> {
    pub fn new(data: &'a dyn DataPort) -> Self {
        BacktestEngine {
            data,
            strategies: Vec::new(),
            correlation: None,
            cancel: CancelHandle::default(),
            timeout: None,
            state: RunState::Configured,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_correlation(mut self, provider: Arc<dyn CorrelationProvider + Send + Sync>) -> Self {
        self.correlation = Some(provider);
        self
    }

    /// Make `strategy` selectable by its id. A later registration with the
    /// same id replaces the earlier one.
    pub fn register_strategy(&mut self, strategy: Box<dyn Strategy + Send>) {
        self.strategies.retain(|s| s.id() != strategy.id());
        self.strategies.push(strategy);
    }

    pub fn registered_strategies(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.id()).collect()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn force_cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run one backtest. Any fatal condition returns `Err` and leaves the
    /// engine in [`RunState::Failed`].
    pub fn run_backtest(&mut self, config: &BacktestConfig) -> Result<BacktestResult, BacktestError> {
        self.state = RunState::Configured;
        let mut strategies = std::mem::take(&mut self.strategies);
        let outcome = self.execute(config, &mut strategies);
        self.strategies = strategies;

        match &outcome {
            Ok(result) => {
                self.state = RunState::Finalized;
                info!(
                    symbol = %config.symbol,
                    trades = result.execution_details.trades_closed,
                    final_equity = result.final_equity(),
                    "backtest finalized"
                );
            }
            Err(e) => {
                warn!(symbol = %config.symbol, error = %e, "backtest failed");
                self.state = RunState::Failed(e.to_string());
            }
        }
        outcome
    }

    fn execute(
        &mut self,
        config: &BacktestConfig,
        strategies: &mut [Box<dyn Strategy + Send>],
    ) -> Result<BacktestResult, BacktestError> {
        validate_backtest_config(config)?;
        let selected = select_strategies(config, strategies)?;
        for &idx in &selected {
            strategies[idx].reset();
        }

        self.cancel.clear();
        let guard = RunGuard {
            cancel: self.cancel.clone(),
            deadline: self.timeout.map(|t| Instant::now() + t),
        };

        let fetcher = HistoricalDataFetcher::new(self.data, DataValidator::for_config(config));
        let run = Run::new(config);

        self.state = RunState::FetchingData;
        let run = run.fetch(&fetcher)?;

        self.state = RunState::Validating;
        let run = run.validate(&fetcher)?;

        self.state = RunState::Simulating;
        let mut risk = RiskManager::from_backtest(config);
        if let Some(provider) = &self.correlation {
            risk = risk.with_correlation(Arc::clone(provider));
        }
        let run = run.simulate(strategies, &selected, risk, &guard)?;

        Ok(run.finalize())
    }
}

fn select_strategies(
    config: &BacktestConfig,
    strategies: &[Box<dyn Strategy + Send>],
) -> Result<Vec<usize>, BacktestError> {
    let mut selected = Vec::new();
    for id in &config.strategies {
        let idx = strategies
            .iter()
            .position(|s| s.id() == id.as_str())
            .ok_or_else(|| {
                BacktestError::config(
                    "backtest.strategies",
                    format!("strategy '{}' is not registered", id),
                )
            })?;
        if !selected.contains(&idx) {
            selected.push(idx);
        }
    }
    Ok(selected)
}

struct Configured;

struct Fetched {
    raw: Vec<MarketBar>,
}

struct Validated {
    data: FetchedData,
}

struct Simulated {
    data: FetchedData,
    output: SimulationOutput,
}

struct Run<'c, P> {
    config: &'c BacktestConfig,
    phase: P,
}

impl<'c> Run<'c, Configured> {
    fn new(config: &'c BacktestConfig) -> Self {
        Run {
            config,
            phase: Configured,
        }
    }

    fn fetch(self, fetcher: &HistoricalDataFetcher<'_>) -> Result<Run<'c, Fetched>, BacktestError> {
        info!(symbol = %self.config.symbol, start = %self.config.start_date, end = %self.config.end_date, "fetching data");
        let raw = fetcher.fetch_raw(&self.config.symbol, self.config.start_date, self.config.end_date)?;
        Ok(Run {
            config: self.config,
            phase: Fetched { raw },
        })
    }
}

impl<'c> Run<'c, Fetched> {
    fn validate(self, fetcher: &HistoricalDataFetcher<'_>) -> Result<Run<'c, Validated>, BacktestError> {
        let data = fetcher.validate(&self.config.symbol, &self.phase.raw);
        if !data.report.is_valid {
            return Err(BacktestError::DataValidation {
                symbol: self.config.symbol.clone(),
                errors: data.report.errors,
            });
        }
        Ok(Run {
            config: self.config,
            phase: Validated { data },
        })
    }
}

impl<'c> Run<'c, Validated> {
    fn simulate(
        self,
        strategies: &mut [Box<dyn Strategy + Send>],
        selected: &[usize],
        risk: RiskManager,
        guard: &RunGuard,
    ) -> Result<Run<'c, Simulated>, BacktestError> {
        let seed = self.config.seed();
        info!(bars = self.phase.data.bars.len(), seed, "simulating");
        let mut sim = Simulation::new(self.config, risk, seed);
        let bars = &self.phase.data.bars;
        let last = bars.len().saturating_sub(1);

        for (i, bar) in bars.iter().enumerate() {
            guard.check(i)?;
            let window = &bars[..=i];

            for &idx in selected {
                let strategy = &mut strategies[idx];
                let signals = strategy.generate_signals(window);
                for signal in signals {
                    sim.route(strategy.id(), signal, bar, i);
                }
            }

            sim.check_exits(bar, i);
            if i == last {
                sim.close_all(bar);
            }
            sim.mark(bar)?;
        }

        Ok(Run {
            config: self.config,
            phase: Simulated {
                data: self.phase.data,
                output: sim.finish(),
            },
        })
    }
}

impl Run<'_, Simulated> {
    fn finalize(self) -> BacktestResult {
        let config = self.config;
        let Simulated { data, output } = self.phase;
        let performance = PerformanceReport::compute(
            &output.trades,
            &output.portfolio,
            config.initial_balance,
            config.risk_free_rate,
            config.periods_per_year(),
        );
        BacktestResult {
            schema_version: RESULT_SCHEMA_VERSION,
            config: config.clone(),
            trades: output.trades,
            risk_rejections: output.risk_rejections,
            portfolio: output.portfolio,
            performance,
            validation: data.report,
            execution_details: output.details,
        }
    }
}

struct SimulationOutput {
    trades: Vec<BacktestTrade>,
    risk_rejections: Vec<SignalRejection>,
    portfolio: Vec<PortfolioSnapshot>,
    details: ExecutionDetails,
}

/// Mutable state of one simulation. Owned by a single run.
struct Simulation<'c> {
    config: &'c BacktestConfig,
    risk: RiskManager,
    execution: ExecutionSimulator,
    ledger: Ledger,
    trades: Vec<BacktestTrade>,
    risk_rejections: Vec<SignalRejection>,
    details: ExecutionDetails,
    entry_bar: HashMap<u64, usize>,
    next_id: u64,
}

impl<'c> Simulation<'c> {
    fn new(config: &'c BacktestConfig, risk: RiskManager, seed: u64) -> Self {
        Simulation {
            config,
            risk,
            execution: ExecutionSimulator::new(ExecutionConfig::from_backtest(config), seed),
            ledger: Ledger::new(config.initial_balance),
            trades: Vec::new(),
            risk_rejections: Vec::new(),
            details: ExecutionDetails {
                seed,
                ..Default::default()
            },
            entry_bar: HashMap::new(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn reject(&mut self, strategy: &str, signal: TradingSignal, reason: RiskRejection) {
        warn!(strategy, side = %signal.side, %reason, "signal rejected by risk");
        self.details.risk_rejections += 1;
        self.risk_rejections.push(SignalRejection {
            strategy: strategy.to_string(),
            signal,
            reason,
        });
    }

    fn route(&mut self, strategy: &str, signal: TradingSignal, bar: &MarketBar, bar_index: usize) {
        self.details.signals_received += 1;
        debug!(strategy, bar = bar_index, side = %signal.side, symbol = %signal.symbol, "signal");

        if signal.symbol != bar.symbol {
            let reason = RiskRejection::InvalidSignal {
                reason: format!("no market data for {}", signal.symbol),
            };
            self.reject(strategy, signal, reason);
            return;
        }

        if let Some(open) = self.ledger.position_for(&signal.symbol) {
            if open.side != signal.side {
                let id = open.id;
                self.details.strategy_exits += 1;
                self.close(id, bar.close, ExitReason::Signal, bar);
                return;
            }
        } else if signal.side == Side::Sell && !self.config.allow_shorting {
            debug!(strategy, bar = bar_index, "sell with no position and shorting disabled");
            self.details.signals_ignored += 1;
            return;
        }

        let decision = {
            let ctx = RiskContext {
                balance: self.ledger.balance(),
                drawdown_percentage: self.ledger.drawdown_percentage(),
                open_positions: self.ledger.open_positions(),
            };
            self.risk.evaluate(&signal, bar.close, &ctx)
        };

        let plan = match decision {
            RiskDecision::Accept(plan) => plan,
            RiskDecision::Adjust {
                plan,
                requested_quantity,
            } => {
                debug!(strategy, requested_quantity, quantity = plan.quantity, "position size reduced");
                self.details.risk_adjustments += 1;
                plan
            }
            RiskDecision::Reject(reason) => {
                self.reject(strategy, signal, reason);
                return;
            }
        };

        let id = self.allocate_id();
        match self.execution.execute_entry(
            &signal.symbol,
            signal.side,
            bar.close,
            plan.quantity,
            bar.timestamp,
        ) {
            ExecutionOutcome::Rejected(rejection) => {
                warn!(strategy, symbol = %rejection.symbol, reason = %rejection.reason, "order rejected by venue");
                self.details.execution_rejections += 1;
                self.trades.push(BacktestTrade::rejected(
                    id,
                    &signal.symbol,
                    strategy,
                    signal.side,
                    bar.timestamp,
                    bar.close,
                    rejection.reason,
                ));
            }
            ExecutionOutcome::Filled(fill) => {
                let trade = BacktestTrade::open(
                    id,
                    &signal.symbol,
                    strategy,
                    signal.side,
                    bar.timestamp,
                    fill.price,
                    fill.quantity,
                    plan.stop_loss(fill.price),
                    plan.take_profit(fill.price),
                    fill.fee,
                    fill.slippage_cost,
                );
                debug!(
                    id,
                    side = %trade.side,
                    price = trade.entry_price,
                    quantity = trade.quantity,
                    stop = trade.stop_loss,
                    target = trade.take_profit,
                    risk = plan.risk_amount,
                    "position opened"
                );
                self.details.trades_opened += 1;
                self.entry_bar.insert(id, bar_index);
                self.ledger.open_position(trade);
            }
        }
    }

    /// Stop-loss and take-profit for positions opened on earlier bars.
    fn check_exits(&mut self, bar: &MarketBar, bar_index: usize) {
        let due: Vec<(u64, f64, ExitReason)> = self
            .ledger
            .open_positions()
            .iter()
            .filter(|t| t.symbol == bar.symbol)
            .filter(|t| self.entry_bar.get(&t.id).is_some_and(|&e| e < bar_index))
            .filter_map(|t| exit_trigger(t, bar).map(|(price, reason)| (t.id, price, reason)))
            .collect();
        for (id, price, reason) in due {
            self.close(id, price, reason, bar);
        }
    }

    fn close_all(&mut self, bar: &MarketBar) {
        let ids: Vec<u64> = self
            .ledger
            .open_positions()
            .iter()
            .filter(|t| t.symbol == bar.symbol)
            .map(|t| t.id)
            .collect();
        for id in ids {
            self.close(id, bar.close, ExitReason::EndOfData, bar);
        }
    }

    fn close(&mut self, id: u64, reference_price: f64, reason: ExitReason, bar: &MarketBar) {
        let Some(open) = self.ledger.open_positions().iter().find(|t| t.id == id) else {
            return;
        };
        let fill = self
            .execution
            .execute_exit(open.side, reference_price, open.quantity);
        let exit = ExitFill {
            time: bar.timestamp,
            price: fill.price,
            fee: fill.fee,
            slippage: fill.slippage_cost,
            reason,
        };
        if let Some(closed) = self.ledger.close_position(id, exit) {
            debug!(id, ?reason, pnl = closed.pnl, "position closed");
            self.details.trades_closed += 1;
            self.entry_bar.remove(&id);
            self.trades.push(closed);
        }
    }

    fn mark(&mut self, bar: &MarketBar) -> Result<(), BacktestError> {
        let marks = HashMap::from([(bar.symbol.clone(), bar.close)]);
        self.ledger.mark_to_market(bar.timestamp, &marks)?;
        self.details.bars_processed += 1;
        Ok(())
    }

    fn finish(self) -> SimulationOutput {
        SimulationOutput {
            trades: self.trades,
            risk_rejections: self.risk_rejections,
            portfolio: self.ledger.into_history(),
            details: self.details,
        }
    }
}

/// Exit price and reason if `bar` reaches a protective level of `trade`.
/// A bar that opens beyond a level fills at the open; when both levels are
/// inside the bar the stop is assumed.
pub fn exit_trigger(trade: &BacktestTrade, bar: &MarketBar) -> Option<(f64, ExitReason)> {
    let (adverse, favorable) = if trade.is_long() {
        (bar.low, bar.high)
    } else {
        (bar.high, bar.low)
    };
    if trade.should_stop_loss(adverse) {
        let price = if trade.should_stop_loss(bar.open) {
            bar.open
        } else {
            trade.stop_loss
        };
        return Some((price, ExitReason::StopLoss));
    }
    if trade.should_take_profit(favorable) {
        let price = if trade.should_take_profit(bar.open) {
            bar.open
        } else {
            trade.take_profit
        };
        return Some((price, ExitReason::TakeProfit));
    }
    None
}
