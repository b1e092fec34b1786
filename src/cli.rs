//! CLI definition and dispatch.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::{CsvAdapter, parse_timestamp};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_result_adapter::JsonResultWriter;
use crate::domain::backtest::{BacktestConfig, BacktestResult, FeeSchedule, OrderType, RiskManagementConfig};
use crate::domain::config_validation::validate_backtest_config;
use crate::domain::engine::BacktestEngine;
use crate::domain::error::BacktestError;
use crate::domain::fetcher::HistoricalDataFetcher;
use crate::domain::market_bar::DataSource;
use crate::domain::strategies::build_strategies;
use crate::domain::validation::{DataValidator, ValidationReport};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::result_port::ResultSink;

#[derive(Parser, Debug)]
#[command(name = "sigbench", about = "Backtesting and performance evaluation for trading signals")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the JSON result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Fetch and validate market data without simulating
    ValidateData {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Check a configuration file
    CheckConfig {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols available in the data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            symbol,
        } => run_backtest(&config, output, symbol.as_deref()),
        Command::ValidateData { config, symbol } => run_validate_data(&config, symbol.as_deref()),
        Command::CheckConfig { config } => run_check_config(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
    }
}

fn fail(err: &BacktestError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

fn parse_config_date(adapter: &dyn ConfigPort, key: &str) -> Result<DateTime<Utc>, BacktestError> {
    let full_key = format!("backtest.{}", key);
    let value = adapter
        .get_string("backtest", key)
        .ok_or_else(|| BacktestError::config(&full_key, format!("{} is required", key)))?;
    parse_timestamp(&value).ok_or_else(|| {
        BacktestError::config(
            &full_key,
            format!("invalid date '{}' (expected YYYY-MM-DD or RFC 3339)", value),
        )
    })
}

fn parse_order_type(adapter: &dyn ConfigPort) -> Result<OrderType, BacktestError> {
    match adapter
        .get_string("fees", "order_type")
        .map(|s| s.to_lowercase())
        .as_deref()
    {
        None | Some("market") => Ok(OrderType::Market),
        Some("limit") => Ok(OrderType::Limit),
        Some(other) => Err(BacktestError::config(
            "fees.order_type",
            format!("unknown order type '{}' (expected market or limit)", other),
        )),
    }
}

fn parse_seed(adapter: &dyn ConfigPort) -> Result<Option<u64>, BacktestError> {
    adapter
        .get_string("backtest", "seed")
        .map(|s| {
            s.parse::<u64>().map_err(|_| {
                BacktestError::config("backtest.seed", format!("invalid seed '{}'", s))
            })
        })
        .transpose()
}

pub fn parse_strategy_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Assemble a [`BacktestConfig`] from INI sections, applying defaults.
/// Bounds are checked separately by `validate_backtest_config`.
pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, BacktestError> {
    let symbol = adapter
        .get_string("backtest", "symbol")
        .map(|s| s.to_uppercase())
        .ok_or_else(|| BacktestError::config("backtest.symbol", "symbol is required"))?;
    let start_date = parse_config_date(adapter, "start_date")?;
    let end_date = parse_config_date(adapter, "end_date")?;

    let defaults = BacktestConfig::new(&symbol, start_date, end_date, 10_000.0);
    let fee_defaults = FeeSchedule::default();
    let risk_defaults = RiskManagementConfig::default();

    Ok(BacktestConfig {
        initial_balance: adapter.get_double("backtest", "initial_balance", defaults.initial_balance),
        strategies: adapter
            .get_string("backtest", "strategies")
            .map(|s| parse_strategy_list(&s))
            .unwrap_or_default(),
        slippage: adapter.get_double("backtest", "slippage", defaults.slippage),
        fees: FeeSchedule {
            maker: adapter.get_double("fees", "maker", fee_defaults.maker),
            taker: adapter.get_double("fees", "taker", fee_defaults.taker),
        },
        order_type: parse_order_type(adapter)?,
        risk_management: RiskManagementConfig {
            max_risk_per_trade: adapter.get_double("risk", "max_risk_per_trade", risk_defaults.max_risk_per_trade),
            stop_loss_percentage: adapter.get_double("risk", "stop_loss_percentage", risk_defaults.stop_loss_percentage),
            min_risk_reward_ratio: adapter.get_double("risk", "min_risk_reward_ratio", risk_defaults.min_risk_reward_ratio),
            max_drawdown: adapter.get_double("risk", "max_drawdown", risk_defaults.max_drawdown),
            max_correlation: adapter.get_double("risk", "max_correlation", risk_defaults.max_correlation),
            min_quantity: adapter.get_double("risk", "min_quantity", risk_defaults.min_quantity),
        },
        rejection_probability: adapter.get_double("execution", "rejection_probability", defaults.rejection_probability),
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", defaults.risk_free_rate),
        bar_interval_minutes: adapter.get_int("backtest", "bar_interval_minutes", defaults.bar_interval_minutes),
        allow_shorting: adapter.get_bool("backtest", "allow_shorting", defaults.allow_shorting),
        position_size: adapter.get_double("backtest", "position_size", defaults.position_size),
        max_gap_fraction: adapter.get_double("data", "max_gap_fraction", defaults.max_gap_fraction),
        seed: parse_seed(adapter)?,
        ..defaults
    })
}

/// CSV data port described by the `[data]` section.
pub fn build_data_port(adapter: &dyn ConfigPort) -> Result<CsvAdapter, BacktestError> {
    let path = adapter
        .get_string("data", "path")
        .ok_or_else(|| BacktestError::config("data.path", "data path is required"))?;
    let source = adapter
        .get_string("data", "source")
        .map(|s| DataSource::from_tag(&s))
        .unwrap_or_else(|| DataSource::Unknown("unspecified".to_string()));
    Ok(CsvAdapter::new(PathBuf::from(path), source))
}

fn load_backtest_config(
    adapter: &dyn ConfigPort,
    symbol_override: Option<&str>,
) -> Result<BacktestConfig, BacktestError> {
    let mut config = build_backtest_config(adapter)?;
    if let Some(symbol) = symbol_override {
        config.symbol = symbol.to_uppercase();
    }
    validate_backtest_config(&config)?;
    Ok(config)
}

/// Everything after config loading: strategy construction, the run itself
/// and the hand-off to `sink`.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    adapter: &dyn ConfigPort,
    config: &BacktestConfig,
    sink: &dyn ResultSink,
) -> Result<BacktestResult, BacktestError> {
    let mut engine = BacktestEngine::new(data_port);
    for strategy in build_strategies(&config.strategies, adapter)? {
        engine.register_strategy(strategy);
    }
    let result = engine.run_backtest(config)?;
    sink.write(&result)?;
    Ok(result)
}

fn print_summary(result: &BacktestResult) {
    let p = &result.performance;
    let d = &result.execution_details;
    eprintln!("\nBacktest: {} ({} bars, seed {})", result.config.symbol, d.bars_processed, d.seed);
    eprintln!("  Final equity:      {:.2}", result.final_equity());
    eprintln!("  Total return:      {:.2} ({:.2}%)", p.total_return, p.total_return_percentage);
    eprintln!("  Annualized return: {:.2}%", p.annualized_return);
    eprintln!("  Max drawdown:      {:.2} ({:.2}%)", p.max_drawdown, p.max_drawdown_percentage);
    eprintln!("  Sharpe / Sortino:  {:.4} / {:.4}", p.sharpe_ratio, p.sortino_ratio);
    eprintln!("  VaR95 / CVaR95:    {:.4} / {:.4}", p.var_95, p.cvar_95);
    eprintln!(
        "  Trades:            {} ({} won, {} lost, win rate {:.1}%)",
        p.trades.total, p.trades.winning, p.trades.losing, p.trades.win_rate
    );
    eprintln!("  Profit factor:     {:.2}", p.trades.profit_factor);
    eprintln!(
        "  Signals:           {} received, {} risk-rejected, {} adjusted, {} venue-rejected, {} ignored",
        d.signals_received, d.risk_rejections, d.risk_adjustments, d.execution_rejections, d.signals_ignored
    );
}

fn run_backtest(config_path: &PathBuf, output: Option<PathBuf>, symbol: Option<&str>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let config = match load_backtest_config(&adapter, symbol) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let data_port = match build_data_port(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let sink = match output {
        Some(path) => JsonResultWriter::to_path(path),
        None => JsonResultWriter::to_stdout(),
    };

    eprintln!(
        "Running {} on {} from {} to {}",
        config.strategies.join(", "),
        config.symbol,
        config.start_date,
        config.end_date
    );
    match run_backtest_pipeline(&data_port, &adapter, &config, &sink) {
        Ok(result) => {
            print_summary(&result);
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn print_report(symbol: &str, report: &ValidationReport) {
    eprintln!("\nData validation: {}", symbol);
    eprintln!("  Valid:           {}", report.is_valid);
    eprintln!("  Points:          {}/{}", report.valid_points, report.total_points);
    eprintln!("  Integrity score: {:.2}", report.integrity_score);
    eprintln!("  Gaps:            {} ({} missing bars)", report.gaps.len(), report.missing_bars());
    for w in &report.warnings {
        eprintln!("  warning: {}", w);
    }
    for e in &report.errors {
        eprintln!("  error: {}", e);
    }
}

fn run_validate_data(config_path: &PathBuf, symbol: Option<&str>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let outcome = load_backtest_config(&adapter, symbol).and_then(|config| {
        let port = build_data_port(&adapter)?;
        let fetcher = HistoricalDataFetcher::new(&port, DataValidator::for_config(&config));
        let data = fetcher.fetch(&config.symbol, config.start_date, config.end_date)?;
        Ok((config.symbol, data.report))
    });
    match outcome {
        Ok((symbol, report)) => {
            print_report(&symbol, &report);
            if report.is_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(&BacktestError::DataValidation {
                    symbol,
                    errors: report.errors,
                })
            }
        }
        Err(e) => fail(&e),
    }
}

fn run_check_config(config_path: &PathBuf) -> ExitCode {
    eprintln!("Checking config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let config = match load_backtest_config(&adapter, None) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let strategies = match build_strategies(&config.strategies, &adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    eprintln!("\nBacktest:");
    eprintln!("  symbol:          {}", config.symbol);
    eprintln!("  range:           {} to {}", config.start_date, config.end_date);
    eprintln!("  initial balance: {:.2}", config.initial_balance);
    eprintln!("  bar interval:    {} minutes", config.bar_interval_minutes);
    eprintln!("  seed:            {}", config.seed());
    eprintln!("\nStrategies:");
    for s in &strategies {
        eprintln!("  {}", s.id());
    }
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: &PathBuf) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let symbols = match build_data_port(&adapter).and_then(|port| port.list_symbols()) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    if symbols.is_empty() {
        eprintln!("No symbols found");
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}
