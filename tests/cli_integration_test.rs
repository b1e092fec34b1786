//! CLI integration tests: config parsing, data port construction and the
//! backtest pipeline driven from INI and CSV files on disk.

mod common;

use clap::Parser;
use common::*;
use sigbench::adapters::file_config_adapter::FileConfigAdapter;
use sigbench::adapters::json_result_adapter::JsonResultWriter;
use sigbench::cli::{self, Cli, Command};
use sigbench::domain::backtest::{BacktestResult, OrderType};
use sigbench::domain::error::BacktestError;
use sigbench::ports::data_port::DataPort;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn write_csv(dir: &Path, symbol: &str, bars: &[MarketBar]) {
    let mut content = String::from("timestamp,open,high,low,close,volume\n");
    for b in bars {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.timestamp.to_rfc3339(),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        ));
    }
    fs::write(dir.join(format!("{}.csv", symbol)), content).unwrap();
}

fn ini_for(data_dir: &Path) -> String {
    format!(
        r#"
[backtest]
symbol = btcusdt
start_date = 2024-01-01
end_date = 2024-01-05 04:00:00
initial_balance = 25000
strategies = sma_crossover, breakout
slippage = 0.0005
seed = 99

[fees]
maker = 0.0008
taker = 0.0015
order_type = limit

[risk]
max_risk_per_trade = 0.01
stop_loss_percentage = 0.03

[execution]
rejection_probability = 0.05

[data]
path = {}
source = exchange:binance

[strategy.sma_crossover]
fast_period = 5
slow_period = 20
risk_reward = 2.5

[strategy.breakout]
lookback = 12
"#,
        data_dir.display()
    )
}

const MINIMAL_INI: &str = r#"
[backtest]
symbol = ETHUSDT
start_date = 2024-03-01
end_date = 2024-03-02
strategies = breakout
"#;

mod config_loading {
    use super::*;

    #[test]
    fn build_backtest_config_valid_full() {
        let adapter = FileConfigAdapter::from_string(&ini_for(Path::new("/tmp"))).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();

        assert_eq!(config.symbol, "BTCUSDT");
        assert_eq!(config.start_date, t0());
        assert_eq!(config.end_date, hour(100));
        assert!((config.initial_balance - 25_000.0).abs() < f64::EPSILON);
        assert_eq!(config.strategies, vec!["sma_crossover", "breakout"]);
        assert!((config.slippage - 0.0005).abs() < f64::EPSILON);
        assert_eq!(config.order_type, OrderType::Limit);
        assert!((config.fees.maker - 0.0008).abs() < f64::EPSILON);
        assert!((config.risk_management.max_risk_per_trade - 0.01).abs() < f64::EPSILON);
        assert!((config.risk_management.stop_loss_percentage - 0.03).abs() < f64::EPSILON);
        assert!((config.rejection_probability - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.seed, Some(99));
    }

    #[test]
    fn build_backtest_config_uses_defaults() {
        let adapter = FileConfigAdapter::from_string(MINIMAL_INI).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();

        assert!((config.initial_balance - 10_000.0).abs() < f64::EPSILON);
        assert_eq!(config.order_type, OrderType::Market);
        assert!((config.fees.taker - 0.002).abs() < f64::EPSILON);
        assert!((config.rejection_probability - 0.02).abs() < f64::EPSILON);
        assert!((config.risk_management.min_risk_reward_ratio - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.bar_interval_minutes, 60);
        assert!(config.allow_shorting);
        assert!(config.seed.is_none());
    }

    #[test]
    fn missing_symbol_is_error() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\nstart_date = 2024-01-01\nend_date = 2024-02-01\n",
        )
        .unwrap();
        let err = cli::build_backtest_config(&adapter).unwrap_err();
        assert!(matches!(err, BacktestError::Configuration { ref key, .. } if key == "backtest.symbol"));
    }

    #[test]
    fn invalid_date_is_error() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\nsymbol = BTCUSDT\nstart_date = soon\nend_date = 2024-02-01\n",
        )
        .unwrap();
        let err = cli::build_backtest_config(&adapter).unwrap_err();
        assert!(
            matches!(err, BacktestError::Configuration { ref key, .. } if key == "backtest.start_date")
        );
    }

    #[test]
    fn unknown_order_type_is_error() {
        let ini = format!("{}\n[fees]\norder_type = stop\n", MINIMAL_INI);
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        let err = cli::build_backtest_config(&adapter).unwrap_err();
        assert!(matches!(err, BacktestError::Configuration { ref key, .. } if key == "fees.order_type"));
    }

    #[test]
    fn non_numeric_seed_is_error() {
        let ini = MINIMAL_INI.replace("strategies = breakout", "strategies = breakout\nseed = abc");
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        let err = cli::build_backtest_config(&adapter).unwrap_err();
        assert!(matches!(err, BacktestError::Configuration { ref key, .. } if key == "backtest.seed"));
    }

    #[test]
    fn strategy_list_is_trimmed_and_lowercased() {
        assert_eq!(
            cli::parse_strategy_list(" SMA_Crossover, ,breakout "),
            vec!["sma_crossover", "breakout"]
        );
    }

    #[test]
    fn load_config_from_file() {
        let file = write_temp_ini(MINIMAL_INI);
        let adapter = cli::load_config(&file.path().to_path_buf()).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        assert_eq!(config.symbol, "ETHUSDT");
    }

    #[test]
    fn load_config_missing_file_fails() {
        assert!(cli::load_config(&"/nonexistent/sigbench.ini".into()).is_err());
    }
}

mod data_port_setup {
    use super::*;

    #[test]
    fn missing_data_path_is_error() {
        let adapter = FileConfigAdapter::from_string(MINIMAL_INI).unwrap();
        let err = cli::build_data_port(&adapter).err().unwrap();
        assert!(matches!(err, BacktestError::Configuration { ref key, .. } if key == "data.path"));
    }

    #[test]
    fn data_port_lists_csv_symbols() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "BTCUSDT", &sine_bars(10));
        write_csv(dir.path(), "ETHUSDT", &sine_bars(10));
        let adapter = FileConfigAdapter::from_string(&ini_for(dir.path())).unwrap();

        let port = cli::build_data_port(&adapter).unwrap();
        assert_eq!(port.list_symbols().unwrap(), vec!["BTCUSDT", "ETHUSDT"]);
    }
}

mod pipeline {
    use super::*;

    #[test]
    fn full_pipeline_from_disk_writes_json() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), SYMBOL, &sine_bars(100));
        let adapter = FileConfigAdapter::from_string(&ini_for(dir.path())).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        let port = cli::build_data_port(&adapter).unwrap();
        let out = dir.path().join("out").join("result.json");

        let result = cli::run_backtest_pipeline(
            &port,
            &adapter,
            &config,
            &JsonResultWriter::to_path(out.clone()),
        )
        .unwrap();

        assert_eq!(result.portfolio.len(), 100);
        assert_eq!(result.execution_details.seed, 99);
        let written: BacktestResult =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written.trades.len(), result.trades.len());
        assert_eq!(written.config.symbol, "BTCUSDT");
    }

    #[test]
    fn pipeline_with_mock_port_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let adapter = FileConfigAdapter::from_string(&ini_for(dir.path())).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        let port = MockDataPort::new().with_bars(SYMBOL, sine_bars(100));

        let a = cli::run_backtest_pipeline(
            &port,
            &adapter,
            &config,
            &JsonResultWriter::to_path(dir.path().join("a.json")),
        )
        .unwrap();
        let b = cli::run_backtest_pipeline(
            &port,
            &adapter,
            &config,
            &JsonResultWriter::to_path(dir.path().join("b.json")),
        )
        .unwrap();

        assert_eq!(a, b);
        assert_eq!(
            fs::read_to_string(dir.path().join("a.json")).unwrap(),
            fs::read_to_string(dir.path().join("b.json")).unwrap()
        );
    }

    #[test]
    fn unsourced_data_fails_validation() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), SYMBOL, &sine_bars(100));
        let ini = ini_for(dir.path()).replace("source = exchange:binance\n", "");
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        let port = cli::build_data_port(&adapter).unwrap();

        let err = cli::run_backtest_pipeline(
            &port,
            &adapter,
            &config,
            &JsonResultWriter::to_path(dir.path().join("r.json")),
        )
        .unwrap_err();
        assert!(matches!(err, BacktestError::DataValidation { .. }));
        assert!(!dir.path().join("r.json").exists());
    }

    #[test]
    fn missing_csv_is_data_unavailable() {
        let dir = TempDir::new().unwrap();
        let adapter = FileConfigAdapter::from_string(&ini_for(dir.path())).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        let port = cli::build_data_port(&adapter).unwrap();

        let err = cli::run_backtest_pipeline(
            &port,
            &adapter,
            &config,
            &JsonResultWriter::to_path(dir.path().join("r.json")),
        )
        .unwrap_err();
        assert_eq!(err.exit_status(), 3);
    }

    #[test]
    fn bad_strategy_parameters_fail_before_run() {
        let dir = TempDir::new().unwrap();
        let ini = ini_for(dir.path()).replace("slow_period = 20", "slow_period = 3");
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        let port = MockDataPort::new().with_error(SYMBOL, "should not be fetched");

        let err = cli::run_backtest_pipeline(
            &port,
            &adapter,
            &config,
            &JsonResultWriter::to_path(dir.path().join("r.json")),
        )
        .unwrap_err();
        assert!(matches!(err, BacktestError::Configuration { .. }));
    }
}

mod argument_parsing {
    use super::*;

    #[test]
    fn backtest_with_output_and_symbol() {
        let cli = Cli::try_parse_from([
            "sigbench",
            "backtest",
            "--config",
            "run.ini",
            "--output",
            "out.json",
            "--symbol",
            "ethusdt",
        ])
        .unwrap();
        match cli.command {
            Command::Backtest {
                config,
                output,
                symbol,
            } => {
                assert_eq!(config, Path::new("run.ini"));
                assert_eq!(output.as_deref(), Some(Path::new("out.json")));
                assert_eq!(symbol.as_deref(), Some("ethusdt"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn subcommands_require_config() {
        assert!(Cli::try_parse_from(["sigbench", "check-config"]).is_err());
        assert!(Cli::try_parse_from(["sigbench", "list-symbols", "-c", "x.ini"]).is_ok());
        assert!(Cli::try_parse_from(["sigbench", "validate-data", "-c", "x.ini"]).is_ok());
    }
}
