//! INI file configuration adapter.

use crate::domain::error::BacktestError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BacktestError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| BacktestError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, BacktestError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| BacktestError::ConfigParse {
                file: "<inline>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[backtest]
symbol = BTCUSDT
initial_balance = 10000.0
strategies = sma_crossover, breakout
allow_shorting = no
seed = 42

[fees]
maker = 0.001
taker = 0.002

[strategy.sma_crossover]
fast_period = 5
slow_period = 20
"#;

    #[test]
    fn reads_sections_and_keys() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("backtest", "symbol"), Some("BTCUSDT".into()));
        assert_eq!(adapter.get_double("backtest", "initial_balance", 0.0), 10_000.0);
        assert_eq!(adapter.get_int("backtest", "seed", 0), 42);
        assert_eq!(adapter.get_double("fees", "taker", 0.0), 0.002);
        assert!(!adapter.get_bool("backtest", "allow_shorting", true));
    }

    #[test]
    fn dotted_strategy_sections() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_int("strategy.sma_crossover", "fast_period", 0), 5);
        assert_eq!(adapter.get_int("strategy.breakout", "lookback", 20), 20);
    }

    #[test]
    fn missing_and_blank_values() {
        let adapter = FileConfigAdapter::from_string("[backtest]\nsymbol =\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "symbol"), None);
        assert_eq!(adapter.get_string("nowhere", "key"), None);
        assert_eq!(adapter.get_double("backtest", "slippage", 0.001), 0.001);
    }

    #[test]
    fn non_numeric_falls_back_to_default() {
        let adapter =
            FileConfigAdapter::from_string("[risk]\nmax_drawdown = lots\nmin_quantity = x\n").unwrap();
        assert_eq!(adapter.get_double("risk", "max_drawdown", 0.2), 0.2);
        assert_eq!(adapter.get_int("risk", "min_quantity", 7), 7);
    }

    #[test]
    fn bool_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[b]\na = on\nb = Yes\nc = 0\nd = maybe\n").unwrap();
        assert!(adapter.get_bool("b", "a", false));
        assert!(adapter.get_bool("b", "b", false));
        assert!(!adapter.get_bool("b", "c", true));
        assert!(adapter.get_bool("b", "d", true));
    }

    #[test]
    fn from_file_reads_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[data]\npath = /var/lib/bars\nsource = exchange:binance\n").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_string("data", "path"), Some("/var/lib/bars".into()));
        assert_eq!(adapter.get_string("data", "source"), Some("exchange:binance".into()));
    }

    #[test]
    fn missing_file_is_parse_error() {
        let err = FileConfigAdapter::from_file("/nonexistent/path/backtest.ini")
            .err()
            .unwrap();
        assert!(matches!(err, BacktestError::ConfigParse { file, .. } if file.contains("backtest.ini")));
    }
}
