//! JSON hand-off of finished results.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::BacktestError;
use crate::ports::result_port::ResultSink;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone)]
enum Target {
    Stdout,
    File(PathBuf),
}

/// Writes results as pretty-printed JSON to a file or stdout.
#[derive(Debug, Clone)]
pub struct JsonResultWriter {
    target: Target,
}

impl JsonResultWriter {
    pub fn to_path(path: PathBuf) -> Self {
        Self {
            target: Target::File(path),
        }
    }

    pub fn to_stdout() -> Self {
        Self {
            target: Target::Stdout,
        }
    }

    pub fn render(result: &BacktestResult) -> Result<String, BacktestError> {
        Ok(serde_json::to_string_pretty(result)?)
    }
}

impl ResultSink for JsonResultWriter {
    fn write(&self, result: &BacktestResult) -> Result<(), BacktestError> {
        let json = Self::render(result)?;
        match &self.target {
            Target::Stdout => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{}", json)?;
            }
            Target::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, json)?;
            }
        }
        Ok(())
    }
}
