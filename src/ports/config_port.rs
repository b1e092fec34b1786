//! Configuration access port trait.
//!
//! Sections are dotted for per-strategy parameters, e.g. `strategy.breakout`.

pub trait ConfigPort {
    /// Trimmed value, `None` when absent or blank.
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    /// Absent or unparseable values yield `default`.
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
}
