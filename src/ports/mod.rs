//! Port traits the domain consumes.

pub mod config_port;
pub mod data_port;
pub mod result_port;
pub mod strategy_port;
