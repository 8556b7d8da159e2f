//! Core domain types and logic.

pub mod backtest;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod live;
pub mod metrics;
pub mod portfolio;
pub mod position;
pub mod price;
pub mod ranking;
pub mod rotation;
pub mod signals;
pub mod structure;
pub mod top_list;
pub mod trend;
pub mod universe;
