//! Core domain types and logic.

pub mod instrument;
pub mod price_series;
pub mod position;
pub mod portfolio;
pub mod ledger;
pub mod risk;
pub mod scheduler;
pub mod expiry;
pub mod universe;
pub mod information;
pub mod chain;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
