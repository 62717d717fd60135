//! Core domain types and logic.

pub mod orderbook;
pub mod config;
pub mod features;
pub mod model;
pub mod execution;
pub mod simulator;
pub mod backtest;
pub mod diagnostics;
pub mod review;
pub mod autotune;
pub mod dependencies;
pub mod error;
