//! Core domain types and logic.

pub mod kline;
pub mod info;
pub mod error;
pub mod strategy;
pub mod indicator;
pub mod rule;
pub mod rule_parser;
pub mod rule_eval;
pub mod script;
pub mod group;
pub mod builtin;
pub mod registry;
pub mod settings;
pub mod position;
pub mod execution;
pub mod metrics;
pub mod backtest;
pub mod screener;
pub mod config_validation;
