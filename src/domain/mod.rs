//! Core backtesting logic, independent of any adapter.

pub mod bar;
pub mod compile;
pub mod config_validation;
pub mod error;
pub mod executor;
pub mod expr;
pub mod expr_parser;
pub mod generator;
pub mod ledger;
pub mod optimizer;
pub mod signal;
pub mod strategy;
pub mod table;
pub mod universe;
