//! Signal descriptors and row-wise evaluation.

use crate::domain::expr::Expr;
use crate::domain::table::SecurityTable;
use serde::{Deserialize, Serialize};

/// The trade direction a signal argues for when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Buy,
    Sell,
}

/// A declared signal: a named boolean predicate with a direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub name: String,
    pub expr: Expr,
    pub direction: Direction,
}

/// Evaluate a predicate over every row of a table.
pub fn evaluate_signal(table: &SecurityTable, expr: &Expr) -> Vec<bool> {
    (0..table.len()).map(|row| expr.evaluate(table, row)).collect()
}
