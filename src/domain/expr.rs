//! Predicate AST for trading signals.
//!
//! Signal predicates are explicit values bound to column names, resolved
//! against a table's schema at apply-time, never implicit scoping. Any
//! comparison touching an unresolved warmup gap evaluates to `false`.
//!
//! # Evaluation semantics
//!
//! - `CrossAbove`/`CrossBelow` need the previous row too and are `false` at row 0
//! - `And` short-circuits on the first `false`, `Or` on the first `true`

use crate::domain::table::SecurityTable;
use std::collections::BTreeSet;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(String),
    Constant(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Above { left: Operand, right: Operand },
    Below { left: Operand, right: Operand },
    AboveOrEqual { left: Operand, right: Operand },
    BelowOrEqual { left: Operand, right: Operand },
    Equals { left: Operand, right: Operand },
    CrossAbove { left: Operand, right: Operand },
    CrossBelow { left: Operand, right: Operand },
    Between { operand: Operand, lower: f64, upper: f64 },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Collect every column name the predicate references, for pre-flight
    /// schema checks.
    pub fn columns(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Above { left, right }
            | Expr::Below { left, right }
            | Expr::AboveOrEqual { left, right }
            | Expr::BelowOrEqual { left, right }
            | Expr::Equals { left, right }
            | Expr::CrossAbove { left, right }
            | Expr::CrossBelow { left, right } => {
                collect_operand(left, out);
                collect_operand(right, out);
            }
            Expr::Between { operand, .. } => collect_operand(operand, out),
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.columns(out);
                }
            }
            Expr::Not(e) => e.columns(out),
        }
    }

    /// Evaluate the predicate at one row of a table.
    pub fn evaluate(&self, table: &SecurityTable, row: usize) -> bool {
        match self {
            Expr::Above { left, right } => {
                compare(table, row, left, right, |l, r| l > r)
            }
            Expr::Below { left, right } => {
                compare(table, row, left, right, |l, r| l < r)
            }
            // Dedicated variants rather than Not(Below)/Not(Above): the gap
            // rule must make these false, and Not would flip that.
            Expr::AboveOrEqual { left, right } => {
                compare(table, row, left, right, |l, r| l >= r)
            }
            Expr::BelowOrEqual { left, right } => {
                compare(table, row, left, right, |l, r| l <= r)
            }
            Expr::Equals { left, right } => {
                compare(table, row, left, right, |l, r| (l - r).abs() < EPSILON)
            }
            Expr::CrossAbove { left, right } => {
                if row == 0 {
                    return false;
                }
                compare(table, row, left, right, |l, r| l > r)
                    && compare(table, row - 1, left, right, |l, r| l <= r)
            }
            Expr::CrossBelow { left, right } => {
                if row == 0 {
                    return false;
                }
                compare(table, row, left, right, |l, r| l < r)
                    && compare(table, row - 1, left, right, |l, r| l >= r)
            }
            Expr::Between {
                operand,
                lower,
                upper,
            } => match resolve(operand, table, row) {
                Some(v) => v >= *lower && v <= *upper,
                None => false,
            },
            Expr::And(exprs) => exprs.iter().all(|e| e.evaluate(table, row)),
            Expr::Or(exprs) => exprs.iter().any(|e| e.evaluate(table, row)),
            Expr::Not(e) => !e.evaluate(table, row),
        }
    }
}

fn collect_operand(operand: &Operand, out: &mut BTreeSet<String>) {
    if let Operand::Column(name) = operand {
        out.insert(name.clone());
    }
}

fn resolve(operand: &Operand, table: &SecurityTable, row: usize) -> Option<f64> {
    match operand {
        Operand::Column(name) => table.value(name, row),
        Operand::Constant(v) => Some(*v),
    }
}

fn compare(
    table: &SecurityTable,
    row: usize,
    left: &Operand,
    right: &Operand,
    cmp: impl Fn(f64, f64) -> bool,
) -> bool {
    match (resolve(left, table, row), resolve(right, table, row)) {
        (Some(l), Some(r)) => cmp(l, r),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use chrono::NaiveDate;

    fn make_table(closes: &[f64]) -> SecurityTable {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: NaiveDate::from_ymd_opt(2024, 1, (i + 1) as u32).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000,
            })
            .collect();
        SecurityTable::new("TEST", bars).unwrap()
    }

    fn col(name: &str) -> Operand {
        Operand::Column(name.into())
    }

    #[test]
    fn above_below_against_constant() {
        let table = make_table(&[100.0, 120.0]);

        let above = Expr::Above {
            left: col("CLOSE"),
            right: Operand::Constant(110.0),
        };
        assert!(!above.evaluate(&table, 0));
        assert!(above.evaluate(&table, 1));

        let below = Expr::Below {
            left: col("CLOSE"),
            right: Operand::Constant(110.0),
        };
        assert!(below.evaluate(&table, 0));
        assert!(!below.evaluate(&table, 1));
    }

    #[test]
    fn gap_comparisons_are_false() {
        let mut table = make_table(&[100.0, 120.0]);
        table.add_column("SMA_2", vec![None, Some(110.0)]);

        let above = Expr::Above {
            left: col("CLOSE"),
            right: col("SMA_2"),
        };
        assert!(!above.evaluate(&table, 0));
        assert!(above.evaluate(&table, 1));

        // NOT over a gap comparison is still the negation of false.
        let not = Expr::Not(Box::new(above));
        assert!(not.evaluate(&table, 0));
    }

    #[test]
    fn inclusive_comparisons_are_false_on_gaps() {
        let mut table = make_table(&[100.0, 120.0]);
        table.add_column("SMA_2", vec![None, Some(110.0)]);

        let gte = Expr::AboveOrEqual {
            left: col("CLOSE"),
            right: col("SMA_2"),
        };
        assert!(!gte.evaluate(&table, 0));
        assert!(gte.evaluate(&table, 1));

        let lte = Expr::BelowOrEqual {
            left: col("SMA_2"),
            right: col("CLOSE"),
        };
        assert!(!lte.evaluate(&table, 0));
        assert!(lte.evaluate(&table, 1));
    }

    #[test]
    fn inclusive_comparisons_honor_equality() {
        let table = make_table(&[100.0]);

        let gte = Expr::AboveOrEqual {
            left: col("CLOSE"),
            right: Operand::Constant(100.0),
        };
        assert!(gte.evaluate(&table, 0));

        let lte = Expr::BelowOrEqual {
            left: col("CLOSE"),
            right: Operand::Constant(100.0),
        };
        assert!(lte.evaluate(&table, 0));
    }

    #[test]
    fn cross_above_needs_previous_row() {
        let mut table = make_table(&[100.0, 100.0, 120.0]);
        table.add_column("LEVEL", vec![Some(110.0), Some(110.0), Some(110.0)]);

        let cross = Expr::CrossAbove {
            left: col("CLOSE"),
            right: col("LEVEL"),
        };
        assert!(!cross.evaluate(&table, 0));
        assert!(!cross.evaluate(&table, 1));
        assert!(cross.evaluate(&table, 2));
    }

    #[test]
    fn cross_below() {
        let mut table = make_table(&[120.0, 100.0]);
        table.add_column("LEVEL", vec![Some(110.0), Some(110.0)]);

        let cross = Expr::CrossBelow {
            left: col("CLOSE"),
            right: col("LEVEL"),
        };
        assert!(!cross.evaluate(&table, 0));
        assert!(cross.evaluate(&table, 1));
    }

    #[test]
    fn between_inclusive() {
        let table = make_table(&[100.0]);
        let between = Expr::Between {
            operand: col("CLOSE"),
            lower: 100.0,
            upper: 150.0,
        };
        assert!(between.evaluate(&table, 0));
    }

    #[test]
    fn and_or_not_composition() {
        let table = make_table(&[100.0]);

        let true_leaf = Expr::Equals {
            left: col("CLOSE"),
            right: Operand::Constant(100.0),
        };
        let false_leaf = Expr::Above {
            left: col("CLOSE"),
            right: Operand::Constant(200.0),
        };

        assert!(Expr::And(vec![true_leaf.clone(), true_leaf.clone()]).evaluate(&table, 0));
        assert!(!Expr::And(vec![true_leaf.clone(), false_leaf.clone()]).evaluate(&table, 0));
        assert!(Expr::Or(vec![false_leaf.clone(), true_leaf.clone()]).evaluate(&table, 0));
        assert!(!Expr::Or(vec![false_leaf.clone()]).evaluate(&table, 0));
        assert!(Expr::Not(Box::new(false_leaf)).evaluate(&table, 0));
    }

    #[test]
    fn columns_collects_every_reference() {
        let expr = Expr::And(vec![
            Expr::Above {
                left: col("CLOSE"),
                right: col("SMA_20"),
            },
            Expr::Not(Box::new(Expr::Below {
                left: col("RSI_14"),
                right: Operand::Constant(30.0),
            })),
        ]);

        let mut out = BTreeSet::new();
        expr.columns(&mut out);
        let names: Vec<&str> = out.iter().map(String::as_str).collect();
        assert_eq!(names, ["CLOSE", "RSI_14", "SMA_20"]);
    }
}
