//! The ledger: the backtest's append-only output of record.
//!
//! External reporting and statistics collaborators consume these types, so
//! their shape is a stable, serde-serializable contract.

use crate::domain::error::BacklabError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// An open holding in one security.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub quantity: i64,
    pub avg_cost: f64,
}

impl Position {
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One executed trade event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub date: NaiveDate,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: i64,
    pub price: f64,
    pub value: f64,
}

/// Snapshot of one security's position inside a ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub quantity: i64,
    pub avg_cost: f64,
    pub market_value: f64,
}

/// One date's account state: cash, open positions, total value, and the
/// trades executed that date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub date: NaiveDate,
    pub cash: f64,
    pub positions: Vec<PositionSnapshot>,
    pub total_value: f64,
    pub trades: Vec<Trade>,
}

/// Append-only sequence of ledger entries, one per simulated date.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ledger {
    pub entries: Vec<LedgerEntry>,
}

/// Flat per-date row for CSV export (the equity-curve shape chart consumers
/// expect).
#[derive(Debug, Serialize)]
struct LedgerCsvRow {
    date: NaiveDate,
    cash: f64,
    total_value: f64,
    open_positions: usize,
    trades: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger::default()
    }

    pub fn push(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total account value on the last simulated date.
    pub fn final_value(&self) -> Option<f64> {
        self.entries.last().map(|e| e.total_value)
    }

    /// Every trade across the whole run, in execution order.
    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.entries.iter().flat_map(|e| e.trades.iter())
    }

    /// Write the equity curve as CSV, one row per date.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), BacklabError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for entry in &self.entries {
            csv_writer
                .serialize(LedgerCsvRow {
                    date: entry.date,
                    cash: entry.cash,
                    total_value: entry.total_value,
                    open_positions: entry.positions.len(),
                    trades: entry.trades.len(),
                })
                .map_err(|e| BacklabError::DataSource {
                    reason: format!("ledger CSV write failed: {}", e),
                })?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(day: u32, cash: f64, total_value: f64, trades: Vec<Trade>) -> LedgerEntry {
        LedgerEntry {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            cash,
            positions: Vec::new(),
            total_value,
            trades,
        }
    }

    #[test]
    fn position_market_value() {
        let pos = Position {
            quantity: 100,
            avg_cost: 50.0,
        };
        assert!((pos.market_value(55.0) - 5500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn final_value_is_last_entry() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.final_value(), None);

        ledger.push(entry(1, 100.0, 100.0, Vec::new()));
        ledger.push(entry(2, 100.0, 105.0, Vec::new()));
        assert_eq!(ledger.final_value(), Some(105.0));
    }

    #[test]
    fn trades_iterates_in_execution_order() {
        let trade = |day: u32, symbol: &str| Trade {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            symbol: symbol.into(),
            side: TradeSide::Buy,
            quantity: 10,
            price: 100.0,
            value: 1000.0,
        };

        let mut ledger = Ledger::new();
        ledger.push(entry(1, 0.0, 0.0, vec![trade(1, "A"), trade(1, "B")]));
        ledger.push(entry(2, 0.0, 0.0, vec![trade(2, "A")]));

        let symbols: Vec<&str> = ledger.trades().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, ["A", "B", "A"]);
    }

    #[test]
    fn csv_export_one_row_per_date() {
        let mut ledger = Ledger::new();
        ledger.push(entry(1, 100000.0, 100000.0, Vec::new()));
        ledger.push(entry(2, 10.0, 100000.0, Vec::new()));

        let mut buf = Vec::new();
        ledger.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let lines: Vec<&str> = text.trim().lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "date,cash,total_value,open_positions,trades");
        assert!(lines[1].starts_with("2024-01-01,"));
        assert!(lines[2].starts_with("2024-01-02,10"));
    }
}
