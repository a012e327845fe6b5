//! Sequential backtest executor.
//!
//! Replays compiled decision streams over the union timeline of every
//! security, mutating a single cash-and-positions account. The executor is
//! deterministic: sells settle before buys on each date, securities are
//! visited in the caller-supplied universe order, and identical inputs
//! always produce an identical ledger.

use crate::domain::compile::Decision;
use crate::domain::error::BacklabError;
use crate::domain::ledger::{Ledger, LedgerEntry, Position, PositionSnapshot, Trade, TradeSide};
use crate::domain::table::{union_timeline, SecurityTable};
use std::collections::HashMap;

/// How freed cash is committed to the date's buyers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AllocationPolicy {
    /// Split available cash evenly across every security buying that date.
    EqualWeight,
    /// Commit a fixed fraction of remaining cash to each buyer in turn.
    FixedFraction(f64),
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        AllocationPolicy::EqualWeight
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionConfig {
    pub starting_cash: f64,
    pub allocation: AllocationPolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            starting_cash: 100_000.0,
            allocation: AllocationPolicy::EqualWeight,
        }
    }
}

/// Replay one decision stream per security over the union timeline.
pub fn run(
    tables: &[SecurityTable],
    decisions: &HashMap<String, Vec<Decision>>,
    config: &ExecutionConfig,
) -> Result<Ledger, BacklabError> {
    for table in tables {
        let stream = decisions
            .get(&table.symbol)
            .ok_or_else(|| BacklabError::UnknownSecurity {
                symbol: table.symbol.clone(),
            })?;
        if stream.len() != table.len() {
            return Err(BacklabError::InvalidSeries {
                symbol: table.symbol.clone(),
                reason: format!(
                    "decision stream has {} rows but the series has {}",
                    stream.len(),
                    table.len()
                ),
            });
        }
    }

    let timeline = union_timeline(tables);
    let mut cash = config.starting_cash;
    let mut positions: HashMap<String, Position> = HashMap::new();
    let mut last_close: HashMap<String, f64> = HashMap::new();
    let mut ledger = Ledger::new();

    for date in &timeline {
        let mut trades = Vec::new();

        // Sells settle first so freed cash is available to the same date's
        // buyers.
        for table in tables {
            let Some(row) = table.row_index(*date) else {
                continue;
            };
            let price = table.bars()[row].close;
            last_close.insert(table.symbol.clone(), price);

            if decisions[&table.symbol][row] != Decision::Sell {
                continue;
            }
            let Some(position) = positions.remove(&table.symbol) else {
                continue;
            };
            let proceeds = position.market_value(price);
            cash += proceeds;
            trades.push(Trade {
                date: *date,
                symbol: table.symbol.clone(),
                side: TradeSide::Sell,
                quantity: position.quantity,
                price,
                value: proceeds,
            });
        }

        let buyers: Vec<&SecurityTable> = tables
            .iter()
            .filter(|t| {
                t.row_index(*date)
                    .is_some_and(|row| decisions[&t.symbol][row] == Decision::Buy)
            })
            .collect();

        let equal_slice = if buyers.is_empty() {
            0.0
        } else {
            cash / buyers.len() as f64
        };

        for table in &buyers {
            let Some(row) = table.row_index(*date) else {
                continue;
            };
            let price = table.bars()[row].close;
            let budget = match config.allocation {
                AllocationPolicy::EqualWeight => equal_slice.min(cash),
                AllocationPolicy::FixedFraction(fraction) => (cash * fraction).min(cash),
            };
            if price <= 0.0 {
                continue;
            }
            let quantity = (budget / price).floor() as i64;
            if quantity <= 0 {
                continue;
            }
            let cost = quantity as f64 * price;
            cash -= cost;
            positions
                .entry(table.symbol.clone())
                .and_modify(|p| {
                    let total_cost = p.avg_cost * p.quantity as f64 + cost;
                    p.quantity += quantity;
                    p.avg_cost = total_cost / p.quantity as f64;
                })
                .or_insert(Position {
                    quantity,
                    avg_cost: price,
                });
            trades.push(Trade {
                date: *date,
                symbol: table.symbol.clone(),
                side: TradeSide::Buy,
                quantity,
                price,
                value: cost,
            });
        }

        // Value held positions at the latest known close. A symbol with no
        // bar yet contributes nothing (it cannot hold a position before its
        // first bar).
        let mut snapshots: Vec<PositionSnapshot> = Vec::new();
        for table in tables {
            let Some(position) = positions.get(&table.symbol) else {
                continue;
            };
            let price = last_close.get(&table.symbol).copied().unwrap_or(0.0);
            snapshots.push(PositionSnapshot {
                symbol: table.symbol.clone(),
                quantity: position.quantity,
                avg_cost: position.avg_cost,
                market_value: position.market_value(price),
            });
        }
        let total_value = cash + snapshots.iter().map(|s| s.market_value).sum::<f64>();

        ledger.push(LedgerEntry {
            date: *date,
            cash,
            positions: snapshots,
            total_value,
            trades,
        });
    }

    Ok(ledger)
}
