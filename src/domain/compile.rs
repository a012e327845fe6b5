//! Decision compilation: merging signal columns into one trade decision
//! per security per date.
//!
//! Precedence when listed signals disagree on a date: any sell-direction
//! signal wins over any buy-direction signal, biasing toward risk reduction.

use crate::domain::signal::{Direction, SignalSpec};
use crate::domain::table::SecurityTable;
use serde::{Deserialize, Serialize};

/// The compiled, conflict-resolved outcome for one (security, date).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Buy,
    Sell,
    Hold,
}

/// Compile the listed signals (in order) into one decision per row.
///
/// Callers guarantee every listed spec has a matching signal column on the
/// table; the container's `compile` pre-flights that.
pub fn compile_decisions(table: &SecurityTable, listed: &[&SignalSpec]) -> Vec<Decision> {
    (0..table.len())
        .map(|row| {
            let fired = |direction: Direction| {
                listed.iter().any(|spec| {
                    spec.direction == direction
                        && table
                            .signal_column(&spec.name)
                            .is_some_and(|col| col[row])
                })
            };
            if fired(Direction::Sell) {
                Decision::Sell
            } else if fired(Direction::Buy) {
                Decision::Buy
            } else {
                Decision::Hold
            }
        })
        .collect()
}
