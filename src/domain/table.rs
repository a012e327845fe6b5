//! Per-security tables and the shared calendar.
//!
//! A [`SecurityTable`] holds one security's ordered bars plus any derived
//! numeric columns appended by the indicator pipeline and any boolean columns
//! produced by the signal engine. Raw OHLCV fields are addressable by the
//! column names OPEN, HIGH, LOW, CLOSE and VOLUME. Derived values use
//! `Option<f64>`: `None` marks a warmup gap where the generator had no
//! resolvable window yet.

use crate::domain::bar::Bar;
use crate::domain::error::BacklabError;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

pub const RAW_COLUMNS: [&str; 5] = ["OPEN", "HIGH", "LOW", "CLOSE", "VOLUME"];

#[derive(Debug, Clone)]
pub struct SecurityTable {
    pub symbol: String,
    bars: Vec<Bar>,
    date_index: HashMap<NaiveDate, usize>,
    derived_order: Vec<String>,
    derived: HashMap<String, Vec<Option<f64>>>,
    signals: HashMap<String, Vec<bool>>,
}

impl SecurityTable {
    /// Build a table from already-fetched bars. Dates must be strictly
    /// increasing; duplicates or out-of-order rows reject the whole series.
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, BacklabError> {
        let symbol = symbol.into();
        for pair in bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(BacklabError::InvalidSeries {
                    symbol,
                    reason: format!(
                        "dates not strictly increasing: {} then {}",
                        pair[0].date, pair[1].date
                    ),
                });
            }
        }
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Ok(Self {
            symbol,
            bars,
            date_index,
            derived_order: Vec::new(),
            derived: HashMap::new(),
            signals: HashMap::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn bar(&self, row: usize) -> &Bar {
        &self.bars[row]
    }

    pub fn row_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    /// True when `name` resolves to a raw OHLCV field or a derived column.
    /// Raw names match case-insensitively; derived names are exact.
    pub fn has_column(&self, name: &str) -> bool {
        RAW_COLUMNS.contains(&name.to_ascii_uppercase().as_str()) || self.derived.contains_key(name)
    }

    /// Resolve a column value at a row. Raw fields always resolve; derived
    /// columns may be `None` in their warmup gap; unknown names are `None`
    /// (callers pre-flight existence with [`Self::has_column`]).
    pub fn value(&self, name: &str, row: usize) -> Option<f64> {
        if row >= self.bars.len() {
            return None;
        }
        match name.to_ascii_uppercase().as_str() {
            "OPEN" => Some(self.bars[row].open),
            "HIGH" => Some(self.bars[row].high),
            "LOW" => Some(self.bars[row].low),
            "CLOSE" => Some(self.bars[row].close),
            "VOLUME" => Some(self.bars[row].volume as f64),
            _ => self.derived.get(name).and_then(|col| col[row]),
        }
    }

    /// Append a derived column. The caller checks for duplicates first; the
    /// length must match the bar count.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        let name = name.into();
        debug_assert_eq!(values.len(), self.bars.len());
        debug_assert!(!self.has_column(&name));
        self.derived_order.push(name.clone());
        self.derived.insert(name, values);
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.derived.get(name).map(|v| v.as_slice())
    }

    /// Derived column names in append order.
    pub fn derived_columns(&self) -> &[String] {
        &self.derived_order
    }

    pub fn add_signal_column(&mut self, name: impl Into<String>, values: Vec<bool>) {
        debug_assert_eq!(values.len(), self.bars.len());
        self.signals.insert(name.into(), values);
    }

    pub fn signal_column(&self, name: &str) -> Option<&[bool]> {
        self.signals.get(name).map(|v| v.as_slice())
    }
}

/// Merge every table's dates into one strictly increasing shared calendar.
pub fn union_timeline(tables: &[SecurityTable]) -> Vec<NaiveDate> {
    let unique: BTreeSet<NaiveDate> = tables
        .iter()
        .flat_map(|t| t.bars.iter().map(|bar| bar.date))
        .collect();
    unique.into_iter().collect()
}
