#![allow(dead_code)]

use backlab::domain::bar::Bar;
use backlab::domain::error::BacklabError;
use backlab::ports::DataPort;
use chrono::NaiveDate;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, BacklabError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(BacklabError::DataSource {
                reason: reason.clone(),
            });
        }
        match self.data.get(symbol) {
            None => Err(BacklabError::UnknownSecurity {
                symbol: symbol.to_string(),
            }),
            Some(bars) => Ok(bars
                .iter()
                .filter(|b| b.date >= start && b.date <= end)
                .cloned()
                .collect()),
        }
    }

    fn list_symbols(&self) -> Result<Vec<String>, BacklabError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn date(text: &str) -> NaiveDate {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
}

pub fn make_bar(day: &str, close: f64) -> Bar {
    Bar {
        date: date(day),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 100_000,
    }
}

/// Bars on consecutive calendar days starting 2024-01-01, one per close.
pub fn daily_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(i as u64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100_000,
        })
        .collect()
}
