//! CSV file data adapter.
//!
//! Serves bars from a directory of `<SYMBOL>.csv` files with a
//! `date,open,high,low,close,volume` header. A symbol with no file is an
//! unknown security; a malformed file is a data-source error.

use crate::domain::bar::Bar;
use crate::domain::error::BacklabError;
use crate::ports::DataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol.to_uppercase()))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, BacklabError> {
        let path = self.csv_path(symbol);
        if !path.is_file() {
            return Err(BacklabError::UnknownSecurity {
                symbol: symbol.to_string(),
            });
        }

        let mut reader = csv::Reader::from_path(&path).map_err(|e| BacklabError::DataSource {
            reason: format!("failed to open {}: {}", path.display(), e),
        })?;

        let mut bars = Vec::new();
        for result in reader.deserialize::<CsvRow>() {
            let row = result.map_err(|e| BacklabError::DataSource {
                reason: format!("{}: {}", path.display(), e),
            })?;
            if row.date < start || row.date > end {
                continue;
            }
            bars.push(Bar {
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, BacklabError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| BacklabError::DataSource {
            reason: format!("failed to read {}: {}", self.base_path.display(), e),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| BacklabError::DataSource {
                    reason: format!("failed to read {}: {}", self.base_path.display(), e),
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    symbols.push(stem.to_uppercase());
                }
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}
