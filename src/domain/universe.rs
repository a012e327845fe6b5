//! Universe parsing and pre-run validation for multi-security backtests.
//!
//! Parses comma-separated symbol lists from configuration and checks each
//! symbol has enough bars in range before the pipeline touches it.

use crate::domain::error::BacklabError;
use crate::ports::DataPort;
use chrono::NaiveDate;
use log::{info, warn};
use std::collections::HashSet;

pub const MIN_BARS: usize = 30;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("no symbol in the universe passed validation")]
    AllSymbolsFailed,
}

/// Split a comma-separated symbol list, trimming and uppercasing each
/// token. Empty tokens and duplicates reject the whole list.
pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug, Clone)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
}

#[derive(Debug)]
pub struct UniverseValidation {
    pub symbols: Vec<String>,
    pub skipped: Vec<SkippedSymbol>,
}

/// Probe every symbol through the data port, dropping any that cannot be
/// fetched or has fewer than `MIN_BARS` bars in range. An all-skip outcome
/// is an error; partial skips are logged and carried in the result.
pub fn validate_universe(
    data_port: &dyn DataPort,
    symbols: Vec<String>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<UniverseValidation, BacklabError> {
    let mut valid = Vec::new();
    let mut skipped = Vec::new();

    for symbol in symbols {
        let bars = match data_port.fetch_bars(&symbol, start, end) {
            Ok(bars) => bars,
            Err(e) => {
                warn!("skipping {symbol}: {e}");
                skipped.push(SkippedSymbol {
                    symbol,
                    reason: SkipReason::NoData,
                });
                continue;
            }
        };

        if bars.is_empty() {
            warn!("skipping {symbol}: no bars in range");
            skipped.push(SkippedSymbol {
                symbol,
                reason: SkipReason::NoData,
            });
            continue;
        }

        if bars.len() < MIN_BARS {
            warn!(
                "skipping {symbol}: only {} bars, minimum {MIN_BARS} required",
                bars.len()
            );
            skipped.push(SkippedSymbol {
                symbol,
                reason: SkipReason::InsufficientBars { bars: bars.len() },
            });
            continue;
        }

        info!("{symbol}: {} bars ok", bars.len());
        valid.push(symbol);
    }

    if valid.is_empty() {
        return Err(UniverseError::AllSymbolsFailed.into());
    }

    if !skipped.is_empty() {
        info!(
            "backtesting {} of {} symbols",
            valid.len(),
            valid.len() + skipped.len()
        );
    }

    Ok(UniverseValidation {
        symbols: valid,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;

    #[test]
    fn parse_basic_list() {
        let result = parse_symbols("CBA,BHP,WBC,NAB").unwrap();
        assert_eq!(result, vec!["CBA", "BHP", "WBC", "NAB"]);
    }

    #[test]
    fn parse_trims_and_uppercases() {
        let result = parse_symbols("  cba , bhp ,wbc  ").unwrap();
        assert_eq!(result, vec!["CBA", "BHP", "WBC"]);
    }

    #[test]
    fn parse_rejects_empty_token() {
        assert!(matches!(
            parse_symbols("CBA,,BHP"),
            Err(UniverseError::EmptyToken)
        ));
    }

    #[test]
    fn parse_rejects_duplicate() {
        assert!(matches!(
            parse_symbols("CBA,bhp,BHP"),
            Err(UniverseError::DuplicateSymbol(s)) if s == "BHP"
        ));
    }

    struct StubPort {
        bars_per_symbol: usize,
    }

    impl DataPort for StubPort {
        fn fetch_bars(
            &self,
            symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<Bar>, BacklabError> {
            if symbol == "MISSING" {
                return Err(BacklabError::UnknownSecurity {
                    symbol: symbol.to_string(),
                });
            }
            Ok((0..self.bars_per_symbol)
                .map(|i| Bar {
                    date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                        + chrono::Days::new(i as u64),
                    open: 1.0,
                    high: 1.0,
                    low: 1.0,
                    close: 1.0,
                    volume: 100,
                })
                .collect())
        }

        fn list_symbols(&self) -> Result<Vec<String>, BacklabError> {
            Ok(Vec::new())
        }
    }

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn validation_skips_unfetchable_symbols() {
        let port = StubPort {
            bars_per_symbol: 60,
        };
        let result = validate_universe(
            &port,
            vec!["CBA".into(), "MISSING".into()],
            jan(1),
            jan(31),
        )
        .unwrap();

        assert_eq!(result.symbols, vec!["CBA"]);
        assert_eq!(result.skipped.len(), 1);
        assert!(matches!(result.skipped[0].reason, SkipReason::NoData));
    }

    #[test]
    fn validation_skips_thin_history() {
        let port = StubPort { bars_per_symbol: 5 };
        let err = validate_universe(&port, vec!["CBA".into()], jan(1), jan(31)).unwrap_err();
        assert!(matches!(
            err,
            BacklabError::Universe(UniverseError::AllSymbolsFailed)
        ));
    }
}
