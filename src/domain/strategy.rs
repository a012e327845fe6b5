//! The strategy container: named state threaded through the whole pipeline.
//!
//! A [`Strategy`] owns the per-security tables and accumulates indicator
//! declarations, signal declarations, compiled decisions and finally the
//! backtest ledger. Pipeline methods return `Result<&mut Self, _>` so runs
//! chain with `?`, and every method pre-flights its inputs before mutating:
//! a failed call leaves the container exactly as it was.

use crate::domain::compile::{compile_decisions, Decision};
use crate::domain::error::BacklabError;
use crate::domain::executor::{self, ExecutionConfig};
use crate::domain::expr_parser;
use crate::domain::generator::{
    apply_generator, GeneratorFn, GeneratorRegistry, HistoryGap, IndicatorSpec,
};
use crate::domain::ledger::Ledger;
use crate::domain::signal::{evaluate_signal, Direction, SignalSpec};
use crate::domain::table::SecurityTable;
use crate::ports::DataPort;
use chrono::NaiveDate;
use log::warn;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct Strategy {
    name: String,
    tables: Vec<SecurityTable>,
    registry: GeneratorRegistry,
    indicators: Vec<IndicatorSpec>,
    signals: Vec<SignalSpec>,
    compiled: Option<HashMap<String, Vec<Decision>>>,
    ledger: Option<Ledger>,
    history_gaps: Vec<HistoryGap>,
}

impl Strategy {
    /// Wrap already-fetched tables. Symbols must be unique.
    pub fn new(name: impl Into<String>, tables: Vec<SecurityTable>) -> Result<Self, BacklabError> {
        let mut seen = BTreeSet::new();
        for table in &tables {
            if !seen.insert(table.symbol.clone()) {
                return Err(BacklabError::InvalidSeries {
                    symbol: table.symbol.clone(),
                    reason: "symbol appears more than once in the universe".into(),
                });
            }
        }
        Ok(Strategy {
            name: name.into(),
            tables,
            registry: GeneratorRegistry::standard(),
            indicators: Vec::new(),
            signals: Vec::new(),
            compiled: None,
            ledger: None,
            history_gaps: Vec::new(),
        })
    }

    /// Initialize a strategy by fetching every symbol through a data port.
    pub fn load(
        name: impl Into<String>,
        data_port: &dyn DataPort,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, BacklabError> {
        let mut tables = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let bars = data_port.fetch_bars(symbol, start, end)?;
            if bars.is_empty() {
                return Err(BacklabError::UnknownSecurity {
                    symbol: symbol.clone(),
                });
            }
            tables.push(SecurityTable::new(symbol.clone(), bars)?);
        }
        Strategy::new(name, tables)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tables(&self) -> &[SecurityTable] {
        &self.tables
    }

    pub fn table(&self, symbol: &str) -> Result<&SecurityTable, BacklabError> {
        self.tables
            .iter()
            .find(|t| t.symbol == symbol)
            .ok_or_else(|| BacklabError::UnknownSecurity {
                symbol: symbol.to_string(),
            })
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.symbol.as_str()).collect()
    }

    pub fn indicators(&self) -> &[IndicatorSpec] {
        &self.indicators
    }

    pub fn signals(&self) -> &[SignalSpec] {
        &self.signals
    }

    /// Windows that exceeded a security's history. The affected columns are
    /// all gaps; see [`Self::require_full_history`] for the strict view.
    pub fn history_gaps(&self) -> &[HistoryGap] {
        &self.history_gaps
    }

    /// Extend the capability set with a custom generator.
    pub fn register_generator(&mut self, name: &str, generator: GeneratorFn) -> &mut Self {
        self.registry.register(name, generator);
        self
    }

    /// Declare an indicator and compute its column on every security.
    ///
    /// The column name must be new across the whole universe. A window
    /// longer than a security's history is not an error: the column is
    /// appended as all gaps and the shortfall is recorded as a
    /// [`HistoryGap`].
    pub fn add_indicator(&mut self, spec: IndicatorSpec) -> Result<&mut Self, BacklabError> {
        if self.tables.iter().any(|t| t.has_column(&spec.name)) {
            return Err(BacklabError::DuplicateIndicator {
                name: spec.name.clone(),
            });
        }
        let generator = self.registry.resolve(&spec.generator)?;

        // Compute every column before appending any so a failure on one
        // security leaves the whole container untouched.
        let mut computed = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            let column = apply_generator(table, &spec.generator, generator, &spec.args)?;
            if !table.is_empty() && column.iter().all(Option::is_none) {
                warn!(
                    "indicator {} on {}: window {} exceeds {} rows of history",
                    spec.name,
                    table.symbol,
                    spec.args.period,
                    table.len()
                );
                self.history_gaps.push(HistoryGap {
                    symbol: table.symbol.clone(),
                    column: spec.name.clone(),
                    have: table.len(),
                    need: spec.args.period,
                });
            }
            computed.push(column);
        }
        for (table, column) in self.tables.iter_mut().zip(computed) {
            table.add_column(spec.name.clone(), column);
        }
        self.indicators.push(spec);
        self.invalidate();
        Ok(self)
    }

    /// Declare a named signal from a predicate expression and evaluate it
    /// into a boolean column on every security.
    pub fn add_signal(
        &mut self,
        name: impl Into<String>,
        predicate: &str,
        direction: Direction,
    ) -> Result<&mut Self, BacklabError> {
        let name = name.into();
        if self.signals.iter().any(|s| s.name == name) {
            return Err(BacklabError::DuplicateSignal { name });
        }
        let expr = expr_parser::parse(predicate)?;

        let mut referenced = BTreeSet::new();
        expr.columns(&mut referenced);
        for column in &referenced {
            if let Some(table) = self.tables.iter().find(|t| !t.has_column(column)) {
                warn!(
                    "signal {}: column {} is not defined on {}",
                    name, column, table.symbol
                );
                return Err(BacklabError::UndefinedColumn {
                    column: column.clone(),
                });
            }
        }

        for table in &mut self.tables {
            let fired = evaluate_signal(table, &expr);
            table.add_signal_column(name.clone(), fired);
        }
        self.signals.push(SignalSpec {
            name,
            expr,
            direction,
        });
        self.invalidate();
        Ok(self)
    }

    /// Compile the listed signals into one decision stream per security.
    /// Signals declared but not listed are ignored.
    pub fn compile(&mut self, listed: &[&str]) -> Result<&mut Self, BacklabError> {
        let mut specs = Vec::with_capacity(listed.len());
        for name in listed {
            let spec = self
                .signals
                .iter()
                .find(|s| s.name == *name)
                .ok_or_else(|| BacklabError::UnknownSignal {
                    name: name.to_string(),
                })?;
            specs.push(spec);
        }
        let compiled = self
            .tables
            .iter()
            .map(|table| (table.symbol.clone(), compile_decisions(table, &specs)))
            .collect();
        self.compiled = Some(compiled);
        self.ledger = None;
        Ok(self)
    }

    pub fn decisions(&self) -> Option<&HashMap<String, Vec<Decision>>> {
        self.compiled.as_ref()
    }

    /// Replay the compiled decisions through the executor.
    pub fn run_backtest(&mut self, config: &ExecutionConfig) -> Result<&mut Self, BacklabError> {
        let decisions = self.compiled.as_ref().ok_or(BacklabError::NotCompiled)?;
        let ledger = executor::run(&self.tables, decisions, config)?;
        self.ledger = Some(ledger);
        Ok(self)
    }

    pub fn ledger(&self) -> Option<&Ledger> {
        self.ledger.as_ref()
    }

    /// Final account value of the last backtest run.
    pub fn final_value(&self) -> Option<f64> {
        self.ledger.as_ref().and_then(Ledger::final_value)
    }

    /// Promote the first recorded history shortfall to a hard error. Strict
    /// callers (the optimizer's trial closures in particular) use this to
    /// reject parameterizations that out-window their data.
    pub fn require_full_history(&self) -> Result<(), BacklabError> {
        match self.history_gaps.first() {
            None => Ok(()),
            Some(gap) => Err(BacklabError::InsufficientHistory {
                symbol: gap.symbol.clone(),
                column: gap.column.clone(),
                have: gap.have,
                need: gap.need,
            }),
        }
    }

    // Declarations changed after a compile: the old decisions no longer
    // reflect the container.
    fn invalidate(&mut self) {
        self.compiled = None;
        self.ledger = None;
    }
}
