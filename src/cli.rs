//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::{CsvAdapter, FileConfigAdapter};
use crate::domain::config_validation::{
    parse_data_settings, parse_execution_config, parse_strategy_definition,
    substitute_placeholder, DataSettings, StrategyDefinition, PLACEHOLDER,
};
use crate::domain::error::BacklabError;
use crate::domain::expr_parser;
use crate::domain::generator::GeneratorRegistry;
use crate::domain::optimizer::{optimize, parameter_range};
use crate::domain::strategy::Strategy;
use crate::domain::universe::{parse_symbols, validate_universe};
use crate::ports::{ConfigPort, DataPort};

#[derive(Parser, Debug)]
#[command(name = "backlab", about = "Signal-driven portfolio backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a configured backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the equity curve to a CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sweep the strategy's $PARAM placeholder over a range
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        /// Candidate range as lo:hi:step, e.g. 5:50:5
        #[arg(short, long)]
        range: String,
    },
    /// List the symbols the configured data directory can serve
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Check a configuration without fetching data or running
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest { config, output } => run_backtest(&config, output.as_deref()),
        Command::Optimize { config, range } => run_optimize(&config, &range),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Validate { config } => run_validate(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Fetch the universe and drive the whole pipeline from a parsed definition.
fn build_strategy(
    definition: &StrategyDefinition,
    data: &DataSettings,
) -> Result<Strategy, BacklabError> {
    let symbols = parse_symbols(&data.universe)?;
    let adapter = CsvAdapter::new(data.csv_dir.clone());
    let validation = validate_universe(&adapter, symbols, data.start, data.end)?;

    let mut strategy = Strategy::load(
        definition.name.clone(),
        &adapter,
        &validation.symbols,
        data.start,
        data.end,
    )?;
    for spec in &definition.indicators {
        strategy.add_indicator(spec.clone())?;
    }
    for signal in &definition.signals {
        strategy.add_signal(signal.name.clone(), &signal.predicate, signal.direction)?;
    }
    let listed: Vec<&str> = definition.compile.iter().map(String::as_str).collect();
    strategy.compile(&listed)?;
    Ok(strategy)
}

fn run_backtest(config_path: &Path, output: Option<&Path>) -> Result<(), BacklabError> {
    let adapter = FileConfigAdapter::from_file(config_path)?;
    let data = parse_data_settings(&adapter)?;
    let exec = parse_execution_config(&adapter)?;
    let definition = parse_strategy_definition(&adapter)?;

    info!(
        "running {} over {} to {}",
        definition.name, data.start, data.end
    );
    let mut strategy = build_strategy(&definition, &data)?;
    strategy.run_backtest(&exec)?;

    let ledger = strategy.ledger().ok_or(BacklabError::NotCompiled)?;
    println!("strategy:    {}", strategy.name());
    println!("dates:       {}", ledger.len());
    println!("trades:      {}", ledger.trades().count());
    if let Some(value) = ledger.final_value() {
        println!("final value: {value:.2}");
    }

    if let Some(path) = output {
        let file = fs::File::create(path)?;
        ledger.write_csv(file)?;
        info!("wrote equity curve to {}", path.display());
    }
    Ok(())
}

fn run_optimize(config_path: &Path, range_text: &str) -> Result<(), BacklabError> {
    let content = fs::read_to_string(config_path)?;
    if !content.contains(PLACEHOLDER) {
        return Err(BacklabError::ConfigInvalid {
            section: "strategy".into(),
            key: "indicators".into(),
            reason: format!("config has no {PLACEHOLDER} placeholder to sweep"),
        });
    }

    let (lo, hi, step) = parse_range(range_text)?;
    let candidates = parameter_range(lo, hi, step);
    info!("sweeping {PLACEHOLDER} over {} candidates", candidates.len());

    let report = optimize(&candidates, |parameter| {
        let adapter = FileConfigAdapter::from_string(&substitute_placeholder(&content, parameter))?;
        let data = parse_data_settings(&adapter)?;
        let exec = parse_execution_config(&adapter)?;
        let definition = parse_strategy_definition(&adapter)?;

        let mut strategy = build_strategy(&definition, &data)?;
        strategy.run_backtest(&exec)?;
        strategy.require_full_history()?;
        Ok(strategy)
    })?;

    println!("{:>10}  {:>14}", "parameter", "final value");
    for trial in &report.trials {
        println!("{:>10}  {:>14.2}", trial.parameter, trial.objective);
    }
    match &report.best {
        Some(best) => println!(
            "best: {} with final value {:.2} ({} of {} trials succeeded)",
            best.parameter,
            best.objective,
            report.trials.len(),
            report.trial_count
        ),
        None => println!("no trial succeeded ({} attempted)", report.trial_count),
    }
    Ok(())
}

fn parse_range(text: &str) -> Result<(f64, f64, f64), BacklabError> {
    let invalid = || BacklabError::ConfigInvalid {
        section: "cli".into(),
        key: "range".into(),
        reason: format!("`{text}` is not lo:hi:step"),
    };
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }
    let lo: f64 = parts[0].trim().parse().map_err(|_| invalid())?;
    let hi: f64 = parts[1].trim().parse().map_err(|_| invalid())?;
    let step: f64 = parts[2].trim().parse().map_err(|_| invalid())?;
    Ok((lo, hi, step))
}

fn run_list_symbols(config_path: &Path) -> Result<(), BacklabError> {
    let adapter = FileConfigAdapter::from_file(config_path)?;
    let csv_dir =
        adapter
            .get_string("data", "csv_dir")?
            .ok_or_else(|| BacklabError::ConfigMissing {
                section: "data".into(),
                key: "csv_dir".into(),
            })?;

    let data_port = CsvAdapter::new(PathBuf::from(csv_dir));
    for symbol in data_port.list_symbols()? {
        println!("{symbol}");
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), BacklabError> {
    let adapter = FileConfigAdapter::from_file(config_path)?;
    let data = parse_data_settings(&adapter)?;
    parse_execution_config(&adapter)?;
    let definition = parse_strategy_definition(&adapter)?;

    parse_symbols(&data.universe)?;

    let registry = GeneratorRegistry::standard();
    for spec in &definition.indicators {
        registry.resolve(&spec.generator)?;
    }
    for signal in &definition.signals {
        if let Err(e) = expr_parser::parse(&signal.predicate) {
            eprintln!("in signal {}:", signal.name);
            eprintln!("{}", e.display_with_context(&signal.predicate));
            return Err(e.into());
        }
    }
    for name in &definition.compile {
        if !definition.signals.iter().any(|s| s.name == *name) {
            return Err(BacklabError::UnknownSignal { name: name.clone() });
        }
    }

    println!(
        "{}: ok ({} indicators, {} signals, {} compiled)",
        definition.name,
        definition.indicators.len(),
        definition.signals.len(),
        definition.compile.len()
    );
    Ok(())
}
