//! Translation from raw configuration keys to validated domain settings.
//!
//! Three sections drive a run. `[data]` locates the bar store and the
//! universe, `[backtest]` shapes execution, and `[strategy]` declares the
//! pipeline: semicolon-separated indicator and signal entries plus the
//! compile list. A `$PARAM` placeholder anywhere in the strategy section is
//! the optimizer's substitution point.

use crate::domain::error::BacklabError;
use crate::domain::executor::{AllocationPolicy, ExecutionConfig};
use crate::domain::generator::{GeneratorArgs, IndicatorSpec};
use crate::domain::signal::Direction;
use crate::ports::ConfigPort;
use chrono::NaiveDate;
use std::path::PathBuf;

pub const PLACEHOLDER: &str = "$PARAM";

#[derive(Debug, Clone)]
pub struct DataSettings {
    pub csv_dir: PathBuf,
    pub universe: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct SignalDefinition {
    pub name: String,
    pub predicate: String,
    pub direction: Direction,
}

#[derive(Debug, Clone)]
pub struct StrategyDefinition {
    pub name: String,
    pub indicators: Vec<IndicatorSpec>,
    pub signals: Vec<SignalDefinition>,
    pub compile: Vec<String>,
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> BacklabError {
    BacklabError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, BacklabError> {
    config
        .get_string(section, key)?
        .ok_or_else(|| BacklabError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })
}

fn parse_date(value: &str, key: &str) -> Result<NaiveDate, BacklabError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| invalid("data", key, format!("{value}: {e}")))
}

pub fn parse_data_settings(config: &dyn ConfigPort) -> Result<DataSettings, BacklabError> {
    let csv_dir = PathBuf::from(require(config, "data", "csv_dir")?);
    let universe = require(config, "data", "universe")?;
    let start = parse_date(&require(config, "data", "start_date")?, "start_date")?;
    let end = parse_date(&require(config, "data", "end_date")?, "end_date")?;
    if end < start {
        return Err(invalid(
            "data",
            "end_date",
            format!("{end} is before start_date {start}"),
        ));
    }
    Ok(DataSettings {
        csv_dir,
        universe,
        start,
        end,
    })
}

pub fn parse_execution_config(config: &dyn ConfigPort) -> Result<ExecutionConfig, BacklabError> {
    let defaults = ExecutionConfig::default();

    let starting_cash = config
        .get_double("backtest", "starting_cash")?
        .unwrap_or(defaults.starting_cash);
    if !starting_cash.is_finite() || starting_cash <= 0.0 {
        return Err(invalid(
            "backtest",
            "starting_cash",
            format!("{starting_cash} is not a positive amount"),
        ));
    }

    let allocation = match config.get_string("backtest", "allocation")? {
        None => defaults.allocation,
        Some(value) => parse_allocation(&value)?,
    };

    Ok(ExecutionConfig {
        starting_cash,
        allocation,
    })
}

fn parse_allocation(value: &str) -> Result<AllocationPolicy, BacklabError> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("equal_weight") {
        return Ok(AllocationPolicy::EqualWeight);
    }
    if let Some(rest) = value.strip_prefix("fraction:") {
        let fraction: f64 = rest
            .trim()
            .parse()
            .map_err(|_| invalid("backtest", "allocation", format!("bad fraction {rest}")))?;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(invalid(
                "backtest",
                "allocation",
                format!("fraction {fraction} must be in (0, 1]"),
            ));
        }
        return Ok(AllocationPolicy::FixedFraction(fraction));
    }
    Err(invalid(
        "backtest",
        "allocation",
        format!("{value} is neither equal_weight nor fraction:<f>"),
    ))
}

pub fn parse_strategy_definition(
    config: &dyn ConfigPort,
) -> Result<StrategyDefinition, BacklabError> {
    let name = config
        .get_string("strategy", "name")?
        .unwrap_or_else(|| "strategy".to_string());

    let indicators = require(config, "strategy", "indicators")?
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_indicator_entry)
        .collect::<Result<Vec<_>, _>>()?;

    let signals = require(config, "strategy", "signals")?
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_signal_entry)
        .collect::<Result<Vec<_>, _>>()?;

    let compile = require(config, "strategy", "compile")?
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if compile.is_empty() {
        return Err(invalid("strategy", "compile", "no signals listed"));
    }

    Ok(StrategyDefinition {
        name,
        indicators,
        signals,
        compile,
    })
}

/// One indicator entry: `NAME = generator(SOURCE, PERIOD)`.
pub fn parse_indicator_entry(entry: &str) -> Result<IndicatorSpec, BacklabError> {
    let (name, call) = entry
        .split_once('=')
        .ok_or_else(|| invalid("strategy", "indicators", format!("no `=` in `{entry}`")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("strategy", "indicators", "empty indicator name"));
    }
    let (generator, args) = parse_indicator_call(call.trim())?;
    Ok(IndicatorSpec {
        name: name.to_uppercase(),
        generator,
        args,
    })
}

/// A generator call: `generator(SOURCE, PERIOD)`.
pub fn parse_indicator_call(call: &str) -> Result<(String, GeneratorArgs), BacklabError> {
    let bad = |reason: String| invalid("strategy", "indicators", reason);

    let open = call
        .find('(')
        .ok_or_else(|| bad(format!("`{call}` is not a generator call")))?;
    let close = call
        .rfind(')')
        .filter(|&i| i == call.len() - 1 && i > open)
        .ok_or_else(|| bad(format!("unbalanced parentheses in `{call}`")))?;

    let generator = call[..open].trim().to_lowercase();
    if generator.is_empty() {
        return Err(bad(format!("missing generator name in `{call}`")));
    }

    let arguments: Vec<&str> = call[open + 1..close].split(',').map(str::trim).collect();
    if arguments.len() != 2 {
        return Err(bad(format!(
            "`{call}` takes (SOURCE, PERIOD), got {} arguments",
            arguments.len()
        )));
    }
    let source = arguments[0].to_uppercase();
    if source.is_empty() {
        return Err(bad(format!("empty source column in `{call}`")));
    }
    let period: usize = arguments[1]
        .parse()
        .map_err(|_| bad(format!("`{}` is not a whole-number period", arguments[1])))?;

    Ok((generator, GeneratorArgs { source, period }))
}

/// One signal entry: `NAME = buy: PREDICATE`, `NAME = sell: PREDICATE`, or
/// `NAME = PREDICATE` (the direction defaults to buy).
pub fn parse_signal_entry(entry: &str) -> Result<SignalDefinition, BacklabError> {
    let (name, rest) = entry
        .split_once('=')
        .ok_or_else(|| invalid("strategy", "signals", format!("no `=` in `{entry}`")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("strategy", "signals", "empty signal name"));
    }

    let rest = rest.trim();
    let (direction, predicate) = if let Some(predicate) = rest.strip_prefix("buy:") {
        (Direction::Buy, predicate)
    } else if let Some(predicate) = rest.strip_prefix("sell:") {
        (Direction::Sell, predicate)
    } else {
        (Direction::Buy, rest)
    };
    let predicate = predicate.trim();
    if predicate.is_empty() {
        return Err(invalid(
            "strategy",
            "signals",
            format!("signal {name} has an empty predicate"),
        ));
    }

    Ok(SignalDefinition {
        name: name.to_string(),
        predicate: predicate.to_string(),
        direction,
    })
}

/// Substitute the optimizer's `$PARAM` placeholder. Whole numbers render
/// without a decimal point so periods stay parseable.
pub fn substitute_placeholder(text: &str, value: f64) -> String {
    let rendered = if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    };
    text.replace(PLACEHOLDER, &rendered)
}
