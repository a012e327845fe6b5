//! Brute-force parameter sweep over a strategy-building closure.
//!
//! Each candidate parameter gets an independent trial: the closure builds
//! and runs a fresh strategy, and the final account value is the objective.
//! Trials run in parallel but the report is deterministic: results keep
//! parameter order and ties go to the earlier parameter.

use crate::domain::error::BacklabError;
use crate::domain::strategy::Strategy;
use log::warn;
use rayon::prelude::*;
use serde::Serialize;

/// One successful trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    /// Index into the candidate range.
    pub trial: usize,
    pub parameter: f64,
    pub objective: f64,
}

/// Outcome of a full sweep. `trial_count` counts every attempted trial;
/// `trials` holds only the successful ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationReport {
    pub trials: Vec<TrialResult>,
    pub best: Option<TrialResult>,
    pub trial_count: usize,
}

/// Build the inclusive candidate range `lo, lo+step, ... <= hi`.
pub fn parameter_range(lo: f64, hi: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || lo > hi {
        return Vec::new();
    }
    let mut values = Vec::new();
    let mut i = 0u32;
    loop {
        let value = lo + step * f64::from(i);
        // Absorb accumulated float error at the top of the range.
        if value > hi + step * 1e-9 {
            break;
        }
        values.push(value);
        i += 1;
    }
    values
}

/// Sweep `parameters`, running one strategy per candidate. A failing trial
/// is logged and excluded rather than aborting the sweep; a sweep over an
/// empty range is an error.
pub fn optimize<F>(parameters: &[f64], trial: F) -> Result<OptimizationReport, BacklabError>
where
    F: Fn(f64) -> Result<Strategy, BacklabError> + Sync,
{
    if parameters.is_empty() {
        return Err(BacklabError::EmptyRange);
    }

    let outcomes: Vec<Option<TrialResult>> = parameters
        .par_iter()
        .enumerate()
        .map(|(index, &parameter)| match trial(parameter) {
            Ok(strategy) => {
                let Some(objective) = strategy.final_value() else {
                    warn!("trial {index} (parameter {parameter}) produced no ledger; excluded");
                    return None;
                };
                if !objective.is_finite() {
                    warn!(
                        "trial {index} (parameter {parameter}) objective {objective} \
                         is not finite; excluded"
                    );
                    return None;
                }
                Some(TrialResult {
                    trial: index,
                    parameter,
                    objective,
                })
            }
            Err(err) => {
                warn!("trial {index} (parameter {parameter}) failed: {err}; excluded");
                None
            }
        })
        .collect();

    let trials: Vec<TrialResult> = outcomes.into_iter().flatten().collect();
    // Ties keep the earlier parameter.
    let best = trials.iter().fold(None::<TrialResult>, |acc, candidate| {
        match acc {
            Some(current) if current.objective >= candidate.objective => Some(current),
            _ => Some(candidate.clone()),
        }
    });

    Ok(OptimizationReport {
        trials,
        best,
        trial_count: parameters.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::domain::executor::ExecutionConfig;
    use crate::domain::generator::{GeneratorArgs, IndicatorSpec};
    use crate::domain::signal::Direction;
    use crate::domain::table::SecurityTable;
    use chrono::NaiveDate;

    fn make_table(closes: &[f64]) -> SecurityTable {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: NaiveDate::from_ymd_opt(2024, 1, (i + 1) as u32).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000,
            })
            .collect();
        SecurityTable::new("AAA", bars).unwrap()
    }

    fn sma_crossover_trial(closes: &[f64], period: f64) -> Result<Strategy, BacklabError> {
        let mut strategy = Strategy::new("trial", vec![make_table(closes)])?;
        strategy
            .add_indicator(IndicatorSpec {
                name: "SMA_N".into(),
                generator: "sma".into(),
                args: GeneratorArgs {
                    source: "CLOSE".into(),
                    period: period as usize,
                },
            })?
            .add_signal("enter", "CLOSE > SMA_N", Direction::Buy)?
            .add_signal("exit", "CLOSE < SMA_N", Direction::Sell)?
            .compile(&["enter", "exit"])?
            .run_backtest(&ExecutionConfig::default())?;
        strategy.require_full_history()?;
        Ok(strategy)
    }

    #[test]
    fn parameter_range_is_inclusive() {
        assert_eq!(parameter_range(2.0, 6.0, 2.0), vec![2.0, 4.0, 6.0]);
        assert_eq!(parameter_range(5.0, 5.0, 1.0), vec![5.0]);
        assert!(parameter_range(5.0, 4.0, 1.0).is_empty());
        assert!(parameter_range(1.0, 10.0, 0.0).is_empty());
    }

    #[test]
    fn empty_range_is_an_error() {
        let result = optimize(&[], |_| {
            Strategy::new("never", Vec::new())
        });
        assert!(matches!(result, Err(BacklabError::EmptyRange)));
    }

    #[test]
    fn best_matches_the_maximum_individual_run() {
        let closes = [10.0, 11.0, 12.0, 9.0, 13.0, 14.0, 12.0, 15.0];
        let candidates = [2.0, 3.0, 4.0];

        let report =
            optimize(&candidates, |p| sma_crossover_trial(&closes, p)).unwrap();

        assert_eq!(report.trial_count, 3);
        assert_eq!(report.trials.len(), 3);

        let expected_best = candidates
            .iter()
            .map(|&p| sma_crossover_trial(&closes, p).unwrap().final_value().unwrap())
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(report.best.unwrap().objective, expected_best);
    }

    #[test]
    fn failing_trials_are_excluded_not_fatal() {
        let closes = [10.0, 11.0, 12.0];
        // Period 0 is a hard generator error; period 50 trips the strict
        // history check inside the trial.
        let report = optimize(&[0.0, 2.0, 50.0], |p| {
            sma_crossover_trial(&closes, p)
        })
        .unwrap();

        assert_eq!(report.trial_count, 3);
        assert_eq!(report.trials.len(), 1);
        assert_eq!(report.best.as_ref().unwrap().parameter, 2.0);
    }

    #[test]
    fn all_trials_failing_yields_no_best() {
        let report = optimize(&[1.0, 2.0], |_| {
            Err(BacklabError::EmptyRange)
        })
        .unwrap();
        assert!(report.best.is_none());
        assert!(report.trials.is_empty());
        assert_eq!(report.trial_count, 2);
    }

    #[test]
    fn ties_keep_the_earlier_parameter() {
        let closes = [10.0, 10.0, 10.0, 10.0];
        // Flat prices: every period produces an idle run with the same
        // final value.
        let report = optimize(&[2.0, 3.0], |p| sma_crossover_trial(&closes, p)).unwrap();
        assert_eq!(report.best.unwrap().parameter, 2.0);
    }
}
