//! Indicator generators and the named-generator registry.
//!
//! The indicator pipeline never accepts arbitrary code: generators are
//! registered callables resolved by name and parameterized with
//! [`GeneratorArgs`]. Every generator is causal (the output at row `i`
//! depends only on rows `<= i` of its source column) and marks its warmup
//! prefix with `None` gaps rather than fabricated values.

use crate::domain::error::BacklabError;
use crate::domain::table::SecurityTable;
use std::collections::HashMap;

/// Named arguments for a generator: the source column it reads and its
/// lookback window.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorArgs {
    pub source: String,
    pub period: usize,
}

impl Default for GeneratorArgs {
    fn default() -> Self {
        GeneratorArgs {
            source: "CLOSE".into(),
            period: 14,
        }
    }
}

/// A declared indicator: output column name, generator name, arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSpec {
    pub name: String,
    pub generator: String,
    pub args: GeneratorArgs,
}

/// A flagged (but non-fatal) case of a window longer than the available
/// history: the column exists but is all gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryGap {
    pub symbol: String,
    pub column: String,
    pub have: usize,
    pub need: usize,
}

/// A generator maps a source column to a same-length derived column.
pub type GeneratorFn = fn(&[Option<f64>], usize) -> Vec<Option<f64>>;

#[derive(Debug, Clone)]
pub struct GeneratorRegistry {
    generators: HashMap<String, GeneratorFn>,
}

impl GeneratorRegistry {
    /// The built-in capability set.
    pub fn standard() -> Self {
        let mut registry = GeneratorRegistry {
            generators: HashMap::new(),
        };
        registry.register("sma", calc_sma);
        registry.register("ema", calc_ema);
        registry.register("wma", calc_wma);
        registry.register("rsi", calc_rsi);
        registry.register("roc", calc_roc);
        registry.register("stddev", calc_stddev);
        registry
    }

    pub fn register(&mut self, name: &str, generator: GeneratorFn) {
        self.generators.insert(name.to_lowercase(), generator);
    }

    pub fn resolve(&self, name: &str) -> Result<GeneratorFn, BacklabError> {
        self.generators
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| BacklabError::GeneratorArgument {
                generator: name.to_string(),
                reason: "not a registered generator".into(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.generators.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Resolve arguments against a table and run the generator.
pub fn apply_generator(
    table: &SecurityTable,
    generator_name: &str,
    generator: GeneratorFn,
    args: &GeneratorArgs,
) -> Result<Vec<Option<f64>>, BacklabError> {
    if args.period == 0 {
        return Err(BacklabError::GeneratorArgument {
            generator: generator_name.to_string(),
            reason: "window must be at least 1".into(),
        });
    }
    if !table.has_column(&args.source) {
        return Err(BacklabError::GeneratorArgument {
            generator: generator_name.to_string(),
            reason: format!("source column {} does not exist", args.source),
        });
    }
    let values: Vec<Option<f64>> = (0..table.len())
        .map(|row| table.value(&args.source, row))
        .collect();
    Ok(generator(&values, args.period))
}

fn window(values: &[Option<f64>], end: usize, period: usize) -> Option<Vec<f64>> {
    if end + 1 < period {
        return None;
    }
    values[end + 1 - period..=end].iter().copied().collect()
}

/// Simple moving average: mean of the last `n` resolved source values.
pub fn calc_sma(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            window(values, i, period).map(|w| w.iter().sum::<f64>() / period as f64)
        })
        .collect()
}

/// Weighted moving average: weights 1..=n, newest value weighted heaviest.
pub fn calc_wma(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let divisor = (period * (period + 1)) as f64 / 2.0;
    (0..values.len())
        .map(|i| {
            window(values, i, period).map(|w| {
                let weighted: f64 = w
                    .iter()
                    .enumerate()
                    .map(|(j, v)| (j + 1) as f64 * v)
                    .sum();
                weighted / divisor
            })
        })
        .collect()
}

/// Population standard deviation over the last `n` source values.
pub fn calc_stddev(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            window(values, i, period).map(|w| {
                let mean = w.iter().sum::<f64>() / period as f64;
                let variance = w
                    .iter()
                    .map(|v| {
                        let diff = v - mean;
                        diff * diff
                    })
                    .sum::<f64>()
                    / period as f64;
                variance.sqrt()
            })
        })
        .collect()
}

/// Rate of change: ((v[i] - v[i-n]) / v[i-n]) * 100, 0 when the reference is 0.
pub fn calc_roc(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i < period {
                return None;
            }
            match (values[i - period], values[i]) {
                (Some(prev), Some(curr)) => {
                    if prev == 0.0 {
                        Some(0.0)
                    } else {
                        Some(((curr - prev) / prev) * 100.0)
                    }
                }
                _ => None,
            }
        })
        .collect()
}

/// Exponential moving average: k = 2/(n+1), seeded with the SMA of the first
/// `n` resolved values, then EMA[i] = v[i]*k + EMA[i-1]*(1-k).
pub fn calc_ema(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let start = match values.iter().position(|v| v.is_some()) {
        Some(s) => s,
        None => return out,
    };
    if values.len() - start < period {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed_end = start + period - 1;
    let mut ema = values[start..=seed_end]
        .iter()
        .map(|v| v.unwrap_or(0.0))
        .sum::<f64>()
        / period as f64;
    out[seed_end] = Some(ema);

    for i in seed_end + 1..values.len() {
        let v = values[i].unwrap_or(ema);
        ema = v * k + ema * (1.0 - k);
        out[i] = Some(ema);
    }
    out
}

/// Relative Strength Index with Wilder's smoothing. Needs `n` source changes,
/// so the warmup spans `n` rows past the first resolved value.
pub fn calc_rsi(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let start = match values.iter().position(|v| v.is_some()) {
        Some(s) => s,
        None => return out,
    };
    let resolved: Vec<f64> = values[start..].iter().map(|v| v.unwrap_or(0.0)).collect();
    if resolved.len() < period + 1 {
        return out;
    }

    let mut gains = Vec::with_capacity(resolved.len() - 1);
    let mut losses = Vec::with_capacity(resolved.len() - 1);
    for pair in resolved.windows(2) {
        let change = pair[1] - pair[0];
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    out[start + period] = Some(rsi_value(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        out[start + i + 1] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn resolved(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn sma_warmup_and_values() {
        let out = calc_sma(&resolved(&[10.0, 11.0, 12.0, 9.0, 13.0]), 2);

        assert_eq!(out.len(), 5);
        assert_eq!(out[0], None);
        assert_relative_eq!(out[1].unwrap(), 10.5);
        assert_relative_eq!(out[2].unwrap(), 11.5);
        assert_relative_eq!(out[3].unwrap(), 10.5);
        assert_relative_eq!(out[4].unwrap(), 11.0);
    }

    #[test]
    fn sma_over_gapped_source_extends_warmup() {
        // A stacked indicator reads a column that itself has a warmup gap.
        let source = vec![None, None, Some(10.0), Some(20.0), Some(30.0)];
        let out = calc_sma(&source, 2);

        assert_eq!(out[..3], [None, None, None]);
        assert_relative_eq!(out[3].unwrap(), 15.0);
        assert_relative_eq!(out[4].unwrap(), 25.0);
    }

    #[test]
    fn wma_weights_newest_heaviest() {
        let out = calc_wma(&resolved(&[1.0, 2.0, 3.0]), 3);

        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        // (1*1 + 2*2 + 3*3) / 6
        assert_relative_eq!(out[2].unwrap(), 14.0 / 6.0);
    }

    #[test]
    fn stddev_known_values() {
        let out = calc_stddev(&resolved(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 8);

        assert_eq!(out[6], None);
        assert_relative_eq!(out[7].unwrap(), 2.0);
    }

    #[test]
    fn stddev_constant_series_is_zero() {
        let out = calc_stddev(&resolved(&[100.0, 100.0, 100.0]), 3);
        assert_relative_eq!(out[2].unwrap(), 0.0);
    }

    #[test]
    fn roc_basic() {
        let out = calc_roc(&resolved(&[100.0, 110.0, 121.0]), 1);

        assert_eq!(out[0], None);
        assert_relative_eq!(out[1].unwrap(), 10.0);
        assert_relative_eq!(out[2].unwrap(), 10.0);
    }

    #[test]
    fn roc_zero_reference() {
        let out = calc_roc(&resolved(&[0.0, 5.0]), 1);
        assert_relative_eq!(out[1].unwrap(), 0.0);
    }

    #[test]
    fn ema_seed_is_sma() {
        let out = calc_ema(&resolved(&[10.0, 20.0, 30.0, 40.0]), 3);

        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_relative_eq!(out[2].unwrap(), 20.0);
        // k = 0.5: 40*0.5 + 20*0.5
        assert_relative_eq!(out[3].unwrap(), 30.0);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let out = calc_rsi(&resolved(&[1.0, 2.0, 3.0, 4.0, 5.0]), 3);

        assert_eq!(out[2], None);
        assert_relative_eq!(out[3].unwrap(), 100.0);
        assert_relative_eq!(out[4].unwrap(), 100.0);
    }

    #[test]
    fn rsi_balanced_moves() {
        // Alternating +1/-1 gives avg_gain == avg_loss at the seed: RSI = 50.
        let out = calc_rsi(&resolved(&[10.0, 11.0, 10.0, 11.0, 10.0]), 4);
        assert_relative_eq!(out[4].unwrap(), 50.0);
    }

    #[test]
    fn window_longer_than_series_is_all_gaps() {
        for generator in [calc_sma, calc_ema, calc_wma, calc_stddev] {
            let out = generator(&resolved(&[1.0, 2.0]), 5);
            assert!(out.iter().all(|v| v.is_none()));
        }
    }

    #[test]
    fn registry_resolves_case_insensitively() {
        let registry = GeneratorRegistry::standard();
        assert!(registry.resolve("sma").is_ok());
        assert!(registry.resolve("SMA").is_ok());
        assert!(matches!(
            registry.resolve("vortex"),
            Err(BacklabError::GeneratorArgument { .. })
        ));
    }

    #[test]
    fn registry_names_sorted() {
        let registry = GeneratorRegistry::standard();
        assert_eq!(
            registry.names(),
            ["ema", "roc", "rsi", "sma", "stddev", "wma"]
        );
    }

    #[test]
    fn apply_generator_rejects_zero_window() {
        let table = crate::domain::table::SecurityTable::new("T", Vec::new()).unwrap();
        let args = GeneratorArgs {
            source: "CLOSE".into(),
            period: 0,
        };
        let result = apply_generator(&table, "sma", calc_sma, &args);
        assert!(matches!(
            result,
            Err(BacklabError::GeneratorArgument { .. })
        ));
    }

    proptest! {
        /// Causal warmup shape: for any window w and series length n >= w,
        /// exactly the first w-1 entries are gaps and the rest resolve.
        #[test]
        fn sma_warmup_shape(window in 1usize..20, extra in 0usize..40, seed in any::<u64>()) {
            let len = window + extra;
            let mut x = seed;
            let prices: Vec<f64> = (0..len)
                .map(|_| {
                    x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    100.0 + (x >> 33) as f64 / u32::MAX as f64
                })
                .collect();

            let out = calc_sma(&resolved(&prices), window);

            prop_assert_eq!(out.len(), len);
            prop_assert!(out[..window - 1].iter().all(|v| v.is_none()));
            prop_assert!(out[window - 1..].iter().all(|v| v.is_some()));
        }
    }
}
