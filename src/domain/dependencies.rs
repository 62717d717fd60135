//! Cross-symbol dependency analysis over mid prices.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::orderbook::OrderBookSeries;

/// Lags examined in each direction when searching for the strongest
/// cross-correlation.
pub const MAX_LAG: i32 = 10;

/// Relationship between two symbols: the Pearson correlation of their
/// aligned mid prices at lag 0, plus the strongest lagged alignment. A
/// positive `lead_lag` means `symbol_a` leads `symbol_b` by that many
/// samples.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyResult {
    pub symbol_a: String,
    pub symbol_b: String,
    pub correlation: f64,
    pub lead_lag: i32,
    pub lead_correlation: f64,
}

/// Examines every symbol pair, aligning the tails of both mid-price series
/// to a common length. Reports the unshifted correlation alongside the lag
/// with the largest absolute correlation. Pairs with fewer than two
/// overlapping samples are skipped; results sort by unshifted correlation
/// strength.
pub fn analyse_dependencies(
    series_map: &BTreeMap<String, OrderBookSeries>,
) -> Vec<DependencyResult> {
    let prices: BTreeMap<&str, Vec<f64>> = series_map
        .iter()
        .map(|(symbol, series)| (symbol.as_str(), series.mid_prices()))
        .collect();

    let symbols: Vec<&str> = prices.keys().copied().collect();
    let mut results = Vec::new();
    for (i, &a) in symbols.iter().enumerate() {
        for &b in &symbols[i + 1..] {
            let len = prices[a].len().min(prices[b].len());
            if len < 2 {
                continue;
            }
            let tail_a = &prices[a][prices[a].len() - len..];
            let tail_b = &prices[b][prices[b].len() - len..];
            let (lead_lag, lead_correlation) = best_lag(tail_a, tail_b);
            results.push(DependencyResult {
                symbol_a: a.to_string(),
                symbol_b: b.to_string(),
                correlation: correlation(tail_a, tail_b),
                lead_lag,
                lead_correlation,
            });
        }
    }
    results.sort_by(|x, y| y.correlation.abs().total_cmp(&x.correlation.abs()));
    results
}

/// Shifts `b` relative to `a` outward from lag 0 and keeps the lag
/// maximizing |correlation|. Only a strictly stronger alignment displaces
/// the incumbent, so lag 0 wins ties and a smaller shift beats an
/// equal-strength larger one.
fn best_lag(a: &[f64], b: &[f64]) -> (i32, f64) {
    let mut best = (0, correlation(a, b));
    for magnitude in 1..=MAX_LAG {
        for lag in [magnitude, -magnitude] {
            let (sa, sb) = shifted(a, b, lag);
            if sa.len() < 2 {
                continue;
            }
            let corr = correlation(sa, sb);
            if corr.abs() > best.1.abs() {
                best = (lag, corr);
            }
        }
    }
    best
}

fn shifted<'s>(a: &'s [f64], b: &'s [f64], lag: i32) -> (&'s [f64], &'s [f64]) {
    let n = a.len();
    let shift = lag.unsigned_abs() as usize;
    if shift >= n {
        return (&[], &[]);
    }
    if lag >= 0 {
        // a leads: compare a's head with b's tail.
        (&a[..n - shift], &b[shift..])
    } else {
        (&a[shift..], &b[..n - shift])
    }
}

/// Pearson correlation. Degenerate inputs (short, mismatched, or constant
/// series) yield 0.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.len() < 2 {
        return 0.0;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    cov / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orderbook::OrderBookSample;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn series_from_mids(symbol: &str, mids: &[f64]) -> OrderBookSeries {
        let samples = mids
            .iter()
            .enumerate()
            .map(|(i, &mid)| OrderBookSample {
                timestamp: Utc
                    .with_ymd_and_hms(2024, 3, 1, 10, (i / 60) as u32, (i % 60) as u32)
                    .unwrap(),
                bid_price_1: mid - 0.5,
                bid_size_1: 1.0,
                ask_price_1: mid + 0.5,
                ask_size_1: 1.0,
                bid_price_2: mid - 1.0,
                bid_size_2: 1.0,
                ask_price_2: mid + 1.0,
                ask_size_2: 1.0,
                trade_volume: 5.0,
            })
            .collect();
        OrderBookSeries {
            symbol: symbol.into(),
            samples,
        }
    }

    #[test]
    fn correlation_of_identical_series_is_one() {
        let xs = [0.1, -0.2, 0.3, 0.05, -0.1];
        assert_relative_eq!(correlation(&xs, &xs), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn correlation_of_inverted_series_is_minus_one() {
        let xs = [0.1, -0.2, 0.3, 0.05, -0.1];
        let ys: Vec<f64> = xs.iter().map(|v| -v).collect();
        assert_relative_eq!(correlation(&xs, &ys), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn correlation_degenerate_inputs_are_zero() {
        assert_eq!(correlation(&[], &[]), 0.0);
        assert_eq!(correlation(&[1.0], &[1.0]), 0.0);
        assert_eq!(correlation(&[1.0, 2.0], &[1.0]), 0.0);
        // Constant series has zero variance.
        assert_eq!(correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn identical_symbols_correlate_at_lag_zero() {
        // Period-7 mids: every multiple-of-7 shift also aligns perfectly,
        // but none beats the unshifted correlation strictly.
        let mids: Vec<f64> = (0..30).map(|i| 100.0 + ((i * 3) % 7) as f64).collect();
        let mut map = BTreeMap::new();
        map.insert("AAAUSDT".to_string(), series_from_mids("AAAUSDT", &mids));
        map.insert("BBBUSDT".to_string(), series_from_mids("BBBUSDT", &mids));

        let results = analyse_dependencies(&map);
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.symbol_a, "AAAUSDT");
        assert_eq!(result.symbol_b, "BBBUSDT");
        assert_eq!(result.lead_lag, 0);
        assert_relative_eq!(result.correlation, 1.0, epsilon = 1e-9);
        assert_relative_eq!(result.lead_correlation, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn detects_leading_symbol() {
        // BBB repeats AAA's path two samples later.
        let base: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 5) % 13) as f64 * 0.3).collect();
        let lagged: Vec<f64> = base[..38].to_vec();
        let mut padded = vec![base[0], base[0]];
        padded.extend_from_slice(&lagged);

        let mut map = BTreeMap::new();
        map.insert("AAAUSDT".to_string(), series_from_mids("AAAUSDT", &base));
        map.insert("BBBUSDT".to_string(), series_from_mids("BBBUSDT", &padded));

        let results = analyse_dependencies(&map);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lead_lag, 2);
        assert!(results[0].lead_correlation > 0.999);
        // The unshifted alignment is strictly weaker.
        assert!(results[0].correlation.abs() < results[0].lead_correlation);
    }

    #[test]
    fn two_sample_overlap_is_admitted() {
        let mut map = BTreeMap::new();
        map.insert(
            "AAAUSDT".to_string(),
            series_from_mids("AAAUSDT", &[100.0, 101.0]),
        );
        map.insert(
            "BBBUSDT".to_string(),
            series_from_mids("BBBUSDT", &[200.0, 201.0]),
        );

        let results = analyse_dependencies(&map);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lead_lag, 0);
        assert_relative_eq!(results[0].correlation, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn single_sample_pairs_are_skipped() {
        let mut map = BTreeMap::new();
        map.insert("AAAUSDT".to_string(), series_from_mids("AAAUSDT", &[100.0]));
        map.insert("BBBUSDT".to_string(), series_from_mids("BBBUSDT", &[100.0]));
        assert!(analyse_dependencies(&map).is_empty());
    }

    #[test]
    fn results_sorted_by_correlation_strength() {
        let trend: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let noisy: Vec<f64> = (0..30)
            .map(|i| 100.0 + ((i * 11) % 17) as f64 * 0.5)
            .collect();
        let mut map = BTreeMap::new();
        map.insert("AAAUSDT".to_string(), series_from_mids("AAAUSDT", &trend));
        map.insert("BBBUSDT".to_string(), series_from_mids("BBBUSDT", &trend));
        map.insert("CCCUSDT".to_string(), series_from_mids("CCCUSDT", &noisy));

        let results = analyse_dependencies(&map);
        assert_eq!(results.len(), 3);
        // The perfectly matched pair sorts first.
        assert_eq!(results[0].symbol_a, "AAAUSDT");
        assert_eq!(results[0].symbol_b, "BBBUSDT");
        for pair in results.windows(2) {
            assert!(pair[0].correlation.abs() >= pair[1].correlation.abs());
        }
    }
}
