//! Feature-impact attribution over backtest trades.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::backtest::BacktestReport;
use crate::domain::error::MicrotraderError;
use crate::domain::features::{build_feature_matrix, FeatureMatrix, FEATURE_NAMES, UNLABELED};
use crate::domain::orderbook::OrderBookSeries;
use crate::domain::simulator::Trade;

/// Mean PnL difference between the upper and lower quartile bucket of one
/// feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureEffect {
    pub feature: String,
    pub positive_mean: f64,
    pub negative_mean: f64,
    pub difference: f64,
    pub trade_count: usize,
}

/// Per-symbol feature effects plus the trade-count-weighted aggregate,
/// sorted descending by difference.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub per_symbol: BTreeMap<String, Vec<FeatureEffect>>,
    pub aggregated: Vec<FeatureEffect>,
}

impl ImpactReport {
    /// Top-N aggregated effects with negative difference, worst first.
    pub fn loss_drivers(&self, top_n: usize) -> Vec<FeatureEffect> {
        let mut losses: Vec<FeatureEffect> = self
            .aggregated
            .iter()
            .filter(|e| e.difference < 0.0)
            .cloned()
            .collect();
        losses.sort_by(|a, b| a.difference.total_cmp(&b.difference));
        losses.truncate(top_n);
        losses
    }

    /// Top-N aggregated effects with positive difference, best first.
    pub fn gain_drivers(&self, top_n: usize) -> Vec<FeatureEffect> {
        let mut gains: Vec<FeatureEffect> = self
            .aggregated
            .iter()
            .filter(|e| e.difference > 0.0)
            .cloned()
            .collect();
        gains.sort_by(|a, b| b.difference.total_cmp(&a.difference));
        gains.truncate(top_n);
        gains
    }
}

/// Re-derives the feature matrix per symbol, aligns trades to rows by exact
/// timestamp, and attributes PnL to quartile buckets of each feature value.
/// Trades without a matching row are dropped; a symbol with no aligned
/// trades falls back to a synthetic matrix-derived PnL series so the report
/// is never empty for a populated series.
pub fn evaluate_feature_impacts(
    series_map: &BTreeMap<String, OrderBookSeries>,
    reports: &BTreeMap<String, BacktestReport>,
    horizon: usize,
) -> Result<ImpactReport, MicrotraderError> {
    let mut per_symbol: BTreeMap<String, Vec<FeatureEffect>> = BTreeMap::new();
    let mut accumulator: BTreeMap<String, (f64, f64, f64)> = BTreeMap::new();

    for (symbol, report) in reports {
        let Some(series) = series_map.get(symbol) else {
            continue;
        };
        let matrix = build_feature_matrix(series, horizon)?;
        let mut pairs = match_trades_with_features(&report.state.trades, &matrix);
        if pairs.is_empty() {
            pairs = fallback_from_matrix(&matrix);
        }
        if pairs.is_empty() {
            per_symbol.insert(symbol.clone(), Vec::new());
            continue;
        }

        let mut effects = Vec::new();
        for (feature_idx, feature_name) in FEATURE_NAMES.iter().enumerate() {
            let values: Vec<f64> = pairs.iter().map(|(row, _)| row[feature_idx]).collect();
            let pnls: Vec<f64> = pairs.iter().map(|(_, pnl)| *pnl).collect();
            let (positive_mean, negative_mean) = quartile_means(&values, &pnls);
            if positive_mean == 0.0 && negative_mean == 0.0 {
                continue;
            }
            effects.push(FeatureEffect {
                feature: (*feature_name).to_string(),
                positive_mean,
                negative_mean,
                difference: positive_mean - negative_mean,
                trade_count: pairs.len(),
            });
            let entry = accumulator
                .entry((*feature_name).to_string())
                .or_insert((0.0, 0.0, 0.0));
            entry.0 += positive_mean * pairs.len() as f64;
            entry.1 += negative_mean * pairs.len() as f64;
            entry.2 += pairs.len() as f64;
        }
        per_symbol.insert(symbol.clone(), effects);
    }

    let mut aggregated: Vec<FeatureEffect> = accumulator
        .into_iter()
        .filter(|(_, (_, _, weight))| *weight > 0.0)
        .map(|(feature, (pos_sum, neg_sum, weight))| {
            let positive_mean = pos_sum / weight;
            let negative_mean = neg_sum / weight;
            FeatureEffect {
                feature,
                positive_mean,
                negative_mean,
                difference: positive_mean - negative_mean,
                trade_count: weight as usize,
            }
        })
        .collect();
    aggregated.sort_by(|a, b| b.difference.total_cmp(&a.difference));

    Ok(ImpactReport {
        per_symbol,
        aggregated,
    })
}

fn match_trades_with_features<'a>(
    trades: &[Trade],
    matrix: &'a FeatureMatrix,
) -> Vec<(&'a [f64], f64)> {
    let by_timestamp: BTreeMap<&str, &[f64]> = matrix
        .timestamps
        .iter()
        .zip(&matrix.features)
        .map(|(ts, row)| (ts.as_str(), row.as_slice()))
        .collect();
    trades
        .iter()
        .filter_map(|trade| {
            by_timestamp
                .get(trade.timestamp.as_str())
                .map(|row| (*row, trade.pnl))
        })
        .collect()
}

/// Synthetic stand-in when no trade aligned: the labeled direction scaled by
/// the spread, per non-sentinel row.
fn fallback_from_matrix(matrix: &FeatureMatrix) -> Vec<(&[f64], f64)> {
    matrix
        .features
        .iter()
        .zip(&matrix.target)
        .zip(&matrix.spread)
        .filter(|&((_, &target), _)| target != UNLABELED)
        .map(|((row, &target), &spread)| (row.as_slice(), (target - 0.5) * spread))
        .collect()
}

/// Mean PnL in the upper and lower quartile bucket. Buckets include every
/// pair whose value ties the boundary, and the boundary indices round the
/// same way for every caller: `lower = max(0, n/4 - 1)`,
/// `upper = min(n - 1, 3n/4)` with truncating arithmetic.
fn quartile_means(values: &[f64], pnls: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted: Vec<(f64, f64)> = values.iter().copied().zip(pnls.iter().copied()).collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let size = sorted.len();
    let lower_index = ((size as f64 * 0.25) as usize).saturating_sub(1);
    let upper_index = ((size as f64 * 0.75) as usize).min(size - 1);
    let lower_bound = sorted[lower_index].0;
    let upper_bound = sorted[upper_index].0;

    let negative_bucket: Vec<f64> = sorted
        .iter()
        .filter(|(value, _)| *value <= lower_bound)
        .map(|(_, pnl)| *pnl)
        .collect();
    let positive_bucket: Vec<f64> = sorted
        .iter()
        .filter(|(value, _)| *value >= upper_bound)
        .map(|(_, pnl)| *pnl)
        .collect();

    let mean = |bucket: &[f64]| {
        if bucket.is_empty() {
            0.0
        } else {
            bucket.iter().sum::<f64>() / bucket.len() as f64
        }
    };
    (mean(&positive_bucket), mean(&negative_bucket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::Backtester;
    use crate::domain::config::StrategyConfig;
    use crate::domain::execution::Side;
    use crate::domain::orderbook::OrderBookSample;
    use crate::domain::simulator::{StrategyState, TradeMode};
    use chrono::{TimeZone, Utc};

    fn make_series(symbol: &str, mids: &[f64]) -> OrderBookSeries {
        let samples = mids
            .iter()
            .enumerate()
            .map(|(i, &mid)| OrderBookSample {
                timestamp: Utc
                    .with_ymd_and_hms(2024, 3, 1, 10, (i / 60) as u32, (i % 60) as u32)
                    .unwrap(),
                bid_price_1: mid - 0.5,
                bid_size_1: 2.0 + (i % 3) as f64,
                ask_price_1: mid + 0.5,
                ask_size_1: 1.5,
                bid_price_2: mid - 1.0,
                bid_size_2: 3.0,
                ask_price_2: mid + 1.0,
                ask_size_2: 2.5,
                trade_volume: 10.0 + (i % 7) as f64,
            })
            .collect();
        OrderBookSeries {
            symbol: symbol.into(),
            samples,
        }
    }

    fn make_trade(timestamp: &str, pnl: f64) -> Trade {
        Trade {
            timestamp: timestamp.into(),
            side: Side::Buy,
            price: 100.0,
            size: 0.5,
            spot_allocation: 0.0,
            reinvested: 0.0,
            notional: 50.0,
            fee: 0.02,
            pnl_gross: pnl,
            pnl,
            confidence: 0.8,
            mode: TradeMode::Standard,
        }
    }

    fn make_report(symbol: &str, trades: Vec<Trade>) -> BacktestReport {
        BacktestReport {
            symbol: symbol.into(),
            state: StrategyState {
                equity_curve: vec![5_000.0],
                trading_curve: vec![5_000.0],
                spot_curve: vec![0.0],
                metrics: BTreeMap::new(),
                trades,
            },
            validation_loss: 0.0,
            interval_volatility: BTreeMap::new(),
        }
    }

    #[test]
    fn quartile_reference_vector() {
        // Eight pairs, values 1..8, pnl = value. lower = max(0, 2-1) = 1,
        // upper = min(7, 6) = 6: buckets {1,2} and {7,8}.
        let values: Vec<f64> = (1..=8).map(f64::from).collect();
        let pnls = values.clone();
        let (positive, negative) = quartile_means(&values, &pnls);
        assert!((negative - 1.5).abs() < 1e-12);
        assert!((positive - 7.5).abs() < 1e-12);
    }

    #[test]
    fn quartile_small_sample_rounding() {
        // Three pairs: lower = max(0, 0-1) -> 0, upper = min(2, 2) = 2.
        let values = vec![1.0, 2.0, 3.0];
        let pnls = vec![-1.0, 0.0, 5.0];
        let (positive, negative) = quartile_means(&values, &pnls);
        assert!((negative - (-1.0)).abs() < 1e-12);
        assert!((positive - 5.0).abs() < 1e-12);
    }

    #[test]
    fn quartile_ties_share_buckets() {
        // All values equal: both buckets span everything.
        let values = vec![2.0; 4];
        let pnls = vec![1.0, 2.0, 3.0, 4.0];
        let (positive, negative) = quartile_means(&values, &pnls);
        assert!((positive - 2.5).abs() < 1e-12);
        assert!((negative - 2.5).abs() < 1e-12);
    }

    #[test]
    fn aligned_trades_drive_effects() {
        let mids: Vec<f64> = (0..20).map(|i| 100.0 + (i % 4) as f64).collect();
        let series = make_series("AAAUSDT", &mids);
        let matrix = build_feature_matrix(&series, 5).unwrap();

        // Trades aligned to real matrix timestamps, with one orphan.
        let trades = vec![
            make_trade(&matrix.timestamps[2], 1.0),
            make_trade(&matrix.timestamps[5], -2.0),
            make_trade(&matrix.timestamps[9], 0.5),
            make_trade(&matrix.timestamps[12], 3.0),
            make_trade("1999-01-01T00:00:00+00:00", 99.0),
        ];

        let mut series_map = BTreeMap::new();
        series_map.insert("AAAUSDT".to_string(), series);
        let mut reports = BTreeMap::new();
        reports.insert("AAAUSDT".to_string(), make_report("AAAUSDT", trades));

        let impact = evaluate_feature_impacts(&series_map, &reports, 5).unwrap();
        let effects = &impact.per_symbol["AAAUSDT"];
        assert!(!effects.is_empty());
        // The orphan trade is dropped: four aligned pairs.
        assert!(effects.iter().all(|e| e.trade_count == 4));
        // Aggregate is sorted descending by difference.
        for window in impact.aggregated.windows(2) {
            assert!(window[0].difference >= window[1].difference);
        }
    }

    #[test]
    fn no_trades_falls_back_to_matrix() {
        let mids: Vec<f64> = (0..15).map(|i| 100.0 + (i % 5) as f64).collect();
        let series = make_series("AAAUSDT", &mids);
        let mut series_map = BTreeMap::new();
        series_map.insert("AAAUSDT".to_string(), series);
        let mut reports = BTreeMap::new();
        reports.insert("AAAUSDT".to_string(), make_report("AAAUSDT", vec![]));

        let impact = evaluate_feature_impacts(&series_map, &reports, 5).unwrap();
        let effects = &impact.per_symbol["AAAUSDT"];
        assert!(!effects.is_empty());
        // Fallback pairs cover the ten non-sentinel rows.
        assert!(effects.iter().all(|e| e.trade_count == 10));
    }

    #[test]
    fn symbol_missing_from_series_map_is_skipped() {
        let mut reports = BTreeMap::new();
        reports.insert(
            "GONE".to_string(),
            make_report("GONE", vec![make_trade("2024-03-01T10:00:00+00:00", 1.0)]),
        );
        let impact = evaluate_feature_impacts(&BTreeMap::new(), &reports, 5).unwrap();
        assert!(impact.per_symbol.is_empty());
        assert!(impact.aggregated.is_empty());
    }

    #[test]
    fn drivers_split_by_sign() {
        let impact = ImpactReport {
            per_symbol: BTreeMap::new(),
            aggregated: vec![
                FeatureEffect {
                    feature: "spread".into(),
                    positive_mean: -1.0,
                    negative_mean: 1.0,
                    difference: -2.0,
                    trade_count: 4,
                },
                FeatureEffect {
                    feature: "imbalance".into(),
                    positive_mean: 2.0,
                    negative_mean: 0.5,
                    difference: 1.5,
                    trade_count: 4,
                },
                FeatureEffect {
                    feature: "mid".into(),
                    positive_mean: 0.6,
                    negative_mean: 0.1,
                    difference: 0.5,
                    trade_count: 4,
                },
            ],
        };
        let gains = impact.gain_drivers(1);
        assert_eq!(gains.len(), 1);
        assert_eq!(gains[0].feature, "imbalance");
        let losses = impact.loss_drivers(3);
        assert_eq!(losses.len(), 1);
        assert_eq!(losses[0].feature, "spread");
    }

    #[test]
    fn end_to_end_with_backtester() {
        let mids: Vec<f64> = (0..60)
            .map(|i| 100.0 + ((i * 7) % 11) as f64 * 0.3)
            .collect();
        let mut series_map = BTreeMap::new();
        series_map.insert("AAAUSDT".to_string(), make_series("AAAUSDT", &mids));

        let backtester = Backtester::new(StrategyConfig::default());
        let reports = backtester.run(&series_map).unwrap();
        let impact = evaluate_feature_impacts(&series_map, &reports, 5).unwrap();
        assert!(impact.per_symbol.contains_key("AAAUSDT"));
    }
}
