//! Per-symbol backtest orchestration.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::domain::config::StrategyConfig;
use crate::domain::error::MicrotraderError;
use crate::domain::features::{build_feature_matrix, interval_volatility, FeatureMatrix};
use crate::domain::model::LogisticModel;
use crate::domain::orderbook::OrderBookSeries;
use crate::domain::simulator::{run_strategy, StrategyState};

pub const DEFAULT_HORIZON: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub state: StrategyState,
    pub validation_loss: f64,
    pub interval_volatility: BTreeMap<usize, f64>,
}

/// Trains and replays the strategy for every symbol in a series map.
#[derive(Debug, Clone)]
pub struct Backtester {
    pub config: StrategyConfig,
    pub horizon: usize,
}

impl Backtester {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            horizon: DEFAULT_HORIZON,
        }
    }

    pub fn with_horizon(config: StrategyConfig, horizon: usize) -> Self {
        Self { config, horizon }
    }

    /// Per symbol: derive features, split chronologically (no shuffling, to
    /// avoid lookahead), train on the head, score and simulate on the tail.
    pub fn run(
        &self,
        series_map: &BTreeMap<String, OrderBookSeries>,
    ) -> Result<BTreeMap<String, BacktestReport>, MicrotraderError> {
        let mut reports = BTreeMap::new();
        for (symbol, series) in series_map {
            let matrix = build_feature_matrix(series, self.horizon)?;
            let (train, test) = self.split(&matrix);
            debug!(
                symbol = symbol.as_str(),
                rows = matrix.len(),
                train_rows = train.len(),
                "training logistic model"
            );
            let model = LogisticModel::train(
                &train.features,
                &train.target,
                &train.spread,
                self.config.fee_rate,
            );
            let validation_loss = model.score(
                &test.features,
                &test.target,
                &test.spread,
                self.config.fee_rate,
            );
            let state = run_strategy(&self.config, &model, &test);
            let volatility = interval_volatility(series, &self.config.evaluation_windows);
            debug!(
                symbol = symbol.as_str(),
                trades = state.trades.len(),
                validation_loss,
                "symbol backtest complete"
            );
            reports.insert(
                symbol.clone(),
                BacktestReport {
                    symbol: symbol.clone(),
                    state,
                    validation_loss,
                    interval_volatility: volatility,
                },
            );
        }
        Ok(reports)
    }

    fn split(&self, matrix: &FeatureMatrix) -> (FeatureMatrix, FeatureMatrix) {
        let split_idx = (matrix.len() as f64 * self.config.training_ratio) as usize;
        (
            matrix.slice(0..split_idx),
            matrix.slice(split_idx..matrix.len()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ConfigPatch;
    use crate::domain::orderbook::OrderBookSample;
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
                bid_size_1: 2.0,
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

    fn zigzag_mids(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| 100.0 + (i % 5) as f64 - (i % 3) as f64 * 0.5)
            .collect()
    }

    #[test]
    fn run_produces_one_report_per_symbol() {
        let mut series_map = BTreeMap::new();
        series_map.insert("AAAUSDT".to_string(), make_series("AAAUSDT", &zigzag_mids(40)));
        series_map.insert("BBBUSDT".to_string(), make_series("BBBUSDT", &zigzag_mids(30)));

        let backtester = Backtester::new(StrategyConfig::default());
        let reports = backtester.run(&series_map).unwrap();

        assert_eq!(reports.len(), 2);
        let report = &reports["AAAUSDT"];
        assert_eq!(report.symbol, "AAAUSDT");
        assert!(report.validation_loss >= 0.0);
        assert!(report.state.metrics.contains_key("final_equity"));
        // Default windows 3/6/9 all fit a 40-sample series.
        assert_eq!(report.interval_volatility.len(), 3);
    }

    #[test]
    fn split_is_chronological() {
        let series = make_series("AAAUSDT", &zigzag_mids(20));
        let config = StrategyConfig::default()
            .clone_with(&ConfigPatch {
                training_ratio: Some(0.6),
                ..ConfigPatch::default()
            })
            .unwrap();
        let backtester = Backtester::new(config);
        let matrix = build_feature_matrix(&series, DEFAULT_HORIZON).unwrap();
        let (train, test) = backtester.split(&matrix);

        assert_eq!(train.len(), 12);
        assert_eq!(test.len(), 8);
        assert_eq!(train.timestamps[11], matrix.timestamps[11]);
        assert_eq!(test.timestamps[0], matrix.timestamps[12]);
        // Every training timestamp precedes every test timestamp.
        assert!(train.timestamps.last().unwrap() < test.timestamps.first().unwrap());
    }

    #[test]
    fn empty_series_map_yields_empty_reports() {
        let backtester = Backtester::new(StrategyConfig::default());
        let reports = backtester.run(&BTreeMap::new()).unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn short_series_still_reports() {
        // Fewer samples than the horizon: everything is sentinel, training
        // degrades to the zero model, no trades.
        let mut series_map = BTreeMap::new();
        series_map.insert("AAAUSDT".to_string(), make_series("AAAUSDT", &[100.0, 101.0, 102.0]));
        let backtester = Backtester::new(StrategyConfig::default());
        let reports = backtester.run(&series_map).unwrap();
        let report = &reports["AAAUSDT"];
        assert_eq!(report.state.trades.len(), 0);
        assert_eq!(report.validation_loss, 0.0);
    }
}
