#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use microtrader::domain::config::{ConfigPatch, StrategyConfig};
use microtrader::domain::error::MicrotraderError;
pub use microtrader::domain::orderbook::{OrderBookSample, OrderBookSeries};
use microtrader::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: BTreeMap<String, OrderBookSeries>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            error: None,
        }
    }

    pub fn with_series(mut self, series: OrderBookSeries) -> Self {
        self.data.insert(series.symbol.clone(), series);
        self
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn load_series(&self) -> Result<BTreeMap<String, OrderBookSeries>, MicrotraderError> {
        if let Some(reason) = &self.error {
            return Err(MicrotraderError::Csv {
                reason: reason.clone(),
            });
        }
        Ok(self.data.clone())
    }
}

/// One book snapshot around `mid` with a one-unit spread, offset `i` seconds
/// into the session.
pub fn make_sample(i: usize, mid: f64) -> OrderBookSample {
    OrderBookSample {
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
    }
}

pub fn make_series(symbol: &str, mids: &[f64]) -> OrderBookSeries {
    OrderBookSeries {
        symbol: symbol.to_string(),
        samples: mids
            .iter()
            .enumerate()
            .map(|(i, &mid)| make_sample(i, mid))
            .collect(),
    }
}

/// Mid path that oscillates without trending, long enough to train on.
pub fn zigzag_mids(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| 100.0 + ((i * 7) % 11) as f64 * 0.4 - ((i * 3) % 5) as f64 * 0.3)
        .collect()
}

pub fn make_config(patch: ConfigPatch) -> StrategyConfig {
    StrategyConfig::default().clone_with(&patch).unwrap()
}

pub fn make_series_map(symbols: &[(&str, usize)]) -> BTreeMap<String, OrderBookSeries> {
    symbols
        .iter()
        .map(|(symbol, len)| {
            (
                symbol.to_string(),
                make_series(symbol, &zigzag_mids(*len)),
            )
        })
        .collect()
}

/// CSV export of a series map in the adapter's expected schema, rows in
/// timestamp order.
pub fn series_map_to_csv(series_map: &BTreeMap<String, OrderBookSeries>) -> String {
    let mut rows: Vec<(chrono::DateTime<Utc>, String)> = Vec::new();
    for (symbol, series) in series_map {
        for s in &series.samples {
            rows.push((
                s.timestamp,
                format!(
                    "{},{},{},{},{},{},{},{},{},{},{}",
                    s.timestamp.to_rfc3339(),
                    symbol,
                    s.bid_price_1,
                    s.bid_size_1,
                    s.ask_price_1,
                    s.ask_size_1,
                    s.bid_price_2,
                    s.bid_size_2,
                    s.ask_price_2,
                    s.ask_size_2,
                    s.trade_volume,
                ),
            ));
        }
    }
    rows.sort_by_key(|(ts, _)| *ts);

    let mut out = String::from(
        "timestamp,symbol,bid_price_1,bid_size_1,ask_price_1,ask_size_1,\
         bid_price_2,bid_size_2,ask_price_2,ask_size_2,trade_volume\n",
    );
    for (_, row) in rows {
        out.push_str(&row);
        out.push('\n');
    }
    out
}
