//! Order book snapshot records.

use chrono::{DateTime, Utc};

/// One level-1/level-2 snapshot with trailing trade volume. Immutable once
/// parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookSample {
    pub timestamp: DateTime<Utc>,
    pub bid_price_1: f64,
    pub bid_size_1: f64,
    pub ask_price_1: f64,
    pub ask_size_1: f64,
    pub bid_price_2: f64,
    pub bid_size_2: f64,
    pub ask_price_2: f64,
    pub ask_size_2: f64,
    pub trade_volume: f64,
}

impl OrderBookSample {
    /// Average of best bid and best ask.
    pub fn mid_price(&self) -> f64 {
        (self.bid_price_1 + self.ask_price_1) / 2.0
    }
}

/// Time-ordered snapshots for a single symbol. Samples are sorted ascending
/// by timestamp at load time; duplicate timestamps are preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookSeries {
    pub symbol: String,
    pub samples: Vec<OrderBookSample>,
}

impl OrderBookSeries {
    pub fn mid_prices(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.mid_price()).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
