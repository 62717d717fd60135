//! Microstructure feature derivation from order book series.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::domain::error::MicrotraderError;
use crate::domain::orderbook::{OrderBookSample, OrderBookSeries};

pub const FEATURE_COUNT: usize = 8;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "mid",
    "spread",
    "microprice_edge",
    "imbalance",
    "queue_pressure",
    "delta_mid",
    "delta_volume",
    "rolling_vol",
];

/// Sentinel target for rows too close to the series end to be labeled.
/// Downstream stages exclude these rows from training, scoring and
/// simulation.
pub const UNLABELED: f64 = 0.5;

/// Trailing window for the rolling volatility column.
const ROLLING_WINDOW: usize = 5;

/// Parallel per-row arrays. All four vectors always have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub features: Vec<Vec<f64>>,
    pub target: Vec<f64>,
    pub spread: Vec<f64>,
    pub timestamps: Vec<String>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The direction label for a row, or `None` for sentinel rows.
    pub fn label(&self, idx: usize) -> Option<bool> {
        let target = self.target[idx];
        if target == UNLABELED {
            None
        } else {
            Some(target > 0.5)
        }
    }

    /// A copy of the given row range, preserving the parallel-array
    /// invariant.
    pub fn slice(&self, range: Range<usize>) -> FeatureMatrix {
        FeatureMatrix {
            features: self.features[range.clone()].to_vec(),
            target: self.target[range.clone()].to_vec(),
            spread: self.spread[range.clone()].to_vec(),
            timestamps: self.timestamps[range].to_vec(),
        }
    }
}

/// Derives the fixed eight-column feature matrix and forward-looking
/// direction label for a series. The label of row `i` is 1 when the mid
/// price `horizon` samples ahead is strictly greater than the current mid,
/// else 0; the final `horizon` rows get the [`UNLABELED`] sentinel.
pub fn build_feature_matrix(
    series: &OrderBookSeries,
    horizon: usize,
) -> Result<FeatureMatrix, MicrotraderError> {
    if horizon == 0 {
        return Err(MicrotraderError::InvalidArgument {
            name: "horizon".into(),
            reason: "must be positive".into(),
        });
    }

    let n = series.samples.len();
    let mids = series.mid_prices();
    let spread: Vec<f64> = series
        .samples
        .iter()
        .map(|s| s.ask_price_1 - s.bid_price_1)
        .collect();

    let mut delta_mid = vec![0.0; n];
    let mut delta_volume = vec![0.0; n];
    for i in 1..n {
        delta_mid[i] = mids[i] - mids[i - 1];
        delta_volume[i] = series.samples[i].trade_volume - series.samples[i - 1].trade_volume;
    }
    let rolling_vol = rolling_std(&delta_mid, ROLLING_WINDOW);

    let mut features = Vec::with_capacity(n);
    for (i, sample) in series.samples.iter().enumerate() {
        let queue_pressure = sample.bid_size_1 + sample.bid_size_2
            - sample.ask_size_1
            - sample.ask_size_2;
        features.push(vec![
            mids[i],
            spread[i],
            microprice(sample) - mids[i],
            imbalance(sample),
            queue_pressure,
            delta_mid[i],
            delta_volume[i],
            rolling_vol[i],
        ]);
    }

    let mut target = Vec::with_capacity(n);
    for i in 0..n {
        if i + horizon < n {
            target.push(if mids[i + horizon] > mids[i] { 1.0 } else { 0.0 });
        } else {
            target.push(UNLABELED);
        }
    }

    let timestamps = series
        .samples
        .iter()
        .map(|s| s.timestamp.to_rfc3339())
        .collect();

    Ok(FeatureMatrix {
        features,
        target,
        spread,
        timestamps,
    })
}

/// Population standard deviation of non-overlapping window returns
/// (last minus first mid within each chunk), keyed by window size. Window
/// sizes of 1 or larger than the series are skipped.
pub fn interval_volatility(
    series: &OrderBookSeries,
    windows: &[usize],
) -> BTreeMap<usize, f64> {
    let mids = series.mid_prices();
    let mut result = BTreeMap::new();
    for &size in windows {
        if size <= 1 || size > mids.len() {
            continue;
        }
        let returns: Vec<f64> = mids
            .chunks(size)
            .filter(|chunk| chunk.len() == size)
            .map(|chunk| chunk[size - 1] - chunk[0])
            .collect();
        if returns.is_empty() {
            continue;
        }
        let vol = if returns.len() > 1 {
            population_std(&returns)
        } else {
            0.0
        };
        result.insert(size, vol);
    }
    result
}

/// Size-weighted blend of best bid/ask favoring the thinner side; falls back
/// to the mid when both top sizes are zero.
fn microprice(sample: &OrderBookSample) -> f64 {
    let total = sample.bid_size_1 + sample.ask_size_1;
    if total == 0.0 {
        return sample.mid_price();
    }
    (sample.ask_price_1 * sample.bid_size_1 + sample.bid_price_1 * sample.ask_size_1) / total
}

fn imbalance(sample: &OrderBookSample) -> f64 {
    let total = sample.bid_size_1 + sample.ask_size_1;
    if total == 0.0 {
        return 0.0;
    }
    (sample.bid_size_1 - sample.ask_size_1) / total
}

/// Trailing-window population standard deviation; windows with fewer than
/// two points yield 0.
fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let mut result = Vec::with_capacity(values.len());
    for idx in 0..values.len() {
        let start = idx.saturating_sub(window - 1);
        let segment = &values[start..=idx];
        if segment.len() < 2 {
            result.push(0.0);
        } else {
            result.push(population_std(segment));
        }
    }
    result
}

pub(crate) fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}
