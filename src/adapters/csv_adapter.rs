//! CSV order book snapshot adapter.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

use crate::domain::error::MicrotraderError;
use crate::domain::orderbook::{OrderBookSample, OrderBookSeries};
use crate::ports::data_port::DataPort;

/// Columns a snapshot export must carry, beyond `timestamp` and `symbol`.
const NUMERIC_COLUMNS: [&str; 9] = [
    "bid_price_1",
    "bid_size_1",
    "ask_price_1",
    "ask_size_1",
    "bid_price_2",
    "bid_size_2",
    "ask_price_2",
    "ask_size_2",
    "trade_volume",
];

pub struct CsvOrderBookAdapter {
    path: PathBuf,
}

impl CsvOrderBookAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn column_indices(
        &self,
        headers: &csv::StringRecord,
    ) -> Result<BTreeMap<String, usize>, MicrotraderError> {
        let mut indices = BTreeMap::new();
        for (i, name) in headers.iter().enumerate() {
            indices.insert(name.trim().to_string(), i);
        }
        let mut missing: Vec<&str> = Vec::new();
        for required in ["timestamp", "symbol"].iter().chain(NUMERIC_COLUMNS.iter()) {
            if !indices.contains_key(*required) {
                missing.push(required);
            }
        }
        if !missing.is_empty() {
            return Err(MicrotraderError::SchemaMissingColumns {
                columns: missing.join(", "),
            });
        }
        Ok(indices)
    }
}

impl DataPort for CsvOrderBookAdapter {
    fn load_series(&self) -> Result<BTreeMap<String, OrderBookSeries>, MicrotraderError> {
        if !self.path.exists() {
            return Err(MicrotraderError::DatasetNotFound {
                path: self.path.display().to_string(),
            });
        }

        let mut rdr =
            csv::Reader::from_path(&self.path).map_err(|e| MicrotraderError::Csv {
                reason: format!("failed to open {}: {}", self.path.display(), e),
            })?;
        let headers = rdr
            .headers()
            .map_err(|e| MicrotraderError::Csv {
                reason: format!("failed to read header: {}", e),
            })?
            .clone();
        let indices = self.column_indices(&headers)?;

        let mut rows: Vec<(String, OrderBookSample)> = Vec::new();
        for (row_idx, result) in rdr.records().enumerate() {
            // Row numbers in errors are 1-based data rows, matching what a
            // user sees below the header in a spreadsheet.
            let row = row_idx + 1;
            let record = result.map_err(|e| MicrotraderError::Csv {
                reason: format!("row {}: {}", row, e),
            })?;

            let raw_timestamp = field(&record, &indices, "timestamp");
            let timestamp = parse_timestamp(raw_timestamp).ok_or_else(|| {
                MicrotraderError::FieldInvalid {
                    column: "timestamp".to_string(),
                    row,
                    reason: format!("unrecognized timestamp: {:?}", raw_timestamp),
                }
            })?;
            let symbol = field(&record, &indices, "symbol").to_string();
            if symbol.is_empty() {
                return Err(MicrotraderError::FieldInvalid {
                    column: "symbol".to_string(),
                    row,
                    reason: "empty symbol".to_string(),
                });
            }

            rows.push((
                symbol,
                OrderBookSample {
                    timestamp,
                    bid_price_1: number(&record, &indices, "bid_price_1", row)?,
                    bid_size_1: number(&record, &indices, "bid_size_1", row)?,
                    ask_price_1: number(&record, &indices, "ask_price_1", row)?,
                    ask_size_1: number(&record, &indices, "ask_size_1", row)?,
                    bid_price_2: number(&record, &indices, "bid_price_2", row)?,
                    bid_size_2: number(&record, &indices, "bid_size_2", row)?,
                    ask_price_2: number(&record, &indices, "ask_price_2", row)?,
                    ask_size_2: number(&record, &indices, "ask_size_2", row)?,
                    trade_volume: number(&record, &indices, "trade_volume", row)?,
                },
            ));
        }

        if rows.is_empty() {
            return Err(MicrotraderError::NoData {
                path: self.path.display().to_string(),
            });
        }

        // Global chronological order first; the stable sort keeps same-tick
        // rows in file order within each symbol.
        rows.sort_by_key(|(_, sample)| sample.timestamp);

        let mut series_map: BTreeMap<String, OrderBookSeries> = BTreeMap::new();
        for (symbol, sample) in rows {
            series_map
                .entry(symbol.clone())
                .or_insert_with(|| OrderBookSeries {
                    symbol,
                    samples: Vec::new(),
                })
                .samples
                .push(sample);
        }
        debug!(
            path = %self.path.display(),
            symbols = series_map.len(),
            "loaded order book snapshots"
        );
        Ok(series_map)
    }
}

fn field<'r>(
    record: &'r csv::StringRecord,
    indices: &BTreeMap<String, usize>,
    column: &str,
) -> &'r str {
    record.get(indices[column]).unwrap_or("").trim()
}

fn number(
    record: &csv::StringRecord,
    indices: &BTreeMap<String, usize>,
    column: &str,
    row: usize,
) -> Result<f64, MicrotraderError> {
    let raw = field(record, indices, column);
    raw.parse().map_err(|_| MicrotraderError::FieldInvalid {
        column: column.to_string(),
        row,
        reason: format!("not a number: {:?}", raw),
    })
}

/// Accepts RFC 3339 timestamps as well as the naive `T`- or space-separated
/// forms common in exchange exports. Naive timestamps are taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    None
}
