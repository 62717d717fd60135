//! Data access port trait.

use std::collections::BTreeMap;

use crate::domain::error::MicrotraderError;
use crate::domain::orderbook::OrderBookSeries;

pub trait DataPort {
    /// Loads every symbol's order book series, keyed by symbol.
    fn load_series(&self) -> Result<BTreeMap<String, OrderBookSeries>, MicrotraderError>;
}
