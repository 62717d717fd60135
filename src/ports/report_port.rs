//! Report generation port trait.

use std::collections::BTreeMap;

use crate::domain::autotune::AutoTuneResult;
use crate::domain::backtest::BacktestReport;
use crate::domain::error::MicrotraderError;
use crate::domain::review::TradeReview;

/// Port for exporting run results.
pub trait ReportPort {
    fn write_backtest(
        &self,
        reports: &BTreeMap<String, BacktestReport>,
        output_path: &str,
    ) -> Result<(), MicrotraderError>;

    fn write_review(
        &self,
        review: &TradeReview,
        output_path: &str,
    ) -> Result<(), MicrotraderError>;

    fn write_autotune(
        &self,
        result: &AutoTuneResult,
        output_path: &str,
    ) -> Result<(), MicrotraderError>;
}
