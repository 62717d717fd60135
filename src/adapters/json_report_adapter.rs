//! JSON file report adapter.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;

use serde::Serialize;
use tracing::info;

use crate::domain::autotune::AutoTuneResult;
use crate::domain::backtest::BacktestReport;
use crate::domain::error::MicrotraderError;
use crate::domain::review::TradeReview;
use crate::ports::report_port::ReportPort;

/// Writes pretty-printed JSON, one document per run.
pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self
    }

    fn write_json<T: Serialize>(
        &self,
        value: &T,
        output_path: &str,
    ) -> Result<(), MicrotraderError> {
        let file = File::create(output_path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), value)?;
        info!(path = output_path, "report written");
        Ok(())
    }
}

impl Default for JsonReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for JsonReportAdapter {
    fn write_backtest(
        &self,
        reports: &BTreeMap<String, BacktestReport>,
        output_path: &str,
    ) -> Result<(), MicrotraderError> {
        self.write_json(reports, output_path)
    }

    fn write_review(
        &self,
        review: &TradeReview,
        output_path: &str,
    ) -> Result<(), MicrotraderError> {
        self.write_json(review, output_path)
    }

    fn write_autotune(
        &self,
        result: &AutoTuneResult,
        output_path: &str,
    ) -> Result<(), MicrotraderError> {
        self.write_json(result, output_path)
    }
}
