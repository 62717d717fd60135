//! Grid-search calibration of the six strategy hyperparameters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::backtest::{BacktestReport, Backtester};
use crate::domain::config::{ConfigPatch, StrategyConfig};
use crate::domain::orderbook::OrderBookSeries;

const AXES: usize = 6;

/// Valid range each axis is clamped into before evaluation.
const THRESHOLD_RANGE: (f64, f64) = (0.51, 0.95);
const POSITION_RANGE: (f64, f64) = (0.2, 2.0);
const RATIO_RANGE: (f64, f64) = (0.5, 0.9);
const SPOT_RATIO_RANGE: (f64, f64) = (0.05, 0.95);
const MULTIPLIER_RANGE: (f64, f64) = (1.0, 3.0);
const PROBE_RATIO_RANGE: (f64, f64) = (0.02, 0.6);

const DRAWDOWN_PENALTY: f64 = 0.5;
const SPOT_BONUS: f64 = 0.1;

/// Explicit candidate lists per axis; unset axes fall back to a small
/// neighborhood of the base value. All lists are sanitized (clamped,
/// deduplicated, sorted) before use.
#[derive(Debug, Clone, Default)]
pub struct GridCandidates {
    pub thresholds: Option<Vec<f64>>,
    pub max_positions: Option<Vec<f64>>,
    pub training_ratios: Option<Vec<f64>>,
    pub spot_ratios: Option<Vec<f64>>,
    pub strong_multipliers: Option<Vec<f64>>,
    pub probe_ratios: Option<Vec<f64>>,
}

/// Cooperative cancellation flag checked between grid evaluations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// One evaluated grid point.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub decision_threshold: f64,
    pub max_position: f64,
    pub training_ratio: f64,
    pub profit_spot_ratio: f64,
    pub strong_signal_multiplier: f64,
    pub probe_ratio: f64,
    pub final_equity: f64,
    pub total_pnl: f64,
    pub max_drawdown: f64,
    pub spot_saved: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoTuneResult {
    pub best_config: StrategyConfig,
    pub best_score: f64,
    pub evaluations: Vec<EvaluationResult>,
}

/// Evaluates the Cartesian product of the six candidate axes in parallel
/// and returns the best-scoring configuration alongside every evaluation.
///
/// Grid points are independent: a failing point is logged and skipped, and
/// already-computed evaluations stay valid when the token cancels the rest
/// of the search. With no successful evaluation the base config is returned
/// with a score of negative infinity.
pub fn auto_calibrate(
    series_map: &BTreeMap<String, OrderBookSeries>,
    base_config: &StrategyConfig,
    candidates: &GridCandidates,
    cancel: &CancelToken,
) -> AutoTuneResult {
    let axes = build_axes(base_config, candidates);
    let points = cartesian_product(&axes);
    debug!(points = points.len(), "starting calibration grid");

    let outcomes: Vec<(StrategyConfig, EvaluationResult)> = points
        .par_iter()
        .filter_map(|point| {
            if cancel.is_cancelled() {
                return None;
            }
            match evaluate_point(series_map, base_config, point) {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(error = %e, "skipping failed grid point");
                    None
                }
            }
        })
        .collect();

    let mut best_score = f64::NEG_INFINITY;
    let mut best_config = base_config.clone();
    let mut evaluations = Vec::with_capacity(outcomes.len());
    for (config, evaluation) in outcomes {
        if evaluation.score > best_score {
            best_score = evaluation.score;
            best_config = config;
        }
        evaluations.push(evaluation);
    }

    AutoTuneResult {
        best_config,
        best_score,
        evaluations,
    }
}

/// Scores a report set: summed PnL, penalized by drawdown, rewarded for
/// banked spot. Empty report sets score negative infinity so they are never
/// selected.
pub fn score_reports(reports: &BTreeMap<String, BacktestReport>) -> f64 {
    if reports.is_empty() {
        return f64::NEG_INFINITY;
    }
    let (pnl, drawdown, spot) = sum_outcomes(reports);
    pnl - DRAWDOWN_PENALTY * drawdown + SPOT_BONUS * spot
}

fn sum_outcomes(reports: &BTreeMap<String, BacktestReport>) -> (f64, f64, f64) {
    let mut pnl = 0.0;
    let mut drawdown = 0.0;
    let mut spot = 0.0;
    for report in reports.values() {
        let get = |key: &str| report.state.metrics.get(key).copied().unwrap_or(0.0);
        pnl += get("total_pnl");
        drawdown += get("max_drawdown");
        spot += get("spot_saved");
    }
    (pnl, drawdown, spot)
}

fn evaluate_point(
    series_map: &BTreeMap<String, OrderBookSeries>,
    base_config: &StrategyConfig,
    point: &[f64; AXES],
) -> Result<(StrategyConfig, EvaluationResult), crate::domain::error::MicrotraderError> {
    let [threshold, max_position, training_ratio, spot_ratio, multiplier, probe_ratio] = *point;
    let candidate = base_config.clone_with(&ConfigPatch {
        decision_threshold: Some(threshold),
        max_position: Some(max_position),
        training_ratio: Some(training_ratio),
        profit_spot_ratio: Some(spot_ratio),
        strong_signal_multiplier: Some(multiplier),
        probe_ratio: Some(probe_ratio),
        ..ConfigPatch::default()
    })?;

    let reports = Backtester::new(candidate.clone()).run(series_map)?;
    let score = score_reports(&reports);
    let (total_pnl, max_drawdown, spot_saved) = sum_outcomes(&reports);
    let final_equity = reports
        .values()
        .map(|r| r.state.metrics.get("final_equity").copied().unwrap_or(0.0))
        .sum();

    Ok((
        candidate,
        EvaluationResult {
            decision_threshold: threshold,
            max_position,
            training_ratio,
            profit_spot_ratio: spot_ratio,
            strong_signal_multiplier: multiplier,
            probe_ratio,
            final_equity,
            total_pnl,
            max_drawdown,
            spot_saved,
            score,
        },
    ))
}

fn build_axes(base: &StrategyConfig, candidates: &GridCandidates) -> [Vec<f64>; AXES] {
    [
        sanitize_candidates(
            candidates.thresholds.as_deref(),
            &[
                base.decision_threshold * 0.95,
                base.decision_threshold,
                base.decision_threshold * 1.05,
            ],
            THRESHOLD_RANGE,
        ),
        sanitize_candidates(
            candidates.max_positions.as_deref(),
            &[
                base.max_position * 0.8,
                base.max_position,
                base.max_position * 1.2,
            ],
            POSITION_RANGE,
        ),
        sanitize_candidates(
            candidates.training_ratios.as_deref(),
            &[0.6, base.training_ratio, 0.75],
            RATIO_RANGE,
        ),
        sanitize_candidates(
            candidates.spot_ratios.as_deref(),
            &[
                base.profit_spot_ratio * 0.8,
                base.profit_spot_ratio,
                base.profit_spot_ratio * 1.2,
            ],
            SPOT_RATIO_RANGE,
        ),
        sanitize_candidates(
            candidates.strong_multipliers.as_deref(),
            &[
                base.strong_signal_multiplier * 0.9,
                base.strong_signal_multiplier,
                base.strong_signal_multiplier * 1.1,
            ],
            MULTIPLIER_RANGE,
        ),
        sanitize_candidates(
            candidates.probe_ratios.as_deref(),
            &[
                base.probe_ratio * 0.8,
                base.probe_ratio,
                base.probe_ratio * 1.2,
            ],
            PROBE_RATIO_RANGE,
        ),
    ]
}

/// Clamps positive candidates into the axis range, deduplicates and sorts.
/// An empty result falls back to the base (middle fallback) value.
fn sanitize_candidates(
    candidates: Option<&[f64]>,
    fallback: &[f64; 3],
    (lower, upper): (f64, f64),
) -> Vec<f64> {
    let raw = candidates.unwrap_or(fallback);
    let mut sanitized: Vec<f64> = raw
        .iter()
        .filter(|v| **v > 0.0)
        .map(|v| v.clamp(lower, upper))
        .collect();
    sanitized.sort_by(|a, b| a.total_cmp(b));
    sanitized.dedup();
    if sanitized.is_empty() {
        sanitized.push(fallback[1].clamp(lower, upper));
    }
    sanitized
}

/// Flat enumeration of the grid, leftmost axis varying slowest.
fn cartesian_product(axes: &[Vec<f64>; AXES]) -> Vec<[f64; AXES]> {
    let mut points: Vec<[f64; AXES]> = vec![[0.0; AXES]];
    for (i, axis) in axes.iter().enumerate() {
        let mut next = Vec::with_capacity(points.len() * axis.len());
        for point in &points {
            for &value in axis {
                let mut extended = *point;
                extended[i] = value;
                next.push(extended);
            }
        }
        points = next;
    }
    points
}
