//! Heuristic review of completed backtests.
//!
//! The suggestion rules are pattern matches on feature names and metric
//! ratios. They are tunable policy, not market physics; the thresholds live
//! in the constants below.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::backtest::BacktestReport;
use crate::domain::diagnostics::{FeatureEffect, ImpactReport};

const TOP_DRIVERS: usize = 3;
/// Spot share of equity below which saving is considered too timid.
const SPOT_RATIO_FLOOR: f64 = 0.1;
/// Spot share of equity above which capital is considered starved.
const SPOT_RATIO_CEILING: f64 = 0.6;
/// Missed gains must exceed avoided losses by this factor before the review
/// recommends loosening entry.
const UNEXPLOITED_GAIN_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentSuggestion {
    pub parameter: String,
    pub suggested_value: f64,
    pub rationale: String,
}

/// Condensed cross-symbol conclusions from a backtest run.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReview {
    pub total_trades: usize,
    pub total_pnl: f64,
    pub total_fees: f64,
    pub average_trade_notional: f64,
    pub max_notional: f64,
    pub total_spot_saved: f64,
    pub total_trading_capital: f64,
    pub counterfactual_gain: f64,
    pub counterfactual_loss: f64,
    pub loss_drivers: Vec<FeatureEffect>,
    pub gain_drivers: Vec<FeatureEffect>,
    pub suggestions: Vec<AdjustmentSuggestion>,
}

/// Aggregates the metrics of every report and derives adjustment
/// suggestions from the dominant gain/loss drivers.
pub fn review_trades(
    reports: &BTreeMap<String, BacktestReport>,
    impacts: Option<&ImpactReport>,
) -> TradeReview {
    let mut total_trades = 0.0;
    let mut total_pnl = 0.0;
    let mut total_fees = 0.0;
    let mut total_notional = 0.0;
    let mut max_notional = 0.0_f64;
    let mut total_spot = 0.0;
    let mut total_trading = 0.0;
    let mut counterfactual_gain = 0.0;
    let mut counterfactual_loss = 0.0;

    for report in reports.values() {
        let metrics = &report.state.metrics;
        let get = |key: &str| metrics.get(key).copied().unwrap_or(0.0);
        let trades = get("trade_count");
        total_trades += trades;
        total_pnl += get("total_pnl");
        total_fees += get("total_fees");
        total_notional += get("average_trade_size_usd") * trades;
        max_notional = max_notional.max(get("max_notional_usd"));
        total_spot += get("spot_saved");
        total_trading += get("trading_capital");
        counterfactual_gain += get("counterfactual_gain");
        counterfactual_loss += get("counterfactual_loss");
    }

    let average_trade_notional = if total_trades > 0.0 {
        total_notional / total_trades
    } else {
        0.0
    };
    let loss_drivers = impacts
        .map(|i| i.loss_drivers(TOP_DRIVERS))
        .unwrap_or_default();
    let gain_drivers = impacts
        .map(|i| i.gain_drivers(TOP_DRIVERS))
        .unwrap_or_default();

    let suggestions = suggest_adjustments(
        &loss_drivers,
        &gain_drivers,
        total_pnl,
        total_spot,
        total_trading,
        counterfactual_gain,
        counterfactual_loss,
    );

    TradeReview {
        total_trades: total_trades as usize,
        total_pnl,
        total_fees,
        average_trade_notional,
        max_notional,
        total_spot_saved: total_spot,
        total_trading_capital: total_trading,
        counterfactual_gain,
        counterfactual_loss,
        loss_drivers,
        gain_drivers,
        suggestions,
    }
}

fn suggest_adjustments(
    losses: &[FeatureEffect],
    gains: &[FeatureEffect],
    total_pnl: f64,
    total_spot: f64,
    total_trading: f64,
    counterfactual_gain: f64,
    counterfactual_loss: f64,
) -> Vec<AdjustmentSuggestion> {
    let mut suggestions = Vec::new();
    let baseline_threshold: f64 = if total_pnl <= 0.0 { 0.6 } else { 0.55 };

    for effect in losses {
        let feature = effect.feature.to_lowercase();
        if feature.contains("vpin") {
            suggestions.push(AdjustmentSuggestion {
                parameter: "risk.max_vpin".into(),
                suggested_value: 0.5,
                rationale: "Flow toxicity dominates losses; a tighter VPIN cap \
                            filters the worst entries."
                    .into(),
            });
        } else if feature.contains("spread") {
            suggestions.push(AdjustmentSuggestion {
                parameter: "decision_threshold".into(),
                suggested_value: baseline_threshold.max(0.6),
                rationale: "Losses cluster in wide-spread conditions; a higher \
                            confidence bar avoids trading them."
                    .into(),
            });
        } else if feature.contains("queue") || feature.contains("imbalance") {
            suggestions.push(AdjustmentSuggestion {
                parameter: "max_position".into(),
                suggested_value: 0.6,
                rationale: "Adverse queue pressure drives losses; a smaller \
                            maximum position limits the damage."
                    .into(),
            });
        }
    }

    if total_pnl < 0.0 {
        suggestions.push(AdjustmentSuggestion {
            parameter: "training_ratio".into(),
            suggested_value: 0.7,
            rationale: "Net result is negative; more training data usually \
                        stabilizes the model."
                .into(),
        });
    }

    let equity = total_spot + total_trading;
    if equity > 0.0 {
        let spot_ratio = total_spot / equity;
        if spot_ratio < SPOT_RATIO_FLOOR && total_pnl > 0.0 {
            suggestions.push(AdjustmentSuggestion {
                parameter: "profit_spot_ratio".into(),
                suggested_value: 0.6,
                rationale: "Profits exist but almost nothing is banked to spot; \
                            route a larger share of wins to the reserve."
                    .into(),
            });
        } else if spot_ratio > SPOT_RATIO_CEILING {
            suggestions.push(AdjustmentSuggestion {
                parameter: "profit_spot_ratio".into(),
                suggested_value: 0.3,
                rationale: "Most equity sits idle in spot; keep more capital \
                            working in the strategy."
                    .into(),
            });
        }
    }

    if counterfactual_gain > 0.0
        && counterfactual_gain > counterfactual_loss * UNEXPLOITED_GAIN_FACTOR
    {
        suggestions.push(AdjustmentSuggestion {
            parameter: "decision_threshold".into(),
            suggested_value: 0.55,
            rationale: "Declined trades would have netted far more than they \
                        risked; a lower entry bar captures part of that."
                .into(),
        });
        suggestions.push(AdjustmentSuggestion {
            parameter: "probe_ratio".into(),
            suggested_value: 0.3,
            rationale: "Unexploited opportunities warrant larger probe trades \
                        below the main threshold."
                .into(),
        });
    }

    if suggestions.is_empty() {
        if let Some(top_gain) = gains.first() {
            suggestions.push(AdjustmentSuggestion {
                parameter: "decision_threshold".into(),
                suggested_value: baseline_threshold,
                rationale: format!(
                    "Gains are driven by {}; keep current settings and monitor \
                     that signal.",
                    top_gain.feature
                ),
            });
        }
    }

    suggestions
}
