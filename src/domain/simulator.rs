//! Strategy replay over a held-out feature slice.
//!
//! Tracks trading capital against a spot "savings" reserve: a slice of every
//! positive net PnL is routed to spot, and spot is raided again only when
//! trading capital falls below the reserve floor. Declined opportunities are
//! replayed as counterfactuals so missed gains and avoided losses stay
//! measurable.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::config::StrategyConfig;
use crate::domain::execution::{decide_execution, net_edge_bps, Side};
use crate::domain::features::FeatureMatrix;
use crate::domain::model::LogisticModel;

/// Slippage assumed for every simulated decision, in basis points.
pub const ASSUMED_SLIPPAGE_BPS: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    Standard,
    Strong,
    Probe,
}

impl TradeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeMode::Standard => "standard",
            TradeMode::Strong => "strong",
            TradeMode::Probe => "probe",
        }
    }
}

/// One executed decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub timestamp: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub spot_allocation: f64,
    pub reinvested: f64,
    pub notional: f64,
    pub fee: f64,
    pub pnl_gross: f64,
    pub pnl: f64,
    pub confidence: f64,
    pub mode: TradeMode,
}

/// Result of one simulation run. The three curves are parallel and satisfy
/// `trading + spot == equity` at every point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyState {
    pub equity_curve: Vec<f64>,
    pub trading_curve: Vec<f64>,
    pub spot_curve: Vec<f64>,
    pub metrics: BTreeMap<String, f64>,
    pub trades: Vec<Trade>,
}

/// Peak-to-trough decline over a curve, in absolute terms. Zero for
/// non-decreasing curves.
pub fn max_drawdown(curve: &[f64]) -> f64 {
    let mut max_dd = 0.0;
    let mut peak = f64::NEG_INFINITY;
    for &value in curve {
        if value > peak {
            peak = value;
        }
        let drawdown = peak - value;
        if drawdown > max_dd {
            max_dd = drawdown;
        }
    }
    max_dd
}

/// Replays the execution policy row by row over `features`. Sentinel-target
/// rows are skipped; the realized PnL of a trade is read off the known
/// direction label, scaled by the spread.
pub fn run_strategy(
    config: &StrategyConfig,
    model: &LogisticModel,
    features: &FeatureMatrix,
) -> StrategyState {
    let mut capital = config.capital;
    let mut spot = 0.0_f64;
    let reserve_floor = config.reserve_floor();

    let mut equity_curve = vec![capital + spot];
    let mut trading_curve = vec![capital];
    let mut spot_curve = vec![spot];
    let mut trades: Vec<Trade> = Vec::new();

    let mut total_pnl = 0.0;
    let mut total_fees = 0.0;
    let mut total_notional = 0.0;
    let mut max_notional = 0.0_f64;
    let mut reinvested_total = 0.0;
    let mut counterfactual_gain = 0.0;
    let mut counterfactual_loss = 0.0;
    let mut counterfactual_opportunities = 0u32;
    let mut counterfactual_avoided = 0u32;
    let mut probe_trades = 0u32;
    let mut strong_trades = 0u32;
    let mut uncertain_skips = 0u32;
    let mut reserve_skips = 0u32;
    let mut emergency_transfers = 0u32;
    let mut emergency_rescued = 0.0;
    let mut good_decisions = 0u32;
    let mut bad_decisions = 0u32;

    let probs = model.predict_proba(&features.features);
    for (idx, &prob) in probs.iter().enumerate() {
        if features.label(idx).is_none() {
            continue;
        }
        let confidence = (prob - 0.5).abs() * 2.0;
        let edge_bps = (prob - 0.5) * 10_000.0;

        if confidence < config.uncertainty_margin {
            uncertain_skips += 1;
            continue;
        }

        let decision = decide_execution(
            edge_bps,
            config.fee_rate,
            ASSUMED_SLIPPAGE_BPS,
            confidence,
            config.decision_threshold,
        );

        let price = features.features[idx][0];
        let max_affordable = if price > 0.0 {
            (capital - reserve_floor).max(0.0) / price
        } else {
            0.0
        };

        let mut size = 0.0;
        let mut mode: Option<TradeMode> = None;
        let side;

        if let Some(ref d) = decision {
            side = d.side;
            size = config
                .max_position
                .min(d.size * config.max_position)
                .min(max_affordable);
            mode = Some(TradeMode::Standard);
            if confidence >= config.strong_signal_threshold {
                let mult = config.strong_signal_multiplier;
                size = (size * mult)
                    .min(config.max_position * mult)
                    .min(max_affordable);
                mode = Some(TradeMode::Strong);
            }
        } else {
            side = if edge_bps > 0.0 { Side::Buy } else { Side::Sell };
            let net_edge = net_edge_bps(edge_bps, config.fee_rate, ASSUMED_SLIPPAGE_BPS);
            if net_edge > 0.0 && confidence >= config.probe_confidence {
                size = (config.max_position * config.probe_ratio).min(max_affordable);
                mode = Some(TradeMode::Probe);
            }
        }

        let direction_pnl = |direction: f64, size: f64| {
            let gross = direction * (features.target[idx] - 0.5) * features.spread[idx] * size;
            let fee = price * size * config.fee_rate;
            (gross, fee, gross - fee)
        };

        let Some(mode) = mode.filter(|_| size > 0.0) else {
            // Declined or unaffordable: replay a maximal affordable trade on
            // paper instead.
            let hypothetical = config.max_position.min(max_affordable);
            if hypothetical <= 0.0 {
                reserve_skips += 1;
            } else {
                let direction = if edge_bps > 0.0 { 1.0 } else { -1.0 };
                let (_, _, net) = direction_pnl(direction, hypothetical);
                if net > 0.0 {
                    counterfactual_gain += net;
                    counterfactual_opportunities += 1;
                } else {
                    counterfactual_loss += net.abs();
                    counterfactual_avoided += 1;
                }
            }
            continue;
        };

        let (pnl_gross, fee, pnl_net) = direction_pnl(side.direction(), size);
        capital += pnl_net;

        let mut spot_allocation = 0.0;
        let mut reinvested = 0.0;
        if pnl_net > 0.0 {
            spot_allocation = (pnl_net * config.profit_spot_ratio).min(capital.max(0.0));
            capital -= spot_allocation;
            spot += spot_allocation;
            reinvested = pnl_net - spot_allocation;
        }

        if capital < reserve_floor && spot > 0.0 {
            let transfer = (reserve_floor - capital).min(spot);
            spot -= transfer;
            capital += transfer;
            emergency_transfers += 1;
            emergency_rescued += transfer;
        }
        if capital < 0.0 {
            capital = 0.0;
        }

        let notional = price * size;
        total_pnl += pnl_net;
        total_fees += fee;
        total_notional += notional;
        if notional > max_notional {
            max_notional = notional;
        }
        reinvested_total += reinvested;
        match mode {
            TradeMode::Probe => probe_trades += 1,
            TradeMode::Strong => strong_trades += 1,
            TradeMode::Standard => {}
        }
        if pnl_net > 0.0 {
            good_decisions += 1;
        } else {
            bad_decisions += 1;
        }

        trades.push(Trade {
            timestamp: features.timestamps[idx].clone(),
            side,
            price,
            size,
            spot_allocation,
            reinvested,
            notional,
            fee,
            pnl_gross,
            pnl: pnl_net,
            confidence,
            mode,
        });
        equity_curve.push(capital + spot);
        trading_curve.push(capital);
        spot_curve.push(spot);
    }

    let final_equity = capital + spot;
    let avg_notional = if trades.is_empty() {
        0.0
    } else {
        total_notional / trades.len() as f64
    };
    let spot_ratio = if final_equity > 0.0 {
        spot / final_equity
    } else {
        0.0
    };

    let mut metrics = BTreeMap::new();
    metrics.insert("trade_count".into(), trades.len() as f64);
    metrics.insert("final_equity".into(), final_equity);
    metrics.insert("trading_capital".into(), capital);
    metrics.insert("spot_saved".into(), spot);
    metrics.insert("reinvested_capital".into(), reinvested_total);
    metrics.insert("total_pnl".into(), total_pnl);
    metrics.insert("total_fees".into(), total_fees);
    metrics.insert("average_trade_size_usd".into(), avg_notional);
    metrics.insert("max_notional_usd".into(), max_notional);
    metrics.insert("max_drawdown".into(), max_drawdown(&equity_curve));
    metrics.insert("spot_ratio".into(), spot_ratio);
    metrics.insert("counterfactual_gain".into(), counterfactual_gain);
    metrics.insert("counterfactual_loss".into(), counterfactual_loss);
    metrics.insert(
        "counterfactual_opportunities".into(),
        f64::from(counterfactual_opportunities),
    );
    metrics.insert(
        "counterfactual_avoided".into(),
        f64::from(counterfactual_avoided),
    );
    metrics.insert("probe_trades".into(), f64::from(probe_trades));
    metrics.insert("strong_trades".into(), f64::from(strong_trades));
    metrics.insert("uncertain_skips".into(), f64::from(uncertain_skips));
    metrics.insert("reserve_skips".into(), f64::from(reserve_skips));
    metrics.insert("emergency_transfers".into(), f64::from(emergency_transfers));
    metrics.insert("emergency_rescued".into(), emergency_rescued);
    metrics.insert("good_decisions".into(), f64::from(good_decisions));
    metrics.insert("bad_decisions".into(), f64::from(bad_decisions));
    metrics.insert("decision_threshold".into(), config.decision_threshold);
    metrics.insert("max_position".into(), config.max_position);
    metrics.insert("training_ratio".into(), config.training_ratio);
    metrics.insert("profit_spot_ratio".into(), config.profit_spot_ratio);
    metrics.insert("probe_ratio".into(), config.probe_ratio);
    metrics.insert(
        "strong_signal_multiplier".into(),
        config.strong_signal_multiplier,
    );

    StrategyState {
        equity_curve,
        trading_curve,
        spot_curve,
        metrics,
        trades,
    }
}
