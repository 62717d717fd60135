//! Stateless execution policy.

use serde::Serialize;

/// Net edge above which a decision is flagged aggressive.
const AGGRESSIVE_EDGE_BPS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn direction(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionDecision {
    pub side: Side,
    pub aggressive: bool,
    pub size: f64,
    pub reason: String,
}

/// Edge remaining after fees and expected slippage, in basis points.
pub fn net_edge_bps(edge_bps: f64, fee_rate: f64, expected_slippage_bps: f64) -> f64 {
    edge_bps - fee_rate * 10_000.0 - expected_slippage_bps
}

/// Maps a predicted edge and confidence to an execute/skip decision. Pure
/// and deterministic: `None` when confidence is below the threshold or the
/// net edge is not positive.
pub fn decide_execution(
    edge_bps: f64,
    fee_rate: f64,
    expected_slippage_bps: f64,
    confidence: f64,
    threshold: f64,
) -> Option<ExecutionDecision> {
    if confidence < threshold {
        return None;
    }
    let net_edge = net_edge_bps(edge_bps, fee_rate, expected_slippage_bps);
    if net_edge <= 0.0 {
        return None;
    }
    let side = if edge_bps > 0.0 { Side::Buy } else { Side::Sell };
    Some(ExecutionDecision {
        side,
        aggressive: net_edge > AGGRESSIVE_EDGE_BPS,
        size: confidence.min(1.0),
        reason: format!("edge={edge_bps:.2}bps"),
    })
}
