//! Strategy configuration and risk limits.

use serde::Serialize;

use crate::domain::error::MicrotraderError;
use crate::ports::config_port::ConfigPort;

/// Hard safety limits enforced around the strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskLimits {
    pub intraday_drawdown: f64,
    pub cvar_limit: f64,
    pub max_participation: f64,
    pub max_vpin: f64,
    pub slippage_budget_bps: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            intraday_drawdown: 0.04,
            cvar_limit: 0.06,
            max_participation: 0.15,
            max_vpin: 0.6,
            slippage_budget_bps: 6.0,
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<(), MicrotraderError> {
        validate_open_unit("risk.intraday_drawdown", self.intraday_drawdown)?;
        validate_open_unit("risk.cvar_limit", self.cvar_limit)?;
        if !(self.max_participation > 0.0 && self.max_participation <= 1.0) {
            return Err(invalid("risk.max_participation", "must lie in (0,1]"));
        }
        validate_open_unit("risk.max_vpin", self.max_vpin)?;
        if self.slippage_budget_bps <= 0.0 {
            return Err(invalid("risk.slippage_budget_bps", "must be positive"));
        }
        Ok(())
    }
}

/// Parameters driving training, execution and capital management.
///
/// Construct via [`StrategyConfig::default`], [`StrategyConfig::from_config`]
/// or [`StrategyConfig::clone_with`]; all three validate every field, so a
/// held instance is always internally consistent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyConfig {
    pub training_ratio: f64,
    pub decision_threshold: f64,
    pub capital: f64,
    pub max_position: f64,
    pub fee_rate: f64,
    pub evaluation_windows: Vec<usize>,
    pub profit_spot_ratio: f64,
    pub min_reserve_ratio: f64,
    pub probe_ratio: f64,
    pub probe_confidence: f64,
    pub uncertainty_margin: f64,
    pub strong_signal_threshold: f64,
    pub strong_signal_multiplier: f64,
    pub risk_limits: RiskLimits,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            training_ratio: 0.65,
            decision_threshold: 0.58,
            capital: 5_000.0,
            max_position: 0.75,
            fee_rate: 0.0004,
            evaluation_windows: vec![3, 6, 9],
            profit_spot_ratio: 0.5,
            min_reserve_ratio: 0.1,
            probe_ratio: 0.2,
            probe_confidence: 0.4,
            uncertainty_margin: 0.05,
            strong_signal_threshold: 0.75,
            strong_signal_multiplier: 1.5,
            risk_limits: RiskLimits::default(),
        }
    }
}

/// Named overrides applied by [`StrategyConfig::clone_with`]. Unset fields
/// keep the source value.
#[derive(Debug, Clone, Default)]
pub struct ConfigPatch {
    pub training_ratio: Option<f64>,
    pub decision_threshold: Option<f64>,
    pub capital: Option<f64>,
    pub max_position: Option<f64>,
    pub fee_rate: Option<f64>,
    pub evaluation_windows: Option<Vec<usize>>,
    pub profit_spot_ratio: Option<f64>,
    pub min_reserve_ratio: Option<f64>,
    pub probe_ratio: Option<f64>,
    pub probe_confidence: Option<f64>,
    pub uncertainty_margin: Option<f64>,
    pub strong_signal_threshold: Option<f64>,
    pub strong_signal_multiplier: Option<f64>,
    pub intraday_drawdown: Option<f64>,
    pub cvar_limit: Option<f64>,
    pub max_participation: Option<f64>,
    pub max_vpin: Option<f64>,
    pub slippage_budget_bps: Option<f64>,
}

impl StrategyConfig {
    /// Returns a new validated config with the patched fields replaced. The
    /// receiver is left untouched.
    pub fn clone_with(&self, patch: &ConfigPatch) -> Result<Self, MicrotraderError> {
        let mut next = self.clone();
        if let Some(v) = patch.training_ratio {
            next.training_ratio = v;
        }
        if let Some(v) = patch.decision_threshold {
            next.decision_threshold = v;
        }
        if let Some(v) = patch.capital {
            next.capital = v;
        }
        if let Some(v) = patch.max_position {
            next.max_position = v;
        }
        if let Some(v) = patch.fee_rate {
            next.fee_rate = v;
        }
        if let Some(ref v) = patch.evaluation_windows {
            next.evaluation_windows = v.clone();
        }
        if let Some(v) = patch.profit_spot_ratio {
            next.profit_spot_ratio = v;
        }
        if let Some(v) = patch.min_reserve_ratio {
            next.min_reserve_ratio = v;
        }
        if let Some(v) = patch.probe_ratio {
            next.probe_ratio = v;
        }
        if let Some(v) = patch.probe_confidence {
            next.probe_confidence = v;
        }
        if let Some(v) = patch.uncertainty_margin {
            next.uncertainty_margin = v;
        }
        if let Some(v) = patch.strong_signal_threshold {
            next.strong_signal_threshold = v;
        }
        if let Some(v) = patch.strong_signal_multiplier {
            next.strong_signal_multiplier = v;
        }
        if let Some(v) = patch.intraday_drawdown {
            next.risk_limits.intraday_drawdown = v;
        }
        if let Some(v) = patch.cvar_limit {
            next.risk_limits.cvar_limit = v;
        }
        if let Some(v) = patch.max_participation {
            next.risk_limits.max_participation = v;
        }
        if let Some(v) = patch.max_vpin {
            next.risk_limits.max_vpin = v;
        }
        if let Some(v) = patch.slippage_budget_bps {
            next.risk_limits.slippage_budget_bps = v;
        }
        next.validated()
    }

    /// Builds a config from `[strategy]` and `[risk]` sections, falling back
    /// to defaults for absent keys.
    pub fn from_config(adapter: &dyn ConfigPort) -> Result<Self, MicrotraderError> {
        let base = Self::default();
        let windows = match adapter.get_string("strategy", "evaluation_windows") {
            Some(raw) => parse_windows(&raw)?,
            None => base.evaluation_windows.clone(),
        };
        let cfg = Self {
            training_ratio: adapter.get_double("strategy", "training_ratio", base.training_ratio),
            decision_threshold: adapter.get_double(
                "strategy",
                "decision_threshold",
                base.decision_threshold,
            ),
            capital: adapter.get_double("strategy", "capital", base.capital),
            max_position: adapter.get_double("strategy", "max_position", base.max_position),
            fee_rate: adapter.get_double("strategy", "fee_rate", base.fee_rate),
            evaluation_windows: windows,
            profit_spot_ratio: adapter.get_double(
                "strategy",
                "profit_spot_ratio",
                base.profit_spot_ratio,
            ),
            min_reserve_ratio: adapter.get_double(
                "strategy",
                "min_reserve_ratio",
                base.min_reserve_ratio,
            ),
            probe_ratio: adapter.get_double("strategy", "probe_ratio", base.probe_ratio),
            probe_confidence: adapter.get_double(
                "strategy",
                "probe_confidence",
                base.probe_confidence,
            ),
            uncertainty_margin: adapter.get_double(
                "strategy",
                "uncertainty_margin",
                base.uncertainty_margin,
            ),
            strong_signal_threshold: adapter.get_double(
                "strategy",
                "strong_signal_threshold",
                base.strong_signal_threshold,
            ),
            strong_signal_multiplier: adapter.get_double(
                "strategy",
                "strong_signal_multiplier",
                base.strong_signal_multiplier,
            ),
            risk_limits: RiskLimits {
                intraday_drawdown: adapter.get_double(
                    "risk",
                    "intraday_drawdown",
                    base.risk_limits.intraday_drawdown,
                ),
                cvar_limit: adapter.get_double("risk", "cvar_limit", base.risk_limits.cvar_limit),
                max_participation: adapter.get_double(
                    "risk",
                    "max_participation",
                    base.risk_limits.max_participation,
                ),
                max_vpin: adapter.get_double("risk", "max_vpin", base.risk_limits.max_vpin),
                slippage_budget_bps: adapter.get_double(
                    "risk",
                    "slippage_budget_bps",
                    base.risk_limits.slippage_budget_bps,
                ),
            },
        };
        cfg.validated()
    }

    /// Amount of trading capital never risked by the simulator.
    pub fn reserve_floor(&self) -> f64 {
        self.capital * self.min_reserve_ratio
    }

    fn validated(mut self) -> Result<Self, MicrotraderError> {
        validate_open_unit("training_ratio", self.training_ratio)?;
        validate_open_unit("decision_threshold", self.decision_threshold)?;
        if self.capital <= 0.0 {
            return Err(invalid("capital", "must be positive"));
        }
        if self.max_position <= 0.0 {
            return Err(invalid("max_position", "must be positive"));
        }
        if self.fee_rate < 0.0 {
            return Err(invalid("fee_rate", "must not be negative"));
        }
        if self.evaluation_windows.is_empty() {
            return Err(invalid("evaluation_windows", "must not be empty"));
        }
        if self.evaluation_windows.iter().any(|w| *w == 0) {
            return Err(invalid("evaluation_windows", "windows must be positive"));
        }
        self.evaluation_windows.sort_unstable();
        self.evaluation_windows.dedup();
        validate_closed_unit("profit_spot_ratio", self.profit_spot_ratio)?;
        if !(0.0..1.0).contains(&self.min_reserve_ratio) {
            return Err(invalid("min_reserve_ratio", "must lie in [0,1)"));
        }
        if !(self.probe_ratio > 0.0 && self.probe_ratio <= 1.0) {
            return Err(invalid("probe_ratio", "must lie in (0,1]"));
        }
        validate_open_unit("probe_confidence", self.probe_confidence)?;
        if !(0.0..1.0).contains(&self.uncertainty_margin) {
            return Err(invalid("uncertainty_margin", "must lie in [0,1)"));
        }
        validate_open_unit("strong_signal_threshold", self.strong_signal_threshold)?;
        if self.strong_signal_multiplier < 1.0 {
            return Err(invalid("strong_signal_multiplier", "must be at least 1"));
        }
        self.risk_limits.validate()?;
        Ok(self)
    }
}

fn parse_windows(raw: &str) -> Result<Vec<usize>, MicrotraderError> {
    raw.split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>().map_err(|_| {
                invalid("evaluation_windows", "expected comma-separated integers")
            })
        })
        .collect()
}

fn validate_open_unit(field: &str, value: f64) -> Result<(), MicrotraderError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(invalid(field, "must lie in (0,1)"))
    }
}

fn validate_closed_unit(field: &str, value: f64) -> Result<(), MicrotraderError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must lie in [0,1]"))
    }
}

fn invalid(field: &str, reason: &str) -> MicrotraderError {
    MicrotraderError::ConfigInvalid {
        field: field.into(),
        reason: reason.into(),
    }
}
