//! CLI definition and dispatch.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use crate::adapters::csv_adapter::CsvOrderBookAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::autotune::{auto_calibrate, CancelToken, GridCandidates};
use crate::domain::backtest::{BacktestReport, Backtester, DEFAULT_HORIZON};
use crate::domain::config::{ConfigPatch, StrategyConfig};
use crate::domain::dependencies::analyse_dependencies;
use crate::domain::diagnostics::evaluate_feature_impacts;
use crate::domain::orderbook::OrderBookSeries;
use crate::domain::review::review_trades;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "microtrader", about = "Order book signal backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Strategy parameters overridable from the command line. Unset flags fall
/// back to the config file, then to built-in defaults.
#[derive(Args, Debug, Default)]
pub struct ConfigOverrides {
    #[arg(long)]
    pub decision_threshold: Option<f64>,
    #[arg(long)]
    pub max_position: Option<f64>,
    #[arg(long)]
    pub training_ratio: Option<f64>,
    #[arg(long)]
    pub capital: Option<f64>,
    #[arg(long)]
    pub fee_rate: Option<f64>,
    #[arg(long)]
    pub profit_spot_ratio: Option<f64>,
    #[arg(long)]
    pub min_reserve_ratio: Option<f64>,
    #[arg(long)]
    pub probe_ratio: Option<f64>,
    #[arg(long)]
    pub strong_signal_multiplier: Option<f64>,
}

impl ConfigOverrides {
    fn to_patch(&self) -> ConfigPatch {
        ConfigPatch {
            decision_threshold: self.decision_threshold,
            max_position: self.max_position,
            training_ratio: self.training_ratio,
            capital: self.capital,
            fee_rate: self.fee_rate,
            profit_spot_ratio: self.profit_spot_ratio,
            min_reserve_ratio: self.min_reserve_ratio,
            probe_ratio: self.probe_ratio,
            strong_signal_multiplier: self.strong_signal_multiplier,
            ..ConfigPatch::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest the strategy over an order book snapshot export
    Backtest {
        /// CSV file of order book snapshots
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Label horizon in samples
        #[arg(long)]
        horizon: Option<usize>,
        /// Write the full report as JSON
        #[arg(short, long)]
        export: Option<PathBuf>,
        /// Also report cross-symbol lead/lag correlations
        #[arg(long)]
        show_deps: bool,
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Backtest, then attribute PnL to features and suggest adjustments
    Analyse {
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        horizon: Option<usize>,
        #[arg(short, long)]
        export: Option<PathBuf>,
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Grid-search the strategy hyperparameters
    Autotune {
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        horizon: Option<usize>,
        #[arg(short, long)]
        export: Option<PathBuf>,
        /// Candidate decision thresholds, comma separated
        #[arg(long, value_delimiter = ',')]
        thresholds: Option<Vec<f64>>,
        #[arg(long, value_delimiter = ',')]
        max_positions: Option<Vec<f64>>,
        #[arg(long, value_delimiter = ',')]
        training_ratios: Option<Vec<f64>>,
        #[arg(long, value_delimiter = ',')]
        spot_ratios: Option<Vec<f64>>,
        #[arg(long, value_delimiter = ',')]
        strong_multipliers: Option<Vec<f64>>,
        #[arg(long, value_delimiter = ',')]
        probe_ratios: Option<Vec<f64>>,
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            data,
            config,
            horizon,
            export,
            show_deps,
            overrides,
        } => run_backtest(
            &data,
            config.as_ref(),
            horizon,
            export.as_ref(),
            show_deps,
            &overrides,
        ),
        Command::Analyse {
            data,
            config,
            horizon,
            export,
            overrides,
        } => run_analyse(&data, config.as_ref(), horizon, export.as_ref(), &overrides),
        Command::Autotune {
            data,
            config,
            horizon,
            export,
            thresholds,
            max_positions,
            training_ratios,
            spot_ratios,
            strong_multipliers,
            probe_ratios,
            overrides,
        } => {
            let candidates = GridCandidates {
                thresholds,
                max_positions,
                training_ratios,
                spot_ratios,
                strong_multipliers,
                probe_ratios,
            };
            run_autotune(
                &data,
                config.as_ref(),
                horizon,
                export.as_ref(),
                &candidates,
                &overrides,
            )
        }
    }
}

pub fn build_config(
    config_path: Option<&PathBuf>,
    overrides: &ConfigOverrides,
) -> Result<StrategyConfig, ExitCode> {
    let base = match config_path {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            let adapter = FileConfigAdapter::from_file(path).map_err(|e| {
                eprintln!("error: {e}");
                ExitCode::from(&e)
            })?;
            StrategyConfig::from_config(&adapter).map_err(|e| {
                eprintln!("error: {e}");
                ExitCode::from(&e)
            })?
        }
        None => StrategyConfig::default(),
    };

    base.clone_with(&overrides.to_patch()).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn load_series(data_path: &PathBuf) -> Result<BTreeMap<String, OrderBookSeries>, ExitCode> {
    eprintln!("Loading snapshots from {}", data_path.display());
    let adapter = CsvOrderBookAdapter::new(data_path.clone());
    let series_map = adapter.load_series().map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;
    for (symbol, series) in &series_map {
        eprintln!("  {}: {} samples", symbol, series.len());
    }
    Ok(series_map)
}

fn run_reports(
    series_map: &BTreeMap<String, OrderBookSeries>,
    config: &StrategyConfig,
    horizon: usize,
) -> Result<BTreeMap<String, BacktestReport>, ExitCode> {
    eprintln!(
        "Running backtest: {} symbols, horizon {}",
        series_map.len(),
        horizon,
    );
    let backtester = Backtester::with_horizon(config.clone(), horizon);
    backtester.run(series_map).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn print_summary(reports: &BTreeMap<String, BacktestReport>) {
    let metric = |report: &BacktestReport, key: &str| -> f64 {
        report.state.metrics.get(key).copied().unwrap_or(0.0)
    };

    eprintln!("\n=== Aggregate Results ===");
    let mut total_pnl = 0.0;
    let mut total_equity = 0.0;
    let mut total_spot = 0.0;
    let mut total_trades = 0.0;
    for report in reports.values() {
        total_pnl += metric(report, "total_pnl");
        total_equity += metric(report, "final_equity");
        total_spot += metric(report, "spot_saved");
        total_trades += metric(report, "trade_count");
    }
    eprintln!("Total PnL:        {:.2}", total_pnl);
    eprintln!("Final Equity:     {:.2}", total_equity);
    eprintln!("Spot Saved:       {:.2}", total_spot);
    eprintln!("Total Trades:     {:.0}", total_trades);

    eprintln!("\n=== Per-Symbol Summary ===");
    for (symbol, report) in reports {
        let pnl = metric(report, "total_pnl");
        let pnl_sign = if pnl >= 0.0 { "+" } else { "" };
        eprintln!(
            "  {}:  {:.0} trades, {}{:.2} pnl, {:.2} drawdown, loss {:.4}",
            symbol,
            metric(report, "trade_count"),
            pnl_sign,
            pnl,
            metric(report, "max_drawdown"),
            report.validation_loss,
        );
    }
}

fn export_backtest(
    reports: &BTreeMap<String, BacktestReport>,
    export: Option<&PathBuf>,
) -> Result<(), ExitCode> {
    if let Some(path) = export {
        let out = path.display().to_string();
        JsonReportAdapter::new()
            .write_backtest(reports, &out)
            .map_err(|e| {
                eprintln!("error: {e}");
                ExitCode::from(&e)
            })?;
        eprintln!("\nReport written to: {out}");
    }
    Ok(())
}

fn run_backtest(
    data_path: &PathBuf,
    config_path: Option<&PathBuf>,
    horizon: Option<usize>,
    export: Option<&PathBuf>,
    show_deps: bool,
    overrides: &ConfigOverrides,
) -> ExitCode {
    let config = match build_config(config_path, overrides) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let series_map = match load_series(data_path) {
        Ok(m) => m,
        Err(code) => return code,
    };
    let reports = match run_reports(&series_map, &config, horizon.unwrap_or(DEFAULT_HORIZON)) {
        Ok(r) => r,
        Err(code) => return code,
    };

    print_summary(&reports);

    if show_deps {
        let dependencies = analyse_dependencies(&series_map);
        if !dependencies.is_empty() {
            eprintln!("\n=== Cross-Symbol Dependencies ===");
            for dep in &dependencies {
                eprintln!(
                    "  {} / {}:  corr {:.3}, best lag {} (corr {:.3})",
                    dep.symbol_a,
                    dep.symbol_b,
                    dep.correlation,
                    dep.lead_lag,
                    dep.lead_correlation,
                );
            }
        }
    }

    if let Err(code) = export_backtest(&reports, export) {
        return code;
    }
    ExitCode::SUCCESS
}

fn run_analyse(
    data_path: &PathBuf,
    config_path: Option<&PathBuf>,
    horizon: Option<usize>,
    export: Option<&PathBuf>,
    overrides: &ConfigOverrides,
) -> ExitCode {
    let config = match build_config(config_path, overrides) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let series_map = match load_series(data_path) {
        Ok(m) => m,
        Err(code) => return code,
    };
    let horizon = horizon.unwrap_or(DEFAULT_HORIZON);
    let reports = match run_reports(&series_map, &config, horizon) {
        Ok(r) => r,
        Err(code) => return code,
    };

    print_summary(&reports);

    let impacts = match evaluate_feature_impacts(&series_map, &reports, horizon) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let review = review_trades(&reports, Some(&impacts));

    if !review.loss_drivers.is_empty() {
        eprintln!("\n=== Loss Drivers ===");
        for effect in &review.loss_drivers {
            eprintln!(
                "  {}:  diff {:+.4} over {} trades",
                effect.feature, effect.difference, effect.trade_count,
            );
        }
    }
    if !review.gain_drivers.is_empty() {
        eprintln!("\n=== Gain Drivers ===");
        for effect in &review.gain_drivers {
            eprintln!(
                "  {}:  diff {:+.4} over {} trades",
                effect.feature, effect.difference, effect.trade_count,
            );
        }
    }
    eprintln!("\n=== Suggested Adjustments ===");
    if review.suggestions.is_empty() {
        eprintln!("  (none)");
    } else {
        for suggestion in &review.suggestions {
            eprintln!(
                "  {} -> {:.2}  ({})",
                suggestion.parameter, suggestion.suggested_value, suggestion.rationale,
            );
        }
    }

    if let Some(path) = export {
        let out = path.display().to_string();
        if let Err(e) = JsonReportAdapter::new().write_review(&review, &out) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        eprintln!("\nReport written to: {out}");
    }
    ExitCode::SUCCESS
}

fn run_autotune(
    data_path: &PathBuf,
    config_path: Option<&PathBuf>,
    horizon: Option<usize>,
    export: Option<&PathBuf>,
    candidates: &GridCandidates,
    overrides: &ConfigOverrides,
) -> ExitCode {
    let config = match build_config(config_path, overrides) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let series_map = match load_series(data_path) {
        Ok(m) => m,
        Err(code) => return code,
    };
    if horizon.is_some() {
        // The calibrator scores with the default horizon; an override here
        // would silently diverge from the scored configuration.
        eprintln!("warning: --horizon is ignored by autotune");
    }

    eprintln!("Calibrating over {} symbols", series_map.len());
    let result = auto_calibrate(&series_map, &config, candidates, &CancelToken::new());

    eprintln!("\n=== Calibration Results ===");
    eprintln!("Evaluations:      {}", result.evaluations.len());
    eprintln!("Best Score:       {:.2}", result.best_score);
    let best = &result.best_config;
    eprintln!("Best Parameters:");
    eprintln!("  decision_threshold       {:.3}", best.decision_threshold);
    eprintln!("  max_position             {:.3}", best.max_position);
    eprintln!("  training_ratio           {:.3}", best.training_ratio);
    eprintln!("  profit_spot_ratio        {:.3}", best.profit_spot_ratio);
    eprintln!(
        "  strong_signal_multiplier {:.3}",
        best.strong_signal_multiplier
    );
    eprintln!("  probe_ratio              {:.3}", best.probe_ratio);

    if let Some(path) = export {
        let out = path.display().to_string();
        if let Err(e) = JsonReportAdapter::new().write_autotune(&result, &out) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        eprintln!("\nReport written to: {out}");
    }
    ExitCode::SUCCESS
}
