//! Multi-fold batch execution.
//!
//! Runs the neutralize → simulate pipeline over each fold's test window.
//! Folds share no mutable state, so they execute in parallel; a
//! cooperative cancellation flag is checked once per fold, so a cancelled
//! batch still yields only complete fold outputs.

use crate::error::{Result, SimError};
use crate::metrics::MetricsReport;
use crate::neutralize::{self, NeutralizeMethod};
use crate::panel::Panel;
use crate::simulator::{PortfolioSimulator, SimulationResult, SimulatorConfig};
use crate::splitter::Fold;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Configuration for a batch run over folds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Neutralization applied to the raw factor panel per fold.
    pub neutralize: NeutralizeMethod,
    /// Simulator configuration shared by all folds.
    pub simulator: SimulatorConfig,
    /// Show a progress bar while folds run.
    pub show_progress: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            neutralize: NeutralizeMethod::ZScore,
            simulator: SimulatorConfig::default(),
            show_progress: false,
        }
    }
}

/// Output of one fold's test-window simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldRunResult {
    pub fold: Fold,
    pub result: SimulationResult,
    pub metrics: MetricsReport,
}

/// Results across all completed folds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub folds: Vec<FoldRunResult>,
    pub mean_sharpe: f64,
    pub std_sharpe: f64,
    pub min_sharpe: f64,
    pub max_sharpe: f64,
    /// True when the batch stopped early via the cancellation flag.
    pub cancelled: bool,
}

impl BatchResult {
    /// Human-readable cross-fold summary.
    pub fn summary(&self) -> String {
        format!(
            "Fold Batch Summary:\n\
             Folds: {}{}\n\
             Mean Sharpe: {:.3}\n\
             Std Sharpe: {:.3}\n\
             Min Sharpe: {:.3}\n\
             Max Sharpe: {:.3}",
            self.folds.len(),
            if self.cancelled { " (cancelled)" } else { "" },
            self.mean_sharpe,
            self.std_sharpe,
            self.min_sharpe,
            self.max_sharpe
        )
    }
}

/// Run each fold's test window through neutralization and simulation.
///
/// `cancel` is checked before each fold starts; folds already running
/// complete normally. Returns an error only when every requested fold
/// failed fatally (per-fold fatal errors are logged and skipped so one
/// bad window cannot sink a batch).
pub fn run_folds(
    folds: &[Fold],
    raw_factor: &Panel,
    prices: &Panel,
    volumes: Option<&Panel>,
    config: &BatchConfig,
    cancel: Option<&AtomicBool>,
) -> Result<BatchResult> {
    if folds.is_empty() {
        return Err(SimError::ConfigError("no folds to run".into()));
    }
    info!(folds = folds.len(), "starting fold batch");

    let progress = if config.show_progress {
        let pb = ProgressBar::new(folds.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} folds")
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let outcomes: Vec<Option<FoldRunResult>> = folds
        .par_iter()
        .map(|fold| {
            if cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false) {
                return None;
            }
            let outcome = run_fold(fold, raw_factor, prices, volumes, config);
            if let Some(ref pb) = progress {
                pb.inc(1);
            }
            match outcome {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(fold = fold.index, error = %e, "fold failed, skipping");
                    None
                }
            }
        })
        .collect();

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let cancelled = cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false);
    let completed: Vec<FoldRunResult> = outcomes.into_iter().flatten().collect();
    if completed.is_empty() && !cancelled {
        return Err(SimError::InsufficientData("all folds failed".into()));
    }

    let sharpes: Vec<f64> = completed.iter().map(|f| f.metrics.sharpe).collect();
    let (mean, sd, min, max) = spread(&sharpes);

    info!(completed = completed.len(), cancelled, "fold batch complete");
    Ok(BatchResult {
        folds: completed,
        mean_sharpe: mean,
        std_sharpe: sd,
        min_sharpe: min,
        max_sharpe: max,
        cancelled,
    })
}

fn run_fold(
    fold: &Fold,
    raw_factor: &Panel,
    prices: &Panel,
    volumes: Option<&Panel>,
    config: &BatchConfig,
) -> Result<FoldRunResult> {
    let test_prices = prices.window(fold.test_start, fold.test_end);
    let test_raw = raw_factor.window(fold.test_start, fold.test_end);
    let test_volumes = volumes.map(|v| v.window(fold.test_start, fold.test_end));

    let (signal, mut diagnostics) = neutralize::apply(&test_raw, &config.neutralize)?;

    let simulator = PortfolioSimulator::new(config.simulator.clone());
    let mut result = simulator.run(&signal, &test_prices, test_volumes.as_ref())?;
    diagnostics.append(&mut result.diagnostics);
    result.diagnostics = diagnostics;

    let metrics = MetricsReport::from_result(&result, &signal, &test_prices);
    Ok(FoldRunResult {
        fold: fold.clone(),
        result,
        metrics,
    })
}

fn spread(values: &[f64]) -> (f64, f64, f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (mean, var.sqrt(), min, max)
}
