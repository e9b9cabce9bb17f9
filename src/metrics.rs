//! Summary statistics over simulator output.
//!
//! Thin aggregation layer: the heavy lifting (persistence, plotting,
//! attribution reports) belongs to external consumers. Everything here is
//! a pure reduction over the return, turnover, and signal series.

use crate::error::Result;
use crate::panel::Panel;
use crate::simulator::SimulationResult;
use crate::types::SeriesPoint;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Trading periods per year used for annualization.
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Annualized Sharpe ratio of a per-period return series.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let sd = var.sqrt();
    if sd < 1e-12 {
        return 0.0;
    }
    mean / sd * PERIODS_PER_YEAR.sqrt()
}

/// Maximum peak-to-trough drawdown of the compounded return path, as a
/// positive fraction.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0f64;
    let mut peak = 1.0f64;
    let mut worst = 0.0f64;
    for r in returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.max(1.0 - equity / peak);
        }
    }
    worst
}

/// Mean of a turnover series.
pub fn mean_turnover(turnover: &[SeriesPoint]) -> f64 {
    if turnover.is_empty() {
        return 0.0;
    }
    turnover.iter().map(|p| p.value).sum::<f64>() / turnover.len() as f64
}

/// Information coefficient: per-date Pearson correlation between the
/// signal cross-section and the next date's return cross-section,
/// averaged over dates with at least three overlapping symbols.
pub fn information_coefficient(signal: &Panel, prices: &Panel) -> f64 {
    let mut ics = Vec::new();
    let dates = prices.dates();
    for t in 0..dates.len().saturating_sub(1) {
        let signal_row = match signal.row_for_date(dates[t]) {
            Some(r) => r,
            None => continue,
        };
        let today = prices.row(t);
        let next = prices.row(t + 1);

        let mut pairs: Vec<(f64, f64)> = signal_row
            .iter()
            .filter_map(|(symbol, &s)| {
                let p0 = today.get(symbol)?;
                let p1 = next.get(symbol)?;
                if *p0 > 0.0 {
                    Some((s, p1 / p0 - 1.0))
                } else {
                    None
                }
            })
            .collect();
        pairs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        if pairs.len() >= 3 {
            if let Some(ic) = pearson(&pairs) {
                ics.push(ic);
            }
        }
    }
    if ics.is_empty() {
        0.0
    } else {
        ics.iter().sum::<f64>() / ics.len() as f64
    }
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    let denom = (var_x * var_y).sqrt();
    if denom < 1e-12 {
        None
    } else {
        Some(cov / denom)
    }
}

/// Summary statistics for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub total_return: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub mean_turnover: f64,
    pub information_coefficient: f64,
    pub trading_days: usize,
    pub diagnostics: usize,
}

impl MetricsReport {
    /// Reduce a simulation result (plus the signal/price inputs for IC)
    /// to summary statistics.
    pub fn from_result(result: &SimulationResult, signal: &Panel, prices: &Panel) -> Self {
        let returns: Vec<f64> = result.returns.iter().map(|p| p.value).collect();
        Self {
            total_return: result.total_return(),
            sharpe: sharpe_ratio(&returns),
            max_drawdown: max_drawdown(&returns),
            mean_turnover: mean_turnover(&result.turnover),
            information_coefficient: information_coefficient(signal, prices),
            trading_days: returns.len(),
            diagnostics: result.diagnostics.len(),
        }
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Backtest Summary:\n\
             Trading Days: {}\n\
             Total Return: {:.2}%\n\
             Sharpe: {:.2}\n\
             Max Drawdown: {:.2}%\n\
             Mean Turnover: {:.4}\n\
             IC: {:.4}\n\
             Diagnostics: {}",
            self.trading_days,
            self.total_return * 100.0,
            self.sharpe,
            self.max_drawdown * 100.0,
            self.mean_turnover,
            self.information_coefficient,
            self.diagnostics
        )
    }

    /// Write the report as JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
