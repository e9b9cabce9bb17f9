//! Cross-sectional neutralization of raw factor values.
//!
//! Each date's cross-section is transformed independently of every other
//! date, so neutralization can never move information through time. Dates
//! are processed in parallel; the output panel keeps the input calendar.

use crate::error::Result;
use crate::panel::Panel;
use crate::types::{Diagnostic, DiagnosticKind};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Minimum cross-section size for a beta regression.
const MIN_BETA_CROSS_SECTION: usize = 3;

const EPS: f64 = 1e-12;

/// Neutralization method applied per date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NeutralizeMethod {
    /// Subtract the cross-sectional mean and divide by the standard
    /// deviation. Degenerate cross-sections (zero stddev) zero out.
    ZScore,
    /// Subtract the mean of each industry bucket. Symbols without a
    /// mapping are masked for the date.
    IndustryDemean {
        industries: HashMap<String, String>,
    },
    /// Regress values on beta exposures (OLS with intercept) and keep the
    /// residual. Dates with fewer than three covered symbols are masked;
    /// on processed dates, symbols without a beta are masked individually.
    BetaNeutral { betas: Panel },
    /// Apply the listed stages in order, each consuming the previous
    /// stage's output.
    Composite(Vec<NeutralizeMethod>),
}

/// Cross-sectional neutralization engine.
///
/// Pure function of its inputs: the only outputs are the signal panel and
/// the diagnostics for masked or degenerate dates.
pub struct NeutralizationEngine {
    method: NeutralizeMethod,
}

impl NeutralizationEngine {
    pub fn new(method: NeutralizeMethod) -> Self {
        Self { method }
    }

    /// Transform a raw factor panel into a signal panel.
    pub fn neutralize(&self, raw: &Panel) -> Result<(Panel, Vec<Diagnostic>)> {
        apply(raw, &self.method)
    }
}

/// Neutralize a raw factor panel with the given method.
pub fn apply(raw: &Panel, method: &NeutralizeMethod) -> Result<(Panel, Vec<Diagnostic>)> {
    if let NeutralizeMethod::Composite(stages) = method {
        let mut current = raw.clone();
        let mut diagnostics = Vec::new();
        for stage in stages {
            let (next, mut diags) = apply(&current, stage)?;
            diagnostics.append(&mut diags);
            current = next;
        }
        return Ok((current, diagnostics));
    }

    let dates = raw.dates().to_vec();
    // Each date is independent, so the cross-sections map in parallel.
    let transformed: Vec<(HashMap<String, f64>, Vec<Diagnostic>)> = (0..raw.len())
        .into_par_iter()
        .map(|idx| transform_date(dates[idx], raw.row(idx), method))
        .collect();

    let mut rows = Vec::with_capacity(transformed.len());
    let mut diagnostics = Vec::new();
    for (row, mut diags) in transformed {
        rows.push(row);
        diagnostics.append(&mut diags);
    }
    debug!(
        dates = dates.len(),
        diagnostics = diagnostics.len(),
        "neutralization complete"
    );
    Ok((Panel::new(dates, rows)?, diagnostics))
}

fn transform_date(
    date: DateTime<Utc>,
    row: &HashMap<String, f64>,
    method: &NeutralizeMethod,
) -> (HashMap<String, f64>, Vec<Diagnostic>) {
    match method {
        NeutralizeMethod::ZScore => zscore_date(date, row),
        NeutralizeMethod::IndustryDemean { industries } => {
            industry_demean_date(date, row, industries)
        }
        NeutralizeMethod::BetaNeutral { betas } => {
            beta_neutral_date(date, row, betas.row_for_date(date))
        }
        NeutralizeMethod::Composite(_) => unreachable!("composite handled by apply"),
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Cross-section in symbol order, so float accumulation never depends on
/// hash iteration order.
fn sorted_xs(row: &HashMap<String, f64>) -> Vec<(&String, f64)> {
    let mut xs: Vec<(&String, f64)> = row.iter().map(|(s, v)| (s, *v)).collect();
    xs.sort_by(|a, b| a.0.cmp(b.0));
    xs
}

fn zscore_date(
    date: DateTime<Utc>,
    row: &HashMap<String, f64>,
) -> (HashMap<String, f64>, Vec<Diagnostic>) {
    if row.is_empty() {
        return (HashMap::new(), Vec::new());
    }
    let values: Vec<f64> = sorted_xs(row).iter().map(|(_, v)| *v).collect();
    let mu = mean(&values);
    let var = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    let sd = var.sqrt();

    if sd < EPS {
        // One symbol or a constant cross-section: nothing to rank.
        let zeroed = row.keys().map(|s| (s.clone(), 0.0)).collect();
        return (
            zeroed,
            vec![Diagnostic::for_date(date, DiagnosticKind::DegenerateCrossSection)],
        );
    }

    let out = row
        .iter()
        .map(|(s, v)| (s.clone(), (v - mu) / sd))
        .collect();
    (out, Vec::new())
}

fn industry_demean_date(
    date: DateTime<Utc>,
    row: &HashMap<String, f64>,
    industries: &HashMap<String, String>,
) -> (HashMap<String, f64>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut buckets: HashMap<&str, Vec<f64>> = HashMap::new();
    for (symbol, value) in sorted_xs(row) {
        match industries.get(symbol) {
            Some(industry) => buckets.entry(industry).or_default().push(value),
            None => diagnostics.push(Diagnostic::for_symbol(
                date,
                symbol.clone(),
                DiagnosticKind::UnmappedIndustry,
            )),
        }
    }

    let bucket_means: HashMap<&str, f64> = buckets
        .iter()
        .map(|(industry, values)| (*industry, mean(values)))
        .collect();

    let out = row
        .iter()
        .filter_map(|(symbol, value)| {
            let industry = industries.get(symbol)?;
            let mu = bucket_means.get(industry.as_str())?;
            Some((symbol.clone(), value - mu))
        })
        .collect();
    (out, diagnostics)
}

fn beta_neutral_date(
    date: DateTime<Utc>,
    row: &HashMap<String, f64>,
    betas: Option<&HashMap<String, f64>>,
) -> (HashMap<String, f64>, Vec<Diagnostic>) {
    let xs = sorted_xs(row);
    let covered: Vec<(&String, f64, f64)> = match betas {
        Some(beta_row) => xs
            .iter()
            .filter_map(|(s, v)| beta_row.get(*s).map(|b| (*s, *v, *b)))
            .collect(),
        None => Vec::new(),
    };

    if covered.len() < MIN_BETA_CROSS_SECTION {
        return (
            HashMap::new(),
            vec![Diagnostic::for_date(
                date,
                DiagnosticKind::InsufficientBetaCoverage,
            )],
        );
    }

    // Symbols carrying a factor value but no beta are masked for the
    // date, each with its own recorded reason.
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    if covered.len() < xs.len() {
        if let Some(beta_row) = betas {
            for (symbol, _) in &xs {
                if !beta_row.contains_key(*symbol) {
                    diagnostics.push(Diagnostic::for_symbol(
                        date,
                        (*symbol).clone(),
                        DiagnosticKind::MissingBeta,
                    ));
                }
            }
        }
    }

    let n = covered.len() as f64;
    let mean_b = covered.iter().map(|(_, _, b)| b).sum::<f64>() / n;
    let mean_v = covered.iter().map(|(_, v, _)| v).sum::<f64>() / n;
    let var_b = covered.iter().map(|(_, _, b)| (b - mean_b).powi(2)).sum::<f64>() / n;

    if var_b < EPS {
        // Constant betas carry no slope; demeaning is the residual.
        let out = covered
            .iter()
            .map(|(s, v, _)| ((*s).clone(), v - mean_v))
            .collect();
        diagnostics.push(Diagnostic::for_date(
            date,
            DiagnosticKind::DegenerateCrossSection,
        ));
        return (out, diagnostics);
    }

    let cov = covered
        .iter()
        .map(|(_, v, b)| (v - mean_v) * (b - mean_b))
        .sum::<f64>()
        / n;
    let slope = cov / var_b;
    let intercept = mean_v - slope * mean_b;

    let out = covered
        .iter()
        .map(|(s, v, b)| ((*s).clone(), v - (intercept + slope * b)))
        .collect();
    (out, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(n)
    }

    fn panel_of(rows: Vec<Vec<(&str, f64)>>) -> Panel {
        let dates = (0..rows.len() as i64).map(day).collect();
        let rows = rows
            .into_iter()
            .map(|r| r.into_iter().map(|(s, v)| (s.to_string(), v)).collect())
            .collect();
        Panel::new(dates, rows).unwrap()
    }

    #[test]
    fn test_zscore_mean_zero_unit_std() {
        let raw = panel_of(vec![vec![("A", 3.0), ("B", 5.0), ("C", 10.0)]]);
        let (signal, diags) = apply(&raw, &NeutralizeMethod::ZScore).unwrap();
        assert!(diags.is_empty());

        let row = signal.row(0);
        let mean: f64 = row.values().sum::<f64>() / row.len() as f64;
        let var: f64 = row.values().map(|v| (v - mean).powi(2)).sum::<f64>() / row.len() as f64;
        assert!(mean.abs() < 1e-10);
        assert!((var.sqrt() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_zscore_degenerate_cross_section() {
        let raw = panel_of(vec![vec![("A", 5.0), ("B", 5.0)]]);
        let (signal, diags) = apply(&raw, &NeutralizeMethod::ZScore).unwrap();
        assert_eq!(signal.get(0, "A"), Some(0.0));
        assert_eq!(signal.get(0, "B"), Some(0.0));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::DegenerateCrossSection);
    }

    #[test]
    fn test_zscore_single_symbol_flagged() {
        let raw = panel_of(vec![vec![("A", 7.0)]]);
        let (signal, diags) = apply(&raw, &NeutralizeMethod::ZScore).unwrap();
        assert_eq!(signal.get(0, "A"), Some(0.0));
        assert_eq!(diags[0].kind, DiagnosticKind::DegenerateCrossSection);
    }

    #[test]
    fn test_zscore_dates_independent() {
        // Scaling one date must not change another date's output.
        let raw = panel_of(vec![
            vec![("A", 1.0), ("B", -1.0)],
            vec![("A", 100.0), ("B", -50.0)],
        ]);
        let (signal, _) = apply(&raw, &NeutralizeMethod::ZScore).unwrap();

        let scaled = panel_of(vec![
            vec![("A", 1.0), ("B", -1.0)],
            vec![("A", 1000.0), ("B", -500.0)],
        ]);
        let (signal_scaled, _) = apply(&scaled, &NeutralizeMethod::ZScore).unwrap();
        assert_eq!(signal.row(0), signal_scaled.row(0));
    }

    #[test]
    fn test_industry_demean() {
        let raw = panel_of(vec![vec![("A", 1.0), ("B", 3.0), ("C", 10.0), ("D", 20.0)]]);
        let industries: HashMap<String, String> = [
            ("A", "tech"),
            ("B", "tech"),
            ("C", "energy"),
            ("D", "energy"),
        ]
        .iter()
        .map(|(s, i)| (s.to_string(), i.to_string()))
        .collect();

        let (signal, diags) = apply(&raw, &NeutralizeMethod::IndustryDemean { industries }).unwrap();
        assert!(diags.is_empty());
        assert_eq!(signal.get(0, "A"), Some(-1.0));
        assert_eq!(signal.get(0, "B"), Some(1.0));
        assert_eq!(signal.get(0, "C"), Some(-5.0));
        assert_eq!(signal.get(0, "D"), Some(5.0));
    }

    #[test]
    fn test_industry_demean_unmapped_masked() {
        let raw = panel_of(vec![vec![("A", 1.0), ("B", 3.0), ("X", 99.0)]]);
        let industries: HashMap<String, String> = [("A", "tech"), ("B", "tech")]
            .iter()
            .map(|(s, i)| (s.to_string(), i.to_string()))
            .collect();

        let (signal, diags) = apply(&raw, &NeutralizeMethod::IndustryDemean { industries }).unwrap();
        assert_eq!(signal.get(0, "X"), None);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::UnmappedIndustry);
        assert_eq!(diags[0].symbol.as_deref(), Some("X"));
    }

    #[test]
    fn test_beta_neutral_removes_beta_component() {
        // Values exactly linear in beta: residuals must vanish.
        let raw = panel_of(vec![vec![("A", 2.0), ("B", 4.0), ("C", 6.0)]]);
        let betas = panel_of(vec![vec![("A", 1.0), ("B", 2.0), ("C", 3.0)]]);

        let (signal, diags) = apply(&raw, &NeutralizeMethod::BetaNeutral { betas }).unwrap();
        assert!(diags.is_empty());
        for symbol in ["A", "B", "C"] {
            assert!(signal.get(0, symbol).unwrap().abs() < 1e-10);
        }
    }

    #[test]
    fn test_beta_neutral_residual_orthogonal() {
        let raw = panel_of(vec![vec![("A", 1.0), ("B", 5.0), ("C", 2.0), ("D", 8.0)]]);
        let betas = panel_of(vec![vec![("A", 0.5), ("B", 1.5), ("C", 1.0), ("D", 2.0)]]);
        let beta_row = betas.row(0).clone();

        let (signal, _) = apply(&raw, &NeutralizeMethod::BetaNeutral { betas }).unwrap();
        let row = signal.row(0);

        // OLS residuals sum to zero and are orthogonal to the regressor.
        let sum: f64 = row.values().sum();
        assert!(sum.abs() < 1e-9);
        let dot: f64 = row.iter().map(|(s, v)| v * beta_row[s]).sum();
        assert!(dot.abs() < 1e-9);
    }

    #[test]
    fn test_beta_neutral_uncovered_symbol_masked() {
        let raw = panel_of(vec![vec![("A", 1.0), ("B", 5.0), ("C", 2.0), ("D", 8.0)]]);
        let betas = panel_of(vec![vec![("A", 0.5), ("B", 1.5), ("C", 1.0)]]);

        let (signal, diags) = apply(&raw, &NeutralizeMethod::BetaNeutral { betas }).unwrap();
        assert_eq!(signal.get(0, "D"), None);
        assert_eq!(signal.row(0).len(), 3);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::MissingBeta);
        assert_eq!(diags[0].symbol.as_deref(), Some("D"));
    }

    #[test]
    fn test_beta_neutral_insufficient_coverage_masks_date() {
        let raw = panel_of(vec![vec![("A", 1.0), ("B", 2.0), ("C", 3.0)]]);
        let betas = panel_of(vec![vec![("A", 1.0), ("B", 1.2)]]);

        let (signal, diags) = apply(&raw, &NeutralizeMethod::BetaNeutral { betas }).unwrap();
        assert!(signal.row(0).is_empty());
        assert_eq!(diags[0].kind, DiagnosticKind::InsufficientBetaCoverage);
    }

    #[test]
    fn test_composite_order() {
        let industries: HashMap<String, String> = [("A", "tech"), ("B", "tech"), ("C", "tech")]
            .iter()
            .map(|(s, i)| (s.to_string(), i.to_string()))
            .collect();
        let raw = panel_of(vec![vec![("A", 1.0), ("B", 2.0), ("C", 6.0)]]);

        let method = NeutralizeMethod::Composite(vec![
            NeutralizeMethod::IndustryDemean { industries },
            NeutralizeMethod::ZScore,
        ]);
        let (signal, diags) = apply(&raw, &method).unwrap();
        assert!(diags.is_empty());

        let row = signal.row(0);
        let mean: f64 = row.values().sum::<f64>() / row.len() as f64;
        assert!(mean.abs() < 1e-10);
    }

    #[test]
    fn test_engine_wrapper() {
        let raw = panel_of(vec![vec![("A", 1.0), ("B", -1.0)]]);
        let engine = NeutralizationEngine::new(NeutralizeMethod::ZScore);
        let (signal, _) = engine.neutralize(&raw).unwrap();
        assert_eq!(signal.get(0, "A"), Some(1.0));
        assert_eq!(signal.get(0, "B"), Some(-1.0));
    }
}
