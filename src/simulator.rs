//! Portfolio simulation engine.
//!
//! Rolls a signal panel forward one trading date at a time, producing
//! realized weights, trades, costed returns, and turnover. The per-date
//! step receives a [`DayInputs`] view holding only that date's data plus
//! the carried state, so a step can never read the future.

use crate::cost::CostModel;
use crate::error::{Result, SimError};
use crate::panel::Panel;
use crate::types::{Diagnostic, DiagnosticKind, SeriesPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

const EPS: f64 = 1e-12;
const TRADE_EPS: f64 = 1e-10;
const SECONDS_PER_YEAR: f64 = 365.0 * 86_400.0;

/// When target weights are recomputed from the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceCalendar {
    /// Rebalance on every trading date.
    Daily,
    /// Rebalance every `n` trading dates, starting with the first.
    EveryN(usize),
}

/// How the day's signal cross-section maps to target weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationRule {
    /// Weights proportional to the demeaned signal.
    SignalProportional,
    /// Weights proportional to centered cross-sectional ranks.
    RankBased,
}

/// Treatment of weights between rebalances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriftMode {
    /// Trade back to the previous gross exposure after price drift.
    Renormalize,
    /// Leave drifted weights untouched (no trades between rebalances).
    LetDrift,
}

/// Where the budget of an untradeable (frozen) symbol goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrozenNotional {
    /// The frozen symbol's share of the budget sits in cash.
    HoldInCash,
    /// The remaining budget is spread across tradeable symbols.
    Redistribute,
}

/// Immutable configuration for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Trading cost model.
    pub cost_model: CostModel,
    /// Maximum sum of absolute weights.
    pub gross_cap: f64,
    /// Target sum of signed weights (0 for dollar-neutral).
    pub net_cap: f64,
    /// Rebalance calendar.
    pub rebalance: RebalanceCalendar,
    /// Target-weight allocation rule.
    pub allocation: AllocationRule,
    /// Weight treatment between rebalances.
    pub drift: DriftMode,
    /// Budget treatment for frozen symbols.
    pub frozen_notional: FrozenNotional,
    /// Trailing window (trading dates) for ADV estimation.
    pub adv_window: usize,
    /// Portfolio notional in currency, used to scale weight trades for
    /// the cost model's participation terms.
    pub portfolio_notional: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            cost_model: CostModel::default(),
            gross_cap: 1.0,
            net_cap: 0.0,
            rebalance: RebalanceCalendar::Daily,
            allocation: AllocationRule::SignalProportional,
            drift: DriftMode::Renormalize,
            frozen_notional: FrozenNotional::HoldInCash,
            adv_window: 20,
            portfolio_notional: 1_000_000.0,
        }
    }
}

impl SimulatorConfig {
    fn validate(&self) -> Result<()> {
        if self.gross_cap <= 0.0 || !self.gross_cap.is_finite() {
            return Err(SimError::ConfigError("gross_cap must be positive".into()));
        }
        if self.net_cap.abs() > self.gross_cap {
            return Err(SimError::ConfigError(
                "net_cap cannot exceed gross_cap in magnitude".into(),
            ));
        }
        if self.adv_window == 0 {
            return Err(SimError::ConfigError("adv_window must be positive".into()));
        }
        if self.portfolio_notional <= 0.0 {
            return Err(SimError::ConfigError(
                "portfolio_notional must be positive".into(),
            ));
        }
        if let RebalanceCalendar::EveryN(0) = self.rebalance {
            return Err(SimError::ConfigError(
                "rebalance interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Output of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Realized weights per date (post-trade).
    pub weights: Panel,
    /// Executed weight changes per date.
    pub trades: Panel,
    /// Net daily returns (costs deducted), one per trading date.
    pub returns: Vec<SeriesPoint>,
    /// Sum of absolute weight changes per date.
    pub turnover: Vec<SeriesPoint>,
    /// Non-fatal conditions recorded during the run.
    pub diagnostics: Vec<Diagnostic>,
}

impl SimulationResult {
    /// Compounded total return over the run.
    pub fn total_return(&self) -> f64 {
        self.returns.iter().fold(1.0, |acc, p| acc * (1.0 + p.value)) - 1.0
    }
}

/// Single-date view handed to the step function. Holds only data up to
/// and including the step's date.
struct DayInputs<'a> {
    date: DateTime<Utc>,
    prices: &'a HashMap<String, f64>,
    signal: Option<&'a HashMap<String, f64>>,
    /// Trailing average daily volume in currency per symbol.
    adv: BTreeMap<String, f64>,
    is_rebalance: bool,
    /// Fraction of a year since the previous trading date.
    year_fraction: f64,
}

/// Carried state between dates.
#[derive(Default)]
struct DayState {
    weights: BTreeMap<String, f64>,
    /// Last known price per symbol (stale for frozen symbols).
    last_prices: BTreeMap<String, f64>,
}

struct DayOutput {
    weights: HashMap<String, f64>,
    trades: HashMap<String, f64>,
    net_return: f64,
    turnover: f64,
}

/// Deterministic single-run portfolio simulator.
pub struct PortfolioSimulator {
    config: SimulatorConfig,
}

impl PortfolioSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Simulate over the price panel's calendar.
    ///
    /// Fatal on an empty price panel, on signal dates absent from the
    /// price calendar, and on signal symbols absent from the price
    /// universe. Symbols missing a price on individual dates are masked
    /// per the panel semantics and reported through diagnostics.
    pub fn run(
        &self,
        signal: &Panel,
        prices: &Panel,
        volumes: Option<&Panel>,
    ) -> Result<SimulationResult> {
        self.config.validate()?;
        if prices.is_empty() {
            return Err(SimError::EmptyPanel);
        }
        for date in signal.dates() {
            if prices.date_index(*date).is_none() {
                return Err(SimError::PanelError(format!(
                    "signal date {} not in price calendar",
                    date
                )));
            }
        }
        let price_symbols = prices.symbols();
        for symbol in signal.symbols() {
            if !price_symbols.contains(&symbol) {
                return Err(SimError::PanelError(format!(
                    "signal symbol {} absent from price universe",
                    symbol
                )));
            }
        }

        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            dates = prices.len(),
            symbols = price_symbols.len(),
            "starting simulation"
        );

        let mut state = DayState::default();
        let mut weights_panel = Panel::empty();
        let mut trades_panel = Panel::empty();
        let mut returns = Vec::with_capacity(prices.len());
        let mut turnover = Vec::with_capacity(prices.len());
        let mut diagnostics = Vec::new();
        let mut prev_date: Option<DateTime<Utc>> = None;

        for (i, date) in prices.dates().iter().copied().enumerate() {
            let inputs = DayInputs {
                date,
                prices: prices.row(i),
                signal: signal.row_for_date(date),
                adv: trailing_adv(prices, volumes, i, self.config.adv_window),
                is_rebalance: match self.config.rebalance {
                    RebalanceCalendar::Daily => true,
                    RebalanceCalendar::EveryN(n) => i % n == 0,
                },
                year_fraction: prev_date
                    .map(|p| (date - p).num_seconds() as f64 / SECONDS_PER_YEAR)
                    .unwrap_or(0.0),
            };

            let out = self.step(&inputs, &mut state, &mut diagnostics);

            weights_panel.push_row(date, out.weights)?;
            trades_panel.push_row(date, out.trades)?;
            returns.push(SeriesPoint::new(date, out.net_return));
            turnover.push(SeriesPoint::new(date, out.turnover));
            prev_date = Some(date);
        }

        info!(%run_id, diagnostics = diagnostics.len(), "simulation complete");
        Ok(SimulationResult {
            run_id,
            weights: weights_panel,
            trades: trades_panel,
            returns,
            turnover,
            diagnostics,
        })
    }

    /// One trading date: accrue returns, drift, optionally retarget,
    /// trade, and cost.
    fn step(
        &self,
        inputs: &DayInputs<'_>,
        state: &mut DayState,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> DayOutput {
        let cfg = &self.config;

        // Accrue the day's return from yesterday's weights; symbols with
        // no price today are frozen in place.
        let mut gross_return = 0.0;
        let mut drifted: BTreeMap<String, f64> = BTreeMap::new();
        let mut frozen: BTreeMap<String, f64> = BTreeMap::new();
        for (symbol, &w) in &state.weights {
            match (
                state.last_prices.get(symbol),
                inputs.prices.get(symbol),
            ) {
                (Some(&p0), Some(&p1)) if p0 > 0.0 => {
                    let r = p1 / p0 - 1.0;
                    gross_return += w * r;
                    drifted.insert(symbol.clone(), w * (1.0 + r));
                }
                _ => {
                    if w.abs() > EPS {
                        diagnostics.push(Diagnostic::for_symbol(
                            inputs.date,
                            symbol.clone(),
                            DiagnosticKind::MissingPriceForOpenPosition,
                        ));
                    }
                    frozen.insert(symbol.clone(), w);
                }
            }
        }

        // Re-express drifted weights as fractions of the grown notional.
        let growth = 1.0 + gross_return;
        if growth > EPS {
            for v in drifted.values_mut() {
                *v /= growth;
            }
        }

        // Borrow on short positions carried overnight.
        let mut cost_fraction = 0.0;
        if inputs.year_fraction > 0.0 {
            for (symbol, &w) in &state.weights {
                if w < 0.0 {
                    let borrow = cfg.cost_model.borrow_cost(
                        symbol,
                        w * cfg.portfolio_notional,
                        inputs.year_fraction,
                    );
                    cost_fraction += borrow / cfg.portfolio_notional;
                }
            }
        }

        // Decide the day's final weights.
        let final_weights: BTreeMap<String, f64> = if inputs.is_rebalance {
            match inputs
                .signal
                .and_then(|row| self.targets(inputs, row, &frozen, diagnostics))
            {
                Some(targets) => targets,
                None => self.carry_forward(&drifted, &state.weights, &frozen),
            }
        } else {
            self.carry_forward(&drifted, &state.weights, &frozen)
        };

        // Trades move from the drifted book to the final book; frozen
        // symbols never trade.
        let mut trades: BTreeMap<String, f64> = BTreeMap::new();
        for symbol in drifted.keys().chain(final_weights.keys()) {
            if frozen.contains_key(symbol) || trades.contains_key(symbol) {
                continue;
            }
            let from = drifted.get(symbol).copied().unwrap_or(0.0);
            let to = final_weights.get(symbol).copied().unwrap_or(0.0);
            let delta = to - from;
            if delta.abs() > TRADE_EPS {
                trades.insert(symbol.clone(), delta);
            }
        }

        // Cost every executed trade.
        let mut turnover = 0.0;
        for (symbol, &delta) in &trades {
            turnover += delta.abs();
            let price = inputs.prices.get(symbol).copied().unwrap_or(0.0);
            let trade_notional = delta * cfg.portfolio_notional;
            let cost = cfg.cost_model.trade_cost(
                symbol,
                trade_notional,
                price,
                inputs.adv.get(symbol).copied(),
            );
            if cost.zero_adv_fallback {
                diagnostics.push(Diagnostic::for_symbol(
                    inputs.date,
                    symbol.clone(),
                    DiagnosticKind::ZeroAdvFallback,
                ));
            }
            cost_fraction += cost.total() / cfg.portfolio_notional;
        }

        debug!(
            date = %inputs.date.date_naive(),
            gross_return,
            cost_fraction,
            turnover,
            "day step"
        );

        // Commit state: frozen symbols keep their stale last price.
        let mut book = final_weights;
        for (symbol, &w) in &frozen {
            if w.abs() > EPS {
                book.insert(symbol.clone(), w);
            }
        }
        book.retain(|_, w| w.abs() > EPS);
        state.weights = book.clone();
        for (symbol, &price) in inputs.prices {
            state.last_prices.insert(symbol.clone(), price);
        }

        DayOutput {
            weights: book.into_iter().collect(),
            trades: trades.into_iter().collect(),
            net_return: gross_return - cost_fraction,
            turnover,
        }
    }

    /// Weights held when no retargeting happens: drifted book, optionally
    /// renormalized back to the previous gross exposure.
    fn carry_forward(
        &self,
        drifted: &BTreeMap<String, f64>,
        previous: &BTreeMap<String, f64>,
        frozen: &BTreeMap<String, f64>,
    ) -> BTreeMap<String, f64> {
        match self.config.drift {
            DriftMode::LetDrift => drifted.clone(),
            DriftMode::Renormalize => {
                let prev_gross: f64 = previous
                    .iter()
                    .filter(|(s, _)| !frozen.contains_key(*s))
                    .map(|(_, w)| w.abs())
                    .sum();
                let cur_gross: f64 = drifted.values().map(|w| w.abs()).sum();
                if cur_gross > EPS {
                    let scale = prev_gross / cur_gross;
                    drifted.iter().map(|(s, w)| (s.clone(), w * scale)).collect()
                } else {
                    drifted.clone()
                }
            }
        }
    }

    /// Target weights from the day's signal cross-section, scaled to the
    /// gross and net caps net of any frozen exposure. Returns `None` when
    /// the cross-section is unusable (the caller carries forward).
    fn targets(
        &self,
        inputs: &DayInputs<'_>,
        signal_row: &HashMap<String, f64>,
        frozen: &BTreeMap<String, f64>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<BTreeMap<String, f64>> {
        let cfg = &self.config;

        // Sorted cross-section for deterministic float accumulation.
        // Under HoldInCash untradeable symbols keep their budget share
        // (dropped later); under Redistribute they are excluded up front.
        let mut xs: Vec<(&String, f64)> = signal_row
            .iter()
            .filter(|(symbol, _)| match cfg.frozen_notional {
                FrozenNotional::HoldInCash => true,
                FrozenNotional::Redistribute => inputs.prices.contains_key(*symbol),
            })
            .map(|(s, v)| (s, *v))
            .collect();
        xs.sort_by(|a, b| a.0.cmp(b.0));

        if xs.is_empty() {
            diagnostics.push(Diagnostic::for_date(
                inputs.date,
                DiagnosticKind::DegenerateCrossSection,
            ));
            return None;
        }

        if cfg.allocation == AllocationRule::RankBased {
            let mut order: Vec<usize> = (0..xs.len()).collect();
            order.sort_by(|&a, &b| {
                xs[a].1
                    .partial_cmp(&xs[b].1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| xs[a].0.cmp(xs[b].0))
            });
            let center = (xs.len() as f64 - 1.0) / 2.0;
            let mut ranked = xs.clone();
            for (rank, &idx) in order.iter().enumerate() {
                ranked[idx].1 = rank as f64 - center;
            }
            xs = ranked;
        }

        let mean = xs.iter().map(|(_, v)| v).sum::<f64>() / xs.len() as f64;
        for (_, v) in xs.iter_mut() {
            *v -= mean;
        }

        if xs.iter().all(|(_, v)| v.abs() < EPS) {
            diagnostics.push(Diagnostic::for_date(
                inputs.date,
                DiagnosticKind::DegenerateCrossSection,
            ));
            return None;
        }

        // Budget net of frozen exposure so the caps hold for the whole book.
        let stale_gross: f64 = frozen.values().map(|w| w.abs()).sum();
        let stale_net: f64 = frozen.values().sum();
        let budget_gross = (cfg.gross_cap - stale_gross).max(0.0);
        let mut budget_net = cfg.net_cap - stale_net;
        if budget_net.abs() > budget_gross {
            diagnostics.push(Diagnostic::for_date(
                inputs.date,
                DiagnosticKind::LeverageCapInfeasible,
            ));
            budget_net = budget_net.clamp(-budget_gross, budget_gross);
        }

        let sum_long: f64 = xs.iter().map(|(_, v)| v.max(0.0)).sum();
        let sum_short: f64 = xs.iter().map(|(_, v)| (-v).max(0.0)).sum();

        let mut targets: BTreeMap<String, f64> = BTreeMap::new();
        if sum_long < EPS || sum_short < EPS {
            // One-sided cross-section: the net target cannot hold; scale
            // proportionally against the gross cap instead.
            diagnostics.push(Diagnostic::for_date(
                inputs.date,
                DiagnosticKind::LeverageCapInfeasible,
            ));
            let total: f64 = xs.iter().map(|(_, v)| v.abs()).sum();
            for (symbol, v) in &xs {
                targets.insert((*symbol).clone(), v / total * budget_gross);
            }
        } else {
            let long_target = (budget_gross + budget_net) / 2.0;
            let short_target = (budget_gross - budget_net) / 2.0;
            for (symbol, v) in &xs {
                let w = if *v > 0.0 {
                    v / sum_long * long_target
                } else {
                    v / sum_short * short_target
                };
                targets.insert((*symbol).clone(), w);
            }
        }

        // Untradeable symbols cannot receive a target; under HoldInCash
        // their share of the budget simply stays in cash.
        targets.retain(|symbol, _| inputs.prices.contains_key(symbol));
        Some(targets)
    }
}

/// Trailing ADV in currency (volume × price averaged over the window
/// ending at `idx`). Only rows at or before `idx` are read.
fn trailing_adv(
    prices: &Panel,
    volumes: Option<&Panel>,
    idx: usize,
    window: usize,
) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    let volumes = match volumes {
        Some(v) => v,
        None => return out,
    };
    let start = idx.saturating_sub(window - 1);
    let mut sums: BTreeMap<&String, (f64, usize)> = BTreeMap::new();
    for j in start..=idx {
        let date = prices.dates()[j];
        let volume_row = match volumes.row_for_date(date) {
            Some(r) => r,
            None => continue,
        };
        for (symbol, &price) in prices.row(j) {
            if let Some(&vol) = volume_row.get(symbol) {
                let entry = sums.entry(symbol_key(volume_row, symbol)).or_insert((0.0, 0));
                entry.0 += vol * price;
                entry.1 += 1;
            }
        }
    }
    for (symbol, (total, count)) in sums {
        if count > 0 {
            out.insert(symbol.clone(), total / count as f64);
        }
    }
    out
}

// Borrow the key owned by the volume row so the accumulator does not
// allocate per observation.
fn symbol_key<'a>(row: &'a HashMap<String, f64>, symbol: &str) -> &'a String {
    row.get_key_value(symbol).map(|(k, _)| k).expect("key present")
}
