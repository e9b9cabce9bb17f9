//! Transaction cost model.
//!
//! Costs decompose into additive terms: half-spread, commission, optional
//! square-root market impact, and overnight borrow on short positions.
//! The model is a pure function of trade size, price, and market state;
//! parameters are immutable after construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cost parameters for one symbol (or the global default).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostParams {
    /// Full bid-ask spread estimate in basis points.
    pub spread_bps: f64,
    /// Commission as a fraction of traded notional.
    pub commission_rate: f64,
    /// Annualized borrow rate charged on short notional.
    pub borrow_rate: f64,
    /// Square-root market-impact coefficient; zero disables the term.
    pub impact_coefficient: f64,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            spread_bps: 10.0,        // 10 bps full spread
            commission_rate: 0.0005, // 5 bps
            borrow_rate: 0.0,
            impact_coefficient: 0.0,
        }
    }
}

/// Realized cost of a single trade, broken into its additive terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeCost {
    pub spread: f64,
    pub commission: f64,
    pub impact: f64,
    /// True when ADV was zero or missing and the impact term was omitted.
    pub zero_adv_fallback: bool,
}

impl TradeCost {
    /// Total realized cost.
    pub fn total(&self) -> f64 {
        self.spread + self.commission + self.impact
    }
}

/// Deterministic, side-effect-free trading cost model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModel {
    global: CostParams,
    /// Per-symbol parameter overrides.
    #[serde(default)]
    overrides: HashMap<String, CostParams>,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(CostParams::default())
    }
}

impl CostModel {
    pub fn new(global: CostParams) -> Self {
        Self {
            global,
            overrides: HashMap::new(),
        }
    }

    /// A frictionless model (no spread, commission, borrow, or impact).
    pub fn zero() -> Self {
        Self::new(CostParams {
            spread_bps: 0.0,
            commission_rate: 0.0,
            borrow_rate: 0.0,
            impact_coefficient: 0.0,
        })
    }

    /// Override parameters for a specific symbol.
    pub fn with_override(mut self, symbol: impl Into<String>, params: CostParams) -> Self {
        self.overrides.insert(symbol.into(), params);
        self
    }

    /// Parameters in effect for a symbol.
    pub fn params_for(&self, symbol: &str) -> &CostParams {
        self.overrides.get(symbol).unwrap_or(&self.global)
    }

    /// Half-spread cost of crossing the quoted spread.
    pub fn spread_cost(&self, symbol: &str, trade_notional: f64) -> f64 {
        0.5 * self.params_for(symbol).spread_bps * 1e-4 * trade_notional.abs()
    }

    /// Commission on traded notional.
    pub fn commission(&self, symbol: &str, trade_notional: f64) -> f64 {
        self.params_for(symbol).commission_rate * trade_notional.abs()
    }

    /// Signed price displacement from the square-root impact law:
    /// `k * sign(trade) * sqrt(|trade_notional| / adv_notional) * price`.
    ///
    /// Returns zero when ADV is zero or non-finite.
    pub fn price_impact(
        &self,
        symbol: &str,
        trade_notional: f64,
        price: f64,
        adv_notional: f64,
    ) -> f64 {
        let k = self.params_for(symbol).impact_coefficient;
        if k == 0.0 || adv_notional <= 0.0 || !adv_notional.is_finite() {
            return 0.0;
        }
        let participation = trade_notional.abs() / adv_notional;
        k * trade_notional.signum() * participation.sqrt() * price
    }

    /// Full cost of one trade. `adv_notional` of `None` (or zero) degrades
    /// to spread plus commission only, flagged via `zero_adv_fallback`.
    pub fn trade_cost(
        &self,
        symbol: &str,
        trade_notional: f64,
        price: f64,
        adv_notional: Option<f64>,
    ) -> TradeCost {
        let spread = self.spread_cost(symbol, trade_notional);
        let commission = self.commission(symbol, trade_notional);
        let k = self.params_for(symbol).impact_coefficient;

        let (impact, zero_adv_fallback) = match adv_notional {
            _ if k == 0.0 || trade_notional == 0.0 => (0.0, false),
            Some(adv) if adv > 0.0 && adv.is_finite() => {
                if price > 0.0 {
                    // Displacement times shares traded: k * sqrt(|N|/ADV) * |N|.
                    let displacement = self.price_impact(symbol, trade_notional, price, adv);
                    let shares = trade_notional.abs() / price;
                    (displacement.abs() * shares, false)
                } else {
                    // Bad price is not an ADV condition; just skip impact.
                    (0.0, false)
                }
            }
            _ => (0.0, true),
        };

        TradeCost {
            spread,
            commission,
            impact,
            zero_adv_fallback,
        }
    }

    /// Borrow cost for a short position held over `day_fraction` of a year.
    /// Long positions cost nothing.
    pub fn borrow_cost(&self, symbol: &str, position_notional: f64, day_fraction: f64) -> f64 {
        if position_notional >= 0.0 || day_fraction <= 0.0 {
            return 0.0;
        }
        self.params_for(symbol).borrow_rate * position_notional.abs() * day_fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(spread_bps: f64, commission_rate: f64, borrow_rate: f64, k: f64) -> CostModel {
        CostModel::new(CostParams {
            spread_bps,
            commission_rate,
            borrow_rate,
            impact_coefficient: k,
        })
    }

    #[test]
    fn test_worked_example() {
        // spread_bps=10, commission=0.0005, notional=10_000, ADV=1_000_000, k=0.1
        let model = model(10.0, 0.0005, 0.0, 0.1);
        let price = 50.0;

        let cost = model.trade_cost("A", 10_000.0, price, Some(1_000_000.0));
        assert!((cost.spread - 5.0).abs() < 1e-9);
        assert!((cost.commission - 5.0).abs() < 1e-9);

        // Displacement per the stated formula: 0.1 * sqrt(0.01) * price.
        let displacement = model.price_impact("A", 10_000.0, price, 1_000_000.0);
        assert!((displacement - 0.1 * (0.01f64).sqrt() * price).abs() < 1e-9);

        // Realized impact = displacement * shares.
        let shares = 10_000.0 / price;
        assert!((cost.impact - displacement * shares).abs() < 1e-9);
        assert!(!cost.zero_adv_fallback);
    }

    #[test]
    fn test_zero_trade_costs_nothing() {
        let model = model(10.0, 0.0005, 0.01, 0.1);
        let cost = model.trade_cost("A", 0.0, 100.0, Some(1_000_000.0));
        assert_eq!(cost.total(), 0.0);
        assert!(!cost.zero_adv_fallback);
    }

    #[test]
    fn test_cost_non_negative() {
        let model = model(10.0, 0.0005, 0.01, 0.1);
        for notional in [-50_000.0, -1.0, 0.0, 1.0, 50_000.0] {
            let cost = model.trade_cost("A", notional, 25.0, Some(500_000.0));
            assert!(cost.spread >= 0.0);
            assert!(cost.commission >= 0.0);
            assert!(cost.impact >= 0.0);
            assert!(cost.total() >= 0.0);
        }
    }

    #[test]
    fn test_impact_vanishes_with_infinite_adv() {
        let model = model(0.0, 0.0, 0.0, 0.1);
        let mut last = f64::MAX;
        for adv in [1e6, 1e9, 1e12, 1e15, 1e18] {
            let cost = model.trade_cost("A", 10_000.0, 50.0, Some(adv));
            assert!(cost.impact < last);
            last = cost.impact;
        }
        // At ADV=1e18: 0.1 * sqrt(1e4/1e18) * 1e4 = 1e-4.
        assert!(last < 1e-3);
    }

    #[test]
    fn test_zero_adv_degrades_to_spread_only() {
        let model = model(10.0, 0.0005, 0.0, 0.1);
        let cost = model.trade_cost("A", 10_000.0, 50.0, Some(0.0));
        assert_eq!(cost.impact, 0.0);
        assert!(cost.zero_adv_fallback);
        assert!((cost.total() - 10.0).abs() < 1e-9); // spread 5 + commission 5

        let cost = model.trade_cost("A", 10_000.0, 50.0, None);
        assert!(cost.zero_adv_fallback);
    }

    #[test]
    fn test_nonpositive_price_skips_impact_without_adv_flag() {
        let model = model(10.0, 0.0005, 0.0, 0.1);
        let cost = model.trade_cost("A", 10_000.0, 0.0, Some(1_000_000.0));
        assert_eq!(cost.impact, 0.0);
        assert!(!cost.zero_adv_fallback);
        // Spread and commission are still charged on the notional.
        assert!((cost.total() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_adv_without_impact_term_not_flagged() {
        let model = model(10.0, 0.0005, 0.0, 0.0);
        let cost = model.trade_cost("A", 10_000.0, 50.0, None);
        assert!(!cost.zero_adv_fallback);
    }

    #[test]
    fn test_borrow_only_for_shorts() {
        let model = model(0.0, 0.0, 0.05, 0.0);
        assert_eq!(model.borrow_cost("A", 100_000.0, 1.0 / 365.0), 0.0);

        let short = model.borrow_cost("A", -100_000.0, 1.0 / 365.0);
        assert!((short - 0.05 * 100_000.0 / 365.0).abs() < 1e-9);
    }

    #[test]
    fn test_per_symbol_override() {
        let model = model(10.0, 0.0, 0.0, 0.0).with_override(
            "ILLIQ",
            CostParams {
                spread_bps: 50.0,
                commission_rate: 0.0,
                borrow_rate: 0.0,
                impact_coefficient: 0.0,
            },
        );
        assert!((model.spread_cost("AAPL", 10_000.0) - 5.0).abs() < 1e-9);
        assert!((model.spread_cost("ILLIQ", 10_000.0) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_model() {
        let model = CostModel::zero();
        let cost = model.trade_cost("A", 1_000_000.0, 10.0, None);
        assert_eq!(cost.total(), 0.0);
        assert_eq!(model.borrow_cost("A", -1e6, 1.0), 0.0);
    }
}
