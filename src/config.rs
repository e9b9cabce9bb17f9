//! Configuration file support.
//!
//! Loads run parameters from TOML for reproducible backtests and converts
//! them into the immutable configuration structs the core consumes. The
//! core components themselves never touch files or environment variables;
//! this module is the only boundary that does.

use crate::cost::{CostModel, CostParams};
use crate::error::{Result, SimError};
use crate::simulator::{
    AllocationRule, DriftMode, FrozenNotional, RebalanceCalendar, SimulatorConfig,
};
use crate::splitter::SplitConfig;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Complete run configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    /// Simulation settings.
    #[serde(default)]
    pub simulation: SimulationSettings,
    /// Cost model settings.
    #[serde(default)]
    pub costs: CostSettings,
    /// Neutralization settings.
    #[serde(default)]
    pub neutralization: NeutralizationSettings,
    /// Walk-forward split settings.
    #[serde(default)]
    pub split: SplitSettings,
}

/// Simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Maximum sum of absolute weights.
    #[serde(default = "default_gross_cap")]
    pub gross_cap: f64,
    /// Target sum of signed weights.
    #[serde(default)]
    pub net_cap: f64,
    /// Rebalance every N trading dates (1 = daily).
    #[serde(default = "default_one")]
    pub rebalance_every: usize,
    /// Allocation rule: "signal-proportional" or "rank".
    #[serde(default = "default_allocation")]
    pub allocation: String,
    /// Let weights drift between rebalances instead of renormalizing.
    #[serde(default)]
    pub let_drift: bool,
    /// Redistribute frozen symbols' budget instead of holding cash.
    #[serde(default)]
    pub redistribute_frozen: bool,
    /// Trailing window for ADV estimation.
    #[serde(default = "default_adv_window")]
    pub adv_window: usize,
    /// Portfolio notional in currency.
    #[serde(default = "default_notional")]
    pub portfolio_notional: f64,
}

fn default_gross_cap() -> f64 { 1.0 }
fn default_one() -> usize { 1 }
fn default_allocation() -> String { "signal-proportional".to_string() }
fn default_adv_window() -> usize { 20 }
fn default_notional() -> f64 { 1_000_000.0 }

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            gross_cap: 1.0,
            net_cap: 0.0,
            rebalance_every: 1,
            allocation: "signal-proportional".to_string(),
            let_drift: false,
            redistribute_frozen: false,
            adv_window: 20,
            portfolio_notional: 1_000_000.0,
        }
    }
}

/// Cost model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSettings {
    /// Full bid-ask spread estimate in basis points.
    #[serde(default = "default_spread_bps")]
    pub spread_bps: f64,
    /// Commission as a fraction of traded notional.
    #[serde(default = "default_commission")]
    pub commission_rate: f64,
    /// Annualized borrow rate on short notional.
    #[serde(default)]
    pub borrow_rate: f64,
    /// Square-root impact coefficient (0 disables).
    #[serde(default)]
    pub impact_coefficient: f64,
}

fn default_spread_bps() -> f64 { 10.0 }
fn default_commission() -> f64 { 0.0005 }

impl Default for CostSettings {
    fn default() -> Self {
        Self {
            spread_bps: 10.0,
            commission_rate: 0.0005,
            borrow_rate: 0.0,
            impact_coefficient: 0.0,
        }
    }
}

/// Neutralization settings. Industry maps and beta panels come from the
/// data layer, so only the data-free methods are file-configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeutralizationSettings {
    /// Method name: currently "zscore".
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String { "zscore".to_string() }

impl Default for NeutralizationSettings {
    fn default() -> Self {
        Self {
            method: "zscore".to_string(),
        }
    }
}

/// Walk-forward split settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitSettings {
    #[serde(default = "default_n_folds")]
    pub n_folds: usize,
    #[serde(default = "default_train_span")]
    pub train_span: usize,
    #[serde(default = "default_test_span")]
    pub test_span: usize,
    /// Embargo in calendar days.
    #[serde(default = "default_embargo_days")]
    pub embargo_days: i64,
}

fn default_n_folds() -> usize { 5 }
fn default_train_span() -> usize { 252 }
fn default_test_span() -> usize { 63 }
fn default_embargo_days() -> i64 { 5 }

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            n_folds: 5,
            train_span: 252,
            test_span: 63,
            embargo_days: 5,
        }
    }
}

impl FileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("loading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        let config: FileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SimError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Convert to the simulator's immutable configuration.
    pub fn to_simulator_config(&self) -> Result<SimulatorConfig> {
        let allocation = match self.simulation.allocation.to_lowercase().as_str() {
            "signal-proportional" => AllocationRule::SignalProportional,
            "rank" => AllocationRule::RankBased,
            other => {
                return Err(SimError::ConfigError(format!(
                    "unknown allocation rule: {}",
                    other
                )))
            }
        };

        Ok(SimulatorConfig {
            cost_model: CostModel::new(CostParams {
                spread_bps: self.costs.spread_bps,
                commission_rate: self.costs.commission_rate,
                borrow_rate: self.costs.borrow_rate,
                impact_coefficient: self.costs.impact_coefficient,
            }),
            gross_cap: self.simulation.gross_cap,
            net_cap: self.simulation.net_cap,
            rebalance: if self.simulation.rebalance_every <= 1 {
                RebalanceCalendar::Daily
            } else {
                RebalanceCalendar::EveryN(self.simulation.rebalance_every)
            },
            allocation,
            drift: if self.simulation.let_drift {
                DriftMode::LetDrift
            } else {
                DriftMode::Renormalize
            },
            frozen_notional: if self.simulation.redistribute_frozen {
                FrozenNotional::Redistribute
            } else {
                FrozenNotional::HoldInCash
            },
            adv_window: self.simulation.adv_window,
            portfolio_notional: self.simulation.portfolio_notional,
        })
    }

    /// Convert to the splitter's configuration.
    pub fn to_split_config(&self) -> SplitConfig {
        SplitConfig::new(
            self.split.n_folds,
            self.split.train_span,
            self.split.test_span,
            Duration::days(self.split.embargo_days),
        )
    }

    /// Generate an example configuration file.
    pub fn example() -> String {
        r#"# Alphasim run configuration

[simulation]
gross_cap = 1.0
net_cap = 0.0            # dollar-neutral
rebalance_every = 1      # trading dates; 1 = daily
allocation = "signal-proportional"   # or "rank"
let_drift = false
redistribute_frozen = false
adv_window = 20
portfolio_notional = 1000000.0

[costs]
spread_bps = 10.0
commission_rate = 0.0005
borrow_rate = 0.0
impact_coefficient = 0.0   # 0 disables market impact

[neutralization]
method = "zscore"

[split]
n_folds = 5
train_span = 252
test_span = 63
embargo_days = 5
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = FileConfig::default();
        assert_eq!(config.simulation.gross_cap, 1.0);
        assert_eq!(config.simulation.net_cap, 0.0);
        assert_eq!(config.split.n_folds, 5);
        assert_eq!(config.neutralization.method, "zscore");
    }

    #[test]
    fn test_load_config() {
        let toml_content = r#"
[simulation]
gross_cap = 2.0
net_cap = 0.5
rebalance_every = 5
allocation = "rank"
let_drift = true

[costs]
spread_bps = 25.0
impact_coefficient = 0.1

[split]
n_folds = 3
train_span = 100
test_span = 25
embargo_days = 10
"#;
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", toml_content).unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.simulation.gross_cap, 2.0);
        assert_eq!(config.simulation.rebalance_every, 5);
        assert!(config.simulation.let_drift);
        assert_eq!(config.costs.spread_bps, 25.0);
        assert_eq!(config.split.embargo_days, 10);
        // Unspecified fields keep their defaults.
        assert_eq!(config.costs.commission_rate, 0.0005);
    }

    #[test]
    fn test_to_simulator_config() {
        let mut config = FileConfig::default();
        config.simulation.net_cap = 0.25;
        config.simulation.rebalance_every = 5;
        config.simulation.allocation = "rank".to_string();

        let sim = config.to_simulator_config().unwrap();
        assert_eq!(sim.net_cap, 0.25);
        assert_eq!(sim.rebalance, RebalanceCalendar::EveryN(5));
        assert_eq!(sim.allocation, AllocationRule::RankBased);
        assert_eq!(sim.drift, DriftMode::Renormalize);
    }

    #[test]
    fn test_unknown_allocation_rejected() {
        let mut config = FileConfig::default();
        config.simulation.allocation = "mystery".to_string();
        assert!(config.to_simulator_config().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let config = FileConfig::default();
        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();

        let loaded = FileConfig::load(file.path()).unwrap();
        assert_eq!(loaded.simulation.gross_cap, config.simulation.gross_cap);
        assert_eq!(loaded.split.n_folds, config.split.n_folds);
    }

    #[test]
    fn test_example_parses() {
        let example = FileConfig::example();
        let config: FileConfig = toml::from_str(&example).unwrap();
        assert_eq!(config.simulation.gross_cap, 1.0);
        assert_eq!(config.split.train_span, 252);
    }

    #[test]
    fn test_to_split_config() {
        let config = FileConfig::default();
        let split = config.to_split_config();
        assert_eq!(split.n_folds, 5);
        assert_eq!(split.embargo, Duration::days(5));
    }
}
