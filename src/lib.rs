//! Alphasim - a deterministic simulation core for cross-sectional equity backtests.
//!
//! # Overview
//!
//! Alphasim turns a raw factor panel into a cost-aware portfolio backtest
//! without lookahead. The pipeline has five stages, each usable on its own:
//!
//! - **Neutralization**: cross-sectional z-score, industry demeaning, and
//!   beta-neutral regression residuals ([`neutralize`])
//! - **Cost model**: half-spread, commission, borrow, and square-root market
//!   impact, with per-symbol overrides ([`cost`])
//! - **Portfolio simulation**: per-date state machine mapping signals to
//!   capped long/short weights, with drift, freezing, and trade costing
//!   ([`simulator`])
//! - **Purged walk-forward splits**: overlapping train windows, disjoint
//!   test windows, and a calendar-time embargo between them ([`splitter`])
//! - **Batch execution**: parallel fold runs with cooperative cancellation
//!   and cross-fold Sharpe statistics ([`runner`])
//!
//! Two guarantees hold everywhere: identical inputs produce bit-identical
//! outputs (no hidden iteration-order dependence), and the value simulated
//! for date `t` depends only on data at dates `<= t`.
//!
//! # Quick Start
//!
//! ```no_run
//! use alphasim::{
//!     neutralize::{self, NeutralizeMethod},
//!     panel::Panel,
//!     simulator::{PortfolioSimulator, SimulatorConfig},
//!     metrics::MetricsReport,
//! };
//!
//! # fn load_panels() -> (Panel, Panel) { unimplemented!() }
//! let (raw_factor, prices) = load_panels();
//!
//! // Z-score each date's cross-section.
//! let (signal, _diags) = neutralize::apply(&raw_factor, &NeutralizeMethod::ZScore).unwrap();
//!
//! // Simulate a dollar-neutral portfolio with default costs.
//! let simulator = PortfolioSimulator::new(SimulatorConfig::default());
//! let result = simulator.run(&signal, &prices, None).unwrap();
//!
//! let report = MetricsReport::from_result(&result, &signal, &prices);
//! println!("{}", report.summary());
//! ```
//!
//! # Walk-Forward Evaluation
//!
//! ```no_run
//! use alphasim::{
//!     panel::Panel,
//!     runner::{run_folds, BatchConfig},
//!     splitter::{PurgedWalkForward, SplitConfig},
//! };
//! use chrono::Duration;
//!
//! # fn load_panels() -> (Panel, Panel) { unimplemented!() }
//! let (raw_factor, prices) = load_panels();
//!
//! let splitter = PurgedWalkForward::new(SplitConfig::new(5, 252, 63, Duration::days(5)));
//! let folds = splitter.split(prices.dates()).unwrap();
//!
//! let batch = run_folds(&folds, &raw_factor, &prices, None, &BatchConfig::default(), None).unwrap();
//! println!("{}", batch.summary());
//! ```

pub mod config;
pub mod cost;
pub mod error;
pub mod metrics;
pub mod neutralize;
pub mod panel;
pub mod runner;
pub mod signals;
pub mod simulator;
pub mod splitter;
pub mod types;

// Common re-exports
pub use config::FileConfig;
pub use cost::{CostModel, CostParams, TradeCost};
pub use error::{Result, SimError};
pub use metrics::MetricsReport;
pub use neutralize::{NeutralizationEngine, NeutralizeMethod};
pub use panel::Panel;
pub use runner::{run_folds, BatchConfig, BatchResult, FoldRunResult};
pub use simulator::{
    AllocationRule, DriftMode, FrozenNotional, PortfolioSimulator, RebalanceCalendar,
    SimulationResult, SimulatorConfig,
};
pub use splitter::{Fold, FoldIter, PurgedWalkForward, SplitConfig};
pub use types::{Diagnostic, DiagnosticKind, SeriesPoint};
