//! Core shared types for the simulation core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dated scalar observation, used for return and turnover series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(date: DateTime<Utc>, value: f64) -> Self {
        Self { date, value }
    }
}

/// Kind of a non-fatal condition recorded during a run.
///
/// Every kind has a deterministic, documented fallback; the run never
/// silently drops a date or symbol without one of these entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Cross-section too small or constant to neutralize; output zeroed.
    DegenerateCrossSection,
    /// Symbol has no industry mapping; excluded from the cross-section.
    UnmappedIndustry,
    /// Fewer than three symbols with beta coverage; date masked.
    InsufficientBetaCoverage,
    /// Symbol has no beta exposure on the date; excluded from the
    /// regression and the output cross-section.
    MissingBeta,
    /// Gross and net caps could not both hold; fell back to proportional
    /// scaling against the gross cap.
    LeverageCapInfeasible,
    /// Open position with no price on this date; weight frozen in place.
    MissingPriceForOpenPosition,
    /// ADV zero or unavailable; market-impact term omitted for the trade.
    ZeroAdvFallback,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::DegenerateCrossSection => "degenerate cross-section",
            DiagnosticKind::UnmappedIndustry => "unmapped industry",
            DiagnosticKind::InsufficientBetaCoverage => "insufficient beta coverage",
            DiagnosticKind::MissingBeta => "missing beta",
            DiagnosticKind::LeverageCapInfeasible => "leverage cap infeasible",
            DiagnosticKind::MissingPriceForOpenPosition => "missing price for open position",
            DiagnosticKind::ZeroAdvFallback => "zero-ADV fallback",
        };
        write!(f, "{}", s)
    }
}

/// A non-fatal condition recorded during a run, tagged with the date and,
/// where applicable, the symbol it concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub date: DateTime<Utc>,
    pub symbol: Option<String>,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    /// A date-level diagnostic with no specific symbol.
    pub fn for_date(date: DateTime<Utc>, kind: DiagnosticKind) -> Self {
        Self {
            date,
            symbol: None,
            kind,
        }
    }

    /// A diagnostic tagged with a specific symbol.
    pub fn for_symbol(date: DateTime<Utc>, symbol: impl Into<String>, kind: DiagnosticKind) -> Self {
        Self {
            date,
            symbol: Some(symbol.into()),
            kind,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(sym) => write!(f, "{} [{}]: {}", self.date.date_naive(), sym, self.kind),
            None => write!(f, "{}: {}", self.date.date_naive(), self.kind),
        }
    }
}
