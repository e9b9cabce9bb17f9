//! Date × symbol panel storage.
//!
//! A [`Panel`] is an ordered sequence of trading dates, each carrying a
//! symbol-keyed cross-section of finite values. A missing key is the
//! explicit "absent" marker: cells are never zero-filled and NaN sentinels
//! are rejected at construction, so absence can never corrupt arithmetic.

use crate::error::{Result, SimError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A read-only date × symbol numeric dataset.
///
/// Dates are strictly increasing with no duplicates. Each date holds one
/// cross-section; a symbol absent from a cross-section is "not available
/// on that date" (masked), never implicitly zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    dates: Vec<DateTime<Utc>>,
    rows: Vec<HashMap<String, f64>>,
}

impl Panel {
    /// Create a panel from parallel date/cross-section vectors.
    ///
    /// Fails on unsorted or duplicate dates, length mismatch, or any
    /// non-finite cell value.
    pub fn new(dates: Vec<DateTime<Utc>>, rows: Vec<HashMap<String, f64>>) -> Result<Self> {
        if dates.len() != rows.len() {
            return Err(SimError::PanelError(format!(
                "date count {} does not match row count {}",
                dates.len(),
                rows.len()
            )));
        }
        for pair in dates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(SimError::PanelError(format!(
                    "dates must be strictly increasing: {} follows {}",
                    pair[1], pair[0]
                )));
            }
        }
        for (date, row) in dates.iter().zip(&rows) {
            for (symbol, value) in row {
                if !value.is_finite() {
                    return Err(SimError::PanelError(format!(
                        "non-finite value for {} on {}; use an absent cell instead",
                        symbol, date
                    )));
                }
            }
        }
        Ok(Self { dates, rows })
    }

    /// Create an empty panel.
    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build a panel from (date, symbol, value) cells in any order.
    pub fn from_cells<I, S>(cells: I) -> Result<Self>
    where
        I: IntoIterator<Item = (DateTime<Utc>, S, f64)>,
        S: Into<String>,
    {
        let mut by_date: HashMap<DateTime<Utc>, HashMap<String, f64>> = HashMap::new();
        for (date, symbol, value) in cells {
            let symbol = symbol.into();
            let row = by_date.entry(date).or_default();
            if row.insert(symbol.clone(), value).is_some() {
                return Err(SimError::PanelError(format!(
                    "duplicate cell for {} on {}",
                    symbol, date
                )));
            }
        }
        let mut dates: Vec<DateTime<Utc>> = by_date.keys().copied().collect();
        dates.sort();
        let rows = dates
            .iter()
            .map(|d| by_date.remove(d).unwrap_or_default())
            .collect();
        Self::new(dates, rows)
    }

    /// Append a cross-section; its date must follow the last stored date.
    pub fn push_row(&mut self, date: DateTime<Utc>, row: HashMap<String, f64>) -> Result<()> {
        if let Some(last) = self.dates.last() {
            if date <= *last {
                return Err(SimError::PanelError(format!(
                    "row date {} does not follow {}",
                    date, last
                )));
            }
        }
        for (symbol, value) in &row {
            if !value.is_finite() {
                return Err(SimError::PanelError(format!(
                    "non-finite value for {} on {}",
                    symbol, date
                )));
            }
        }
        self.dates.push(date);
        self.rows.push(row);
        Ok(())
    }

    /// Number of dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// True when the panel holds no dates.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// The trading calendar, strictly increasing.
    pub fn dates(&self) -> &[DateTime<Utc>] {
        &self.dates
    }

    /// Cross-section at a date index.
    pub fn row(&self, idx: usize) -> &HashMap<String, f64> {
        &self.rows[idx]
    }

    /// Position of a date in the calendar, if present.
    pub fn date_index(&self, date: DateTime<Utc>) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Cross-section for a date, if the date exists.
    pub fn row_for_date(&self, date: DateTime<Utc>) -> Option<&HashMap<String, f64>> {
        self.date_index(date).map(|i| &self.rows[i])
    }

    /// Value for (date index, symbol); `None` means masked/absent.
    pub fn get(&self, idx: usize, symbol: &str) -> Option<f64> {
        self.rows.get(idx).and_then(|r| r.get(symbol).copied())
    }

    /// Union of symbols over all dates, sorted.
    pub fn symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for row in &self.rows {
            for symbol in row.keys() {
                if !out.contains(symbol) {
                    out.insert(symbol.clone());
                }
            }
        }
        out
    }

    /// Time series for a single symbol as (date, value) pairs, skipping
    /// dates where the symbol is absent.
    pub fn series(&self, symbol: &str) -> Vec<(DateTime<Utc>, f64)> {
        self.dates
            .iter()
            .zip(&self.rows)
            .filter_map(|(d, r)| r.get(symbol).map(|v| (*d, *v)))
            .collect()
    }

    /// Sub-panel over the half-open date interval `[start, end)`.
    pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Panel {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d < end);
        Panel {
            dates: self.dates[lo..hi].to_vec(),
            rows: self.rows[lo..hi].to_vec(),
        }
    }

    /// Sub-panel with all dates up to and including `date`.
    pub fn truncate_at(&self, date: DateTime<Utc>) -> Panel {
        let hi = self.dates.partition_point(|d| *d <= date);
        Panel {
            dates: self.dates[..hi].to_vec(),
            rows: self.rows[..hi].to_vec(),
        }
    }

    /// Iterate (date, cross-section) pairs in calendar order.
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, &HashMap<String, f64>)> {
        self.dates.iter().copied().zip(self.rows.iter())
    }
}
