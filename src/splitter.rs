//! Purged walk-forward cross-validation splits.
//!
//! Produces chronologically ordered, non-overlapping test windows, each
//! preceded by a training window that ends at least one embargo duration
//! earlier. The embargo is a duration rather than a date count so that
//! irregular calendars purge correctly.

use crate::error::{Result, SimError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Configuration for the purged walk-forward splitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Number of folds to generate.
    pub n_folds: usize,
    /// Training window length in trading dates.
    pub train_span: usize,
    /// Test window length in trading dates.
    pub test_span: usize,
    /// Minimum gap between the last training date and the first test date.
    pub embargo: Duration,
}

impl SplitConfig {
    pub fn new(n_folds: usize, train_span: usize, test_span: usize, embargo: Duration) -> Self {
        Self {
            n_folds,
            train_span,
            test_span,
            embargo,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.n_folds == 0 {
            return Err(SimError::ConfigError("n_folds must be positive".into()));
        }
        if self.train_span == 0 || self.test_span == 0 {
            return Err(SimError::ConfigError(
                "train_span and test_span must be positive".into(),
            ));
        }
        if self.embargo < Duration::zero() {
            return Err(SimError::ConfigError("embargo must be non-negative".into()));
        }
        Ok(())
    }
}

/// A (train, embargo gap, test) partition of the trading calendar.
///
/// Ranges are half-open date intervals `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
}

impl Fold {
    pub fn train_contains(&self, date: DateTime<Utc>) -> bool {
        date >= self.train_start && date < self.train_end
    }

    pub fn test_contains(&self, date: DateTime<Utc>) -> bool {
        date >= self.test_start && date < self.test_end
    }
}

/// Purged walk-forward splitter.
///
/// Deterministic: the same configuration and calendar always yield the
/// same folds.
pub struct PurgedWalkForward {
    config: SplitConfig,
}

impl PurgedWalkForward {
    pub fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    /// Lazily generate folds over a strictly increasing trading calendar.
    ///
    /// Fold `k`'s training window starts `k * test_span` dates in; its
    /// test window begins at the first date at least `embargo` after the
    /// last training date (and after the previous fold's test window, so
    /// test windows never overlap). A fold that does not fit yields
    /// `InsufficientData` and ends the sequence. Calling `iter` again
    /// restarts the sequence from the first fold.
    pub fn iter<'a>(&'a self, dates: &'a [DateTime<Utc>]) -> FoldIter<'a> {
        FoldIter {
            config: &self.config,
            dates,
            next_fold: 0,
            prev_test_end_idx: 0,
            stopped: false,
        }
    }

    /// Collect all requested folds, failing if any fold does not fit.
    pub fn split(&self, dates: &[DateTime<Utc>]) -> Result<Vec<Fold>> {
        let folds = self.iter(dates).collect::<Result<Vec<_>>>()?;
        info!(folds = folds.len(), "walk-forward split complete");
        Ok(folds)
    }
}

/// Lazy fold sequence; see [`PurgedWalkForward::iter`].
pub struct FoldIter<'a> {
    config: &'a SplitConfig,
    dates: &'a [DateTime<Utc>],
    next_fold: usize,
    prev_test_end_idx: usize,
    stopped: bool,
}

impl Iterator for FoldIter<'_> {
    type Item = Result<Fold>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped {
            return None;
        }
        if self.next_fold == 0 {
            if let Err(e) = validate_inputs(self.config, self.dates) {
                self.stopped = true;
                return Some(Err(e));
            }
        }
        if self.next_fold >= self.config.n_folds {
            self.stopped = true;
            return None;
        }
        match make_fold(self.config, self.dates, self.next_fold, self.prev_test_end_idx) {
            Ok((fold, test_end_idx)) => {
                self.next_fold += 1;
                self.prev_test_end_idx = test_end_idx;
                Some(Ok(fold))
            }
            Err(e) => {
                self.stopped = true;
                Some(Err(e))
            }
        }
    }
}

fn validate_inputs(config: &SplitConfig, dates: &[DateTime<Utc>]) -> Result<()> {
    config.validate()?;
    if dates.is_empty() {
        return Err(SimError::EmptyPanel);
    }
    for pair in dates.windows(2) {
        if pair[1] <= pair[0] {
            return Err(SimError::PanelError(
                "calendar must be strictly increasing".into(),
            ));
        }
    }
    Ok(())
}

/// Build fold `k`, returning it with the exclusive index of its test end.
fn make_fold(
    config: &SplitConfig,
    dates: &[DateTime<Utc>],
    k: usize,
    prev_test_end_idx: usize,
) -> Result<(Fold, usize)> {
    let train_start_idx = k * config.test_span;
    let train_end_idx = train_start_idx + config.train_span; // exclusive
    if train_end_idx >= dates.len() {
        return Err(insufficient(k, config.n_folds, dates.len()));
    }

    let last_train_date = dates[train_end_idx - 1];
    let earliest_test = last_train_date + config.embargo;
    let embargo_idx = dates.partition_point(|d| *d < earliest_test);
    let test_start_idx = embargo_idx.max(train_end_idx).max(prev_test_end_idx);
    let test_end_idx = test_start_idx + config.test_span; // exclusive
    if test_end_idx > dates.len() {
        return Err(insufficient(k, config.n_folds, dates.len()));
    }

    let fold = Fold {
        index: k,
        train_start: dates[train_start_idx],
        train_end: dates[train_end_idx],
        test_start: dates[test_start_idx],
        test_end: end_bound(dates, test_end_idx),
    };
    Ok((fold, test_end_idx))
}

/// Exclusive upper bound for a window ending at `idx` (one past the last
/// included date). Past the calendar end, extend by one day so the last
/// date stays inside the half-open interval.
fn end_bound(dates: &[DateTime<Utc>], idx: usize) -> DateTime<Utc> {
    dates
        .get(idx)
        .copied()
        .unwrap_or_else(|| dates[dates.len() - 1] + Duration::days(1))
}

fn insufficient(fold: usize, n_folds: usize, available: usize) -> SimError {
    SimError::InsufficientData(format!(
        "fold {} of {} does not fit in {} trading dates",
        fold, n_folds, available
    ))
}
