//! Raw factor generation from price history.
//!
//! A small library of signal generators that produce raw factor panels
//! for the neutralization stage. Only trailing data feeds each date's
//! value, so generated factors inherit the engine's no-lookahead
//! guarantee.

use crate::error::Result;
use crate::panel::Panel;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Simple moving average over a value series; `None` until the window
/// has filled.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(sum / period as f64);
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = Some(sum / period as f64);
    }
    out
}

/// Moving-average crossover factor per symbol: +1 when the fast average
/// is above the slow one, -1 when below. Dates inside the warmup period
/// are left absent (masked) rather than zero-filled.
pub fn ma_crossover_factor(prices: &Panel, fast: usize, slow: usize) -> Result<Panel> {
    let mut rows: Vec<HashMap<String, f64>> = vec![HashMap::new(); prices.len()];
    let dates: Vec<DateTime<Utc>> = prices.dates().to_vec();

    for symbol in prices.symbols() {
        let series = prices.series(&symbol);
        let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
        let fast_ma = sma(&values, fast);
        let slow_ma = sma(&values, slow);

        for (obs_idx, (date, _)) in series.iter().enumerate() {
            let (Some(f), Some(s)) = (fast_ma[obs_idx], slow_ma[obs_idx]) else {
                continue;
            };
            let value = if f > s { 1.0 } else { -1.0 };
            // Observation dates are a subsequence of the calendar.
            if let Some(row_idx) = prices.date_index(*date) {
                rows[row_idx].insert(symbol.clone(), value);
            }
        }
    }

    Panel::new(dates, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(n)
    }

    #[test]
    fn test_sma_basic() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ma = sma(&values, 3);
        assert_eq!(ma[0], None);
        assert_eq!(ma[1], None);
        assert_eq!(ma[2], Some(2.0));
        assert_eq!(ma[3], Some(3.0));
        assert_eq!(ma[4], Some(4.0));
    }

    #[test]
    fn test_sma_short_series() {
        assert!(sma(&[1.0, 2.0], 5).iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_crossover_sign() {
        // A trends up (fast above slow), B trends down.
        let mut cells = Vec::new();
        for i in 0..10i64 {
            cells.push((day(i), "A", 100.0 + i as f64));
            cells.push((day(i), "B", 100.0 - i as f64));
        }
        let prices = Panel::from_cells(cells).unwrap();
        let factor = ma_crossover_factor(&prices, 2, 4).unwrap();

        // Warmup dates are masked, not zero.
        assert_eq!(factor.get(0, "A"), None);
        assert_eq!(factor.get(2, "A"), None);

        for i in 4..10 {
            assert_eq!(factor.get(i, "A"), Some(1.0));
            assert_eq!(factor.get(i, "B"), Some(-1.0));
        }
    }

    #[test]
    fn test_crossover_calendar_preserved() {
        let mut cells = Vec::new();
        for i in 0..10i64 {
            cells.push((day(i), "A", 100.0 + i as f64));
        }
        let prices = Panel::from_cells(cells).unwrap();
        let factor = ma_crossover_factor(&prices, 2, 4).unwrap();
        assert_eq!(factor.dates(), prices.dates());
    }
}
