//! Support/resistance tracking from trailing rolling pivots.
//!
//! A pivot high is a candle whose high equals the maximum high of the trailing
//! window ending at that candle (the candle included); pivot lows mirror this
//! with the minimum low. Levels only ever grow, and each row sees the pivots
//! detected up to and including itself.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::error::EngineError;
use crate::types::FeatureRow;

/// Pivot flags for one row.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pivot {
    pub high: Option<f64>,
    pub low: Option<f64>,
}

/// Totally ordered price used as a set key.
#[derive(Debug, Clone, Copy)]
struct PriceLevel(f64);

impl PriceLevel {
    fn new(price: f64) -> Self {
        // Fold -0.0 into 0.0 so the total order agrees with `==`.
        Self(price + 0.0)
    }
}

impl PartialEq for PriceLevel {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PriceLevel {}

impl PartialOrd for PriceLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriceLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Growing sets of resistances and supports seen so far.
#[derive(Debug, Default)]
pub struct LevelTracker {
    resistances: BTreeSet<PriceLevel>,
    supports: BTreeSet<PriceLevel>,
}

impl LevelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, pivot: Pivot) {
        if let Some(high) = pivot.high {
            self.resistances.insert(PriceLevel::new(high));
        }
        if let Some(low) = pivot.low {
            self.supports.insert(PriceLevel::new(low));
        }
    }

    /// Smallest resistance at or above `price`.
    pub fn nearest_resistance(&self, price: f64) -> Option<f64> {
        self.resistances
            .range(PriceLevel::new(price)..)
            .next()
            .map(|level| level.0)
    }

    /// Largest support at or below `price`.
    pub fn nearest_support(&self, price: f64) -> Option<f64> {
        self.supports
            .range(..=PriceLevel::new(price))
            .next_back()
            .map(|level| level.0)
    }
}

fn validate_window(window: usize) -> Result<(), EngineError> {
    if window == 0 {
        return Err(EngineError::InvalidParameter(
            "pivot window must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Flag trailing-window pivot highs and lows.
///
/// Rows before the first full window never carry a pivot.
pub fn detect_pivots(rows: &[FeatureRow], window: usize) -> Result<Vec<Pivot>, EngineError> {
    validate_window(window)?;

    let pivots = (0..rows.len())
        .map(|i| {
            if i + 1 < window {
                return Pivot::default();
            }
            let span = &rows[i + 1 - window..=i];
            let max_high = span.iter().map(|r| r.high).fold(f64::NEG_INFINITY, f64::max);
            let min_low = span.iter().map(|r| r.low).fold(f64::INFINITY, f64::min);
            let current = &rows[i];

            Pivot {
                high: (current.high == max_high).then_some(current.high),
                low: (current.low == min_low).then_some(current.low),
            }
        })
        .collect();

    Ok(pivots)
}

/// Attach pivots and nearest support/resistance to every row.
pub fn add_levels(mut rows: Vec<FeatureRow>, window: usize) -> Result<Vec<FeatureRow>, EngineError> {
    let pivots = detect_pivots(&rows, window)?;
    let mut tracker = LevelTracker::new();

    for (row, pivot) in rows.iter_mut().zip(pivots) {
        tracker.observe(pivot);
        row.pivot_high = pivot.high;
        row.pivot_low = pivot.low;
        row.nearest_resistance = tracker.nearest_resistance(row.close);
        row.nearest_support = tracker.nearest_support(row.close);
    }

    Ok(rows)
}
