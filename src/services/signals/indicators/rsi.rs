//! Relative Strength Index (RSI) indicator.

use crate::error::EngineError;

/// RSI (Relative Strength Index) indicator with Wilder smoothing.
///
/// Average gain and loss are exponentially smoothed with `alpha = 1 / period`,
/// seeded by the first price change. Values range from 0-100:
/// - Below 30: Oversold
/// - Above 70: Overbought
///
/// The first `period` positions are undefined. When the average loss is exactly
/// zero the RSI is 100.
#[derive(Debug, Clone, Copy)]
pub struct Rsi {
    period: usize,
}

impl Default for Rsi {
    fn default() -> Self {
        Self { period: 6 }
    }
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, EngineError> {
        if period == 0 {
            return Err(EngineError::InvalidParameter(
                "RSI period must be positive".to_string(),
            ));
        }
        Ok(Self { period })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Minimum number of prices before the first value.
    pub fn min_periods(&self) -> usize {
        self.period + 1
    }

    /// Calculate the RSI series.
    pub fn compute(&self, values: &[f64]) -> Vec<Option<f64>> {
        let mut out = Vec::with_capacity(values.len());
        if values.is_empty() {
            return out;
        }
        out.push(None);

        let alpha = 1.0 / self.period as f64;
        let mut avg_gain: Option<f64> = None;
        let mut avg_loss: Option<f64> = None;
        let mut observations = 0usize;

        for pair in values.windows(2) {
            let change = pair[1] - pair[0];
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);

            let g = match avg_gain {
                None => gain,
                Some(prev) => alpha * gain + (1.0 - alpha) * prev,
            };
            let l = match avg_loss {
                None => loss,
                Some(prev) => alpha * loss + (1.0 - alpha) * prev,
            };
            avg_gain = Some(g);
            avg_loss = Some(l);
            observations += 1;

            if observations < self.period {
                out.push(None);
                continue;
            }

            let rsi = if l == 0.0 {
                100.0
            } else {
                let rs = g / l;
                100.0 - 100.0 / (1.0 + rs)
            };
            out.push(Some(rsi.clamp(0.0, 100.0)));
        }

        out
    }
}

/// Wilder RSI of `series` over `period`.
pub fn rsi(series: &[f64], period: usize) -> Result<Vec<Option<f64>>, EngineError> {
    Ok(Rsi::new(period)?.compute(series))
}
