//! Exponential Moving Average (EMA) indicator.

use crate::error::EngineError;

/// EMA (Exponential Moving Average) indicator.
///
/// Recursive form without bias correction: the first output equals the first
/// input, then each value is `alpha * x + (1 - alpha) * prev` with
/// `alpha = 2 / (period + 1)`. Every position has a value.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    period: usize,
    alpha: f64,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, EngineError> {
        if period == 0 {
            return Err(EngineError::InvalidParameter(
                "EMA period must be positive".to_string(),
            ));
        }
        Ok(Self::with_period(period))
    }

    /// Build without validation; callers guarantee `period > 0`.
    pub(super) fn with_period(period: usize) -> Self {
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Calculate the EMA series.
    pub fn compute(&self, values: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(values.len());
        let mut prev: Option<f64> = None;

        for &value in values {
            let next = match prev {
                None => value,
                Some(p) => self.alpha * value + (1.0 - self.alpha) * p,
            };
            out.push(next);
            prev = Some(next);
        }

        out
    }
}

/// EMA of `series` over `period`.
pub fn ema(series: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    Ok(Ema::new(period)?.compute(series))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "expected {}, got {}", e, a);
        }
    }

    #[test]
    fn test_ema_known_values() {
        let result = ema(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert_close(&result, &[1.0, 1.5, 2.25, 3.125, 4.0625]);
    }

    #[test]
    fn test_ema_period_one_is_identity() {
        let series = [3.0, 7.0, 1.0];
        assert_close(&ema(&series, 1).unwrap(), &series);
    }

    #[test]
    fn test_ema_zero_period_rejected() {
        assert!(matches!(ema(&[1.0], 0), Err(EngineError::InvalidParameter(_))));
    }

    #[test]
    fn test_ema_empty_series() {
        assert!(ema(&[], 7).unwrap().is_empty());
    }

    #[test]
    fn test_ema_constant_series() {
        let result = ema(&[5.0; 10], 4).unwrap();
        assert!(result.iter().all(|v| (*v - 5.0).abs() < 1e-12));
    }
}
