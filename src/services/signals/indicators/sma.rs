//! Simple Moving Average (SMA) indicator.

use crate::error::EngineError;

/// SMA (Simple Moving Average) indicator.
///
/// Undefined until a full window of observations exists.
#[derive(Debug, Clone, Copy)]
pub struct Sma {
    window: usize,
}

impl Sma {
    pub fn new(window: usize) -> Result<Self, EngineError> {
        if window == 0 {
            return Err(EngineError::InvalidParameter(
                "SMA window must be positive".to_string(),
            ));
        }
        Ok(Self { window })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn compute(&self, values: &[f64]) -> Vec<Option<f64>> {
        (0..values.len())
            .map(|i| {
                if i + 1 < self.window {
                    return None;
                }
                let sum: f64 = values[i + 1 - self.window..=i].iter().sum();
                Some(sum / self.window as f64)
            })
            .collect()
    }
}

/// Simple moving average of traded volume.
pub fn volume_ma(volume: &[f64], window: usize) -> Result<Vec<Option<f64>>, EngineError> {
    Ok(Sma::new(window)?.compute(volume))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_ma_needs_full_window() {
        let out = volume_ma(&[10.0, 20.0, 30.0, 40.0, 50.0], 5).unwrap();
        assert!(out[..4].iter().all(Option::is_none));
        assert_eq!(out[4], Some(30.0));
    }

    #[test]
    fn test_sma_rolls_forward() {
        let out = Sma::new(2).unwrap().compute(&[1.0, 3.0, 5.0, 7.0]);
        assert_eq!(out, vec![None, Some(2.0), Some(4.0), Some(6.0)]);
    }

    #[test]
    fn test_volume_ma_recovers_after_spike() {
        let mut volume = vec![1e16];
        volume.extend([1.0; 9]);
        let out = volume_ma(&volume, 5).unwrap();

        assert!(out[4].unwrap() > 1e15);
        for value in &out[5..] {
            assert_eq!(*value, Some(1.0));
        }
    }

    #[test]
    fn test_sma_zero_window_rejected() {
        assert!(matches!(volume_ma(&[1.0], 0), Err(EngineError::InvalidParameter(_))));
    }

    #[test]
    fn test_sma_short_series() {
        let out = volume_ma(&[1.0, 2.0], 5).unwrap();
        assert_eq!(out, vec![None, None]);
    }
}
