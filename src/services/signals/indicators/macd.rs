//! MACD (Moving Average Convergence Divergence) indicator.

use super::ema::Ema;
use crate::error::EngineError;

/// MACD indicator.
///
/// Shows the relationship between two EMAs:
/// - MACD Line = EMA(fast) - EMA(slow)
/// - Signal Line = EMA(signal) of MACD Line
/// - Histogram = MACD Line - Signal Line
#[derive(Debug, Clone, Copy)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

/// MACD output columns, aligned with the input series.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Result<Self, EngineError> {
        if fast == 0 || slow == 0 || signal == 0 {
            return Err(EngineError::InvalidParameter(
                "MACD periods must be positive".to_string(),
            ));
        }
        if fast >= slow {
            return Err(EngineError::InvalidParameter(
                "MACD fast period must be less than slow period".to_string(),
            ));
        }
        Ok(Self {
            fast: Ema::new(fast)?,
            slow: Ema::new(slow)?,
            signal: Ema::new(signal)?,
        })
    }

    pub fn compute(&self, close: &[f64]) -> MacdSeries {
        let fast = self.fast.compute(close);
        let slow = self.slow.compute(close);

        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = self.signal.compute(&line);
        let hist = line.iter().zip(&signal).map(|(l, s)| l - s).collect();

        MacdSeries { line, signal, hist }
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self {
            fast: Ema::with_period(12),
            slow: Ema::with_period(26),
            signal: Ema::with_period(9),
        }
    }
}

/// MACD of `close` with the given periods.
pub fn macd(
    close: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<MacdSeries, EngineError> {
    Ok(Macd::new(fast, slow, signal)?.compute(close))
}
