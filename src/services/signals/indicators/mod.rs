//! Technical indicator implementations.

pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use ema::{ema, Ema};
pub use macd::{macd, Macd, MacdSeries};
pub use rsi::{rsi, Rsi};
pub use sma::{volume_ma, Sma};

use crate::error::EngineError;
use crate::types::{Candle, FeatureRow};

/// Short trend EMA period.
pub const EMA_FAST_PERIOD: usize = 7;
/// Long trend EMA period.
pub const EMA_SLOW_PERIOD: usize = 100;
/// RSI period used by the signal rules.
pub const RSI_PERIOD: usize = 6;
/// Volume moving average window.
pub const VOLUME_MA_WINDOW: usize = 5;

/// Compute every model input for a candle series.
///
/// Level fields are left absent; see [`super::levels::add_levels`].
pub fn add_indicators(candles: &[Candle]) -> Result<Vec<FeatureRow>, EngineError> {
    let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volume: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    let ema7 = ema(&close, EMA_FAST_PERIOD)?;
    let ema100 = ema(&close, EMA_SLOW_PERIOD)?;
    let macd = Macd::default().compute(&close);
    let rsi6 = rsi(&close, RSI_PERIOD)?;
    let ma5_volume = volume_ma(&volume, VOLUME_MA_WINDOW)?;

    let rows = candles
        .iter()
        .enumerate()
        .map(|(i, candle)| FeatureRow {
            ema7: Some(ema7[i]),
            ema100: Some(ema100[i]),
            macd_line: Some(macd.line[i]),
            macd_signal: Some(macd.signal[i]),
            macd_hist: Some(macd.hist[i]),
            rsi6: rsi6[i],
            ma5_volume: ma5_volume[i],
            ..FeatureRow::from_candle(candle)
        })
        .collect();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn linear_candles(count: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let close = 100.0 + i as f64;
                Candle::new(
                    start + Duration::hours(4 * i as i64),
                    close,
                    close + 1.0,
                    close - 1.0,
                    close,
                    1000.0 + i as f64 * 10.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_add_indicators_has_required_outputs() {
        let rows = add_indicators(&linear_candles(20)).unwrap();
        assert_eq!(rows.len(), 20);

        let last = rows.last().unwrap();
        assert_eq!(last.price, last.close);
        assert!(last.ema7.is_some());
        assert!(last.ema100.is_some());
        assert!(last.macd_line.is_some());
        assert!(last.macd_signal.is_some());
        assert!(last.macd_hist.is_some());
        assert!(last.rsi6.is_some());
        assert!(last.ma5_volume.is_some());
        assert!(last.nearest_resistance.is_none());
    }

    #[test]
    fn test_add_indicators_warmup_fields() {
        let rows = add_indicators(&linear_candles(10)).unwrap();
        assert!(rows[3].ma5_volume.is_none());
        assert!(rows[4].ma5_volume.is_some());
        assert!(rows[5].rsi6.is_none());
        assert!(rows[6].rsi6.is_some());
        assert!(rows[0].ema7.is_some());
    }

    #[test]
    fn test_add_indicators_empty() {
        assert!(add_indicators(&[]).unwrap().is_empty());
    }
}
