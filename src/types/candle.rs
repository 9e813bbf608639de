//! OHLCV candles and the per-row feature set computed from them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Epoch values above this are interpreted as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 10_000_000_000;

/// One OHLCV interval for a single instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// A candle extended with indicator and level fields.
///
/// Every computed field is optional: indicators that need a warm-up window stay
/// `None` until enough history exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub price: f64,
    pub ema7: Option<f64>,
    pub ema100: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub rsi6: Option<f64>,
    pub ma5_volume: Option<f64>,
    pub pivot_high: Option<f64>,
    pub pivot_low: Option<f64>,
    pub nearest_resistance: Option<f64>,
    pub nearest_support: Option<f64>,
}

impl FeatureRow {
    /// Start a row from a candle with all computed fields absent.
    pub fn from_candle(candle: &Candle) -> Self {
        Self {
            timestamp: candle.timestamp,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            price: candle.close,
            ema7: None,
            ema100: None,
            macd_line: None,
            macd_signal: None,
            macd_hist: None,
            rsi6: None,
            ma5_volume: None,
            pivot_high: None,
            pivot_low: None,
            nearest_resistance: None,
            nearest_support: None,
        }
    }
}

/// Sort candles by time and drop duplicate timestamps, keeping the last one seen.
pub fn normalize_candles(mut candles: Vec<Candle>) -> Result<Vec<Candle>, EngineError> {
    if let Some(bad) = candles.iter().find(|c| !c.is_finite()) {
        return Err(EngineError::InvalidInput(format!(
            "non-finite OHLCV values at {}",
            bad.timestamp.to_rfc3339()
        )));
    }

    // Stable sort keeps ingest order among equal timestamps.
    candles.sort_by_key(|c| c.timestamp);

    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match out.last_mut() {
            Some(last) if last.timestamp == candle.timestamp => *last = candle,
            _ => out.push(candle),
        }
    }
    Ok(out)
}

/// Parse a UTC timestamp from epoch seconds/milliseconds, RFC 3339, a naive
/// datetime, or a bare date (midnight).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, EngineError> {
    let value = value.trim();
    let invalid = || EngineError::InvalidInput(format!("unparseable timestamp: {:?}", value));

    if let Ok(epoch) = value.parse::<i64>() {
        return epoch_to_utc(epoch).ok_or_else(invalid);
    }
    if let Ok(epoch) = value.parse::<f64>() {
        if epoch.is_finite() {
            return epoch_to_utc(epoch as i64).ok_or_else(invalid);
        }
        return Err(invalid());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        return Ok(Utc.from_utc_datetime(&midnight));
    }
    Err(invalid())
}

/// Convert an epoch value to UTC, treating large values as milliseconds.
pub fn epoch_to_utc(epoch: i64) -> Option<DateTime<Utc>> {
    if epoch.abs() > EPOCH_MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(epoch).single()
    } else {
        Utc.timestamp_opt(epoch, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, close: f64) -> Candle {
        Candle::new(Utc.timestamp_opt(ts, 0).unwrap(), close, close, close, close, 1.0)
    }

    #[test]
    fn test_normalize_sorts_ascending() {
        let out = normalize_candles(vec![candle(300, 3.0), candle(100, 1.0), candle(200, 2.0)]).unwrap();
        let closes: Vec<f64> = out.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_normalize_keeps_last_duplicate() {
        let out = normalize_candles(vec![candle(100, 1.0), candle(200, 2.0), candle(100, 9.0)]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].close, 9.0);
    }

    #[test]
    fn test_normalize_rejects_nan() {
        let result = normalize_candles(vec![candle(100, f64::NAN)]);
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 1, 1, 4, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-01-01T04:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-01-01T04:00:00+00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-01-01 04:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("1735704000").unwrap(), expected);
        assert_eq!(parse_timestamp("1735704000000").unwrap(), expected);
    }

    #[test]
    fn test_parse_bare_date_is_midnight() {
        let parsed = parse_timestamp("2026-12-31").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_feature_row_from_candle() {
        let row = FeatureRow::from_candle(&candle(100, 42.0));
        assert_eq!(row.price, 42.0);
        assert!(row.ema7.is_none());
        assert!(row.nearest_support.is_none());
    }
}
