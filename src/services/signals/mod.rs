//! Signal pipeline: indicators, support/resistance levels and rule evaluation.
//!
//! Everything here is synchronous and pure. The worker and the backtester
//! drive it over an in-memory candle series.

pub mod indicators;
pub mod levels;
pub mod rules;

pub use indicators::add_indicators;
pub use levels::{add_levels, detect_pivots, LevelTracker, Pivot};
pub use rules::evaluate_signal;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::EngineError;
use crate::types::{Candle, FeatureRow, Signal};

/// Default trailing window for pivot detection.
pub const DEFAULT_PIVOT_WINDOW: usize = 3;

/// Run indicators then level tracking over a candle series.
pub fn compute_features(
    candles: &[Candle],
    pivot_window: usize,
) -> Result<Vec<FeatureRow>, EngineError> {
    let rows = add_indicators(candles)?;
    add_levels(rows, pivot_window)
}

/// One signal per feature row.
pub fn build_signal_frame(rows: &[FeatureRow]) -> Vec<Signal> {
    rows.iter().map(evaluate_signal).collect()
}

/// Signal for the most recent row.
pub fn build_latest_signal(rows: &[FeatureRow]) -> Result<Signal, EngineError> {
    rows.last()
        .map(evaluate_signal)
        .ok_or_else(|| EngineError::InvalidInput("feature frame is empty".to_string()))
}

/// Latest-signal report keyed alphabetically: `timestamp` of the candle plus
/// the signal fields.
pub fn latest_signal_report(
    rows: &[FeatureRow],
) -> Result<BTreeMap<String, Value>, EngineError> {
    let signal = build_latest_signal(rows)?;
    let mut report = BTreeMap::new();
    if let Some(last) = rows.last() {
        report.insert(
            "timestamp".to_string(),
            Value::String(last.timestamp.to_rfc3339()),
        );
    }

    let level = |v: Option<f64>| v.map_or(Value::Null, Value::from);
    report.insert("action".to_string(), Value::from(signal.action.as_str()));
    report.insert("entry".to_string(), level(signal.entry));
    report.insert("stop_loss".to_string(), level(signal.stop_loss));
    report.insert("target".to_string(), level(signal.target));
    report.insert("rr_ratio".to_string(), level(signal.rr_ratio));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(count: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let close = 100.0 + (i as f64 / 3.0).sin() * 5.0;
                Candle::new(
                    start + Duration::hours(4 * i as i64),
                    close,
                    close + 1.0,
                    close - 1.0,
                    close,
                    1000.0 + (i % 7) as f64 * 50.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_compute_features_fills_levels() {
        let rows = compute_features(&candles(40), DEFAULT_PIVOT_WINDOW).unwrap();
        assert_eq!(rows.len(), 40);
        assert!(rows[0].pivot_high.is_none());
        assert!(rows.iter().any(|r| r.pivot_high.is_some()));
        assert!(rows.iter().any(|r| r.nearest_support.is_some()));
    }

    #[test]
    fn test_compute_features_rejects_zero_window() {
        assert!(matches!(
            compute_features(&candles(10), 0),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_signal_frame_matches_rows() {
        let rows = compute_features(&candles(30), DEFAULT_PIVOT_WINDOW).unwrap();
        let signals = build_signal_frame(&rows);
        assert_eq!(signals.len(), rows.len());
        assert_eq!(build_latest_signal(&rows).unwrap(), signals[signals.len() - 1]);
    }

    #[test]
    fn test_latest_signal_report_keys_are_sorted() {
        let rows = compute_features(&candles(30), DEFAULT_PIVOT_WINDOW).unwrap();
        let report = latest_signal_report(&rows).unwrap();

        let keys: Vec<&str> = report.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["action", "entry", "rr_ratio", "stop_loss", "target", "timestamp"]
        );
        assert_eq!(report["timestamp"], rows[29].timestamp.to_rfc3339());

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.starts_with("{\"action\":"));
        assert!(json.ends_with(&format!("\"timestamp\":\"{}\"}}", rows[29].timestamp.to_rfc3339())));
    }

    #[test]
    fn test_latest_signal_empty_frame() {
        assert!(matches!(build_latest_signal(&[]), Err(EngineError::InvalidInput(_))));
        assert!(build_signal_frame(&[]).is_empty());
    }
}
