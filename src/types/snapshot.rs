//! Persisted "latest signal" snapshot and its normalization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Signal;

/// Outcome of the most recent worker fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Ok,
    Failed,
    #[default]
    Unknown,
}

impl FetchStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(Self::Ok),
            "failed" => Some(Self::Failed),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

/// The published view of the latest signal.
///
/// Field order is the wire key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub timestamp: Option<String>,
    pub candle_time: Option<String>,
    pub signal: Option<Signal>,
    pub stale: bool,
    pub error: Option<String>,
    pub last_fetch_status: FetchStatus,
    pub last_success_at: Option<String>,
    pub source: Option<String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            symbol: None,
            timeframe: None,
            timestamp: None,
            candle_time: None,
            signal: None,
            stale: true,
            error: None,
            last_fetch_status: FetchStatus::Unknown,
            last_success_at: None,
            source: None,
        }
    }
}

/// Coerce an arbitrary JSON payload into a [`Snapshot`].
///
/// Unknown keys are dropped, and missing or non-string text fields become
/// null. `stale` defaults to `true` and `last_fetch_status` to `unknown`. A
/// signal is kept only when it is a JSON object.
pub fn normalize_snapshot(payload: &Value) -> Snapshot {
    let Some(object) = payload.as_object() else {
        return Snapshot::default();
    };

    let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

    let stale = match object.get("stale") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    };

    Snapshot {
        symbol: text("symbol"),
        timeframe: text("timeframe"),
        timestamp: text("timestamp"),
        candle_time: text("candle_time"),
        signal: object
            .get("signal")
            .and_then(Value::as_object)
            .map(Signal::from_json_object),
        stale,
        error: text("error"),
        last_fetch_status: object
            .get("last_fetch_status")
            .and_then(Value::as_str)
            .and_then(FetchStatus::from_str)
            .unwrap_or_default(),
        last_success_at: text("last_success_at"),
        source: text("source"),
    }
}
