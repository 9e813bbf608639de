use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Trading action derived from one feature row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Long,
    Short,
    #[default]
    Wait,
}

impl Action {
    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "long" => Some(Self::Long),
            "short" => Some(Self::Short),
            "wait" => Some(Self::Wait),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
            Self::Wait => "wait",
        }
    }
}

/// Trade suggestion for one row. Price levels are present only for long/short.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Signal {
    pub action: Action,
    #[serde(default)]
    pub entry: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub target: Option<f64>,
    #[serde(default)]
    pub rr_ratio: Option<f64>,
}

impl Signal {
    /// A `wait` signal with every level absent.
    pub fn wait() -> Self {
        Self::default()
    }

    /// Lenient reader for signals stored by older or foreign writers.
    ///
    /// Unknown or missing actions read as `wait`; non-numeric or non-finite
    /// levels read as absent.
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let level = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_f64)
                .filter(|v| v.is_finite())
        };

        Self {
            action: object
                .get("action")
                .and_then(Value::as_str)
                .and_then(Action::from_str)
                .unwrap_or_default(),
            entry: level("entry"),
            stop_loss: level("stop_loss"),
            target: level("target"),
            rr_ratio: level("rr_ratio"),
        }
    }
}
