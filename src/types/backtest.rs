//! Backtest order, trade and metrics types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Action, FeatureRow, Signal};

/// Side of a simulated position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Map a signal action to a side; `wait` has none.
    pub fn from_action(action: Action) -> Option<Self> {
        match action {
            Action::Long => Some(Self::Long),
            Action::Short => Some(Self::Short),
            Action::Wait => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

/// Why a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    Target,
    StopAndTargetSameCandle,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "stop_loss",
            Self::Target => "target",
            Self::StopAndTargetSameCandle => "stop_and_target_same_candle",
            Self::EndOfData => "end_of_data",
        }
    }
}

/// Realized result label of a closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    Flat,
}

impl Outcome {
    pub fn from_pnl(pnl: f64) -> Self {
        if pnl > 0.0 {
            Self::Win
        } else if pnl < 0.0 {
            Self::Loss
        } else {
            Self::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Flat => "flat",
        }
    }
}

/// One candle of simulator input: the bar's range plus the signal fired on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRow {
    pub timestamp: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub signal: Signal,
}

impl BacktestRow {
    pub fn from_features(row: &FeatureRow, signal: Signal) -> Self {
        Self {
            timestamp: row.timestamp,
            high: row.high,
            low: row.low,
            close: row.close,
            signal,
        }
    }
}

/// Order created by a signal, executed on the following candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingOrder {
    pub signal_time: DateTime<Utc>,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: f64,
}

/// A live position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenTrade {
    pub signal_time: DateTime<Utc>,
    pub entry_time: DateTime<Utc>,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: f64,
}

impl OpenTrade {
    pub fn from_pending(order: PendingOrder, entry_time: DateTime<Utc>) -> Self {
        Self {
            signal_time: order.signal_time,
            entry_time,
            side: order.side,
            entry: order.entry,
            stop_loss: order.stop_loss,
            target: order.target,
        }
    }
}

/// A finished trade with realized P&L.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub signal_time: DateTime<Utc>,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub exit_price: f64,
    pub pnl: f64,
    pub outcome: Outcome,
    pub exit_reason: ExitReason,
}

/// Aggregate performance over a trade list.
///
/// `win_rate` is a percentage; P&L figures are fractional returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Metrics {
    pub win_rate: f64,
    pub avg_pl: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub max_drawdown: f64,
    pub trades_count: usize,
}
