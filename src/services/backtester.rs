//! Backtesting Engine
//!
//! Replays a feature + signal frame through a single-position state machine:
//! a signal creates a pending order, the order fills on the next candle, and
//! the position exits on stop loss, target or end of data.
//! Features:
//! - Intrabar stop/target detection from candle high/low
//! - Conservative tie-break when stop and target hit on the same candle
//! - Flat round-trip fee per trade
//! - Win rate, average P&L and compounded drawdown metrics
//! - Trade list export to CSV

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::services::signals::{build_signal_frame, compute_features};
use crate::sources::CandleSource;
use crate::types::{
    parse_timestamp, BacktestRow, Candle, ClosedTrade, ExitReason, Metrics, OpenTrade, Outcome,
    PendingOrder, Side, Signal,
};

/// Inclusive evaluation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EvalWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Parse both bounds; a bare date means midnight UTC of that day.
    pub fn parse(start: &str, end: &str) -> std::result::Result<Self, EngineError> {
        Ok(Self::new(parse_timestamp(start)?, parse_timestamp(end)?))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Turn a row's signal into an order when it has a complete, consistent geometry.
fn pending_order_from(row: &BacktestRow) -> Option<PendingOrder> {
    let side = Side::from_action(row.signal.action)?;
    let entry = finite(row.signal.entry)?;
    let stop_loss = finite(row.signal.stop_loss)?;
    let target = finite(row.signal.target)?;

    let valid = match side {
        Side::Long => stop_loss < entry && entry < target,
        Side::Short => target < entry && entry < stop_loss,
    };

    valid.then_some(PendingOrder {
        signal_time: row.timestamp,
        side,
        entry,
        stop_loss,
        target,
    })
}

/// Exit price and reason if the candle touches the stop or target.
fn check_exit(trade: &OpenTrade, high: f64, low: f64) -> Option<(f64, ExitReason)> {
    let (hit_stop, hit_target) = match trade.side {
        Side::Long => (low <= trade.stop_loss, high >= trade.target),
        Side::Short => (high >= trade.stop_loss, low <= trade.target),
    };

    match (hit_stop, hit_target) {
        (true, true) => Some((trade.stop_loss, ExitReason::StopAndTargetSameCandle)),
        (true, false) => Some((trade.stop_loss, ExitReason::StopLoss)),
        (false, true) => Some((trade.target, ExitReason::Target)),
        (false, false) => None,
    }
}

/// Fractional return of a trade net of a round-trip fee.
pub fn trade_pnl(side: Side, entry: f64, exit_price: f64, fee_rate: f64) -> f64 {
    let gross = match side {
        Side::Long => (exit_price - entry) / entry,
        Side::Short => (entry - exit_price) / entry,
    };
    gross - 2.0 * fee_rate
}

fn close_trade(
    trade: OpenTrade,
    exit_time: DateTime<Utc>,
    exit_price: f64,
    exit_reason: ExitReason,
    fee_rate: f64,
) -> ClosedTrade {
    let pnl = trade_pnl(trade.side, trade.entry, exit_price, fee_rate);
    ClosedTrade {
        signal_time: trade.signal_time,
        entry_time: trade.entry_time,
        exit_time,
        side: trade.side,
        entry: trade.entry,
        stop_loss: trade.stop_loss,
        target: trade.target,
        exit_price,
        pnl,
        outcome: Outcome::from_pnl(pnl),
        exit_reason,
    }
}

fn validate_frame(rows: &[&BacktestRow]) -> std::result::Result<(), EngineError> {
    for (i, row) in rows.iter().enumerate() {
        if !(row.high.is_finite() && row.low.is_finite() && row.close.is_finite()) {
            return Err(EngineError::InvalidInput(format!(
                "non-finite price at {}",
                row.timestamp
            )));
        }
        if i > 0 && row.timestamp <= rows[i - 1].timestamp {
            return Err(EngineError::InvalidInput(format!(
                "timestamps not strictly increasing at {}",
                row.timestamp
            )));
        }
    }
    Ok(())
}

/// Aggregate metrics over a trade list. Empty input gives all zeros.
pub fn compute_metrics(trades: &[ClosedTrade]) -> Metrics {
    if trades.is_empty() {
        return Metrics::default();
    }

    let count = trades.len() as f64;
    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
    let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();

    let mean = |values: &[f64]| {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };

    let mut equity = 1.0;
    let mut peak = f64::NEG_INFINITY;
    let mut max_drawdown = f64::INFINITY;
    for pnl in &pnls {
        equity *= 1.0 + pnl;
        peak = peak.max(equity);
        max_drawdown = max_drawdown.min(equity / peak - 1.0);
    }

    Metrics {
        win_rate: wins.len() as f64 / count * 100.0,
        avg_pl: mean(&pnls),
        avg_win: mean(&wins),
        avg_loss: mean(&losses),
        max_drawdown,
        trades_count: trades.len(),
    }
}

/// Walk the frame inside `window` and return the closed trades with their metrics.
///
/// At most one order is pending and at most one trade is open at any time;
/// signals arriving while either exists are dropped. A pending order fills at
/// the next candle's timestamp and can exit on that same candle. An order
/// still pending when data runs out is discarded.
///
/// Rows inside `window` must have finite prices and strictly increasing
/// timestamps; rows outside it are ignored.
pub fn simulate_trades(
    rows: &[BacktestRow],
    window: EvalWindow,
    fee_rate: f64,
) -> std::result::Result<(Vec<ClosedTrade>, Metrics), EngineError> {
    let data: Vec<&BacktestRow> = rows.iter().filter(|r| window.contains(r.timestamp)).collect();
    validate_frame(&data)?;

    let mut trades = Vec::new();
    let mut pending: Option<PendingOrder> = None;
    let mut open: Option<OpenTrade> = None;

    for row in &data {
        if open.is_none() {
            if let Some(order) = pending.take() {
                debug!("Filling {} order from {} at {}", order.side.as_str(), order.signal_time, row.timestamp);
                open = Some(OpenTrade::from_pending(order, row.timestamp));
            }
        }

        if let Some(trade) = open {
            if let Some((exit_price, reason)) = check_exit(&trade, row.high, row.low) {
                trades.push(close_trade(trade, row.timestamp, exit_price, reason, fee_rate));
                open = None;
            }
        }

        if open.is_none() && pending.is_none() {
            pending = pending_order_from(row);
        }
    }

    if let (Some(trade), Some(last)) = (open, data.last()) {
        trades.push(close_trade(
            trade,
            last.timestamp,
            last.close,
            ExitReason::EndOfData,
            fee_rate,
        ));
    }

    let metrics = compute_metrics(&trades);
    Ok((trades, metrics))
}

/// One CSV record per closed trade.
#[derive(Debug, Serialize)]
struct TradeRecord<'a> {
    signal_time: String,
    entry_time: String,
    exit_time: String,
    side: &'a str,
    entry: f64,
    stop_loss: f64,
    target: f64,
    exit_price: f64,
    pnl: f64,
    outcome: &'a str,
    exit_reason: &'a str,
}

impl<'a> From<&'a ClosedTrade> for TradeRecord<'a> {
    fn from(trade: &'a ClosedTrade) -> Self {
        Self {
            signal_time: trade.signal_time.to_rfc3339(),
            entry_time: trade.entry_time.to_rfc3339(),
            exit_time: trade.exit_time.to_rfc3339(),
            side: trade.side.as_str(),
            entry: trade.entry,
            stop_loss: trade.stop_loss,
            target: trade.target,
            exit_price: trade.exit_price,
            pnl: trade.pnl,
            outcome: trade.outcome.as_str(),
            exit_reason: trade.exit_reason.as_str(),
        }
    }
}

/// Write the trade list with a header row, creating parent directories.
pub fn write_trades_csv(path: &Path, trades: &[ClosedTrade]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    if trades.is_empty() {
        writer.write_record([
            "signal_time", "entry_time", "exit_time", "side", "entry", "stop_loss", "target",
            "exit_price", "pnl", "outcome", "exit_reason",
        ])?;
    }
    for trade in trades {
        writer.serialize(TradeRecord::from(trade))?;
    }
    writer.flush()?;
    Ok(())
}

/// Inputs for an end-to-end backtest.
#[derive(Debug, Clone)]
pub struct BacktestParams {
    pub symbol: String,
    pub timeframe: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub window: EvalWindow,
    pub page_limit: usize,
    pub pivot_window: usize,
    pub fee_rate: f64,
}

impl BacktestParams {
    pub fn from_config(config: &Config) -> std::result::Result<Self, EngineError> {
        Ok(Self {
            symbol: config.symbol.clone(),
            timeframe: config.timeframe.clone(),
            start: parse_timestamp(&config.fetch_start)?,
            end: parse_timestamp(&config.fetch_end)?,
            window: EvalWindow::parse(&config.eval_start, &config.eval_end)?,
            page_limit: config.page_limit,
            pivot_window: config.pivot_window,
            fee_rate: config.fee_rate,
        })
    }
}

/// Result of an end-to-end backtest.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub metrics: Metrics,
    pub trades: Vec<ClosedTrade>,
    /// Full frame, including rows outside the evaluation window.
    pub rows: Vec<BacktestRow>,
}

/// Fetches candles, builds features and signals, then simulates.
pub struct BacktestRunner {
    params: BacktestParams,
}

impl BacktestRunner {
    pub fn new(params: BacktestParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BacktestParams {
        &self.params
    }

    pub async fn run(&self, source: &dyn CandleSource) -> Result<BacktestReport> {
        let p = &self.params;
        info!(
            "Fetching {} {} candles from {} ({} to {})",
            p.symbol,
            p.timeframe,
            source.describe(),
            p.start,
            p.end
        );
        let candles = source
            .fetch_range(&p.symbol, &p.timeframe, p.start, p.end, p.page_limit)
            .await?;
        Ok(self.run_candles(&candles)?)
    }

    /// Backtest an already loaded candle series.
    pub fn run_candles(
        &self,
        candles: &[Candle],
    ) -> std::result::Result<BacktestReport, EngineError> {
        let p = &self.params;
        let features = compute_features(candles, p.pivot_window)?;
        let signals: Vec<Signal> = build_signal_frame(&features);
        let rows: Vec<BacktestRow> = features
            .iter()
            .zip(signals)
            .map(|(row, signal)| BacktestRow::from_features(row, signal))
            .collect();

        let (trades, metrics) = simulate_trades(&rows, p.window, p.fee_rate)?;
        info!(
            "Backtest complete: {} trades, win rate {:.2}%, max drawdown {:.4}",
            metrics.trades_count, metrics.win_rate, metrics.max_drawdown
        );

        Ok(BacktestReport { metrics, trades, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;
    use chrono::{Duration, TimeZone};

    fn ts(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::hours(4 * i)
    }

    fn full_window() -> EvalWindow {
        EvalWindow::parse("2025-01-01", "2026-12-31").unwrap()
    }

    fn bar(i: i64, high: f64, low: f64, close: f64, signal: Signal) -> BacktestRow {
        BacktestRow { timestamp: ts(i), high, low, close, signal }
    }

    fn order(action: Action, entry: f64, stop_loss: f64, target: f64) -> Signal {
        Signal {
            action,
            entry: Some(entry),
            stop_loss: Some(stop_loss),
            target: Some(target),
            rr_ratio: None,
        }
    }

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    // =========================================================================
    // State machine
    // =========================================================================

    #[test]
    fn test_reference_frame() {
        let rows = vec![
            bar(0, 101.0, 99.0, 100.0, order(Action::Long, 100.0, 95.0, 110.0)),
            bar(1, 111.0, 99.0, 108.0, Signal::wait()),
            bar(2, 102.0, 98.0, 100.0, order(Action::Short, 100.0, 105.0, 90.0)),
            bar(3, 106.0, 95.0, 104.0, Signal::wait()),
            bar(4, 104.0, 100.0, 103.0, Signal::wait()),
        ];

        let (trades, metrics) = simulate_trades(&rows, full_window(), 0.0).unwrap();

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].exit_reason, ExitReason::Target);
        assert_eq!(trades[0].entry_time, ts(1));
        assert_eq!(trades[1].exit_reason, ExitReason::StopLoss);
        assert_eq!(trades[1].side, Side::Short);
        approx(metrics.win_rate, 50.0);
        approx(metrics.avg_pl, 0.025);
        approx(metrics.avg_win, 0.10);
        approx(metrics.avg_loss, -0.05);
        approx(metrics.max_drawdown, -0.05);
        assert_eq!(metrics.trades_count, 2);
    }

    #[test]
    fn test_signals_ignored_while_position_open() {
        let rows = vec![
            bar(0, 101.0, 99.0, 100.0, order(Action::Long, 100.0, 95.0, 120.0)),
            bar(1, 102.0, 98.0, 101.0, order(Action::Long, 101.0, 96.0, 121.0)),
            bar(2, 103.0, 99.0, 102.0, order(Action::Short, 100.0, 105.0, 90.0)),
            bar(3, 104.0, 100.0, 103.0, Signal::wait()),
        ];

        let (trades, _) = simulate_trades(&rows, full_window(), 0.0).unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].signal_time, ts(0));
        assert_eq!(trades[0].exit_reason, ExitReason::EndOfData);
        approx(trades[0].exit_price, 103.0);
        approx(trades[0].pnl, 0.03);
    }

    #[test]
    fn test_same_candle_stop_and_target_exits_at_stop() {
        let rows = vec![
            bar(0, 101.0, 99.0, 100.0, order(Action::Long, 100.0, 95.0, 110.0)),
            bar(1, 112.0, 94.0, 100.0, Signal::wait()),
        ];

        let (trades, metrics) = simulate_trades(&rows, full_window(), 0.0).unwrap();

        assert_eq!(trades[0].exit_reason, ExitReason::StopAndTargetSameCandle);
        approx(trades[0].exit_price, 95.0);
        assert_eq!(trades[0].outcome, Outcome::Loss);
        approx(metrics.win_rate, 0.0);
    }

    #[test]
    fn test_new_order_can_follow_exit_on_same_candle() {
        let rows = vec![
            bar(0, 101.0, 99.0, 100.0, order(Action::Long, 100.0, 95.0, 105.0)),
            bar(1, 106.0, 99.0, 105.0, order(Action::Short, 104.0, 108.0, 96.0)),
            bar(2, 105.0, 95.0, 97.0, Signal::wait()),
        ];

        let (trades, _) = simulate_trades(&rows, full_window(), 0.0).unwrap();

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].signal_time, ts(1));
        assert_eq!(trades[1].entry_time, ts(2));
        assert_eq!(trades[1].exit_reason, ExitReason::Target);
    }

    #[test]
    fn test_invalid_geometry_is_skipped() {
        let rows = vec![
            bar(0, 101.0, 99.0, 100.0, order(Action::Long, 100.0, 105.0, 110.0)),
            bar(1, 101.0, 99.0, 100.0, Signal { target: None, ..order(Action::Short, 100.0, 105.0, 90.0) }),
            bar(2, 101.0, 99.0, 100.0, Signal::wait()),
        ];

        let (trades, metrics) = simulate_trades(&rows, full_window(), 0.0).unwrap();
        assert!(trades.is_empty());
        assert_eq!(metrics, Metrics::default());
    }

    #[test]
    fn test_pending_order_on_last_row_is_dropped() {
        let rows = vec![
            bar(0, 101.0, 99.0, 100.0, Signal::wait()),
            bar(1, 101.0, 99.0, 100.0, order(Action::Long, 100.0, 95.0, 110.0)),
        ];
        let (trades, _) = simulate_trades(&rows, full_window(), 0.0).unwrap();
        assert!(trades.is_empty());
    }

    // =========================================================================
    // Window, fees and validation
    // =========================================================================

    #[test]
    fn test_window_is_inclusive_and_filters() {
        let rows = vec![
            bar(0, 101.0, 99.0, 100.0, order(Action::Long, 100.0, 95.0, 110.0)),
            bar(1, 111.0, 99.0, 108.0, Signal::wait()),
            bar(2, 101.0, 99.0, 100.0, Signal::wait()),
        ];

        let window = EvalWindow::new(ts(1), ts(2));
        let (trades, _) = simulate_trades(&rows, window, 0.0).unwrap();
        assert!(trades.is_empty());

        let window = EvalWindow::new(ts(0), ts(1));
        let (trades, _) = simulate_trades(&rows, window, 0.0).unwrap();
        assert_eq!(trades.len(), 1);
    }

    #[test]
    fn test_bare_date_end_is_midnight() {
        let window = EvalWindow::parse("2025-01-01", "2025-01-02").unwrap();
        assert!(window.contains(Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2025, 1, 2, 4, 0, 0).unwrap()));
    }

    #[test]
    fn test_fee_applies_twice() {
        approx(trade_pnl(Side::Long, 100.0, 110.0, 0.001), 0.098);
        approx(trade_pnl(Side::Short, 100.0, 90.0, 0.0), 0.1);
        approx(trade_pnl(Side::Short, 100.0, 100.0, 0.0005), -0.001);
    }

    #[test]
    fn test_rejects_unsorted_frame() {
        let rows = vec![
            bar(1, 101.0, 99.0, 100.0, Signal::wait()),
            bar(0, 101.0, 99.0, 100.0, Signal::wait()),
        ];
        assert!(matches!(
            simulate_trades(&rows, full_window(), 0.0),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_non_finite_prices() {
        let rows = vec![bar(0, f64::NAN, 99.0, 100.0, Signal::wait())];
        assert!(matches!(
            simulate_trades(&rows, full_window(), 0.0),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_non_finite_rows_outside_window_are_ignored() {
        let rows = vec![
            bar(0, f64::NAN, f64::NAN, f64::NAN, Signal::wait()),
            bar(1, 101.0, 99.0, 100.0, order(Action::Long, 100.0, 95.0, 110.0)),
            bar(2, 111.0, 99.0, 108.0, Signal::wait()),
        ];

        let (trades, _) = simulate_trades(&rows, EvalWindow::new(ts(1), ts(2)), 0.0).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::Target);

        assert!(simulate_trades(&rows, EvalWindow::new(ts(0), ts(2)), 0.0).is_err());
    }

    // =========================================================================
    // Metrics
    // =========================================================================

    #[test]
    fn test_metrics_empty() {
        assert_eq!(compute_metrics(&[]), Metrics::default());
    }

    #[test]
    fn test_write_trades_csv() {
        let rows = vec![
            bar(0, 101.0, 99.0, 100.0, order(Action::Long, 100.0, 95.0, 110.0)),
            bar(1, 111.0, 99.0, 108.0, Signal::wait()),
        ];
        let (trades, _) = simulate_trades(&rows, full_window(), 0.0).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("trades.csv");
        write_trades_csv(&path, &trades).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("signal_time,entry_time,exit_time,side"));
        let record = lines.next().unwrap();
        assert!(record.contains(",long,"));
        assert!(record.ends_with(",win,target"));
    }
}
