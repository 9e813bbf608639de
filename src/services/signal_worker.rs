//! Periodic worker that publishes the latest signal snapshot.
//!
//! Each cycle fetches recent candles, drops the still-forming last candle,
//! evaluates the latest closed row and writes a fresh snapshot. When a cycle
//! fails, the previous snapshot is republished as stale; with no previous
//! snapshot nothing is written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::services::signals::{build_latest_signal, compute_features};
use crate::services::snapshot_store::SnapshotStore;
use crate::sources::CandleSource;
use crate::types::{FetchStatus, Snapshot};

/// Source of "now" for snapshot timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Fetch, compute, persist, sleep.
pub struct SignalWorker {
    config: Arc<Config>,
    source: Arc<dyn CandleSource>,
    store: Arc<dyn SnapshotStore>,
    clock: Clock,
}

impl SignalWorker {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn CandleSource>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, e.g. with a fixed time in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// One fetch-compute-persist cycle.
    ///
    /// Returns the snapshot that was written, or `None` when nothing was.
    pub async fn run_once(&self) -> Option<Snapshot> {
        let now = (self.clock)().to_rfc3339();

        match self.refresh(&now).await {
            Ok(snapshot) => {
                info!(
                    "Published {} signal for {} candle {}",
                    snapshot.signal.map(|s| s.action.as_str()).unwrap_or("no"),
                    self.config.symbol,
                    snapshot.candle_time.as_deref().unwrap_or("-")
                );
                Some(snapshot)
            }
            Err(e) => {
                error!("Worker cycle failed: {}", e);
                self.republish_stale(&now, &e.to_string()).await
            }
        }
    }

    async fn refresh(&self, now: &str) -> Result<Snapshot> {
        let config = &self.config;
        let mut candles = self
            .source
            .fetch_recent(&config.symbol, &config.timeframe, config.ohlcv_limit)
            .await?;

        // The newest candle is still forming.
        if candles.len() > 1 {
            candles.pop();
        }
        let last_closed = candles
            .last()
            .map(|c| c.timestamp)
            .ok_or_else(|| EngineError::DataUnavailable("No closed candles available".to_string()))?;

        let features = compute_features(&candles, config.pivot_window)?;
        let signal = build_latest_signal(&features)?;

        let snapshot = Snapshot {
            symbol: Some(config.symbol.clone()),
            timeframe: Some(config.timeframe.clone()),
            timestamp: Some(now.to_string()),
            candle_time: Some(last_closed.to_rfc3339()),
            signal: Some(signal),
            stale: false,
            error: None,
            last_fetch_status: FetchStatus::Ok,
            last_success_at: Some(now.to_string()),
            source: Some(self.source.describe()),
        };

        self.store.write(&snapshot).await?;
        Ok(snapshot)
    }

    async fn republish_stale(&self, now: &str, error: &str) -> Option<Snapshot> {
        let previous = match self.store.read().await {
            Ok(Some(previous)) => previous,
            Ok(None) => {
                warn!("No previous snapshot is available; skipping persistence on failure.");
                return None;
            }
            Err(e) => {
                error!("Snapshot read failed after worker error: {}", e);
                return None;
            }
        };

        let stale = Snapshot {
            symbol: previous.symbol.or_else(|| Some(self.config.symbol.clone())),
            timeframe: previous.timeframe.or_else(|| Some(self.config.timeframe.clone())),
            timestamp: Some(now.to_string()),
            candle_time: previous.candle_time,
            signal: previous.signal,
            stale: true,
            error: Some(error.to_string()),
            last_fetch_status: FetchStatus::Failed,
            last_success_at: previous.last_success_at,
            source: previous.source.or_else(|| Some(self.source.describe())),
        };

        match self.store.write(&stale).await {
            Ok(()) => {
                warn!("Republished previous snapshot as stale");
                Some(stale)
            }
            Err(e) => {
                error!("Failed to persist stale snapshot: {}", e);
                None
            }
        }
    }

    /// Run cycles every `interval_secs` until `shutdown` turns true.
    ///
    /// A cycle in progress always completes; the wait between cycles is
    /// interrupted as soon as shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.interval_secs);
        info!(
            "Starting worker loop with interval={}s, store={}",
            self.config.interval_secs,
            self.store.describe()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_once().await;

            tokio::select! {
                _ = sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Worker received shutdown signal");
    }
}
