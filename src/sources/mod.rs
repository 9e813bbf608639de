//! Candle data sources.

pub mod binance;
pub mod csv_file;

pub use binance::BinanceSource;
pub use csv_file::{load_ohlcv_csv, CsvSource};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::Candle;

/// Provider of normalised OHLCV candles: ascending, unique timestamps.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Candles whose open time falls in `[start, end]`.
    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page_limit: usize,
    ) -> Result<Vec<Candle>>;

    /// The most recent `limit` candles. The last one may still be forming.
    async fn fetch_recent(&self, symbol: &str, timeframe: &str, limit: usize)
        -> Result<Vec<Candle>>;

    /// Short identifier recorded in snapshots.
    fn describe(&self) -> String;
}
