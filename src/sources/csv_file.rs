use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::CandleSource;
use crate::error::{EngineError, Result};
use crate::types::{normalize_candles, parse_timestamp, Candle};

const REQUIRED_COLUMNS: &[&str] = &["timestamp", "open", "high", "low", "close", "volume"];

#[derive(Debug, Deserialize)]
struct OhlcvRecord {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Load candles from a CSV file with a header row.
///
/// Extra columns are ignored. Timestamps may be epoch seconds, epoch
/// milliseconds or any format accepted by [`parse_timestamp`].
pub fn load_ohlcv_csv(path: &Path) -> Result<Vec<Candle>> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::MissingColumn(missing.join(", ")).into());
    }

    let mut candles = Vec::new();
    for result in reader.deserialize::<OhlcvRecord>() {
        let record = result?;
        candles.push(Candle::new(
            parse_timestamp(&record.timestamp)?,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        ));
    }

    info!("Loaded {} candles from {}", candles.len(), path.display());
    Ok(normalize_candles(candles)?)
}

/// Candle source backed by a local CSV file, re-read on every fetch.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Candle>> {
        let candles = load_ohlcv_csv(&self.path)?;
        if candles.is_empty() {
            return Err(EngineError::DataUnavailable(format!(
                "no candles in {}",
                self.path.display()
            ))
            .into());
        }
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for CsvSource {
    async fn fetch_range(
        &self,
        _symbol: &str,
        _timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _page_limit: usize,
    ) -> Result<Vec<Candle>> {
        let candles: Vec<Candle> = self
            .load()?
            .into_iter()
            .filter(|c| c.timestamp >= start && c.timestamp <= end)
            .collect();
        if candles.is_empty() {
            return Err(EngineError::DataUnavailable(format!(
                "no candles between {} and {}",
                start, end
            ))
            .into());
        }
        Ok(candles)
    }

    async fn fetch_recent(
        &self,
        _symbol: &str,
        _timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let mut candles = self.load()?;
        let skip = candles.len().saturating_sub(limit);
        Ok(candles.split_off(skip))
    }

    fn describe(&self) -> String {
        "csv".to_string()
    }
}
