use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::CandleSource;
use crate::error::{AppError, EngineError, Result};
use crate::types::{epoch_to_utc, normalize_candles, Candle};

const BINANCE_API_URL: &str = "https://api.binance.com/api/v3";

/// Largest page Binance serves from `/klines`.
pub const MAX_KLINES_LIMIT: usize = 1000;

/// Kline intervals accepted by Binance.
pub const SUPPORTED_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

/// Convert `BTC/USDT` style symbols to a Binance trading pair.
pub fn to_pair(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| !matches!(c, '/' | '-' | '_' | ':'))
        .collect::<String>()
        .to_uppercase()
}

fn check_interval(timeframe: &str) -> std::result::Result<(), EngineError> {
    if SUPPORTED_INTERVALS.contains(&timeframe) {
        Ok(())
    } else {
        Err(EngineError::InvalidParameter(format!(
            "unsupported timeframe: {}",
            timeframe
        )))
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Parse one kline array: `[open_time, open, high, low, close, volume, ...]`.
fn parse_kline(row: &[Value]) -> std::result::Result<Candle, EngineError> {
    if row.len() < 6 {
        return Err(EngineError::MissingColumn(format!(
            "kline has {} fields, expected at least 6",
            row.len()
        )));
    }

    let open_time = row[0]
        .as_i64()
        .and_then(epoch_to_utc)
        .ok_or_else(|| EngineError::InvalidInput(format!("bad kline open time: {}", row[0])))?;
    let field = |i: usize, name: &str| {
        number(&row[i])
            .ok_or_else(|| EngineError::InvalidInput(format!("bad kline {}: {}", name, row[i])))
    };

    Ok(Candle::new(
        open_time,
        field(1, "open")?,
        field(2, "high")?,
        field(3, "low")?,
        field(4, "close")?,
        field(5, "volume")?,
    ))
}

/// Binance spot market REST client for historical klines.
#[derive(Clone)]
pub struct BinanceSource {
    client: Client,
    base_url: String,
}

impl BinanceSource {
    /// Create a client for `exchange_id`; only `binance` is available.
    pub fn new(exchange_id: &str) -> std::result::Result<Self, EngineError> {
        if !exchange_id.eq_ignore_ascii_case("binance") {
            return Err(EngineError::InvalidParameter(format!(
                "Unsupported exchange: {}",
                exchange_id
            )));
        }

        let client = Client::builder()
            .user_agent("Candlewick/0.1")
            .build()
            .unwrap_or_else(|_| Client::new());

        Ok(Self {
            client,
            base_url: BINANCE_API_URL.to_string(),
        })
    }

    /// Point the client at another host, e.g. a testnet or mirror.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_klines(
        &self,
        pair: &str,
        interval: &str,
        start_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/klines", self.base_url);
        let mut query = vec![
            ("symbol", pair.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.clamp(1, MAX_KLINES_LIMIT).to_string()),
        ];
        if let Some(start_ms) = start_ms {
            query.push(("startTime", start_ms.to_string()));
        }

        let response = self.client.get(&url).query(&query).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(
                "Binance API returned {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            );
            return Err(AppError::ExternalApi(format!("Binance API error: {}", status)));
        }

        let rows: Vec<Vec<Value>> = response.json().await?;
        let candles = rows
            .iter()
            .map(|row| parse_kline(row))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Binance returned {} klines for {} {}", candles.len(), pair, interval);
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for BinanceSource {
    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page_limit: usize,
    ) -> Result<Vec<Candle>> {
        check_interval(timeframe)?;
        let pair = to_pair(symbol);
        let limit = page_limit.clamp(1, MAX_KLINES_LIMIT);
        let end_ms = end.timestamp_millis();
        let mut since_ms = start.timestamp_millis();
        let mut rows = Vec::new();

        info!("Fetching {} {} klines from Binance", pair, timeframe);

        while since_ms < end_ms {
            let batch = self.fetch_klines(&pair, timeframe, Some(since_ms), limit).await?;
            let Some(last) = batch.last() else {
                break;
            };
            let last_ms = last.timestamp.timestamp_millis();
            let batch_len = batch.len();

            rows.extend(
                batch
                    .into_iter()
                    .filter(|c| c.timestamp.timestamp_millis() <= end_ms),
            );

            if last_ms <= since_ms {
                break;
            }
            since_ms = last_ms + 1;

            if batch_len < limit && last_ms >= end_ms {
                break;
            }
        }

        if rows.is_empty() {
            return Err(EngineError::DataUnavailable(
                "No OHLCV data returned from exchange".to_string(),
            )
            .into());
        }

        Ok(normalize_candles(rows)?)
    }

    async fn fetch_recent(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        check_interval(timeframe)?;
        let candles = self.fetch_klines(&to_pair(symbol), timeframe, None, limit).await?;

        if candles.is_empty() {
            return Err(EngineError::DataUnavailable(
                "No OHLCV data returned from exchange".to_string(),
            )
            .into());
        }

        Ok(normalize_candles(candles)?)
    }

    fn describe(&self) -> String {
        "binance".to_string()
    }
}
