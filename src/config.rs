use std::env;
use std::path::PathBuf;

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Redis URL; the snapshot store is file-only when absent.
    pub redis_url: Option<String>,
    /// JSON file holding the latest snapshot.
    pub snapshot_file_path: PathBuf,
    /// Redis key holding the latest snapshot.
    pub snapshot_redis_key: String,
    /// Instrument, e.g. `BTC/USDT`.
    pub symbol: String,
    /// Candle interval, e.g. `4h`.
    pub timeframe: String,
    /// Exchange used for candle fetches.
    pub exchange_id: String,
    /// Backtest fetch range start.
    pub fetch_start: String,
    /// Backtest fetch range end.
    pub fetch_end: String,
    /// Evaluation window start (inclusive).
    pub eval_start: String,
    /// Evaluation window end (inclusive; a bare date means midnight).
    pub eval_end: String,
    /// Rows per exchange page during range fetches.
    pub page_limit: usize,
    /// Candles fetched per worker cycle.
    pub ohlcv_limit: usize,
    /// Trailing window for pivot detection.
    pub pivot_window: usize,
    /// Read candles from this CSV instead of the exchange.
    pub csv_path: Option<PathBuf>,
    /// Fee charged on each side of a trade, as a fraction of notional.
    pub fee_rate: f64,
    /// Seconds between worker cycles.
    pub interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Self {
            host: text("HOST", "0.0.0.0"),
            port: get("PORT").and_then(|v| v.parse().ok()).unwrap_or(8000),
            redis_url: get("REDIS_URL"),
            snapshot_file_path: PathBuf::from(text("SNAPSHOT_FILE", "data/latest_signal.json")),
            snapshot_redis_key: text("SNAPSHOT_REDIS_KEY", "candlewick:latest_signal"),
            symbol: text("SYMBOL", "BTC/USDT"),
            timeframe: text("TIMEFRAME", "4h"),
            exchange_id: text("EXCHANGE", "binance"),
            fetch_start: text("FETCH_START", "2025-01-01T00:00:00Z"),
            fetch_end: text("FETCH_END", "2026-12-31T23:59:59Z"),
            eval_start: text("EVAL_START", "2025-01-01"),
            eval_end: text("EVAL_END", "2026-12-31"),
            page_limit: get("PAGE_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            ohlcv_limit: get("OHLCV_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            pivot_window: get("PIVOT_WINDOW")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            csv_path: get("CSV_PATH").map(PathBuf::from),
            fee_rate: get("FEE_RATE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            interval_secs: get("WORKER_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    // =========================================================================
    // Config Tests
    // =========================================================================

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert!(config.redis_url.is_none());
        assert_eq!(config.snapshot_file_path, PathBuf::from("data/latest_signal.json"));
        assert_eq!(config.snapshot_redis_key, "candlewick:latest_signal");
        assert_eq!(config.symbol, "BTC/USDT");
        assert_eq!(config.timeframe, "4h");
        assert_eq!(config.exchange_id, "binance");
        assert_eq!(config.fetch_start, "2025-01-01T00:00:00Z");
        assert_eq!(config.fetch_end, "2026-12-31T23:59:59Z");
        assert_eq!(config.eval_start, "2025-01-01");
        assert_eq!(config.eval_end, "2026-12-31");
        assert_eq!(config.page_limit, 1000);
        assert_eq!(config.ohlcv_limit, 300);
        assert_eq!(config.pivot_window, 3);
        assert!(config.csv_path.is_none());
        assert_eq!(config.fee_rate, 0.0);
        assert_eq!(config.interval_secs, 300);
    }

    #[test]
    fn test_config_overrides() {
        let config = from_pairs(&[
            ("PORT", "9000"),
            ("REDIS_URL", "redis://cache:6379"),
            ("SYMBOL", "ETH/USDT"),
            ("CSV_PATH", "data/eth.csv"),
            ("FEE_RATE", "0.001"),
            ("WORKER_INTERVAL_SECS", "60"),
        ]);

        assert_eq!(config.port, 9000);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.symbol, "ETH/USDT");
        assert_eq!(config.csv_path, Some(PathBuf::from("data/eth.csv")));
        assert_eq!(config.fee_rate, 0.001);
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = from_pairs(&[("REDIS_URL", "  "), ("SYMBOL", ""), ("CSV_PATH", " ")]);
        assert!(config.redis_url.is_none());
        assert_eq!(config.symbol, "BTC/USDT");
        assert!(config.csv_path.is_none());
    }

    #[test]
    fn test_unparseable_numbers_use_defaults() {
        let config = from_pairs(&[("PORT", "http"), ("PIVOT_WINDOW", "-1"), ("FEE_RATE", "cheap")]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.pivot_window, 3);
        assert_eq!(config.fee_rate, 0.0);
    }
}
