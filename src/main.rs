use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use candlewick::api;
use candlewick::config::Config;
use candlewick::services::{
    build_snapshot_store, compute_features, latest_signal_report, write_trades_csv,
    BacktestParams, BacktestRunner, SignalWorker,
};
use candlewick::sources::{load_ohlcv_csv, BinanceSource, CandleSource, CsvSource};
use candlewick::types::{parse_timestamp, Candle};
use candlewick::AppState;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "candlewick")]
#[command(about = "OHLCV signal engine: backtests, snapshot worker and read API.", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the read API over the snapshot store.
    Serve,
    /// Publish a fresh snapshot every interval until Ctrl-C.
    Worker,
    /// Backtest the strategy and print metrics as JSON.
    Backtest {
        #[command(flatten)]
        data: DataArgs,
        /// Evaluation window start (inclusive).
        #[arg(long)]
        eval_start: Option<String>,
        /// Evaluation window end (inclusive; a bare date means midnight).
        #[arg(long)]
        eval_end: Option<String>,
        /// Fee per side as a fraction of notional.
        #[arg(long)]
        fee_rate: Option<f64>,
        /// Write the trade list to this CSV file.
        #[arg(long)]
        trades_csv: Option<PathBuf>,
    },
    /// Print the latest signal as JSON.
    Signal {
        #[command(flatten)]
        data: DataArgs,
    },
}

/// Candle input options; unset flags fall back to the environment.
#[derive(Args)]
struct DataArgs {
    /// Local OHLCV CSV to use instead of the exchange.
    #[arg(long)]
    csv: Option<PathBuf>,
    #[arg(long)]
    symbol: Option<String>,
    #[arg(long)]
    timeframe: Option<String>,
    /// Fetch range start.
    #[arg(long)]
    start: Option<String>,
    /// Fetch range end.
    #[arg(long)]
    end: Option<String>,
    #[arg(long)]
    exchange: Option<String>,
    /// Exchange page size.
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    pivot_window: Option<usize>,
}

impl DataArgs {
    fn apply(self, config: &mut Config) {
        if let Some(csv) = self.csv {
            config.csv_path = Some(csv);
        }
        if let Some(symbol) = self.symbol {
            config.symbol = symbol;
        }
        if let Some(timeframe) = self.timeframe {
            config.timeframe = timeframe;
        }
        if let Some(start) = self.start {
            config.fetch_start = start;
        }
        if let Some(end) = self.end {
            config.fetch_end = end;
        }
        if let Some(exchange) = self.exchange {
            config.exchange_id = exchange;
        }
        if let Some(limit) = self.limit {
            config.page_limit = limit;
        }
        if let Some(window) = self.pivot_window {
            config.pivot_window = window;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "candlewick=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command {
        Commands::Serve => serve(Arc::new(config)).await,
        Commands::Worker => run_worker(Arc::new(config)).await,
        Commands::Backtest {
            data,
            eval_start,
            eval_end,
            fee_rate,
            trades_csv,
        } => {
            data.apply(&mut config);
            if let Some(eval_start) = eval_start {
                config.eval_start = eval_start;
            }
            if let Some(eval_end) = eval_end {
                config.eval_end = eval_end;
            }
            if let Some(fee_rate) = fee_rate {
                config.fee_rate = fee_rate;
            }
            backtest(&config, trades_csv).await
        }
        Commands::Signal { data } => {
            data.apply(&mut config);
            latest_signal(&config).await
        }
    }
}

fn candle_source(config: &Config) -> anyhow::Result<Arc<dyn CandleSource>> {
    let source: Arc<dyn CandleSource> = match &config.csv_path {
        Some(path) => Arc::new(CsvSource::new(path)),
        None => Arc::new(BinanceSource::new(&config.exchange_id)?),
    };
    Ok(source)
}

/// Full CSV when configured, otherwise the configured fetch range from the exchange.
async fn load_candles(config: &Config) -> anyhow::Result<Vec<Candle>> {
    if let Some(path) = &config.csv_path {
        return load_ohlcv_csv(path).with_context(|| format!("loading {}", path.display()));
    }

    let source = BinanceSource::new(&config.exchange_id)?;
    let candles = source
        .fetch_range(
            &config.symbol,
            &config.timeframe,
            parse_timestamp(&config.fetch_start)?,
            parse_timestamp(&config.fetch_end)?,
            config.page_limit,
        )
        .await?;
    Ok(candles)
}

async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    let store = Arc::new(build_snapshot_store(&config).await);
    let app = api::app(AppState::new(config.clone(), store));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Candlewick API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

async fn run_worker(config: Arc<Config>) -> anyhow::Result<()> {
    let store = Arc::new(build_snapshot_store(&config).await);
    let source = candle_source(&config)?;
    let worker = SignalWorker::new(config, source, store);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping worker");
            let _ = shutdown_tx.send(true);
        }
    });

    worker.run(shutdown_rx).await;
    Ok(())
}

async fn backtest(config: &Config, trades_csv: Option<PathBuf>) -> anyhow::Result<()> {
    let runner = BacktestRunner::new(BacktestParams::from_config(config)?);
    let report = match &config.csv_path {
        // A CSV is used whole so indicators warm up on all of its history.
        Some(_) => runner.run_candles(&load_candles(config).await?)?,
        None => runner.run(candle_source(config)?.as_ref()).await?,
    };

    if let Some(path) = trades_csv {
        write_trades_csv(&path, &report.trades)?;
        info!("Wrote {} trades to {}", report.trades.len(), path.display());
    }

    println!("{}", serde_json::to_string_pretty(&report.metrics)?);
    Ok(())
}

async fn latest_signal(config: &Config) -> anyhow::Result<()> {
    let candles = load_candles(config).await?;
    let features = compute_features(&candles, config.pivot_window)?;
    let report = latest_signal_report(&features)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
