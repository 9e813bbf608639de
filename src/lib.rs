//! Candlewick - OHLCV signal engine with backtesting, a snapshot worker and a read API

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

use std::sync::Arc;

use config::Config;
use services::SnapshotStore;
use tracing::warn;
use types::Snapshot;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn SnapshotStore>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<dyn SnapshotStore>) -> Self {
        Self { config, store }
    }

    /// Latest snapshot; an unreadable store reads as empty.
    pub async fn read_snapshot(&self) -> Option<Snapshot> {
        match self.store.read().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Snapshot read failed: {}", e);
                None
            }
        }
    }
}

// Re-export commonly used types
pub use error::{AppError, EngineError};
pub use types::*;
