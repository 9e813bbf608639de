//! Persistence for the latest signal snapshot.
//!
//! Every store replaces the whole value on write, so a concurrent reader sees
//! either the old or the new snapshot. The composite store prefers Redis and
//! always keeps a file copy as fallback.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, RedisResult};
use serde_json::Value;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::types::{normalize_snapshot, Snapshot};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Storage for the single latest snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Most recently written snapshot, normalised, or `None` if nothing is stored.
    async fn read(&self) -> Result<Option<Snapshot>>;

    /// Replace the stored snapshot.
    async fn write(&self, snapshot: &Snapshot) -> Result<()>;

    /// Store type reported by the API.
    fn describe(&self) -> String;
}

fn parse_payload(raw: &str) -> Result<Snapshot> {
    let value: Value = serde_json::from_str(raw)?;
    Ok(normalize_snapshot(&value))
}

// =============================================================================
// File
// =============================================================================

/// JSON file on local disk.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.path
            .with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), unique))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn read(&self) -> Result<Option<Snapshot>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        parse_payload(&raw).map(Some)
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(snapshot)?;
        let temp = self.temp_path();
        if let Err(e) = fs::write(&temp, content).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!("Wrote snapshot to {}", self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        "file".to_string()
    }
}

// =============================================================================
// Redis
// =============================================================================

/// Snapshot stored as a JSON string under one Redis key.
#[derive(Clone)]
pub struct RedisSnapshotStore {
    conn: ConnectionManager,
    key: String,
}

impl RedisSnapshotStore {
    /// Connect to Redis at `redis_url`.
    pub async fn connect(redis_url: &str, key: impl Into<String>) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key: key.into(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl SnapshotStore for RedisSnapshotStore {
    async fn read(&self) -> Result<Option<Snapshot>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&self.key).await?;
        raw.as_deref().map(parse_payload).transpose()
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(&self.key, payload).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        "redis".to_string()
    }
}

// =============================================================================
// Composite
// =============================================================================

/// Primary store (normally Redis) backed by a file that is always written.
pub struct CompositeSnapshotStore {
    file: FileSnapshotStore,
    primary: Option<Arc<dyn SnapshotStore>>,
}

impl CompositeSnapshotStore {
    pub fn new(file: FileSnapshotStore, primary: Option<Arc<dyn SnapshotStore>>) -> Self {
        Self { file, primary }
    }

    pub fn file_only(file: FileSnapshotStore) -> Self {
        Self::new(file, None)
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }
}

#[async_trait]
impl SnapshotStore for CompositeSnapshotStore {
    async fn read(&self) -> Result<Option<Snapshot>> {
        if let Some(primary) = &self.primary {
            match primary.read().await {
                Ok(Some(snapshot)) => return Ok(Some(snapshot)),
                Ok(None) => debug!("No snapshot in {}, reading file", primary.describe()),
                Err(e) => warn!(
                    "{} read failed, falling back to file store: {}",
                    primary.describe(),
                    e
                ),
            }
        }
        self.file.read().await
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(primary) = &self.primary {
            if let Err(e) = primary.write(snapshot).await {
                warn!(
                    "{} write failed, continuing with file store: {}",
                    primary.describe(),
                    e
                );
            }
        }
        self.file.write(snapshot).await
    }

    fn describe(&self) -> String {
        match &self.primary {
            Some(primary) => format!("composite({}+file)", primary.describe()),
            None => "composite(file)".to_string(),
        }
    }
}

// =============================================================================
// Memory
// =============================================================================

/// In-process store, mainly for tests and one-shot runs.
#[derive(Default)]
pub struct MemorySnapshotStore {
    value: RwLock<Option<Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            value: RwLock::new(Some(snapshot)),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read(&self) -> Result<Option<Snapshot>> {
        Ok(self.value.read().await.clone())
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        *self.value.write().await = Some(snapshot.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Build the composite store from configuration.
///
/// Redis is used only when `redis_url` is set; a failed connection leaves
/// the file store on its own.
pub async fn build_snapshot_store(config: &Config) -> CompositeSnapshotStore {
    let file = FileSnapshotStore::new(&config.snapshot_file_path);

    let Some(redis_url) = config.redis_url.as_deref() else {
        info!("Snapshot store: file only ({})", config.snapshot_file_path.display());
        return CompositeSnapshotStore::file_only(file);
    };

    match RedisSnapshotStore::connect(redis_url, config.snapshot_redis_key.clone()).await {
        Ok(redis) => {
            info!("Connected to Redis at {}", redis_url);
            CompositeSnapshotStore::new(file, Some(Arc::new(redis)))
        }
        Err(e) => {
            warn!(
                "Failed to connect to Redis: {}. Running with file store only.",
                e
            );
            CompositeSnapshotStore::file_only(file)
        }
    }
}
