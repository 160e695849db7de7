//! In-memory store with an optional JSON snapshot file.
//!
//! With a zero flush interval every update rewrites the snapshot before
//! returning (write-through). Otherwise a background task rewrites it on
//! each tick (write-behind). Snapshot write failures are logged and never
//! undo the in-memory mutation.

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::{Store, StoreError};
use crate::model::{MetricRecord, SnapshotEntry};
use crate::server::config::ServerConfig;

type Metrics = HashMap<String, MetricRecord>;

#[derive(Debug, Clone, Default)]
pub struct MemoryOptions {
    /// Snapshot file; `None` keeps everything in memory only.
    pub path: Option<PathBuf>,
    /// Zero means write-through.
    pub interval: Duration,
    pub restore: bool,
}

impl From<&ServerConfig> for MemoryOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            path: config
                .file_storage_path
                .clone()
                .filter(|p| !p.as_os_str().is_empty()),
            interval: Duration::from_secs(config.store_interval),
            restore: config.restore,
        }
    }
}

/// Whole-file snapshot writer. The mutex orders concurrent writers; each
/// write lands in a staging file that is renamed over the snapshot.
#[derive(Debug)]
struct SnapshotFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotFile {
    async fn write(&self, entries: Vec<SnapshotEntry>) -> Result<(), StoreError> {
        let data = serde_json::to_vec(&entries)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, data).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        debug!("Wrote {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

fn entries(metrics: &Metrics) -> Vec<SnapshotEntry> {
    let mut entries: Vec<SnapshotEntry> = metrics.values().map(SnapshotEntry::from).collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

/// Reads a snapshot file. Missing or empty files yield an empty map.
pub async fn read_snapshot(path: &Path) -> Result<HashMap<String, MetricRecord>, StoreError> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(HashMap::new());
    }
    let entries: Vec<SnapshotEntry> = serde_json::from_slice(&data)?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let record = MetricRecord::from(entry);
            (record.id.clone(), record)
        })
        .collect())
}

pub struct MemoryStore {
    metrics: Arc<RwLock<Metrics>>,
    snapshot: Option<Arc<SnapshotFile>>,
    write_through: bool,
    flusher: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl MemoryStore {
    /// Builds the store, restoring and starting the flusher as configured.
    pub async fn open(options: MemoryOptions) -> Result<Self, StoreError> {
        let mut metrics = Metrics::new();
        if let (Some(path), true) = (&options.path, options.restore) {
            metrics = read_snapshot(path).await?;
            info!("Restored {} metrics from {}", metrics.len(), path.display());
        }

        let snapshot = options.path.map(|path| {
            Arc::new(SnapshotFile {
                path,
                write_lock: Mutex::new(()),
            })
        });
        let metrics = Arc::new(RwLock::new(metrics));
        let write_through = snapshot.is_some() && options.interval.is_zero();

        let flusher = match &snapshot {
            Some(file) if !options.interval.is_zero() => {
                let cancel = CancellationToken::new();
                let handle = tokio::spawn(flush_periodically(
                    metrics.clone(),
                    file.clone(),
                    options.interval,
                    cancel.clone(),
                ));
                info!(
                    "Snapshot flush every {}s to {}",
                    options.interval.as_secs(),
                    file.path.display()
                );
                Some((cancel, handle))
            }
            _ => None,
        };

        Ok(Self {
            metrics,
            snapshot,
            write_through,
            flusher: Mutex::new(flusher),
        })
    }

    /// Builds a pure in-memory store.
    pub fn in_memory() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(Metrics::new())),
            snapshot: None,
            write_through: false,
            flusher: Mutex::new(None),
        }
    }

    /// Applies `records` and, in write-through mode, persists before
    /// returning. Locks are always taken file first, then map, so snapshots
    /// land in mutation order.
    async fn apply(&self, records: Vec<MetricRecord>) {
        let file = self.snapshot.as_ref().filter(|_| self.write_through);
        let _guard = match file {
            Some(file) => Some(file.write_lock.lock().await),
            None => None,
        };

        let mut metrics = self.metrics.write().await;
        for record in records {
            metrics.insert(record.id.clone(), record);
        }

        let Some(file) = file else {
            return;
        };
        let entries = entries(&metrics);
        drop(metrics);
        if let Err(e) = file.write(entries).await {
            error!("Failed to persist snapshot to {}: {}", file.path.display(), e);
        }
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let Some(file) = &self.snapshot else {
            return Ok(());
        };
        let _guard = file.write_lock.lock().await;
        let entries = entries(&*self.metrics.read().await);
        file.write(entries).await
    }
}

async fn flush_periodically(
    metrics: Arc<RwLock<Metrics>>,
    file: Arc<SnapshotFile>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let _guard = file.write_lock.lock().await;
                let entries = entries(&*metrics.read().await);
                if let Err(e) = file.write(entries).await {
                    error!("Periodic snapshot to {} failed: {}", file.path.display(), e);
                }
            }
        }
    }
    debug!("Snapshot flusher stopped");
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self) -> Result<Vec<MetricRecord>, StoreError> {
        let mut records: Vec<MetricRecord> = self.metrics.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn get_one(&self, id: &str) -> Result<MetricRecord, StoreError> {
        self.metrics
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    #[instrument(skip(self), fields(id = %record.id))]
    async fn update(&self, record: MetricRecord) -> Result<(), StoreError> {
        self.apply(vec![record]).await;
        Ok(())
    }

    #[instrument(skip_all, fields(count = records.len()))]
    async fn updates(&self, records: Vec<MetricRecord>) -> Result<(), StoreError> {
        self.apply(records).await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::NotAvailable)
    }

    async fn close(&self) -> Result<(), StoreError> {
        if let Some((cancel, handle)) = self.flusher.lock().await.take() {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!("Snapshot flusher ended abnormally: {}", e);
            }
        }
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricValue;

    fn record(id: &str, value: MetricValue) -> MetricRecord {
        let mut record = MetricRecord::new(id);
        record.apply(value);
        record
    }

    #[tokio::test]
    async fn test_get_one_not_found() {
        let store = MemoryStore::in_memory();
        assert!(matches!(
            store.get_one("missing").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.ping().await, Err(StoreError::NotAvailable)));
    }

    #[tokio::test]
    async fn test_write_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("metrics.json");
        let store = MemoryStore::open(MemoryOptions {
            path: Some(path.clone()),
            interval: Duration::ZERO,
            restore: false,
        })
        .await
        .unwrap();

        store
            .update(record("b", MetricValue::Counter(3)))
            .await
            .unwrap();
        store
            .update(record("a", MetricValue::Gauge(1.5)))
            .await
            .unwrap();

        let written: Vec<SnapshotEntry> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].name, "a");
        assert_eq!(written[0].value, Some(1.5));
        assert_eq!(written[1].delta, Some(3));
    }

    #[tokio::test]
    async fn test_write_behind_flushes_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let store = MemoryStore::open(MemoryOptions {
            path: Some(path.clone()),
            interval: Duration::from_secs(3600),
            restore: false,
        })
        .await
        .unwrap();

        store
            .update(record("x", MetricValue::Gauge(2.0)))
            .await
            .unwrap();
        assert!(!path.exists());

        store.close().await.unwrap();
        let restored = read_snapshot(&path).await.unwrap();
        assert_eq!(restored.get("x").and_then(|r| r.gauge), Some(2.0));
    }

    #[tokio::test]
    async fn test_restore_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(read_snapshot(&missing).await.unwrap().is_empty());

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "").unwrap();
        assert!(read_snapshot(&empty).await.unwrap().is_empty());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "[{").unwrap();
        assert!(matches!(
            read_snapshot(&broken).await,
            Err(StoreError::Snapshot(_))
        ));
    }
}
