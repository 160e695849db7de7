//! Snapshot persistence and restore through the aggregator.

use std::sync::Arc;
use std::time::Duration;

use metric_track::model::{Metric, MetricKind};
use metric_track::server::service::Service;
use metric_track::server::store::{MemoryOptions, MemoryStore, Store};

async fn open(path: &std::path::Path, interval: Duration) -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::open(MemoryOptions {
            path: Some(path.to_path_buf()),
            interval,
            restore: true,
        })
        .await
        .unwrap(),
    )
}

#[tokio::test]
async fn test_restore_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics-db.json");

    let first = open(&path, Duration::ZERO).await;
    let service = Service::new(first.clone());
    service
        .update_batch(vec![
            Metric::gauge("Alloc", 1024.25),
            Metric::counter("PollCount", 5),
            Metric::counter("PollCount", 6),
            Metric::gauge("Mixed", -1.0),
            Metric::counter("Mixed", 2),
        ])
        .await
        .unwrap();
    let persisted = first.get().await.unwrap();
    first.close().await.unwrap();

    let second = open(&path, Duration::ZERO).await;
    assert_eq!(second.get().await.unwrap(), persisted);

    let service = Service::new(second);
    let count = service
        .get_one("PollCount", MetricKind::Counter)
        .await
        .unwrap();
    assert_eq!(count.delta, Some(11));
}

#[tokio::test]
async fn test_periodic_flush() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics-db.json");

    let store = open(&path, Duration::from_secs(1)).await;
    Service::new(store.clone())
        .update_batch(vec![Metric::gauge("g", 2.0)])
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();

    // Give the writer a moment to finish, then restore without closing
    tokio::time::sleep(Duration::from_millis(100)).await;
    let restored = open(&path, Duration::ZERO).await;
    assert_eq!(restored.get_one("g").await.unwrap().gauge, Some(2.0));
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_restore_disabled_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics-db.json");
    std::fs::write(&path, r#"[{"name":"old","value":1.0,"delta":null}]"#).unwrap();

    let store = MemoryStore::open(MemoryOptions {
        path: Some(path.clone()),
        interval: Duration::ZERO,
        restore: false,
    })
    .await
    .unwrap();
    assert!(store.get().await.unwrap().is_empty());

    let restored = open(&path, Duration::ZERO).await;
    assert_eq!(restored.get_one("old").await.unwrap().gauge, Some(1.0));
}
