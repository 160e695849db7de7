//! PostgreSQL store tests. Skipped unless `TEST_DATABASE_DSN` points at a
//! disposable database.

use metric_track::model::{Metric, MetricKind, MetricRecord};
use metric_track::server::service::Service;
use metric_track::server::store::{PostgresStore, Store, StoreError};
use std::sync::Arc;

async fn connect() -> Option<PostgresStore> {
    let dsn = std::env::var("TEST_DATABASE_DSN").ok()?;
    Some(PostgresStore::connect(&dsn).await.unwrap())
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, rand::random::<u32>())
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let Some(store) = connect().await else {
        eprintln!("TEST_DATABASE_DSN not set, skipping");
        return;
    };
    let id = unique("gauge");

    for value in [1.5, 2.5] {
        store
            .updates(vec![MetricRecord {
                id: id.clone(),
                gauge: Some(value),
                counter: None,
            }])
            .await
            .unwrap();
    }

    let rows: Vec<_> = store
        .get()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.id == id)
        .collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].gauge, Some(2.5));
    assert!(store.ping().await.is_ok());
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_migrations_rerun_and_aggregation() {
    let Some(first) = connect().await else {
        eprintln!("TEST_DATABASE_DSN not set, skipping");
        return;
    };
    first.close().await.unwrap();

    // Reconnecting re-applies migrations with nothing pending
    let Some(store) = connect().await else {
        return;
    };
    let id = unique("counter");
    let service = Service::new(Arc::new(store));
    service
        .update_batch(vec![Metric::counter(id.clone(), 5)])
        .await
        .unwrap();
    service
        .update_batch(vec![Metric::counter(id.clone(), 5)])
        .await
        .unwrap();
    let metric = service.get_one(&id, MetricKind::Counter).await.unwrap();
    assert_eq!(metric.delta, Some(10));

    assert!(matches!(
        service.store().get_one("definitely-missing").await,
        Err(StoreError::NotFound(_))
    ));
}
