//! Pluggable metric persistence.
//!
//! The aggregator only sees [`Store`]; the concrete backend is chosen once at
//! startup by [`open`]. Stores do blind writes: the replace-or-accumulate
//! rule is applied by the caller before `update`/`updates`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::model::MetricRecord;
use crate::server::config::ServerConfig;

pub use memory::{MemoryOptions, MemoryStore};
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metric '{0}' not found")]
    NotFound(String),

    #[error("storage has no durable backend")]
    NotAvailable,

    #[error("snapshot file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot format error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// All records, ordered by id.
    async fn get(&self) -> Result<Vec<MetricRecord>, StoreError>;

    async fn get_one(&self, id: &str) -> Result<MetricRecord, StoreError>;

    /// Overwrites (or creates) one record.
    async fn update(&self, record: MetricRecord) -> Result<(), StoreError>;

    /// Overwrites (or creates) every record in `records`.
    async fn updates(&self, records: Vec<MetricRecord>) -> Result<(), StoreError>;

    /// Liveness of the durable backend.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Flushes and releases the backend.
    async fn close(&self) -> Result<(), StoreError>;
}

/// Opens the backend selected by `config`: Postgres when a DSN is set,
/// otherwise the in-memory store with an optional snapshot file.
pub async fn open(config: &ServerConfig) -> Result<Arc<dyn Store>, StoreError> {
    match config.database_dsn.as_deref().filter(|dsn| !dsn.is_empty()) {
        Some(dsn) => {
            info!("Using PostgreSQL store");
            Ok(Arc::new(PostgresStore::connect(dsn).await?))
        }
        None => {
            info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::open(MemoryOptions::from(config)).await?))
        }
    }
}
