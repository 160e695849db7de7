//! The aggregator: replace-or-accumulate on top of a [`Store`].

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::render;
use super::store::{Store, StoreError};
use crate::model::{Metric, MetricError, MetricKind, MetricRecord, MetricUpdate};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Invalid(#[from] MetricError),

    #[error("metric '{0}' not found")]
    NotFound(String),

    #[error("storage is not available")]
    Unavailable,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            StoreError::NotAvailable => ServiceError::Unavailable,
            other => ServiceError::Store(other),
        }
    }
}

/// Shared by both protocol bindings. Read-modify-write sequences are
/// serialized by `write_lock` so concurrent counter deltas never get lost.
pub struct Service {
    store: Arc<dyn Store>,
    write_lock: Mutex<()>,
}

impl Service {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn get_all(&self) -> Result<Vec<MetricRecord>, ServiceError> {
        Ok(self.store.get().await?)
    }

    /// Full dump rendered as an HTML page.
    pub async fn render_all(&self) -> Result<String, ServiceError> {
        Ok(render::metrics_page(&self.get_all().await?))
    }

    /// Value of `id` as `kind`; NotFound also when the record holds no
    /// value of that kind.
    #[instrument(skip(self))]
    pub async fn get_one(&self, id: &str, kind: MetricKind) -> Result<Metric, ServiceError> {
        let record = self.store.get_one(id).await?;
        Metric::from_record(&record, kind).ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Stored record for `id`, or an empty one when the id is new.
    async fn current_record(&self, id: &str) -> Result<MetricRecord, StoreError> {
        match self.store.get_one(id).await {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound(_)) => Ok(MetricRecord::new(id)),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(id = %update.id))]
    pub async fn update_one(&self, update: MetricUpdate) -> Result<MetricRecord, ServiceError> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.current_record(&update.id).await?;
        record.apply(update.value);
        self.store.update(record.clone()).await?;
        debug!("Updated {:?}", record);
        Ok(record)
    }

    /// Applies every valid item of `batch` in order and persists the
    /// touched records in one store call.
    ///
    /// Invalid items and ids whose stored record cannot be read are skipped.
    /// A failed bulk write falls back to writing record by record. Returns
    /// the records actually persisted; fails only when valid items were
    /// present and none could be stored.
    #[instrument(skip_all, fields(count = batch.len()))]
    pub async fn update_batch(&self, batch: Vec<Metric>) -> Result<Vec<MetricRecord>, ServiceError> {
        let _guard = self.write_lock.lock().await;

        let mut order: Vec<String> = Vec::new();
        let mut working: HashMap<String, MetricRecord> = HashMap::new();
        let mut unreadable: HashSet<String> = HashSet::new();
        let mut first_error: Option<StoreError> = None;

        for metric in batch {
            let update = match MetricUpdate::try_from(metric) {
                Ok(update) => update,
                Err(e) => {
                    warn!("Skipping batch item: {}", e);
                    continue;
                }
            };
            if unreadable.contains(&update.id) {
                continue;
            }
            if !working.contains_key(&update.id) {
                match self.current_record(&update.id).await {
                    Ok(record) => {
                        order.push(update.id.clone());
                        working.insert(update.id.clone(), record);
                    }
                    Err(e) => {
                        warn!("Skipping '{}': failed to read current value: {}", update.id, e);
                        unreadable.insert(update.id.clone());
                        first_error.get_or_insert(e);
                        continue;
                    }
                }
            }
            if let Some(record) = working.get_mut(&update.id) {
                record.apply(update.value);
            }
        }

        let records: Vec<MetricRecord> = order
            .iter()
            .filter_map(|id| working.remove(id))
            .collect();
        if records.is_empty() {
            return match first_error {
                Some(e) => Err(e.into()),
                None => Ok(records),
            };
        }

        let err = match self.store.updates(records.clone()).await {
            Ok(()) => return Ok(records),
            Err(e) => e,
        };
        warn!("Bulk write of {} records failed, writing one by one: {}", records.len(), err);

        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            match self.store.update(record.clone()).await {
                Ok(()) => stored.push(record),
                Err(e) => warn!("Dropping update of '{}': {}", record.id, e),
            }
        }
        if stored.is_empty() {
            return Err(err.into());
        }
        Ok(stored)
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        Ok(self.store.ping().await?)
    }
}
