//! PostgreSQL store.
//!
//! Connecting retries only on SQLSTATE 28000 (invalid authorization
//! specification), which a freshly started database reports until its roles
//! are provisioned. Every other connect error fails immediately.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{Store, StoreError};
use crate::model::MetricRecord;

const MAX_CONNECTIONS: u32 = 30;
const MAX_LIFETIME: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

const INVALID_AUTHORIZATION: &str = "28000";

const SELECT_ALL: &str = "SELECT id, gauge, counter FROM tbl_metrics ORDER BY id";
const SELECT_ONE: &str = "SELECT id, gauge, counter FROM tbl_metrics WHERE id = $1";
const UPSERT: &str = "INSERT INTO tbl_metrics (id, gauge, counter) VALUES ($1, $2, $3) \
    ON CONFLICT (id) DO UPDATE SET gauge = EXCLUDED.gauge, counter = EXCLUDED.counter";

type Row = (String, Option<f64>, Option<i64>);

fn to_record((id, gauge, counter): Row) -> MetricRecord {
    MetricRecord { id, gauge, counter }
}

/// Linear connect backoff, created fresh for every connect sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Duration,
    step: Duration,
    remaining: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(2), 3)
    }
}

impl Backoff {
    pub fn new(first: Duration, step: Duration, retries: u32) -> Self {
        Self {
            delay: first,
            step,
            remaining: retries,
        }
    }

    /// Delay before the next attempt, or `None` once retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let delay = self.delay;
        self.delay += self.step;
        Some(delay)
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(INVALID_AUTHORIZATION))
}

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .max_lifetime(MAX_LIFETIME)
        .idle_timeout(IDLE_TIMEOUT)
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects with backoff and applies the embedded migrations.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let mut backoff = Backoff::default();
        let pool = loop {
            match pool_options().connect(dsn).await {
                Ok(pool) => break pool,
                Err(e) if is_transient(&e) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!("PostgreSQL not ready ({}), retrying in {:?}", e, delay);
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e.into()),
                },
                Err(e) => return Err(e.into()),
            }
        };
        info!("Connected to PostgreSQL");

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn get(&self) -> Result<Vec<MetricRecord>, StoreError> {
        let rows: Vec<Row> = sqlx::query_as(SELECT_ALL).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(to_record).collect())
    }

    async fn get_one(&self, id: &str) -> Result<MetricRecord, StoreError> {
        let row: Option<Row> = sqlx::query_as(SELECT_ONE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(to_record)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    #[instrument(skip(self), fields(id = %record.id))]
    async fn update(&self, record: MetricRecord) -> Result<(), StoreError> {
        sqlx::query(UPSERT)
            .bind(&record.id)
            .bind(record.gauge)
            .bind(record.counter)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(count = records.len()))]
    async fn updates(&self, records: Vec<MetricRecord>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for record in &records {
            sqlx::query(UPSERT)
                .bind(&record.id)
                .bind(record.gauge)
                .bind(record.counter)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}
