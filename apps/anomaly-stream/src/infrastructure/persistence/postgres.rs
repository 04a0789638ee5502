//! PostgreSQL anomaly store.
//!
//! One row per flagged anomaly in `anomalies(stock, timestamp, score)`.
//! The table is created on connect if it does not exist.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::application::ports::{AnomalyStore, PersistenceError};
use crate::domain::observation::{AnomalyRecord, RecentAnomaly};

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(_)
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => Self::Connection(err.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS anomalies (
    id BIGSERIAL PRIMARY KEY,
    stock TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    score DOUBLE PRECISION NOT NULL
)";

const CREATE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS anomalies_stock_timestamp_idx
    ON anomalies (stock, timestamp DESC)";

/// Anomaly store backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PostgresAnomalyStore {
    pool: PgPool,
}

impl PostgresAnomalyStore {
    /// Connect and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached or the schema
    /// statements fail.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;

        let store = Self::with_pool(pool);
        store.migrate().await?;

        tracing::info!(max_connections, "PostgreSQL anomaly store initialized");
        Ok(store)
    }

    /// Wrap an existing pool without touching the schema.
    #[must_use]
    pub const fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AnomalyStore for PostgresAnomalyStore {
    async fn save(&self, record: &AnomalyRecord) -> Result<(), PersistenceError> {
        sqlx::query("INSERT INTO anomalies (stock, timestamp, score) VALUES ($1, $2, $3)")
            .bind(&record.symbol)
            .bind(&record.timestamp)
            .bind(record.score)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_recent(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<RecentAnomaly>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT timestamp, score FROM anomalies \
             WHERE stock = $1 ORDER BY timestamp DESC, id DESC LIMIT $2",
        )
        .bind(symbol)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RecentAnomaly {
                    timestamp: row.try_get("timestamp")?,
                    score: row.try_get("score")?,
                })
            })
            .collect()
    }

    async fn truncate(&self, symbol: &str) -> Result<u64, PersistenceError> {
        let result = sqlx::query("DELETE FROM anomalies WHERE stock = $1")
            .bind(symbol)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
