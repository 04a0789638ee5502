//! Anomaly Store Port (Driven Port)
//!
//! Interface for persisting flagged anomalies.

use async_trait::async_trait;

use crate::domain::observation::{AnomalyRecord, RecentAnomaly};

/// Errors from anomaly persistence.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistenceError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("Query error: {0}")]
    Query(String),
}

/// Port for the anomaly store.
///
/// Duplicate `(symbol, timestamp)` records are allowed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnomalyStore: Send + Sync {
    /// Append one anomaly.
    async fn save(&self, record: &AnomalyRecord) -> Result<(), PersistenceError>;

    /// Most recent anomalies of `symbol`, newest first, at most `limit`.
    async fn fetch_recent(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<RecentAnomaly>, PersistenceError>;

    /// Delete every anomaly of `symbol`, returning how many were removed.
    async fn truncate(&self, symbol: &str) -> Result<u64, PersistenceError>;
}
