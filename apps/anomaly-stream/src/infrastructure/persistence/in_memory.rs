//! In-memory anomaly store for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{AnomalyStore, PersistenceError};
use crate::domain::market_data::Symbol;
use crate::domain::observation::{AnomalyRecord, RecentAnomaly};

/// In-memory implementation of `AnomalyStore`.
///
/// Suitable for testing and development. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryAnomalyStore {
    records: RwLock<HashMap<Symbol, Vec<RecentAnomaly>>>,
}

impl InMemoryAnomalyStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored anomalies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().values().map(Vec::len).sum()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AnomalyStore for InMemoryAnomalyStore {
    async fn save(&self, record: &AnomalyRecord) -> Result<(), PersistenceError> {
        self.records
            .write()
            .entry(record.symbol.clone())
            .or_default()
            .push(RecentAnomaly {
                timestamp: record.timestamp.clone(),
                score: record.score,
            });
        Ok(())
    }

    async fn fetch_recent(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<RecentAnomaly>, PersistenceError> {
        let records = self.records.read();
        let Some(stored) = records.get(symbol) else {
            return Ok(Vec::new());
        };

        // Later arrivals win ties on equal timestamps.
        let mut recent: Vec<RecentAnomaly> = stored.iter().rev().cloned().collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(limit);
        Ok(recent)
    }

    async fn truncate(&self, symbol: &str) -> Result<u64, PersistenceError> {
        let removed = self
            .records
            .write()
            .remove(symbol)
            .map_or(0, |records| records.len());
        Ok(removed as u64)
    }
}
