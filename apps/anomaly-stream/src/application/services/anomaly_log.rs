//! Read access to stored anomalies.
//!
//! Queries are best-effort: a failing store yields an empty list.

use std::sync::Arc;

use crate::application::ports::AnomalyStore;
use crate::domain::observation::RecentAnomaly;
use crate::infrastructure::metrics::{self, StoreOperation};

/// Default number of anomalies returned per query.
pub const DEFAULT_RECENT_LIMIT: usize = 15;

/// Best-effort reader over an [`AnomalyStore`].
#[derive(Clone)]
pub struct AnomalyLog {
    store: Arc<dyn AnomalyStore>,
    limit: usize,
}

impl std::fmt::Debug for AnomalyLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyLog")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl AnomalyLog {
    /// Create a reader returning at most `limit` anomalies per query.
    #[must_use]
    pub fn new(store: Arc<dyn AnomalyStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Most recent anomalies of `symbol`, newest first.
    pub async fn recent(&self, symbol: &str) -> Vec<RecentAnomaly> {
        match self.store.fetch_recent(symbol, self.limit).await {
            Ok(anomalies) => anomalies,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Failed to fetch anomalies");
                metrics::record_persistence_error(StoreOperation::FetchRecent);
                Vec::new()
            }
        }
    }
}
