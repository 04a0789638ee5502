//! Scorer Port (Driven Port)
//!
//! Interface to the anomaly model: a full window in, a reconstruction
//! error out.

use async_trait::async_trait;

use crate::domain::market_data::FeatureVector;

/// Scoring error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    /// Window dimensions do not match what the model expects.
    #[error("Expected window with shape ({expected_rows}, {expected_cols}), got ({rows}, {cols})")]
    ShapeMismatch {
        /// Expected number of rows.
        expected_rows: usize,
        /// Expected number of features per row.
        expected_cols: usize,
        /// Actual number of rows.
        rows: usize,
        /// Feature count of the first offending row.
        cols: usize,
    },

    /// The model produced a non-finite error.
    #[error("Model produced a non-finite reconstruction error")]
    NonFinite,

    /// Any other model failure.
    #[error("{0}")]
    Internal(String),
}

/// Port for scoring full windows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Reconstruction error of `window` (oldest row first).
    async fn score(&self, window: &[FeatureVector]) -> Result<f64, ScoringError>;
}
