//! Tick Source Port (Driven Port)
//!
//! Interface for loading the recorded data that a stream replays.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::market_data::TickSeries;

/// Tick source error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DataSourceError {
    /// No data exists for the symbol.
    #[error("No data found for symbol: {symbol}")]
    NotFound {
        /// The unknown symbol.
        symbol: String,
    },

    /// The data exists but could not be read.
    #[error("Failed to read data for {symbol}: {message}")]
    Io {
        /// Symbol being loaded.
        symbol: String,
        /// Error details.
        message: String,
    },

    /// The data could not be parsed.
    #[error("Failed to parse data for {symbol}: {message}")]
    Parse {
        /// Symbol being loaded.
        symbol: String,
        /// Error details.
        message: String,
    },
}

/// Port for loading tick series.
///
/// Implementations load each symbol once and hand out the cached series
/// on later calls.
#[async_trait]
pub trait TickSource: Send + Sync {
    /// Load the full ordered series of `symbol`.
    async fn load(&self, symbol: &str) -> Result<Arc<TickSeries>, DataSourceError>;

    /// Get the name of this source.
    fn name(&self) -> &'static str;
}
