//! Tick Source Adapters
//!
//! `CsvTickSource` replays `<data_dir>/<SYMBOL>.csv` files. The header row
//! names the columns and column 0 is the timestamp. Rows with an empty cell
//! or more cells than the header are dropped at load time; short rows are
//! kept so the stream's own skip policy sees them. Each symbol is read from disk once and cached.
//!
//! `InMemoryTickSource` serves pre-built series for tests and demos.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use csv_async::{AsyncReaderBuilder, Trim};
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::io::BufReader;

use crate::application::ports::{DataSourceError, TickSource};
use crate::domain::market_data::{Symbol, Tick, TickSeries};

// =============================================================================
// CSV Source
// =============================================================================

/// Tick source backed by one CSV file per symbol.
#[derive(Debug)]
pub struct CsvTickSource {
    data_dir: PathBuf,
    cache: RwLock<HashMap<Symbol, Arc<TickSeries>>>,
}

impl CsvTickSource {
    /// Create a source reading from `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Directory holding the CSV files.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Number of symbols loaded so far.
    #[must_use]
    pub fn cached_symbols(&self) -> usize {
        self.cache.read().len()
    }

    fn path_for(&self, symbol: &str) -> Option<PathBuf> {
        let valid = !symbol.is_empty()
            && !symbol.starts_with('.')
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        valid.then(|| self.data_dir.join(format!("{symbol}.csv")))
    }

    async fn read_series(&self, symbol: &str) -> Result<TickSeries, DataSourceError> {
        let not_found = || DataSourceError::NotFound {
            symbol: symbol.to_string(),
        };
        let path = self.path_for(symbol).ok_or_else(not_found)?;

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => {
                return Err(DataSourceError::Io {
                    symbol: symbol.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let parse_error = |e: csv_async::Error| DataSourceError::Parse {
            symbol: symbol.to_string(),
            message: e.to_string(),
        };

        let mut reader = AsyncReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .create_reader(BufReader::new(file));

        let columns: Vec<String> = reader
            .headers()
            .await
            .map_err(parse_error)?
            .iter()
            .map(ToString::to_string)
            .collect();

        let mut ticks = Vec::new();
        let mut dropped = 0usize;
        let mut records = reader.records();
        while let Some(record) = records.next().await {
            let record = record.map_err(parse_error)?;
            if record.len() > columns.len() || record.iter().any(str::is_empty) {
                dropped += 1;
                continue;
            }
            ticks.push(Tick::new(record.iter().map(ToString::to_string).collect()));
        }

        tracing::info!(
            symbol,
            path = %path.display(),
            ticks = ticks.len(),
            dropped,
            "Loaded tick data"
        );
        Ok(TickSeries::new(columns, ticks))
    }
}

#[async_trait]
impl TickSource for CsvTickSource {
    async fn load(&self, symbol: &str) -> Result<Arc<TickSeries>, DataSourceError> {
        let cached = self.cache.read().get(symbol).cloned();
        if let Some(series) = cached {
            return Ok(series);
        }

        let series = Arc::new(self.read_series(symbol).await?);
        let mut cache = self.cache.write();
        Ok(Arc::clone(
            cache.entry(symbol.to_string()).or_insert(series),
        ))
    }

    fn name(&self) -> &'static str {
        "csv"
    }
}

// =============================================================================
// In-Memory Source
// =============================================================================

/// Tick source serving pre-built series.
#[derive(Debug, Default)]
pub struct InMemoryTickSource {
    series: RwLock<HashMap<Symbol, Arc<TickSeries>>>,
}

impl InMemoryTickSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a series, builder style.
    #[must_use]
    pub fn with_series(self, symbol: &str, series: TickSeries) -> Self {
        self.insert(symbol, series);
        self
    }

    /// Add or replace the series of `symbol`.
    pub fn insert(&self, symbol: &str, series: TickSeries) {
        self.series
            .write()
            .insert(symbol.to_string(), Arc::new(series));
    }
}

#[async_trait]
impl TickSource for InMemoryTickSource {
    async fn load(&self, symbol: &str) -> Result<Arc<TickSeries>, DataSourceError> {
        self.series
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| DataSourceError::NotFound {
                symbol: symbol.to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

// =============================================================================
// Tests
// =============================================================================
