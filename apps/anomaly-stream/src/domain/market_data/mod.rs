//! Market Data Types
//!
//! Canonical in-memory representation of a replayed symbol feed: an
//! ordered series of ticks, each a raw CSV-style row whose first cell is
//! the timestamp and whose remaining cells form the feature vector.

use serde_json::{Map, Number, Value};

// =============================================================================
// Types
// =============================================================================

/// A symbol string (stock ticker or any feed identifier).
pub type Symbol = String;

/// Numeric features of one tick, in column order, timestamp excluded.
pub type FeatureVector = Vec<f64>;

/// A raw row rendered as an ordered column-name to value map.
pub type RawData = Map<String, Value>;

/// Why a tick was skipped instead of being added to the window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowSkipped {
    /// The row does not carry a timestamp and at least one feature.
    #[error("row has {found} columns, at least 2 required")]
    InsufficientColumns {
        /// Number of cells present in the row.
        found: usize,
    },
    /// A feature cell could not be parsed as a finite number.
    #[error("column {column} value {value:?} is not a finite number")]
    InvalidFeature {
        /// Zero-based column index (timestamp is column 0).
        column: usize,
        /// Offending cell content.
        value: String,
    },
}

// =============================================================================
// Tick
// =============================================================================

/// One row of source data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    cells: Vec<String>,
}

impl Tick {
    /// Create a tick from its raw cells (timestamp first).
    #[must_use]
    pub const fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    /// Create a tick from string slices.
    #[must_use]
    pub fn from_cells<S: AsRef<str>>(cells: &[S]) -> Self {
        Self::new(cells.iter().map(|c| c.as_ref().to_string()).collect())
    }

    /// Timestamp cell, if the row has one.
    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        self.cells.first().map(String::as_str)
    }

    /// Number of cells in the row, timestamp included.
    #[must_use]
    pub const fn column_count(&self) -> usize {
        self.cells.len()
    }

    /// Raw cells of the row.
    #[must_use]
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// Extract the feature vector (every column except the timestamp).
    ///
    /// # Errors
    ///
    /// Returns [`RowSkipped`] when the row is too short or a feature cell is
    /// not a finite number.
    pub fn feature_vector(&self) -> Result<FeatureVector, RowSkipped> {
        if self.cells.len() < 2 {
            return Err(RowSkipped::InsufficientColumns {
                found: self.cells.len(),
            });
        }

        self.cells
            .iter()
            .enumerate()
            .skip(1)
            .map(|(column, cell)| {
                cell.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| RowSkipped::InvalidFeature {
                        column,
                        value: cell.clone(),
                    })
            })
            .collect()
    }

    /// Render the row as an ordered map keyed by column name.
    ///
    /// Numeric cells become JSON numbers, everything else stays a string.
    /// Cells beyond the known columns are keyed by their index.
    #[must_use]
    pub fn raw_data(&self, columns: &[String]) -> RawData {
        let mut data = Map::with_capacity(self.cells.len());
        for (idx, cell) in self.cells.iter().enumerate() {
            let key = columns
                .get(idx)
                .cloned()
                .unwrap_or_else(|| idx.to_string());
            data.insert(key, cell_value(cell));
        }
        data
    }
}

fn cell_value(cell: &str) -> Value {
    let trimmed = cell.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Number(int.into());
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(cell.to_string()), Value::Number)
}

// =============================================================================
// Tick Series
// =============================================================================

/// The full, ordered data set of one symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSeries {
    columns: Vec<String>,
    ticks: Vec<Tick>,
}

impl TickSeries {
    /// Create a series from column names and ticks.
    #[must_use]
    pub const fn new(columns: Vec<String>, ticks: Vec<Tick>) -> Self {
        Self { columns, ticks }
    }

    /// Column names, timestamp column first.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Tick at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Tick> {
        self.ticks.get(index)
    }

    /// Number of ticks.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.ticks.len()
    }

    /// Whether the series holds no ticks.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn columns() -> Vec<String> {
        ["timestamp", "open", "high", "low", "close", "volume"]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn feature_vector_excludes_timestamp() {
        let tick = Tick::from_cells(&["2024-01-02 09:30", "1.5", "2", "1", "1.75", "1000"]);
        assert_eq!(tick.timestamp(), Some("2024-01-02 09:30"));
        assert_eq!(
            tick.feature_vector().unwrap(),
            vec![1.5, 2.0, 1.0, 1.75, 1000.0]
        );
    }

    #[test_case(&[] ; "empty row")]
    #[test_case(&["2024-01-02"] ; "timestamp only")]
    fn short_rows_are_skipped(cells: &[&str]) {
        let tick = Tick::from_cells(cells);
        assert_eq!(
            tick.feature_vector(),
            Err(RowSkipped::InsufficientColumns { found: cells.len() })
        );
    }

    #[test_case("abc" ; "text")]
    #[test_case("" ; "empty cell")]
    #[test_case("NaN" ; "nan")]
    #[test_case("inf" ; "infinite")]
    fn invalid_features_are_skipped(bad: &str) {
        let tick = Tick::from_cells(&["t0", "1.0", bad]);
        assert_eq!(
            tick.feature_vector(),
            Err(RowSkipped::InvalidFeature {
                column: 2,
                value: bad.to_string(),
            })
        );
    }

    #[test]
    fn raw_data_preserves_column_order_and_types() {
        let tick = Tick::from_cells(&["2024-01-02", "1.5", "2", "1", "1.75", "1000"]);
        let data = tick.raw_data(&columns());

        let keys: Vec<_> = data.keys().cloned().collect();
        assert_eq!(keys, columns());
        assert_eq!(data["timestamp"], Value::String("2024-01-02".to_string()));
        assert_eq!(data["open"], serde_json::json!(1.5));
        assert_eq!(data["volume"], serde_json::json!(1000));
    }

    #[test]
    fn raw_data_keys_extra_cells_by_index() {
        let tick = Tick::from_cells(&["t0", "1", "2"]);
        let data = tick.raw_data(&["timestamp".to_string()]);
        assert!(data.contains_key("1"));
        assert!(data.contains_key("2"));
    }

    #[test]
    fn series_accessors() {
        let series = TickSeries::new(
            columns(),
            vec![Tick::from_cells(&["t0", "1"]), Tick::from_cells(&["t1", "2"])],
        );
        assert_eq!(series.len(), 2);
        assert!(!series.is_empty());
        assert_eq!(series.get(1).and_then(Tick::timestamp), Some("t1"));
        assert!(series.get(2).is_none());
        assert!(TickSeries::default().is_empty());
    }
}
