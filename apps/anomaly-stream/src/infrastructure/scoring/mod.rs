//! Scorer Adapters
//!
//! `BaselineScorer` standardizes a window with an optional feature scaler,
//! reconstructs every row as the per-feature window mean and returns the
//! mean squared reconstruction error. Any trained model can replace it
//! behind the `Scorer` port.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::ports::{Scorer, ScoringError};
use crate::domain::market_data::FeatureVector;

// =============================================================================
// Feature Scaler
// =============================================================================

/// Feature scaler error.
#[derive(Debug, thiserror::Error)]
pub enum ScalerError {
    /// The scaler file could not be read.
    #[error("failed to read scaler {path}: {message}")]
    Io {
        /// Scaler path.
        path: PathBuf,
        /// Error details.
        message: String,
    },

    /// The scaler file is not valid JSON of the expected shape.
    #[error("failed to parse scaler: {0}")]
    Parse(#[from] serde_json::Error),

    /// The scaler does not match the feature count.
    #[error("scaler has {mean} means and {scale} scales, expected {expected}")]
    DimensionMismatch {
        /// Configured feature count.
        expected: usize,
        /// Number of means.
        mean: usize,
        /// Number of scales.
        scale: usize,
    },

    /// A mean or scale is not finite.
    #[error("scaler contains non-finite values")]
    NonFinite,
}

/// Per-feature standardization `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeatureScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl FeatureScaler {
    /// Build a scaler from means and scales.
    ///
    /// # Errors
    ///
    /// Returns an error if the lengths differ from `feature_dim` or any
    /// value is not finite.
    pub fn new(mean: Vec<f64>, scale: Vec<f64>, feature_dim: usize) -> Result<Self, ScalerError> {
        let scaler = Self { mean, scale };
        scaler.validate(feature_dim)?;
        Ok(scaler)
    }

    /// Load a JSON scaler of the form `{"mean": [...], "scale": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path, feature_dim: usize) -> Result<Self, ScalerError> {
        let text = std::fs::read_to_string(path).map_err(|e| ScalerError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let scaler: Self = serde_json::from_str(&text)?;
        scaler.validate(feature_dim)?;
        Ok(scaler)
    }

    fn validate(&self, feature_dim: usize) -> Result<(), ScalerError> {
        if self.mean.len() != feature_dim || self.scale.len() != feature_dim {
            return Err(ScalerError::DimensionMismatch {
                expected: feature_dim,
                mean: self.mean.len(),
                scale: self.scale.len(),
            });
        }
        if self.mean.iter().chain(&self.scale).any(|v| !v.is_finite()) {
            return Err(ScalerError::NonFinite);
        }
        Ok(())
    }

    /// Standardize one row. A zero scale leaves the centered value as is.
    #[must_use]
    pub fn transform(&self, row: &[f64]) -> FeatureVector {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                let centered = x - mean;
                if scale.abs() < f64::EPSILON {
                    centered
                } else {
                    centered / scale
                }
            })
            .collect()
    }
}

// =============================================================================
// Baseline Scorer
// =============================================================================

/// Mean-reconstruction scorer.
#[derive(Debug, Clone)]
pub struct BaselineScorer {
    window_size: usize,
    feature_dim: usize,
    scaler: Option<FeatureScaler>,
}

impl BaselineScorer {
    /// Create a scorer for windows of `window_size` rows of `feature_dim` features.
    #[must_use]
    pub const fn new(window_size: usize, feature_dim: usize, scaler: Option<FeatureScaler>) -> Self {
        Self {
            window_size,
            feature_dim,
            scaler,
        }
    }

    fn check_shape(&self, window: &[FeatureVector]) -> Result<(), ScoringError> {
        let bad_row = window.iter().find(|row| row.len() != self.feature_dim);
        if window.len() != self.window_size || bad_row.is_some() {
            return Err(ScoringError::ShapeMismatch {
                expected_rows: self.window_size,
                expected_cols: self.feature_dim,
                rows: window.len(),
                cols: bad_row.or_else(|| window.first()).map_or(0, Vec::len),
            });
        }
        Ok(())
    }

    /// Mean squared reconstruction error of `window`.
    ///
    /// # Errors
    ///
    /// Returns an error on a shape mismatch or a non-finite result.
    #[allow(clippy::cast_precision_loss)]
    pub fn reconstruction_error(&self, window: &[FeatureVector]) -> Result<f64, ScoringError> {
        self.check_shape(window)?;

        let rows: Vec<FeatureVector> = match &self.scaler {
            Some(scaler) => window.iter().map(|row| scaler.transform(row)).collect(),
            None => window.to_vec(),
        };

        let n = rows.len() as f64;
        let means: Vec<f64> = (0..self.feature_dim)
            .map(|col| rows.iter().map(|row| row[col]).sum::<f64>() / n)
            .collect();

        let total: f64 = rows
            .iter()
            .flat_map(|row| row.iter().zip(&means).map(|(x, m)| (x - m).powi(2)))
            .sum();
        let error = total / (n * self.feature_dim as f64);

        if error.is_finite() {
            Ok(error)
        } else {
            Err(ScoringError::NonFinite)
        }
    }
}

#[async_trait]
impl Scorer for BaselineScorer {
    async fn score(&self, window: &[FeatureVector]) -> Result<f64, ScoringError> {
        self.reconstruction_error(window)
    }
}

// =============================================================================
// Tests
// =============================================================================
