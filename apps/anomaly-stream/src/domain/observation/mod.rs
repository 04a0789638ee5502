//! Observation and Anomaly Types
//!
//! The messages fanned out to real-time listeners and the records kept by
//! the anomaly store.
//!
//! # Wire Format
//!
//! Messages are a closed tagged union keyed by `type`:
//!
//! ```text
//! {"type":"connection","message":"Connected to AAPL stream"}
//! {"type":"observation","symbol":"AAPL","timestamp":"...","data":{...},"anomaly":false,"score":null}
//! {"type":"error","symbol":"AAPL","timestamp":"...","data":{...},"error":"Model prediction failed: ..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::market_data::RawData;

/// Default reconstruction-error threshold above which a window is anomalous.
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 0.000_087;

/// Whether `score` is anomalous under `threshold` (strictly greater).
#[must_use]
pub fn is_anomaly(score: f64, threshold: f64) -> bool {
    score > threshold
}

// =============================================================================
// Anomaly Records
// =============================================================================

/// A flagged anomaly as written to the anomaly store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// Symbol the anomaly belongs to.
    pub symbol: String,
    /// Timestamp of the tick that completed the anomalous window.
    pub timestamp: String,
    /// Reconstruction error.
    pub score: f64,
}

impl AnomalyRecord {
    /// Create a new record.
    #[must_use]
    pub fn new(symbol: impl Into<String>, timestamp: impl Into<String>, score: f64) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp: timestamp.into(),
            score,
        }
    }
}

/// A stored anomaly as returned by recent-anomaly queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentAnomaly {
    /// Tick timestamp.
    pub timestamp: String,
    /// Reconstruction error.
    pub score: f64,
}

// =============================================================================
// Observation Messages
// =============================================================================

/// A message delivered to listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObservationMessage {
    /// Greeting sent when a listener connects.
    Connection {
        /// Human readable greeting.
        message: String,
    },
    /// A processed tick, with a score once the window is full.
    Observation {
        /// Symbol of the feed.
        symbol: String,
        /// Tick timestamp.
        timestamp: String,
        /// Full raw row.
        data: RawData,
        /// Whether the score exceeded the threshold.
        anomaly: bool,
        /// Reconstruction error, absent until the window first fills.
        score: Option<f64>,
    },
    /// A tick that could not be scored, or a stream that failed.
    Error {
        /// Symbol of the feed.
        symbol: String,
        /// Tick timestamp, absent for stream-level failures.
        timestamp: Option<String>,
        /// Raw row, absent for stream-level failures.
        data: Option<RawData>,
        /// Failure description.
        error: String,
    },
}

impl ObservationMessage {
    /// Greeting for a newly connected listener.
    #[must_use]
    pub fn greeting(symbol: &str) -> Self {
        Self::Connection {
            message: format!("Connected to {symbol} stream"),
        }
    }

    /// A normal observation.
    #[must_use]
    pub fn observation(
        symbol: &str,
        timestamp: &str,
        data: RawData,
        anomaly: bool,
        score: Option<f64>,
    ) -> Self {
        Self::Observation {
            symbol: symbol.to_string(),
            timestamp: timestamp.to_string(),
            data,
            anomaly,
            score,
        }
    }

    /// An observation whose window could not be scored.
    #[must_use]
    pub fn scoring_failed(symbol: &str, timestamp: &str, data: RawData, reason: &str) -> Self {
        Self::Error {
            symbol: symbol.to_string(),
            timestamp: Some(timestamp.to_string()),
            data: Some(data),
            error: format!("Model prediction failed: {reason}"),
        }
    }

    /// Notice that the stream terminated on an unexpected error.
    #[must_use]
    pub fn stream_failed(symbol: &str, reason: &str) -> Self {
        Self::Error {
            symbol: symbol.to_string(),
            timestamp: None,
            data: None,
            error: format!("Streaming error: {reason}"),
        }
    }

    /// Symbol this message belongs to, if any.
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Connection { .. } => None,
            Self::Observation { symbol, .. } | Self::Error { symbol, .. } => Some(symbol),
        }
    }

    /// Tick timestamp carried by the message, if any.
    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        match self {
            Self::Connection { .. } => None,
            Self::Observation { timestamp, .. } => Some(timestamp),
            Self::Error { timestamp, .. } => timestamp.as_deref(),
        }
    }

    /// Whether this is an anomalous observation.
    #[must_use]
    pub const fn is_anomaly(&self) -> bool {
        matches!(self, Self::Observation { anomaly: true, .. })
    }

    /// Score of an observation, if computed.
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Observation { score, .. } => *score,
            Self::Connection { .. } | Self::Error { .. } => None,
        }
    }

    /// Error text of an error message.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error { error, .. } => Some(error),
            Self::Connection { .. } | Self::Observation { .. } => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
