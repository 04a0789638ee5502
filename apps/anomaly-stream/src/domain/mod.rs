//! Domain Layer - Core stream types and per-symbol state.
//!
//! This layer contains the core domain types for the simulated feeds
//! with no I/O. Everything here is pure Rust with serialization support.

/// Ticks, feature vectors and tick series.
pub mod market_data;

/// Observation messages and anomaly records.
pub mod observation;

/// Per-symbol streaming flag, cursor and rolling window.
pub mod symbol_state;
