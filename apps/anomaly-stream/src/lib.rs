#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Anomaly Stream - Simulated Feeds with Rolling-Window Anomaly Scoring
//!
//! Replays recorded per-symbol tick data as live feeds, scores every full
//! rolling window with a reconstruction-error model, persists flagged
//! anomalies and fans every observation out to WebSocket listeners.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core stream types and state
//!   - `market_data`: Ticks, feature vectors, tick series
//!   - `observation`: Observation messages, anomaly records, threshold rule
//!   - `symbol_state`: Per-symbol flag, cursor and rolling window
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Tick source, scorer, anomaly store, listener
//!   - `services`: Listener registry, stream driver, stream supervisor
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `csv_source`: CSV tick files, cached per symbol
//!   - `scoring`: Baseline scorer and feature scaler
//!   - `persistence`: In-memory and PostgreSQL anomaly stores
//!   - `listener`, `http`: WebSocket and REST surface
//!   - `config`, `metrics`, `telemetry`: Process plumbing
//!
//! # Data Flow
//!
//! ```text
//!  POST /api/start/{symbol}
//!          |
//!  StreamSupervisor --spawn--> StreamDriver --tick--> SymbolStateStore
//!                                  |
//!                    full window   +--> Scorer
//!                    anomaly       +--> AnomalyStore
//!                    every tick    +--> ListenerRegistry --> /ws/{symbol} clients
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core stream types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market_data::{FeatureVector, RawData, RowSkipped, Symbol, Tick, TickSeries};
pub use domain::observation::{AnomalyRecord, ObservationMessage, RecentAnomaly};
pub use domain::symbol_state::{SymbolState, SymbolStateStore};

// Ports
pub use application::ports::{
    AnomalyStore, DataSourceError, Listener, ListenerError, ListenerId, PersistenceError, Scorer,
    ScoringError, TickSource,
};

// Services
pub use application::services::{
    AnomalyLog, BroadcastOutcome, ListenerRegistry, SharedListenerRegistry, StreamContext,
    StreamControlError, StreamDriver, StreamDriverConfig, StreamOutcome, StreamSupervisor,
};

// Infrastructure config
pub use infrastructure::config::{
    AppConfig, ConfigError, DataSettings, PersistenceSettings, ScoringSettings, ServerSettings,
    StreamSettings,
};

// Adapters (for integration tests)
pub use infrastructure::csv_source::{CsvTickSource, InMemoryTickSource};
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, create_router};
pub use infrastructure::listener::ChannelListener;
pub use infrastructure::persistence::{InMemoryAnomalyStore, PostgresAnomalyStore};
pub use infrastructure::scoring::{BaselineScorer, FeatureScaler, ScalerError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
