//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ListenerRegistry`: Per-symbol listener sets with fan-out and pruning
//! - `StreamDriver`: The per-tick control loop of one running stream
//! - `StreamSupervisor`: Start/stop lifecycle, at most one stream per symbol
//! - `AnomalyLog`: Best-effort read access to stored anomalies

mod anomaly_log;
mod listener_registry;
mod stream_driver;
mod stream_supervisor;

#[cfg(test)]
mod test_support;

pub use anomaly_log::{AnomalyLog, DEFAULT_RECENT_LIMIT};
pub use listener_registry::{BroadcastOutcome, ListenerRegistry, SharedListenerRegistry};
pub use stream_driver::{
    StreamContext, StreamDriver, StreamDriverConfig, StreamFatal, StreamOutcome,
};
pub use stream_supervisor::{StreamControlError, StreamSupervisor};
