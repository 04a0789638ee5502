//! Port Interfaces
//!
//! Defines the interfaces (ports) for the collaborators the stream core
//! drives, following the Hexagonal Architecture pattern. Infrastructure
//! adapters implement these; tests substitute fakes.
//!
//! ## Driven Ports (Outbound)
//!
//! - `TickSource`: Loads the ordered tick series of a symbol
//! - `Scorer`: Turns a full window into a reconstruction error
//! - `AnomalyStore`: Appends, queries and truncates anomaly records
//! - `Listener`: A real-time sink for observation messages

mod anomaly_store_port;
mod listener_port;
mod scorer_port;
mod tick_source_port;

pub use anomaly_store_port::{AnomalyStore, PersistenceError};
pub use listener_port::{Listener, ListenerError, ListenerId};
pub use scorer_port::{Scorer, ScoringError};
pub use tick_source_port::{DataSourceError, TickSource};

#[cfg(test)]
pub use anomaly_store_port::MockAnomalyStore;
#[cfg(test)]
pub use scorer_port::MockScorer;
