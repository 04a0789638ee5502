//! Anomaly Store Adapters
//!
//! - `InMemoryAnomalyStore`: process-local store for tests and development
//! - `PostgresAnomalyStore`: `sqlx` backed store for deployments

mod in_memory;
mod postgres;

pub use in_memory::InMemoryAnomalyStore;
pub use postgres::PostgresAnomalyStore;
