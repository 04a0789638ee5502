//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the stream core interacts with external systems.

/// Port interfaces for external systems (tick source, scorer, store, listeners).
pub mod ports;

/// Application services: listener fan-out, stream driving and supervision.
pub mod services;
