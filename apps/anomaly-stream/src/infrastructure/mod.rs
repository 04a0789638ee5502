//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the process-level plumbing.

/// Configuration loading.
pub mod config;

/// CSV and in-memory tick sources.
pub mod csv_source;

/// REST, WebSocket, health and metrics endpoints.
pub mod http;

/// Channel-backed listener used by WebSocket connections.
pub mod listener;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// In-memory and PostgreSQL anomaly stores.
pub mod persistence;

/// Baseline reconstruction-error scorer.
pub mod scoring;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
