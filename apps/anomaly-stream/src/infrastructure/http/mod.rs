//! HTTP Surface
//!
//! REST commands, the WebSocket feed, health checks and Prometheus metrics
//! on one axum server.
//!
//! # Endpoints
//!
//! - `POST /api/start/{symbol}` - Start streaming a symbol
//! - `POST /api/stop/{symbol}` - Stop streaming a symbol
//! - `GET /api/anomalies/{symbol}` - Most recent stored anomalies
//! - `GET /api/health` - JSON health status
//! - `GET /ws/{symbol}` - WebSocket feed of observation messages
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /metrics` - Prometheus metrics in text format

mod rest;
mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::application::services::{AnomalyLog, SharedListenerRegistry, StreamSupervisor};

// =============================================================================
// Shared State
// =============================================================================

/// State shared by every handler.
#[derive(Debug)]
pub struct AppState {
    version: String,
    started_at: Instant,
    supervisor: Arc<StreamSupervisor>,
    listeners: SharedListenerRegistry,
    anomalies: AnomalyLog,
}

impl AppState {
    /// Create handler state around a supervisor and an anomaly reader.
    #[must_use]
    pub fn new(version: String, supervisor: Arc<StreamSupervisor>, anomalies: AnomalyLog) -> Self {
        let listeners = Arc::clone(&supervisor.context().listeners);
        Self {
            version,
            started_at: Instant::now(),
            supervisor,
            listeners,
            anomalies,
        }
    }
}

/// Build the router with every endpoint and the CORS policy.
#[must_use]
pub fn create_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/start/{symbol}", post(rest::start_stream))
        .route("/api/stop/{symbol}", post(rest::stop_stream))
        .route("/api/anomalies/{symbol}", get(rest::recent_anomalies))
        .route("/api/health", get(rest::health))
        .route("/healthz", get(rest::liveness))
        .route("/metrics", get(rest::metrics))
        .route("/ws/{symbol}", get(websocket::upgrade))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// REST and WebSocket server.
pub struct HttpServer {
    port: u16,
    router: Router,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, router: Router, cancel: CancellationToken) -> Self {
        Self {
            port,
            router,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server encounters
    /// a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
