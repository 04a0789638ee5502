//! REST handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use super::AppState;
use crate::application::ports::DataSourceError;
use crate::application::services::StreamControlError;
use crate::domain::market_data::Symbol;
use crate::domain::observation::RecentAnomaly;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Responses
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Human readable status.
    pub message: &'static str,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Symbols with a running stream.
    pub active_streams: Vec<Symbol>,
    /// Connected listeners across all symbols.
    pub listeners: usize,
}

#[derive(Debug, Serialize)]
struct AnomaliesResponse {
    anomalies: Vec<RecentAnomaly>,
}

/// A rejected stream command.
pub(super) struct CommandRejected(StreamControlError);

impl IntoResponse for CommandRejected {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            StreamControlError::AlreadyRunning { .. } => {
                (StatusCode::BAD_REQUEST, "Stream already running.".to_string())
            }
            StreamControlError::NotRunning { .. } => {
                (StatusCode::BAD_REQUEST, "No active stream to stop.".to_string())
            }
            StreamControlError::DataSourceMissing(DataSourceError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, self.0.to_string())
            }
            StreamControlError::DataSourceMissing(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string())
            }
            StreamControlError::Aborted { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string())
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

pub(super) async fn start_stream(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<serde_json::Value>, CommandRejected> {
    state
        .supervisor
        .start(&symbol)
        .await
        .map_err(CommandRejected)?;
    Ok(Json(json!({ "message": format!("Stream started for {symbol}") })))
}

pub(super) async fn stop_stream(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<serde_json::Value>, CommandRejected> {
    state
        .supervisor
        .stop(&symbol)
        .await
        .map_err(CommandRejected)?;
    Ok(Json(json!({ "message": format!("Stream stopped for {symbol}") })))
}

pub(super) async fn recent_anomalies(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    Json(AnomaliesResponse {
        anomalies: state.anomalies.recent(&symbol).await,
    })
}

pub(super) async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        message: "Backend is healthy",
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        active_streams: state.supervisor.active_symbols(),
        listeners: state.listeners.total_listeners(),
    })
}

pub(super) async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn metrics() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn not_found() -> StreamControlError {
        StreamControlError::DataSourceMissing(DataSourceError::NotFound {
            symbol: "TSLA".to_string(),
        })
    }

    fn io_failure() -> StreamControlError {
        StreamControlError::DataSourceMissing(DataSourceError::Io {
            symbol: "TSLA".to_string(),
            message: "permission denied".to_string(),
        })
    }

    #[test_case(StreamControlError::AlreadyRunning { symbol: "AAPL".into() }, StatusCode::BAD_REQUEST ; "already running")]
    #[test_case(StreamControlError::NotRunning { symbol: "AAPL".into() }, StatusCode::BAD_REQUEST ; "not running")]
    #[test_case(not_found(), StatusCode::NOT_FOUND ; "missing data")]
    #[test_case(io_failure(), StatusCode::INTERNAL_SERVER_ERROR ; "unreadable data")]
    #[test_case(StreamControlError::Aborted { symbol: "AAPL".into() }, StatusCode::SERVICE_UNAVAILABLE ; "aborted")]
    fn rejection_status(error: StreamControlError, expected: StatusCode) {
        assert_eq!(CommandRejected(error).into_response().status(), expected);
    }
}
