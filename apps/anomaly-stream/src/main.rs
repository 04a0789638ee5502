//! Anomaly Stream Binary
//!
//! Starts the REST/WebSocket service that replays tick data and scores it.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin anomaly-stream
//! ```
//!
//! # Environment Variables
//!
//! - `ANOMALY_DATA_DIR`: Directory with `<SYMBOL>.csv` files (default: data)
//! - `ANOMALY_WINDOW_SIZE`: Rolling window length (default: 60)
//! - `ANOMALY_THRESHOLD`: Anomaly threshold (default: 0.000087)
//! - `ANOMALY_TICK_INTERVAL_MS`: Pause between ticks (default: 1000)
//! - `ANOMALY_FEATURE_DIM`: Features per tick (default: 5)
//! - `ANOMALY_SCALER_PATH`: JSON feature scaler (optional)
//! - `ANOMALY_RECENT_LIMIT`: Anomalies per query (default: 15)
//! - `DATABASE_URL`: PostgreSQL URL; in-memory store when unset
//! - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 5)
//! - `ANOMALY_HTTP_PORT`: HTTP port (default: 8000)
//! - `ANOMALY_CORS_ORIGINS`: Comma separated allowed origins
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: anomaly-stream)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anomaly_stream::application::ports::{AnomalyStore, Scorer};
use anomaly_stream::infrastructure::telemetry;
use anomaly_stream::{
    AnomalyLog, AppConfig, AppState, BaselineScorer, CsvTickSource, FeatureScaler, HttpServer,
    InMemoryAnomalyStore, ListenerRegistry, PostgresAnomalyStore, StreamContext,
    StreamDriverConfig, StreamSupervisor, SymbolStateStore, create_router, init_metrics,
};
use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting anomaly stream service");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = AppConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // The scorer must be ready before any stream can start
    let scaler = config
        .scoring
        .scaler_path
        .as_deref()
        .map(|path| FeatureScaler::load(path, config.scoring.feature_dim))
        .transpose()
        .context("failed to load feature scaler")?;
    let scorer: Arc<dyn Scorer> = Arc::new(BaselineScorer::new(
        config.stream.window_size,
        config.scoring.feature_dim,
        scaler,
    ));

    let store: Arc<dyn AnomalyStore> = match &config.persistence.database_url {
        Some(url) => Arc::new(
            PostgresAnomalyStore::connect(url, config.persistence.max_connections)
                .await
                .context("failed to connect anomaly store")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, anomalies are kept in memory only");
            Arc::new(InMemoryAnomalyStore::new())
        }
    };

    let ctx = StreamContext {
        config: StreamDriverConfig::from(config.stream.clone()),
        states: Arc::new(SymbolStateStore::new(config.stream.window_size)),
        scorer,
        store: Arc::clone(&store),
        listeners: Arc::new(ListenerRegistry::new()),
    };
    let source = Arc::new(CsvTickSource::new(config.data.data_dir.clone()));
    let supervisor = Arc::new(StreamSupervisor::new(ctx, source));

    let state = Arc::new(AppState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&supervisor),
        AnomalyLog::new(store, config.stream.recent_limit),
    ));
    let router = create_router(state, &config.server.cors_origins);
    let http_server = HttpServer::new(config.server.http_port, router, shutdown_token.clone());

    let server_task = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Anomaly stream service ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        supervisor.shutdown().await;
        let _ = server_task.await;
    })
    .await
    .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Graceful shutdown timed out"
        );
    }

    tracing::info!("Anomaly stream service stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &AppConfig) {
    tracing::info!(
        data_dir = %config.data.data_dir.display(),
        window_size = config.stream.window_size,
        threshold = config.stream.anomaly_threshold,
        tick_interval_ms = u64::try_from(config.stream.tick_interval.as_millis()).unwrap_or(u64::MAX),
        feature_dim = config.scoring.feature_dim,
        http_port = config.server.http_port,
        persistent_store = config.persistence.database_url.is_some(),
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
