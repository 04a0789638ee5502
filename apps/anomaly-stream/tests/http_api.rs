//! HTTP API Integration Tests
//!
//! Exercises the REST surface through the router, backed by CSV tick
//! files in a temporary directory.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use anomaly_stream::{
    AnomalyLog, AnomalyRecord, AnomalyStore, AppState, BaselineScorer, CsvTickSource,
    InMemoryAnomalyStore, ListenerRegistry, StreamContext, StreamDriverConfig, StreamSupervisor,
    SymbolStateStore, create_router,
};

const AAPL_CSV: &str = "\
timestamp,open,high,low,close,volume
2024-01-02 09:30:00,185.1,185.4,184.9,185.2,12000
2024-01-02 09:31:00,185.2,185.6,185.0,185.5,9800
2024-01-02 09:32:00,185.5,185.9,185.3,185.8,11050
";

struct TestApp {
    router: Router,
    supervisor: Arc<StreamSupervisor>,
    store: Arc<InMemoryAnomalyStore>,
    _data_dir: TempDir,
}

fn setup() -> TestApp {
    let data_dir = TempDir::new().unwrap();
    let mut file = std::fs::File::create(data_dir.path().join("AAPL.csv")).unwrap();
    file.write_all(AAPL_CSV.as_bytes()).unwrap();

    let store = Arc::new(InMemoryAnomalyStore::new());
    let ctx = StreamContext {
        config: StreamDriverConfig {
            anomaly_threshold: 0.000_087,
            tick_interval: Duration::from_secs(60),
        },
        states: Arc::new(SymbolStateStore::new(2)),
        scorer: Arc::new(BaselineScorer::new(2, 5, None)),
        store: Arc::clone(&store) as Arc<dyn AnomalyStore>,
        listeners: Arc::new(ListenerRegistry::new()),
    };
    let supervisor = Arc::new(StreamSupervisor::new(
        ctx,
        Arc::new(CsvTickSource::new(data_dir.path())),
    ));

    let state = Arc::new(AppState::new(
        "test-0.0.1".to_string(),
        Arc::clone(&supervisor),
        AnomalyLog::new(Arc::clone(&store) as Arc<dyn AnomalyStore>, 15),
    ));
    let router = create_router(state, &["http://localhost:3000".to_string()]);

    TestApp {
        router,
        supervisor,
        store,
        _data_dir: data_dir,
    }
}

async fn send(router: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn start_and_stop_round_trip() {
    let app = setup();

    let (status, body) = send(&app.router, "POST", "/api/start/AAPL").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Stream started for AAPL" }));
    assert!(app.supervisor.is_running("AAPL"));

    let (status, body) = send(&app.router, "POST", "/api/start/AAPL").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "detail": "Stream already running." }));

    let (status, body) = send(&app.router, "POST", "/api/stop/AAPL").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Stream stopped for AAPL" }));
    assert!(!app.supervisor.is_running("AAPL"));

    let (status, body) = send(&app.router, "POST", "/api/stop/AAPL").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "detail": "No active stream to stop." }));
}

#[tokio::test]
async fn start_without_data_file_is_not_found() {
    let app = setup();

    let (status, body) = send(&app.router, "POST", "/api/start/MSFT").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("MSFT"));
    assert!(!app.supervisor.is_running("MSFT"));
    assert!(!app.supervisor.context().states.is_streaming("MSFT"));
}

#[tokio::test]
async fn path_traversal_symbol_is_not_found() {
    let app = setup();

    let (status, _) = send(&app.router, "POST", "/api/start/..%2FAAPL").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.supervisor.active_symbols().is_empty());
}

#[tokio::test]
async fn anomalies_are_listed_newest_first() {
    let app = setup();
    for (ts, score) in [("t1", 0.2), ("t3", 0.4), ("t2", 0.3)] {
        app.store
            .save(&AnomalyRecord::new("AAPL", ts, score))
            .await
            .unwrap();
    }

    let (status, body) = send(&app.router, "GET", "/api/anomalies/AAPL").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "anomalies": [
                { "timestamp": "t3", "score": 0.4 },
                { "timestamp": "t2", "score": 0.3 },
                { "timestamp": "t1", "score": 0.2 },
            ]
        })
    );

    let (status, body) = send(&app.router, "GET", "/api/anomalies/MSFT").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "anomalies": [] }));
}

#[tokio::test]
async fn start_clears_previous_anomalies() {
    let app = setup();
    app.store
        .save(&AnomalyRecord::new("AAPL", "stale", 1.0))
        .await
        .unwrap();

    let (status, _) = send(&app.router, "POST", "/api/start/AAPL").await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app.router, "GET", "/api/anomalies/AAPL").await;
    assert_eq!(body, json!({ "anomalies": [] }));

    app.supervisor.shutdown().await;
}

#[tokio::test]
async fn health_reports_active_streams() {
    let app = setup();
    send(&app.router, "POST", "/api/start/AAPL").await;

    let (status, body) = send(&app.router, "GET", "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "Backend is healthy");
    assert_eq!(body["version"], "test-0.0.1");
    assert_eq!(body["active_streams"], json!(["AAPL"]));
    assert_eq!(body["listeners"], 0);

    app.supervisor.shutdown().await;
}

#[tokio::test]
async fn liveness_probe_is_plain_ok() {
    let app = setup();

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"OK");
}
