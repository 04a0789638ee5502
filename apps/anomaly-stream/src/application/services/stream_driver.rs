//! Stream Driver
//!
//! The per-tick control loop of one running stream. A driver owns its
//! symbol from the moment it starts until it returns; the symbol's state
//! is reset on every exit path, including the task being dropped.
//!
//! # Lifecycle
//!
//! ```text
//! STARTING -> RUNNING -> COMPLETED | STOPPED | FAILED -> cleanup
//! ```
//!
//! Each iteration of RUNNING consumes exactly one tick. Short or
//! malformed ticks are skipped without emitting anything. Scorer failures
//! are reported to listeners and the stream continues. Anomaly store
//! failures are only logged. A panic in any collaborator ends the stream
//! as FAILED after a best-effort error broadcast.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::StreamSettings;
use crate::application::ports::{AnomalyStore, Scorer};
use crate::application::services::listener_registry::SharedListenerRegistry;
use crate::domain::market_data::{Symbol, Tick, TickSeries};
use crate::domain::observation::{
    AnomalyRecord, DEFAULT_ANOMALY_THRESHOLD, ObservationMessage, is_anomaly,
};
use crate::domain::symbol_state::SymbolStateStore;
use crate::infrastructure::metrics::{self, StoreOperation};

// =============================================================================
// Configuration
// =============================================================================

/// Tunables of the control loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamDriverConfig {
    /// Scores strictly above this are anomalies.
    pub anomaly_threshold: f64,
    /// Pause between ticks.
    pub tick_interval: Duration,
}

impl Default for StreamDriverConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl From<StreamSettings> for StreamDriverConfig {
    fn from(settings: StreamSettings) -> Self {
        Self {
            anomaly_threshold: settings.anomaly_threshold,
            tick_interval: settings.tick_interval,
        }
    }
}

/// Collaborators shared by every stream.
#[derive(Clone)]
pub struct StreamContext {
    /// Loop tunables.
    pub config: StreamDriverConfig,
    /// Per-symbol state.
    pub states: Arc<SymbolStateStore>,
    /// Window scorer.
    pub scorer: Arc<dyn Scorer>,
    /// Anomaly store.
    pub store: Arc<dyn AnomalyStore>,
    /// Listener fan-out.
    pub listeners: SharedListenerRegistry,
}

impl std::fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamContext")
            .field("config", &self.config)
            .field("window_size", &self.states.window_size())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Every tick was consumed.
    Completed,
    /// The stream was cancelled or its flag was cleared.
    Stopped,
    /// An unexpected error ended the stream.
    Failed(String),
}

/// Unexpected errors that end a stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamFatal {
    /// A collaborator panicked while the stream was running.
    #[error("stream task panicked: {message}")]
    Panicked {
        /// Panic payload text.
        message: String,
    },
}

impl StreamFatal {
    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self::Panicked { message }
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Resets the symbol's state when dropped.
struct ResetOnExit {
    symbol: Symbol,
    states: Arc<SymbolStateStore>,
}

impl Drop for ResetOnExit {
    fn drop(&mut self) {
        self.states.reset(&self.symbol);
    }
}

/// The control loop of one stream.
pub struct StreamDriver {
    symbol: Symbol,
    series: Arc<TickSeries>,
    ctx: StreamContext,
    cancel: CancellationToken,
}

impl std::fmt::Debug for StreamDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDriver")
            .field("symbol", &self.symbol)
            .field("ticks", &self.series.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl StreamDriver {
    /// Create a driver replaying `series` for `symbol`.
    #[must_use]
    pub fn new(
        symbol: impl Into<Symbol>,
        series: Arc<TickSeries>,
        ctx: StreamContext,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            series,
            ctx,
            cancel,
        }
    }

    /// Run until the data is exhausted, the stream is stopped or fails.
    pub async fn run(self) -> StreamOutcome {
        let _reset = ResetOnExit {
            symbol: self.symbol.clone(),
            states: Arc::clone(&self.ctx.states),
        };

        self.ctx.states.initialize(&self.symbol);
        self.ctx.states.set_streaming(&self.symbol, true);
        tracing::info!(symbol = %self.symbol, ticks = self.series.len(), "Stream started");

        let outcome = match AssertUnwindSafe(self.drive()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let fatal = StreamFatal::from_panic(payload.as_ref());
                tracing::error!(symbol = %self.symbol, error = %fatal, "Stream failed");
                let message = ObservationMessage::stream_failed(&self.symbol, &fatal.to_string());
                self.ctx.listeners.broadcast(&self.symbol, &message).await;
                StreamOutcome::Failed(fatal.to_string())
            }
        };

        tracing::info!(symbol = %self.symbol, outcome = ?outcome, "Stream ended");
        outcome
    }

    async fn drive(&self) -> StreamOutcome {
        let symbol = self.symbol.as_str();
        let states = &self.ctx.states;

        loop {
            if self.cancel.is_cancelled() || !states.is_streaming(symbol) {
                return StreamOutcome::Stopped;
            }

            let cursor = states.cursor(symbol);
            let Some(tick) = self.series.get(cursor) else {
                states.set_streaming(symbol, false);
                return StreamOutcome::Completed;
            };

            let features = match tick.feature_vector() {
                Ok(features) => features,
                Err(reason) => {
                    tracing::warn!(symbol, cursor, reason = %reason, "Skipping tick");
                    metrics::record_row_skipped(symbol);
                    states.increment_cursor(symbol);
                    continue;
                }
            };

            let window_len = states.append_to_window(symbol, features);
            states.increment_cursor(symbol);
            metrics::record_tick_processed(symbol);

            let message = if window_len == states.window_size() {
                self.score_window(tick).await
            } else {
                self.observation(tick, false, None)
            };

            self.ctx.listeners.broadcast(symbol, &message).await;

            if !self.pause().await {
                return StreamOutcome::Stopped;
            }
        }
    }

    async fn score_window(&self, tick: &Tick) -> ObservationMessage {
        let symbol = self.symbol.as_str();
        let window = self.ctx.states.window_snapshot(symbol);

        let started = Instant::now();
        let result = self.ctx.scorer.score(&window).await;
        metrics::record_scoring_duration(started.elapsed());

        match result {
            Ok(score) => {
                let anomaly = is_anomaly(score, self.ctx.config.anomaly_threshold);
                tracing::debug!(symbol, timestamp = tick.timestamp(), score, anomaly, "Window scored");
                if anomaly {
                    self.persist(tick, score).await;
                }
                self.observation(tick, anomaly, Some(score))
            }
            Err(e) => {
                tracing::error!(symbol, timestamp = tick.timestamp(), error = %e, "Scoring failed");
                metrics::record_scoring_error(symbol);
                ObservationMessage::scoring_failed(
                    symbol,
                    tick.timestamp().unwrap_or_default(),
                    tick.raw_data(self.series.columns()),
                    &e.to_string(),
                )
            }
        }
    }

    async fn persist(&self, tick: &Tick, score: f64) {
        let record = AnomalyRecord::new(
            self.symbol.as_str(),
            tick.timestamp().unwrap_or_default(),
            score,
        );
        metrics::record_anomaly(&self.symbol);

        if let Err(e) = self.ctx.store.save(&record).await {
            tracing::warn!(
                symbol = %self.symbol,
                timestamp = %record.timestamp,
                error = %e,
                "Failed to save anomaly"
            );
            metrics::record_persistence_error(StoreOperation::Save);
        }
    }

    fn observation(&self, tick: &Tick, anomaly: bool, score: Option<f64>) -> ObservationMessage {
        ObservationMessage::observation(
            &self.symbol,
            tick.timestamp().unwrap_or_default(),
            tick.raw_data(self.series.columns()),
            anomaly,
            score,
        )
    }

    /// Sleep one tick interval. Returns `false` if cancelled meanwhile.
    async fn pause(&self) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(self.ctx.config.tick_interval) => true,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use mockall::Sequence;

    use super::*;
    use crate::application::ports::{
        MockAnomalyStore, MockScorer, PersistenceError, ScoringError,
    };
    use crate::application::services::listener_registry::ListenerRegistry;
    use crate::application::services::test_support::{PanickingScorer, RecordingListener};

    const SYMBOL: &str = "AAPL";

    fn series(rows: &[&[&str]]) -> Arc<TickSeries> {
        let columns = ["timestamp", "open", "close"]
            .iter()
            .map(ToString::to_string)
            .collect();
        Arc::new(TickSeries::new(
            columns,
            rows.iter().map(|r| Tick::from_cells(r)).collect(),
        ))
    }

    fn three_rows() -> Arc<TickSeries> {
        series(&[&["t0", "1", "2"], &["t1", "3", "4"], &["t2", "5", "6"]])
    }

    struct Harness {
        ctx: StreamContext,
        listener: Arc<RecordingListener>,
    }

    fn harness(window: usize, scorer: MockScorer, store: MockAnomalyStore) -> Harness {
        let listeners = Arc::new(ListenerRegistry::new());
        let listener = RecordingListener::new(1);
        listeners.register(SYMBOL, listener.clone());

        Harness {
            ctx: StreamContext {
                config: StreamDriverConfig {
                    anomaly_threshold: 0.000_05,
                    tick_interval: Duration::from_secs(1),
                },
                states: Arc::new(SymbolStateStore::new(window)),
                scorer: Arc::new(scorer),
                store: Arc::new(store),
                listeners,
            },
            listener,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scores_every_full_window_and_persists_anomalies() {
        let mut scorer = MockScorer::new();
        scorer
            .expect_score()
            .withf(|window| window.len() == 2)
            .times(2)
            .returning(|_| Ok(0.0001));

        let mut store = MockAnomalyStore::new();
        let mut seq = Sequence::new();
        for ts in ["t1", "t2"] {
            store
                .expect_save()
                .withf(move |r| r.symbol == SYMBOL && r.timestamp == ts)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let h = harness(2, scorer, store);
        let driver = StreamDriver::new(SYMBOL, three_rows(), h.ctx.clone(), CancellationToken::new());

        assert_eq!(driver.run().await, StreamOutcome::Completed);

        let received = h.listener.messages();
        let flags: Vec<(bool, Option<f64>)> =
            received.iter().map(|m| (m.is_anomaly(), m.score())).collect();
        assert_eq!(
            flags,
            vec![(false, None), (true, Some(0.0001)), (true, Some(0.0001))]
        );
        assert!(!h.ctx.states.is_streaming(SYMBOL));
    }

    #[tokio::test(start_paused = true)]
    async fn below_threshold_is_not_persisted() {
        let mut scorer = MockScorer::new();
        scorer.expect_score().returning(|_| Ok(0.000_01));
        let mut store = MockAnomalyStore::new();
        store.expect_save().never();

        let h = harness(1, scorer, store);
        let driver = StreamDriver::new(SYMBOL, three_rows(), h.ctx.clone(), CancellationToken::new());

        assert_eq!(driver.run().await, StreamOutcome::Completed);
        assert!(h.listener.messages().iter().all(|m| !m.is_anomaly()));
        assert_eq!(h.listener.messages().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_ticks_are_skipped_silently() {
        let mut scorer = MockScorer::new();
        scorer.expect_score().never();

        let h = harness(10, scorer, MockAnomalyStore::new());
        let rows = series(&[
            &["t0", "1", "2"],
            &["t1"],
            &["t2", "oops", "2"],
            &["t3", "5", "6"],
        ]);
        let driver = StreamDriver::new(SYMBOL, rows, h.ctx.clone(), CancellationToken::new());

        assert_eq!(driver.run().await, StreamOutcome::Completed);

        let timestamps: Vec<_> = h
            .listener
            .messages()
            .iter()
            .filter_map(|m| m.timestamp().map(ToString::to_string))
            .collect();
        assert_eq!(timestamps, vec!["t0", "t3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn scoring_failure_is_reported_and_stream_continues() {
        let mut scorer = MockScorer::new();
        let mut seq = Sequence::new();
        scorer
            .expect_score()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ScoringError::Internal("model offline".to_string())));
        scorer
            .expect_score()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(0.0));

        let h = harness(1, scorer, MockAnomalyStore::new());
        let driver = StreamDriver::new(SYMBOL, three_rows(), h.ctx.clone(), CancellationToken::new());

        assert_eq!(driver.run().await, StreamOutcome::Completed);

        let received = h.listener.messages();
        assert_eq!(received.len(), 3);
        assert_eq!(
            received[0].error(),
            Some("Model prediction failed: model offline")
        );
        assert_eq!(received[0].timestamp(), Some("t0"));
        assert_eq!(received[1].score(), Some(0.0));
        assert_eq!(received[2].score(), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_is_swallowed() {
        let mut scorer = MockScorer::new();
        scorer.expect_score().returning(|_| Ok(1.0));
        let mut store = MockAnomalyStore::new();
        store
            .expect_save()
            .times(3)
            .returning(|_| Err(PersistenceError::Connection("refused".to_string())));

        let h = harness(1, scorer, store);
        let driver = StreamDriver::new(SYMBOL, three_rows(), h.ctx.clone(), CancellationToken::new());

        assert_eq!(driver.run().await, StreamOutcome::Completed);
        assert_eq!(h.listener.messages().len(), 3);
        assert!(h.listener.messages().iter().all(ObservationMessage::is_anomaly));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_scorer_fails_the_stream() {
        let mut h = harness(1, MockScorer::new(), MockAnomalyStore::new());
        h.ctx.scorer = Arc::new(PanickingScorer);
        let driver = StreamDriver::new(SYMBOL, three_rows(), h.ctx.clone(), CancellationToken::new());

        assert_eq!(
            driver.run().await,
            StreamOutcome::Failed("stream task panicked: model exploded".to_string())
        );

        let received = h.listener.messages();
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0].error(),
            Some("Streaming error: stream task panicked: model exploded")
        );
        assert_eq!(received[0].timestamp(), None);
        assert!(matches!(
            &received[0],
            ObservationMessage::Error { data: None, .. }
        ));

        let state = h.ctx.states.snapshot(SYMBOL).unwrap();
        assert!(!state.is_streaming());
        assert_eq!(state.cursor(), 0);
        assert!(state.window().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_sleep_stops_and_resets() {
        let h = harness(10, MockScorer::new(), MockAnomalyStore::new());
        let cancel = CancellationToken::new();
        let driver = StreamDriver::new(SYMBOL, three_rows(), h.ctx.clone(), cancel.clone());

        let handle = tokio::spawn(driver.run());
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), StreamOutcome::Stopped);
        assert_eq!(h.listener.messages().len(), 2);

        let state = h.ctx.states.snapshot(SYMBOL).unwrap();
        assert!(!state.is_streaming());
        assert_eq!(state.cursor(), 0);
        assert!(state.window().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_flag_stops_at_next_iteration() {
        let h = harness(10, MockScorer::new(), MockAnomalyStore::new());
        let driver = StreamDriver::new(SYMBOL, three_rows(), h.ctx.clone(), CancellationToken::new());

        let handle = tokio::spawn(driver.run());
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.ctx.states.set_streaming(SYMBOL, false);

        assert_eq!(handle.await.unwrap(), StreamOutcome::Stopped);
        assert_eq!(h.listener.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_task_still_resets_state() {
        let h = harness(10, MockScorer::new(), MockAnomalyStore::new());
        let driver = StreamDriver::new(SYMBOL, three_rows(), h.ctx.clone(), CancellationToken::new());

        let handle = tokio::spawn(driver.run());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(h.ctx.states.is_streaming(SYMBOL));

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert!(!h.ctx.states.is_streaming(SYMBOL));
        assert_eq!(h.ctx.states.cursor(SYMBOL), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_series_completes_immediately() {
        let h = harness(2, MockScorer::new(), MockAnomalyStore::new());
        let driver = StreamDriver::new(
            SYMBOL,
            Arc::new(TickSeries::default()),
            h.ctx.clone(),
            CancellationToken::new(),
        );

        assert_eq!(driver.run().await, StreamOutcome::Completed);
        assert!(h.listener.messages().is_empty());
    }

    #[test]
    fn config_from_settings() {
        let settings = StreamSettings {
            anomaly_threshold: 0.5,
            tick_interval: Duration::from_millis(10),
            ..StreamSettings::default()
        };
        let config = StreamDriverConfig::from(settings);
        assert!((config.anomaly_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.tick_interval, Duration::from_millis(10));
    }
}
