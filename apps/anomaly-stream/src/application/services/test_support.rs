//! In-process fakes shared by service tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{Listener, ListenerError, ListenerId, Scorer, ScoringError};
use crate::domain::market_data::FeatureVector;
use crate::domain::observation::ObservationMessage;

/// Listener that records every message, or fails every delivery.
pub struct RecordingListener {
    id: ListenerId,
    fail: bool,
    received: Mutex<Vec<ObservationMessage>>,
}

impl RecordingListener {
    pub fn new(id: ListenerId) -> Arc<Self> {
        Arc::new(Self {
            id,
            fail: false,
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(id: ListenerId) -> Arc<Self> {
        Arc::new(Self {
            id,
            fail: true,
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn messages(&self) -> Vec<ObservationMessage> {
        self.received.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.received.lock().len()
    }
}

#[async_trait]
impl Listener for RecordingListener {
    fn id(&self) -> ListenerId {
        self.id
    }

    async fn deliver(&self, message: &ObservationMessage) -> Result<(), ListenerError> {
        if self.fail {
            return Err(ListenerError::Closed(self.id));
        }
        self.received.lock().push(message.clone());
        Ok(())
    }
}

/// Scorer that panics on every call.
pub struct PanickingScorer;

#[async_trait]
impl Scorer for PanickingScorer {
    async fn score(&self, _window: &[FeatureVector]) -> Result<f64, ScoringError> {
        panic!("model exploded")
    }
}
