//! Channel-backed Listener
//!
//! Bridges the listener registry to a connection task: deliveries are
//! queued on a bounded channel that the connection drains. A listener whose
//! queue is full or whose receiver is gone fails delivery and is pruned by
//! the registry.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::application::ports::{Listener, ListenerError, ListenerId};
use crate::domain::observation::ObservationMessage;

/// Default queue depth per connection.
pub const DEFAULT_LISTENER_CAPACITY: usize = 256;

/// Listener that forwards messages into an `mpsc` channel.
#[derive(Debug)]
pub struct ChannelListener {
    id: ListenerId,
    tx: mpsc::Sender<ObservationMessage>,
}

impl ChannelListener {
    /// Create a listener and the receiver its connection drains.
    #[must_use]
    pub fn channel(id: ListenerId, capacity: usize) -> (Self, mpsc::Receiver<ObservationMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx }, rx)
    }
}

#[async_trait]
impl Listener for ChannelListener {
    fn id(&self) -> ListenerId {
        self.id
    }

    async fn deliver(&self, message: &ObservationMessage) -> Result<(), ListenerError> {
        self.tx.try_send(message.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => ListenerError::Closed(self.id),
            mpsc::error::TrySendError::Full(_) => ListenerError::Send {
                id: self.id,
                message: "queue full".to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_messages_in_order() {
        let (listener, mut rx) = ChannelListener::channel(1, 4);
        for reason in ["a", "b"] {
            listener
                .deliver(&ObservationMessage::stream_failed("AAPL", reason))
                .await
                .unwrap();
        }
        assert_eq!(rx.recv().await.unwrap().error(), Some("Streaming error: a"));
        assert_eq!(rx.recv().await.unwrap().error(), Some("Streaming error: b"));
    }

    #[tokio::test]
    async fn dropped_receiver_is_closed() {
        let (listener, rx) = ChannelListener::channel(7, 4);
        drop(rx);
        let err = listener
            .deliver(&ObservationMessage::greeting("AAPL"))
            .await
            .unwrap_err();
        assert!(matches!(err, ListenerError::Closed(7)));
    }

    #[tokio::test]
    async fn full_queue_fails_delivery() {
        let (listener, _rx) = ChannelListener::channel(3, 1);
        let msg = ObservationMessage::greeting("AAPL");
        listener.deliver(&msg).await.unwrap();
        assert!(matches!(
            listener.deliver(&msg).await,
            Err(ListenerError::Send { id: 3, .. })
        ));
    }
}
