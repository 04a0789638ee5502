//! Listener Port (Driven Port)
//!
//! A real-time sink owned by the connection layer. The listener registry
//! only borrows it for delivery.

use async_trait::async_trait;

use crate::domain::observation::ObservationMessage;

/// Unique identifier for a listener.
pub type ListenerId = u64;

/// Listener delivery error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ListenerError {
    /// The other end is gone.
    #[error("listener {0} is closed")]
    Closed(ListenerId),

    /// Delivery failed for another reason.
    #[error("delivery to listener {id} failed: {message}")]
    Send {
        /// Listener that failed.
        id: ListenerId,
        /// Error details.
        message: String,
    },
}

/// Port for a real-time message sink.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Identity used for registration and removal.
    fn id(&self) -> ListenerId;

    /// Deliver one message.
    async fn deliver(&self, message: &ObservationMessage) -> Result<(), ListenerError>;
}
