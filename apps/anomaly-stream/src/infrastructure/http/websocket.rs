//! WebSocket feed.
//!
//! Each connection registers a channel-backed listener for its symbol,
//! greets the client and forwards every broadcast until either side goes
//! away. The listener is unregistered on every exit path.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};

use super::AppState;
use crate::application::ports::ListenerId;
use crate::application::services::SharedListenerRegistry;
use crate::domain::observation::ObservationMessage;
use crate::infrastructure::listener::{ChannelListener, DEFAULT_LISTENER_CAPACITY};

pub(super) async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, symbol, state))
}

/// Unregisters the connection's listener when dropped.
struct Registration {
    registry: SharedListenerRegistry,
    symbol: String,
    id: ListenerId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.symbol, self.id);
    }
}

async fn serve_connection(socket: WebSocket, symbol: String, state: Arc<AppState>) {
    let registry = Arc::clone(&state.listeners);
    let id = registry.next_listener_id();
    let (listener, mut rx) = ChannelListener::channel(id, DEFAULT_LISTENER_CAPACITY);
    registry.register(&symbol, Arc::new(listener));
    let _registration = Registration {
        registry,
        symbol: symbol.clone(),
        id,
    };

    tracing::info!(symbol = %symbol, listener_id = id, "WebSocket connected");

    let (mut sink, mut inbound) = socket.split();
    if let Err(e) = send(&mut sink, &ObservationMessage::greeting(&symbol)).await {
        tracing::warn!(symbol = %symbol, listener_id = id, error = %e, "Failed to greet client");
        return;
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(message) = outbound else {
                    // Pruned by the registry after a failed delivery.
                    break;
                };
                if let Err(e) = send(&mut sink, &message).await {
                    tracing::debug!(symbol = %symbol, listener_id = id, error = %e, "WebSocket send failed");
                    break;
                }
            }
            received = inbound.next() => match received {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!(symbol = %symbol, listener_id = id, "WebSocket disconnected");
}

async fn send(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &ObservationMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).map_err(axum::Error::new)?;
    sink.send(Message::Text(text.into())).await
}
