//! Listener Registry
//!
//! Per-symbol sets of live listeners with fan-out delivery.
//!
//! # Delivery
//!
//! `broadcast` copies the listener set of a symbol under a short read
//! lock, releases it, then delivers to every listener in the copy
//! concurrently. Registrations made during delivery only see later
//! messages. Listeners whose delivery fails are removed once the whole
//! broadcast has completed; one failing listener never blocks the rest.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use parking_lot::RwLock;

use crate::application::ports::{Listener, ListenerId};
use crate::domain::market_data::Symbol;
use crate::domain::observation::ObservationMessage;
use crate::infrastructure::metrics;

/// Result of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Listeners that accepted the message.
    pub delivered: usize,
    /// Listeners that failed and were unregistered.
    pub pruned: usize,
}

impl BroadcastOutcome {
    const fn merge(self, other: Self) -> Self {
        Self {
            delivered: self.delivered + other.delivered,
            pruned: self.pruned + other.pruned,
        }
    }
}

/// Registry of listeners keyed by symbol.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<Symbol, Vec<Arc<dyn Listener>>>>,
    next_id: AtomicU64,
}

/// Shared listener registry reference.
pub type SharedListenerRegistry = Arc<ListenerRegistry>;

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("total_listeners", &self.total_listeners())
            .finish_non_exhaustive()
    }
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh listener id.
    pub fn next_listener_id(&self) -> ListenerId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Add `listener` to the set of `symbol`.
    ///
    /// Registering the same id twice for one symbol is a no-op.
    pub fn register(&self, symbol: &str, listener: Arc<dyn Listener>) {
        let mut listeners = self.listeners.write();
        let set = listeners.entry(symbol.to_string()).or_default();
        if set.iter().any(|l| l.id() == listener.id()) {
            return;
        }
        set.push(listener);
        drop(listeners);

        tracing::debug!(symbol, "Listener registered");
        metrics::set_listeners(self.total_listeners());
    }

    /// Remove the listener `id` from the set of `symbol`.
    ///
    /// Returns `false` if it was not registered. Safe to call repeatedly.
    pub fn unregister(&self, symbol: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(set) = listeners.get_mut(symbol) else {
            return false;
        };

        let before = set.len();
        set.retain(|l| l.id() != id);
        let removed = set.len() != before;

        if set.is_empty() {
            listeners.remove(symbol);
        }
        drop(listeners);

        if removed {
            tracing::debug!(symbol, listener_id = id, "Listener unregistered");
            metrics::set_listeners(self.total_listeners());
        }
        removed
    }

    /// Deliver `message` to every listener of `symbol`.
    ///
    /// With no listeners this is a no-op.
    pub async fn broadcast(&self, symbol: &str, message: &ObservationMessage) -> BroadcastOutcome {
        let targets = self
            .listeners
            .read()
            .get(symbol)
            .cloned()
            .unwrap_or_default();

        if targets.is_empty() {
            return BroadcastOutcome::default();
        }

        let results = join_all(targets.iter().map(|listener| async move {
            listener
                .deliver(message)
                .await
                .map_err(|e| (listener.id(), e))
        }))
        .await;

        let mut outcome = BroadcastOutcome::default();
        for result in results {
            match result {
                Ok(()) => outcome.delivered += 1,
                Err((id, e)) => {
                    tracing::warn!(symbol, listener_id = id, error = %e, "Listener send failed, removing");
                    if self.unregister(symbol, id) {
                        outcome.pruned += 1;
                    }
                }
            }
        }

        metrics::record_messages_sent(outcome.delivered);
        metrics::record_listeners_pruned(outcome.pruned);
        outcome
    }

    /// Deliver `message` to the listeners of every symbol.
    pub async fn broadcast_all(&self, message: &ObservationMessage) -> BroadcastOutcome {
        let symbols: Vec<Symbol> = self.listeners.read().keys().cloned().collect();

        let mut outcome = BroadcastOutcome::default();
        for symbol in symbols {
            outcome = outcome.merge(self.broadcast(&symbol, message).await);
        }
        outcome
    }

    /// Number of listeners of `symbol`.
    #[must_use]
    pub fn listener_count(&self, symbol: &str) -> usize {
        self.listeners.read().get(symbol).map_or(0, Vec::len)
    }

    /// Number of listeners across all symbols.
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }
}

// =============================================================================
// Tests
// =============================================================================
