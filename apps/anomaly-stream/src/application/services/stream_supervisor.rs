//! Stream Supervisor
//!
//! Owns the mapping from symbol to running stream task and guarantees at
//! most one stream per symbol.
//!
//! # Slot Lifecycle
//!
//! A symbol's slot is inserted under the registry lock before any I/O
//! happens, so two concurrent `start` calls can never both succeed. The
//! slot then moves `Starting -> Running -> Stopping` and is removed either
//! by `stop` or by the stream task itself when it ends naturally. Every
//! slot carries a run id so a late cleanup from an old run can never
//! remove the slot of a newer one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::{DataSourceError, TickSource};
use crate::application::services::stream_driver::{StreamContext, StreamDriver, StreamOutcome};
use crate::domain::market_data::Symbol;
use crate::infrastructure::metrics::{self, StoreOperation};

/// Stream command errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamControlError {
    /// A stream already owns the symbol.
    #[error("stream already running for {symbol}")]
    AlreadyRunning {
        /// Requested symbol.
        symbol: Symbol,
    },

    /// No stream owns the symbol.
    #[error("no active stream for {symbol}")]
    NotRunning {
        /// Requested symbol.
        symbol: Symbol,
    },

    /// The symbol's data could not be loaded; the stream never began.
    #[error(transparent)]
    DataSourceMissing(#[from] DataSourceError),

    /// The start was overtaken by a stop or by shutdown.
    #[error("start of stream {symbol} was aborted")]
    Aborted {
        /// Requested symbol.
        symbol: Symbol,
    },
}

enum Phase {
    Starting,
    Running(JoinHandle<StreamOutcome>),
    Stopping,
}

struct StreamSlot {
    run_id: Uuid,
    cancel: CancellationToken,
    phase: Phase,
}

type Slots = Arc<Mutex<HashMap<Symbol, StreamSlot>>>;

enum StopAction {
    Released,
    Await(JoinHandle<StreamOutcome>, Uuid),
}

/// Start/stop lifecycle manager for streams.
pub struct StreamSupervisor {
    ctx: StreamContext,
    source: Arc<dyn TickSource>,
    slots: Slots,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for StreamSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSupervisor")
            .field("source", &self.source.name())
            .field("active", &self.active_symbols())
            .finish_non_exhaustive()
    }
}

impl StreamSupervisor {
    /// Create a supervisor drawing ticks from `source`.
    #[must_use]
    pub fn new(ctx: StreamContext, source: Arc<dyn TickSource>) -> Self {
        Self {
            ctx,
            source,
            slots: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Shared collaborators of every stream.
    #[must_use]
    pub const fn context(&self) -> &StreamContext {
        &self.ctx
    }

    /// Start streaming `symbol`.
    ///
    /// Clears the symbol's stored anomalies, then spawns the driver and
    /// returns without waiting for any tick.
    ///
    /// # Errors
    ///
    /// - [`StreamControlError::AlreadyRunning`] if a stream owns the symbol
    /// - [`StreamControlError::DataSourceMissing`] if its data cannot be loaded
    /// - [`StreamControlError::Aborted`] if a stop or shutdown won the race
    pub async fn start(&self, symbol: &str) -> Result<(), StreamControlError> {
        if self.shutdown.is_cancelled() {
            return Err(StreamControlError::Aborted {
                symbol: symbol.to_string(),
            });
        }

        let run_id = Uuid::new_v4();
        let cancel = self.shutdown.child_token();
        {
            let mut slots = self.slots.lock();
            if slots.contains_key(symbol) || !self.ctx.states.try_claim(symbol) {
                return Err(StreamControlError::AlreadyRunning {
                    symbol: symbol.to_string(),
                });
            }
            slots.insert(
                symbol.to_string(),
                StreamSlot {
                    run_id,
                    cancel: cancel.clone(),
                    phase: Phase::Starting,
                },
            );
        }

        let series = match self.source.load(symbol).await {
            Ok(series) => series,
            Err(e) => {
                tracing::warn!(symbol, source = self.source.name(), error = %e, "Failed to load stream data");
                self.release(symbol, run_id);
                return Err(e.into());
            }
        };

        match self.ctx.store.truncate(symbol).await {
            Ok(removed) => tracing::debug!(symbol, removed, "Cleared stored anomalies"),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Failed to clear stored anomalies");
                metrics::record_persistence_error(StoreOperation::Truncate);
            }
        }

        let driver = StreamDriver::new(symbol, series, self.ctx.clone(), cancel.clone());

        let mut slots = self.slots.lock();
        let Some(slot) = slots
            .get_mut(symbol)
            .filter(|slot| slot.run_id == run_id && !cancel.is_cancelled())
        else {
            drop(slots);
            self.release(symbol, run_id);
            return Err(StreamControlError::Aborted {
                symbol: symbol.to_string(),
            });
        };

        let deregistration = DeregisterOnExit {
            slots: Arc::clone(&self.slots),
            symbol: symbol.to_string(),
            run_id,
        };
        slot.phase = Phase::Running(tokio::spawn(async move {
            let _deregistration = deregistration;
            driver.run().await
        }));
        let active = slots.len();
        drop(slots);

        metrics::set_active_streams(active);
        tracing::info!(symbol, %run_id, "Stream task spawned");
        Ok(())
    }

    /// Stop streaming `symbol` and wait for its task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`StreamControlError::NotRunning`] if no stream owns the
    /// symbol or it is already being stopped.
    pub async fn stop(&self, symbol: &str) -> Result<(), StreamControlError> {
        let action = {
            let mut slots = self.slots.lock();
            let Some(slot) = slots.get_mut(symbol) else {
                return Err(StreamControlError::NotRunning {
                    symbol: symbol.to_string(),
                });
            };

            match std::mem::replace(&mut slot.phase, Phase::Stopping) {
                Phase::Stopping => {
                    return Err(StreamControlError::NotRunning {
                        symbol: symbol.to_string(),
                    });
                }
                Phase::Starting => {
                    slot.cancel.cancel();
                    slots.remove(symbol);
                    StopAction::Released
                }
                Phase::Running(handle) => {
                    self.ctx.states.set_streaming(symbol, false);
                    slot.cancel.cancel();
                    StopAction::Await(handle, slot.run_id)
                }
            }
        };

        match action {
            StopAction::Released => {
                self.ctx.states.reset(symbol);
                tracing::info!(symbol, "Stream stopped before it began");
            }
            StopAction::Await(handle, run_id) => {
                match handle.await {
                    Ok(outcome) => tracing::info!(symbol, outcome = ?outcome, "Stream stopped"),
                    Err(e) => {
                        tracing::warn!(symbol, error = %e, "Stream task did not finish cleanly");
                        self.ctx.states.reset(symbol);
                    }
                }
                deregister(&self.slots, symbol, run_id);
            }
        }
        Ok(())
    }

    /// Stop every stream and refuse further starts.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let symbols: Vec<Symbol> = self.slots.lock().keys().cloned().collect();
        tracing::info!(streams = symbols.len(), "Stopping all streams");

        for symbol in symbols {
            if let Err(e) = self.stop(&symbol).await {
                tracing::debug!(symbol = %symbol, error = %e, "Stream already gone at shutdown");
            }
        }
    }

    /// Whether a stream task is registered for `symbol`.
    #[must_use]
    pub fn is_running(&self, symbol: &str) -> bool {
        self.slots.lock().contains_key(symbol)
    }

    /// Symbols with a registered stream task, sorted.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.slots.lock().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Undo a claim made by `start` that never reached a running task.
    fn release(&self, symbol: &str, run_id: Uuid) {
        let mut slots = self.slots.lock();
        if slots.get(symbol).is_some_and(|slot| slot.run_id == run_id) {
            slots.remove(symbol);
            drop(slots);
            self.ctx.states.reset(symbol);
        }
    }
}

/// Removes a run's slot when its task ends, however it ends.
struct DeregisterOnExit {
    slots: Slots,
    symbol: Symbol,
    run_id: Uuid,
}

impl Drop for DeregisterOnExit {
    fn drop(&mut self) {
        deregister(&self.slots, &self.symbol, self.run_id);
    }
}

fn deregister(slots: &Mutex<HashMap<Symbol, StreamSlot>>, symbol: &str, run_id: Uuid) {
    let mut slots = slots.lock();
    if slots.get(symbol).is_some_and(|slot| slot.run_id == run_id) {
        slots.remove(symbol);
    }
    let active = slots.len();
    drop(slots);
    metrics::set_active_streams(active);
}

// =============================================================================
// Tests
// =============================================================================
