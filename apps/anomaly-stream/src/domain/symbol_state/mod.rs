//! Per-Symbol Stream State
//!
//! Tracks, for every symbol ever referenced, whether a stream currently
//! owns it, the read cursor into its tick series and the bounded rolling
//! window of recent feature vectors.
//!
//! # Design
//!
//! The outer map is only locked long enough to find or create the entry
//! for a symbol. Each entry has its own mutex, so operations on one
//! symbol are serialized while unrelated symbols never contend. No lock
//! is held across an `.await`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::domain::market_data::{FeatureVector, Symbol};

/// Default rolling window length.
pub const DEFAULT_WINDOW_SIZE: usize = 60;

// =============================================================================
// Symbol State
// =============================================================================

/// Mutable state of one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolState {
    streaming: bool,
    cursor: usize,
    window: VecDeque<FeatureVector>,
    capacity: usize,
}

impl SymbolState {
    fn new(capacity: usize) -> Self {
        Self {
            streaming: false,
            cursor: 0,
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn reset(&mut self) {
        self.streaming = false;
        self.cursor = 0;
        self.window.clear();
    }

    fn push(&mut self, features: FeatureVector) -> usize {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(features);
        self.window.len()
    }

    /// Whether a stream currently owns this symbol.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Index of the next tick to consume.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Current window contents, oldest first.
    #[must_use]
    pub const fn window(&self) -> &VecDeque<FeatureVector> {
        &self.window
    }

    /// Window capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

// =============================================================================
// Symbol State Store
// =============================================================================

/// Concurrent store of [`SymbolState`] keyed by symbol.
///
/// Entries are created on first reference and never removed; stopping a
/// stream resets its entry so the next start begins from a clean slate.
///
/// # Example
///
/// ```rust
/// use anomaly_stream::domain::symbol_state::SymbolStateStore;
///
/// let store = SymbolStateStore::new(2);
/// assert!(store.try_claim("AAPL"));
/// assert!(!store.try_claim("AAPL"));
///
/// store.append_to_window("AAPL", vec![1.0]);
/// store.append_to_window("AAPL", vec![2.0]);
/// store.append_to_window("AAPL", vec![3.0]);
/// assert_eq!(store.window_snapshot("AAPL"), vec![vec![2.0], vec![3.0]]);
///
/// store.reset("AAPL");
/// assert!(!store.is_streaming("AAPL"));
/// assert!(store.window_snapshot("AAPL").is_empty());
/// ```
#[derive(Debug)]
pub struct SymbolStateStore {
    window_size: usize,
    states: RwLock<HashMap<Symbol, Arc<Mutex<SymbolState>>>>,
}

impl Default for SymbolStateStore {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl SymbolStateStore {
    /// Create a store whose windows hold at most `window_size` entries.
    ///
    /// A zero size is clamped to one.
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Window capacity used for every symbol.
    #[must_use]
    pub const fn window_size(&self) -> usize {
        self.window_size
    }

    fn entry(&self, symbol: &str) -> Arc<Mutex<SymbolState>> {
        if let Some(state) = self.states.read().get(symbol) {
            return Arc::clone(state);
        }

        let mut states = self.states.write();
        Arc::clone(
            states
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SymbolState::new(self.window_size)))),
        )
    }

    fn with_state<R>(&self, symbol: &str, f: impl FnOnce(&mut SymbolState) -> R) -> R {
        let entry = self.entry(symbol);
        let mut state = entry.lock();
        f(&mut state)
    }

    /// Ensure state exists for `symbol` without altering an existing entry.
    pub fn initialize(&self, symbol: &str) {
        drop(self.entry(symbol));
    }

    /// Clear the flag, rewind the cursor and empty the window.
    pub fn reset(&self, symbol: &str) {
        self.with_state(symbol, SymbolState::reset);
    }

    /// Whether a stream currently owns `symbol`.
    #[must_use]
    pub fn is_streaming(&self, symbol: &str) -> bool {
        self.states
            .read()
            .get(symbol)
            .is_some_and(|state| state.lock().streaming)
    }

    /// Set the streaming flag.
    pub fn set_streaming(&self, symbol: &str, streaming: bool) {
        self.with_state(symbol, |state| state.streaming = streaming);
    }

    /// Atomically set the flag if it is clear.
    ///
    /// Returns `true` if the caller now owns the symbol.
    #[must_use]
    pub fn try_claim(&self, symbol: &str) -> bool {
        self.with_state(symbol, |state| {
            if state.streaming {
                false
            } else {
                state.streaming = true;
                true
            }
        })
    }

    /// Index of the next tick to consume.
    #[must_use]
    pub fn cursor(&self, symbol: &str) -> usize {
        self.states
            .read()
            .get(symbol)
            .map_or(0, |state| state.lock().cursor)
    }

    /// Advance the cursor by one and return its new value.
    pub fn increment_cursor(&self, symbol: &str) -> usize {
        self.with_state(symbol, |state| {
            state.cursor += 1;
            state.cursor
        })
    }

    /// Append to the window, evicting the oldest entry when full.
    ///
    /// Returns the window length after the append.
    pub fn append_to_window(&self, symbol: &str, features: FeatureVector) -> usize {
        self.with_state(symbol, |state| state.push(features))
    }

    /// Current window length.
    #[must_use]
    pub fn window_len(&self, symbol: &str) -> usize {
        self.states
            .read()
            .get(symbol)
            .map_or(0, |state| state.lock().window.len())
    }

    /// Copy of the window contents, oldest first.
    ///
    /// Later appends do not affect a returned snapshot.
    #[must_use]
    pub fn window_snapshot(&self, symbol: &str) -> Vec<FeatureVector> {
        self.states
            .read()
            .get(symbol)
            .map(|state| state.lock().window.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of the whole state of `symbol`, if it was ever referenced.
    #[must_use]
    pub fn snapshot(&self, symbol: &str) -> Option<SymbolState> {
        self.states
            .read()
            .get(symbol)
            .map(|state| state.lock().clone())
    }

    /// Symbols whose streaming flag is set.
    #[must_use]
    pub fn streaming_symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self
            .states
            .read()
            .iter()
            .filter(|(_, state)| state.lock().streaming)
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }
}

// =============================================================================
// Tests
// =============================================================================
