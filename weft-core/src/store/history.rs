//! Undo/redo history.
//!
//! An [`UndoableStore`] wraps a [`Store`] and records a deep clone of the
//! whole state after every committed write, bounded by a configurable
//! limit (oldest entries evicted first). `undo` and `redo` move a cursor
//! through the recorded states and replace the live state wholesale, which
//! refreshes every materialized path signal in one batch.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::{Store, StoreOptions};

const DEFAULT_LIMIT: usize = 100;

struct History {
    /// Recorded states, oldest first. Always contains at least the
    /// initial state.
    entries: Vec<Value>,
    /// Index of the live state within `entries`.
    cursor: usize,
    limit: usize,
}

/// A store with bounded undo/redo history.
///
/// Dereferences to [`Store`], so paths, middleware, and persistence work
/// unchanged.
pub struct UndoableStore {
    store: Store,
    history: Arc<Mutex<History>>,
    /// Set while undo/redo replaces the state, so the replacement itself
    /// is not recorded as a new entry.
    restoring: Arc<AtomicBool>,
}

impl UndoableStore {
    /// Create an undoable store with the default history limit.
    pub fn new(initial: impl Into<Value>) -> Self {
        Self::with_limit(initial, DEFAULT_LIMIT)
    }

    /// Create an undoable store keeping at most `limit` recorded states.
    pub fn with_limit(initial: impl Into<Value>, limit: usize) -> Self {
        Self::build(Store::new(initial), limit)
    }

    /// Wrap a store constructed with explicit options.
    pub fn with_options(initial: impl Into<Value>, options: StoreOptions, limit: usize) -> Self {
        Self::build(Store::with_options(initial, options), limit)
    }

    fn build(store: Store, limit: usize) -> Self {
        let history = Arc::new(Mutex::new(History {
            entries: vec![store.snapshot()],
            cursor: 0,
            limit: limit.max(1),
        }));
        let restoring = Arc::new(AtomicBool::new(false));

        let history_clone = history.clone();
        let restoring_clone = restoring.clone();
        store.add_middleware(move |state, _path, _next, _prev| {
            if restoring_clone.load(Ordering::SeqCst) {
                return;
            }
            let mut history = history_clone.lock();
            let cursor = history.cursor;
            // A write after undos discards the redo tail.
            history.entries.truncate(cursor + 1);
            history.entries.push(state.clone());
            if history.entries.len() > history.limit {
                history.entries.remove(0);
            }
            history.cursor = history.entries.len() - 1;
        });

        Self {
            store,
            history,
            restoring,
        }
    }

    /// The wrapped store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn can_undo(&self) -> bool {
        self.history.lock().cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        let history = self.history.lock();
        history.cursor + 1 < history.entries.len()
    }

    /// Number of recorded states.
    pub fn history_len(&self) -> usize {
        self.history.lock().entries.len()
    }

    /// Step back to the previous recorded state. Returns false at the
    /// oldest entry.
    pub fn undo(&self) -> bool {
        let value = {
            let mut history = self.history.lock();
            if history.cursor == 0 {
                return false;
            }
            history.cursor -= 1;
            history.entries[history.cursor].clone()
        };
        self.restore(value);
        true
    }

    /// Step forward to the next recorded state. Returns false at the
    /// newest entry.
    pub fn redo(&self) -> bool {
        let value = {
            let mut history = self.history.lock();
            if history.cursor + 1 >= history.entries.len() {
                return false;
            }
            history.cursor += 1;
            history.entries[history.cursor].clone()
        };
        self.restore(value);
        true
    }

    fn restore(&self, value: Value) {
        self.restoring.store(true, Ordering::SeqCst);
        self.store.replace_state(value);
        self.restoring.store(false, Ordering::SeqCst);
    }
}

impl Deref for UndoableStore {
    type Target = Store;

    fn deref(&self) -> &Store {
        &self.store
    }
}

impl Clone for UndoableStore {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            history: self.history.clone(),
            restoring: self.restoring.clone(),
        }
    }
}

/// Create an undoable store with the default history limit.
pub fn create_undoable_store(initial: impl Into<Value>) -> UndoableStore {
    UndoableStore::new(initial)
}
