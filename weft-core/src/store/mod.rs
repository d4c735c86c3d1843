//! Deep Reactive Store
//!
//! A store holds a JSON-like state tree and materializes one signal per
//! accessed path, lazily. Reading through a [`StoreHandle`] registers the
//! path's signal as a dependency exactly like a plain signal read; a write
//! at path `p` refreshes, inside one batch, the signal at `p`, every
//! ancestor path (the containing object changed), and every descendant
//! path (the value beneath `p` may have changed).
//!
//! # Addressing
//!
//! Paths are explicit cursors instead of property interception:
//!
//! ```rust,ignore
//! let store = Store::new(json!({"user": {"name": "A"}}));
//! let name = store.at("user").at("name");
//!
//! name.get();                 // tracked read
//! name.set(json!("B"));       // notifies user.name, user, and the root
//! ```
//!
//! # Middleware and persistence
//!
//! Registered middleware callbacks run synchronously on every committed
//! write, in registration order, before any notification. Persistence (see
//! [`persist`]) and undo/redo history (see [`history`]) are layered on top
//! of the same hooks.

mod history;
mod path;
mod persist;

pub use history::{create_undoable_store, UndoableStore};
pub use path::{Path, Segment};
pub use persist::{MemoryBackend, PersistOptions, StorageBackend, StorageError};

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;

use crate::reactive::{batch, Signal, Subscription};
use persist::Persistor;

/// Failure of a typed store accessor.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("value at `{path}` does not deserialize: {source}")]
    Deserialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("value does not serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

type Middleware = Arc<dyn Fn(&Value, &Path, &Value, &Value) + Send + Sync>;

/// Options for store construction.
#[derive(Default)]
pub struct StoreOptions {
    /// Persist state to a storage backend on every write.
    pub persist: Option<PersistOptions>,
}

/// A deep reactive store over a JSON-like state tree.
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: RwLock<Value>,
    /// Lazily materialized per-path signals, in creation order.
    signals: RwLock<IndexMap<Path, Signal<Value>>>,
    middleware: RwLock<Vec<Middleware>>,
    persistor: Option<Persistor>,
}

impl Store {
    /// Create a store over the given initial state.
    pub fn new(initial: impl Into<Value>) -> Self {
        Self::with_options(initial, StoreOptions::default())
    }

    /// Create a store with explicit options.
    ///
    /// With persistence configured, an existing parseable blob is merged
    /// over the initial state before the store is constructed.
    pub fn with_options(initial: impl Into<Value>, options: StoreOptions) -> Self {
        let mut initial = initial.into();
        let persistor = options.persist.map(|persist_options| {
            initial = Persistor::load_initial(&persist_options, std::mem::take(&mut initial));
            Persistor::new(persist_options)
        });
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(initial),
                signals: RwLock::new(IndexMap::new()),
                middleware: RwLock::new(Vec::new()),
                persistor,
            }),
        }
    }

    /// Cursor at the root of the state tree.
    pub fn root(&self) -> StoreHandle {
        StoreHandle {
            store: self.clone(),
            path: Path::root(),
        }
    }

    /// Cursor at a top-level key.
    pub fn at(&self, key: impl Into<String>) -> StoreHandle {
        self.root().at(key)
    }

    /// Cursor at an arbitrary path.
    pub fn at_path(&self, path: impl Into<Path>) -> StoreHandle {
        StoreHandle {
            store: self.clone(),
            path: path.into(),
        }
    }

    /// The whole state. Tracked: any write re-triggers the reader.
    pub fn get(&self) -> Value {
        self.root().get()
    }

    /// Untracked clone of the whole state.
    pub fn snapshot(&self) -> Value {
        self.inner.state.read().clone()
    }

    /// Register a middleware callback invoked as
    /// `(state, path, new_value, prev_value)` on every committed write,
    /// before notification.
    pub fn add_middleware(&self, f: impl Fn(&Value, &Path, &Value, &Value) + Send + Sync + 'static) {
        self.inner.middleware.write().push(Arc::new(f));
    }

    /// Replace the whole state and refresh every materialized path signal.
    ///
    /// Used for bulk assignment (undo/redo); middleware does not run.
    pub(crate) fn replace_state(&self, state: Value) {
        {
            let mut guard = self.inner.state.write();
            *guard = state;
        }
        let snapshot = self.snapshot();
        let targets: Vec<(Path, Signal<Value>)> = self
            .inner
            .signals
            .read()
            .iter()
            .map(|(p, s)| (p.clone(), s.clone()))
            .collect();
        batch(|| {
            for (path, signal) in targets {
                let value = value_at(&snapshot, &path).cloned().unwrap_or(Value::Null);
                signal.force_set(value);
            }
        });
        if let Some(persistor) = &self.inner.persistor {
            persistor.touch(&snapshot);
        }
    }

    /// Get (creating if absent) the signal for a path. Idempotent: the
    /// same path always yields the same signal.
    fn signal_at(&self, path: &Path) -> Signal<Value> {
        if let Some(signal) = self.inner.signals.read().get(path) {
            return signal.clone();
        }
        let initial = {
            let state = self.inner.state.read();
            value_at(&state, path).cloned().unwrap_or(Value::Null)
        };
        self.inner
            .signals
            .write()
            .entry(path.clone())
            .or_insert_with(|| Signal::new(initial))
            .clone()
    }

    /// Resolve an updater against the current value at `path`, commit the
    /// result, and run the post-commit pipeline. Returns the closure's
    /// second output.
    fn update_at<R>(&self, path: &Path, f: impl FnOnce(&Value) -> (Value, R)) -> R {
        // The state lock is released before the updater runs, so updaters
        // may read back through the store without self-deadlocking.
        let prev = {
            let state = self.inner.state.read();
            value_at(&state, path).cloned().unwrap_or(Value::Null)
        };
        let (next, out) = f(&prev);
        if prev == next {
            return out;
        }
        {
            let mut state = self.inner.state.write();
            set_value_at(&mut state, path, next.clone());
        }
        self.committed(path, &next, &prev);
        out
    }

    /// Remove the value at `path` from its parent container.
    fn remove_at(&self, path: &Path) -> Option<Value> {
        if path.is_empty() {
            return None;
        }
        let prev = {
            let mut state = self.inner.state.write();
            remove_value_at(&mut state, path)
        }?;
        self.committed(path, &Value::Null, &prev);
        Some(prev)
    }

    /// Post-commit pipeline: middleware, path notification, persistence.
    fn committed(&self, path: &Path, next: &Value, prev: &Value) {
        trace!(path = %path, "store write committed");
        let snapshot = self.snapshot();

        let middleware: Vec<Middleware> = self.inner.middleware.read().clone();
        for callback in &middleware {
            callback(&snapshot, path, next, prev);
        }

        // Exact path, ancestors, and descendants, all in one batch. The
        // signal map is snapshotted first so effects creating new path
        // signals mid-flush cannot disturb this pass.
        let targets: Vec<(Path, Signal<Value>)> = self
            .inner
            .signals
            .read()
            .iter()
            .filter(|(p, _)| {
                **p == *path || p.is_ancestor_of(path) || p.is_descendant_of(path)
            })
            .map(|(p, s)| (p.clone(), s.clone()))
            .collect();
        batch(|| {
            for (target, signal) in targets {
                let value = value_at(&snapshot, &target).cloned().unwrap_or(Value::Null);
                signal.set(value);
            }
        });

        if let Some(persistor) = &self.inner.persistor {
            persistor.touch(&snapshot);
        }
    }
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &*self.inner.state.read())
            .field("materialized_paths", &self.inner.signals.read().len())
            .finish()
    }
}

/// A cursor addressing one path in a store.
#[derive(Clone)]
pub struct StoreHandle {
    store: Store,
    path: Path,
}

impl StoreHandle {
    /// Descend into an object key.
    pub fn at(&self, key: impl Into<String>) -> StoreHandle {
        StoreHandle {
            store: self.store.clone(),
            path: self.path.child(key.into()),
        }
    }

    /// Descend into an array index.
    pub fn index(&self, index: usize) -> StoreHandle {
        StoreHandle {
            store: self.store.clone(),
            path: self.path.child(index),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The value at this path (`Null` if absent). Tracked.
    pub fn get(&self) -> Value {
        self.store.signal_at(&self.path).get()
    }

    /// The value at this path without registering a dependency.
    pub fn get_untracked(&self) -> Value {
        let state = self.store.inner.state.read();
        value_at(&state, &self.path).cloned().unwrap_or(Value::Null)
    }

    /// Deserialize the value at this path.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.get()).map_err(|source| StoreError::Deserialize {
            path: self.path.to_string(),
            source,
        })
    }

    /// Write a value at this path. Equal writes are no-ops.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        self.store.update_at(&self.path, move |_| (value, ()));
    }

    /// Serialize a typed value into this path.
    pub fn set_with<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        self.set(serde_json::to_value(value)?);
        Ok(())
    }

    /// Write the result of an updater applied to the current value.
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) {
        self.store.update_at(&self.path, move |prev| (f(prev), ()));
    }

    /// Remove this path from its parent object or array.
    pub fn remove(&self) -> Option<Value> {
        self.store.remove_at(&self.path)
    }

    /// Manual watcher on this path's signal.
    pub fn subscribe(&self, f: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.store.signal_at(&self.path).subscribe(f)
    }

    // -- array operations ---------------------------------------------------

    /// Length of the array at this path (0 if not an array). Tracked, so
    /// an effect reading the length reacts to any mutation here.
    pub fn len(&self) -> usize {
        match self.get() {
            Value::Array(items) => items.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append to the array at this path, creating it if absent.
    pub fn push(&self, value: impl Into<Value>) {
        let value = value.into();
        self.store.update_at(&self.path, move |prev| {
            let mut items = as_array(prev);
            items.push(value);
            (Value::Array(items), ())
        });
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        self.store.update_at(&self.path, |prev| {
            let mut items = as_array(prev);
            let removed = items.pop();
            (Value::Array(items), removed)
        })
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        self.store.update_at(&self.path, |prev| {
            let mut items = as_array(prev);
            let removed = if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            };
            (Value::Array(items), removed)
        })
    }

    /// Prepend an element.
    pub fn unshift(&self, value: impl Into<Value>) {
        let value = value.into();
        self.store.update_at(&self.path, move |prev| {
            let mut items = as_array(prev);
            items.insert(0, value);
            (Value::Array(items), ())
        });
    }

    /// Insert an element at `index` (clamped to the array length).
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        self.store.update_at(&self.path, move |prev| {
            let mut items = as_array(prev);
            let index = index.min(items.len());
            items.insert(index, value);
            (Value::Array(items), ())
        });
    }

    /// Remove `delete_count` elements starting at `start` and splice
    /// `replacement` in their place; returns the removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        replacement: Vec<Value>,
    ) -> Vec<Value> {
        self.store.update_at(&self.path, move |prev| {
            let mut items = as_array(prev);
            let start = start.min(items.len());
            let end = (start + delete_count).min(items.len());
            let removed: Vec<Value> = items.splice(start..end, replacement).collect();
            (Value::Array(items), removed)
        })
    }

    /// Sort the array with a comparator.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> std::cmp::Ordering) {
        self.store.update_at(&self.path, move |prev| {
            let mut items = as_array(prev);
            items.sort_by(&mut compare);
            (Value::Array(items), ())
        });
    }

    /// Reverse the array in place.
    pub fn reverse(&self) {
        self.store.update_at(&self.path, |prev| {
            let mut items = as_array(prev);
            items.reverse();
            (Value::Array(items), ())
        });
    }

    /// Assign directly to an index; equivalent to `self.index(i).set(v)`.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) {
        self.index(index).set(value);
    }
}

impl Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("path", &self.path.to_string())
            .finish()
    }
}

fn as_array(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        _ => Vec::new(),
    }
}

/// Walk `root` down `path`, if every step exists.
fn value_at<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.segments() {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(key)?,
            Segment::Index(index) => current.as_array()?.get(*index)?,
        };
    }
    Some(current)
}

/// Write `value` at `path`, materializing intermediate objects and arrays
/// as needed (arrays are padded with `Null` up to the index).
fn set_value_at(root: &mut Value, path: &Path, value: Value) {
    let Some((last, parents)) = path.segments().split_last() else {
        *root = value;
        return;
    };
    let mut current = root;
    for segment in parents {
        current = match segment {
            Segment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                current
                    .as_object_mut()
                    .expect("coerced to object")
                    .entry(key.clone())
                    .or_insert(Value::Null)
            }
            Segment::Index(index) => {
                if !current.is_array() {
                    *current = Value::Array(Vec::new());
                }
                let items = current.as_array_mut().expect("coerced to array");
                if items.len() <= *index {
                    items.resize(index + 1, Value::Null);
                }
                &mut items[*index]
            }
        };
    }
    match last {
        Segment::Key(key) => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            current
                .as_object_mut()
                .expect("coerced to object")
                .insert(key.clone(), value);
        }
        Segment::Index(index) => {
            if !current.is_array() {
                *current = Value::Array(Vec::new());
            }
            let items = current.as_array_mut().expect("coerced to array");
            if items.len() <= *index {
                items.resize(index + 1, Value::Null);
            }
            items[*index] = value;
        }
    }
}

/// Remove the value at `path` from its parent, returning it.
fn remove_value_at(root: &mut Value, path: &Path) -> Option<Value> {
    let (last, parents) = path.segments().split_last()?;
    let mut current = root;
    for segment in parents {
        current = match segment {
            Segment::Key(key) => current.as_object_mut()?.get_mut(key)?,
            Segment::Index(index) => current.as_array_mut()?.get_mut(*index)?,
        };
    }
    match last {
        Segment::Key(key) => current.as_object_mut()?.remove(key),
        Segment::Index(index) => {
            let items = current.as_array_mut()?;
            if *index < items.len() {
                Some(items.remove(*index))
            } else {
                None
            }
        }
    }
}

/// Create a store over the given initial state.
pub fn create_store(initial: impl Into<Value>) -> Store {
    Store::new(initial)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
