//! Store persistence.
//!
//! Persistence is best-effort: every committed write schedules a debounced
//! serialize-and-store to a pluggable backend, and every failure along the
//! way (backend, serialization, parse of a stale blob) is logged and
//! swallowed. A broken backend must never block or fail a state update.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of a storage backend or of serialization.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("serialization failure: {0}")]
    Serialize(String),
}

/// A key/value text store the persistence layer writes JSON into.
pub trait StorageBackend: Send + Sync {
    /// Read the blob stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
    /// Write `payload` under `key`, replacing any previous blob.
    fn store(&self, key: &str, payload: &str) -> Result<(), StorageError>;
}

/// In-memory backend, mainly for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current blob under `key`, if any.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn store(&self, key: &str, payload: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), payload.to_string());
        Ok(())
    }
}

type Serializer = Arc<dyn Fn(&Value) -> Result<String, StorageError> + Send + Sync>;

/// Configuration for store persistence.
#[derive(Clone)]
pub struct PersistOptions {
    /// Storage key the state blob is written under.
    pub key: String,
    pub backend: Arc<dyn StorageBackend>,
    /// When set, only these top-level keys are persisted.
    pub include: Option<Vec<String>>,
    /// Quiet period between a write and the storage flush. Zero flushes
    /// synchronously.
    pub debounce: Duration,
    /// Serializer override; defaults to compact JSON.
    pub serializer: Option<Serializer>,
}

impl PersistOptions {
    pub fn new(key: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            key: key.into(),
            backend,
            include: None,
            debounce: Duration::ZERO,
            serializer: None,
        }
    }

    pub fn include(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Merge a persisted blob over the initial state: top-level keys from the
/// blob win, everything else keeps its initial value. Non-object blobs
/// replace the initial state wholesale.
fn merge_over(initial: Value, stored: Value) -> Value {
    match (initial, stored) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, stored) => stored,
    }
}

#[derive(Clone)]
pub(crate) struct Persistor {
    options: PersistOptions,
    /// Debounce generation; only the latest scheduled flush writes.
    generation: Arc<AtomicU64>,
}

impl Persistor {
    pub fn new(options: PersistOptions) -> Self {
        Self {
            options,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Restore persisted state over `initial`, best-effort.
    pub fn load_initial(options: &PersistOptions, initial: Value) -> Value {
        match options.backend.load(&options.key) {
            Ok(Some(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(stored) => merge_over(initial, stored),
                Err(err) => {
                    warn!(key = %options.key, %err, "ignoring unparseable persisted state");
                    initial
                }
            },
            Ok(None) => initial,
            Err(err) => {
                warn!(key = %options.key, %err, "failed to load persisted state");
                initial
            }
        }
    }

    /// Record a state change and schedule a flush.
    pub fn touch(&self, snapshot: &Value) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self.options.debounce.is_zero() {
            self.write(snapshot);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let this = self.clone();
                let snapshot = snapshot.clone();
                let debounce = self.options.debounce;
                handle.spawn(async move {
                    tokio::time::sleep(debounce).await;
                    // A newer write superseded this flush.
                    if this.generation.load(Ordering::SeqCst) == generation {
                        this.write(&snapshot);
                    }
                });
            }
            // No timer available; flush immediately rather than lose data.
            Err(_) => self.write(snapshot),
        }
    }

    fn write(&self, snapshot: &Value) {
        let filtered = match (&self.options.include, snapshot) {
            (Some(keys), Value::Object(map)) => {
                let mut subset = serde_json::Map::new();
                for key in keys {
                    if let Some(value) = map.get(key) {
                        subset.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(subset)
            }
            _ => snapshot.clone(),
        };

        let payload = match &self.options.serializer {
            Some(serialize) => serialize(&filtered),
            None => serde_json::to_string(&filtered)
                .map_err(|err| StorageError::Serialize(err.to_string())),
        };
        let payload = match payload {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key = %self.options.key, %err, "skipping persistence write");
                return;
            }
        };

        match self.options.backend.store(&self.options.key, &payload) {
            Ok(()) => debug!(key = %self.options.key, bytes = payload.len(), "state persisted"),
            Err(err) => warn!(key = %self.options.key, %err, "persistence write failed"),
        }
    }
}
