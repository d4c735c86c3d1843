//! Manual subscriptions and value watchers.
//!
//! Non-reactive consumers (string renderers, DOM patchers, logging) observe
//! signals and memos without participating in dependency tracking. A
//! [`WatcherList`] holds their callbacks; an explicit [`Subscription`]
//! removes one. These fire on every committed write, regardless of any
//! tracking or untrack context in effect at the call site.
//!
//! [`watch`] is the higher-level form: an effect that samples a reactive
//! expression and invokes a callback only when the sampled value actually
//! changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::effect::Effect;

type WatcherFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

static WATCHER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Ordered list of manual watcher callbacks, shared by signals and memos.
pub(crate) struct WatcherList<T> {
    entries: Arc<RwLock<Vec<(u64, WatcherFn<T>)>>>,
}

impl<T: 'static> WatcherList<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Add a watcher and return its subscription handle.
    pub fn subscribe(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = WATCHER_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push((id, Arc::new(f)));

        let entries = Arc::downgrade(&self.entries);
        Subscription {
            cancel: Arc::new(move || {
                if let Some(entries) = entries.upgrade() {
                    entries.write().retain(|(entry_id, _)| *entry_id != id);
                }
            }),
        }
    }

    /// Invoke every watcher with the new value.
    ///
    /// The list is snapshotted first: a watcher unsubscribing another
    /// watcher mid-pass must not disturb this pass.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<WatcherFn<T>> = self
            .entries
            .read()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        for watcher in snapshot {
            watcher(value);
        }
    }
}

impl<T> Clone for WatcherList<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

/// Handle for one manual watcher.
///
/// Call [`Subscription::unsubscribe`] to stop receiving notifications.
/// Dropping the handle without unsubscribing leaves the watcher active for
/// the life of the source.
#[derive(Clone)]
pub struct Subscription {
    cancel: Arc<dyn Fn() + Send + Sync>,
}

impl Subscription {
    /// Remove the watcher. Idempotent.
    pub fn unsubscribe(&self) {
        (self.cancel)();
    }
}

/// Observe a reactive expression and invoke `callback` when its value
/// changes.
///
/// `source` runs under dependency tracking like any effect body, so it can
/// read any combination of signals and memos. `callback` receives the new
/// value and the previous one (`None` on the first run) and runs only when
/// the two differ by `PartialEq` — a dependency change that resolves to the
/// same sampled value is absorbed here.
pub fn watch<T, F, C>(source: F, callback: C) -> Effect
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
    C: Fn(&T, Option<&T>) + Send + Sync + 'static,
{
    let previous = Arc::new(Mutex::new(None::<T>));
    Effect::new(move || {
        let value = source();
        let mut previous = previous.lock();
        if previous.as_ref() != Some(&value) {
            callback(&value, previous.as_ref());
            *previous = Some(value);
        }
    })
}
