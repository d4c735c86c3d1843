//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a tracking context (memo/effect), the
//!    runtime records an edge from the signal to that computation.
//!
//! 2. When a signal's value changes, the runtime walks the edges and marks
//!    every dependent computation stale.
//!
//! 3. Writes are equality-gated: setting a signal to a value the
//!    [`ReactiveEq`] comparator considers identical is a no-op and notifies
//!    nobody.
//!
//! # Thread Safety
//!
//! Signals are thread-safe. The value sits behind a `parking_lot::RwLock`
//! and edges live in the runtime's concurrent registries. Propagation runs
//! on the writing thread.

use std::fmt::Debug;

use parking_lot::RwLock;
use std::sync::Arc;

use super::equality::ReactiveEq;
use super::runtime;
use super::subscriber::SourceId;
use super::watchers::{Subscription, WatcherList};

/// A reactive cell holding a value of type `T`.
///
/// Cloning a signal produces another handle to the same cell; the cell is
/// freed when the last handle drops.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value (tracked inside a computation)
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

struct SignalInner<T> {
    /// Identifies this signal in the runtime's edge registry.
    source: SourceId,
    value: RwLock<T>,
    /// Manual, non-computation subscribers.
    watchers: WatcherList<T>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                source: SourceId::new(),
                value: RwLock::new(value),
                watchers: WatcherList::new(),
            }),
        }
    }

    /// The runtime source ID for this signal.
    pub fn id(&self) -> SourceId {
        self.inner.source
    }

    /// Get the current value.
    ///
    /// If called within a tracking context, registers the current
    /// computation as a subscriber of this signal.
    pub fn get(&self) -> T {
        runtime::track_read(self.inner.source);
        self.inner.value.read().clone()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Alias for [`Signal::get_untracked`].
    pub fn peek(&self) -> T {
        self.get_untracked()
    }

    /// Read the value through a borrow instead of cloning it. Tracked.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        runtime::track_read(self.inner.source);
        f(&self.inner.value.read())
    }

    /// Set a new value and notify subscribers.
    ///
    /// No-op when the new value is identical to the current one under
    /// [`ReactiveEq`]: no subscriber or watcher sees anything.
    pub fn set(&self, value: T)
    where
        T: ReactiveEq,
    {
        {
            let current = self.inner.value.read();
            if current.reactive_eq(&value) {
                return;
            }
        }
        self.commit(value);
    }

    /// Update the value using a function of the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: ReactiveEq,
    {
        let next = {
            let current = self.inner.value.read();
            f(&current)
        };
        self.set(next);
    }

    /// Set a new value unconditionally, bypassing the equality gate.
    ///
    /// The deep store uses this to refresh path signals during wholesale
    /// state replacement.
    pub(crate) fn force_set(&self, value: T) {
        self.commit(value);
    }

    fn commit(&self, value: T) {
        {
            let mut guard = self.inner.value.write();
            *guard = value;
        }
        // Watchers fire on every committed write, independent of batching.
        if !self.inner.watchers.is_empty() {
            let snapshot = self.inner.value.read().clone();
            self.inner.watchers.notify(&snapshot);
        }
        runtime::notify(self.inner.source);
    }

    /// Register a manual watcher invoked with the new value on every
    /// committed write. Tracking context and batching do not affect it.
    pub fn subscribe(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.inner.watchers.subscribe(f)
    }

    /// Number of manual watchers currently registered.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.len()
    }
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        // Last handle gone; nothing can read or write this source again.
        runtime::retire_source(self.source);
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.source)
            .field("value", &self.get_untracked())
            .finish()
    }
}

impl<T: Default + Clone + Send + Sync + 'static> Default for Signal<T> {
    fn default() -> Self {
        Signal::new(T::default())
    }
}

/// Create a new signal.
pub fn create_signal<T: Clone + Send + Sync + 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
