//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first read, the memo runs its computation under dependency
//!    tracking and caches the result.
//!
//! 2. When a dependency changes, the memo does not recompute. It marks
//!    itself stale and lets the runtime propagate staleness to its own
//!    subscribers. This is what keeps diamond-shaped graphs glitch-free:
//!    downstream computations are informed once, not once per path.
//!
//! 3. On the next read, a stale memo drops its old dependency edges,
//!    re-runs the computation under fresh tracking, and caches the result.
//!    Repeated reads with no intervening change run the computation exactly
//!    once.
//!
//! # Panics
//!
//! A panic inside the computation propagates to the reader. The memo stays
//! stale and retries on the next read; the tracking stack is restored by a
//! drop guard, so surrounding computations are unaffected.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::context::{SourceList, TrackingScope};
use super::runtime::{self, RegistryHandle};
use super::subscriber::{Notification, SourceId, Subscriber, SubscriberId};
use super::watchers::{Subscription, WatcherList};

/// A cached, pull-based derived value.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(2);
/// let doubled = Memo::new(move || count.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// ```
pub struct Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
}

struct MemoInner<T> {
    id: SubscriberId,
    /// The source this memo produces; reading the memo depends on it.
    output: SourceId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    /// Cached value; `None` until the first successful computation.
    value: RwLock<Option<T>>,
    stale: AtomicBool,
    /// Sources read during the most recent run, for edge removal.
    sources: Mutex<SourceList>,
    watchers: WatcherList<T>,
    /// Keeps the runtime registration alive for the life of the memo.
    registration: Mutex<Option<RegistryHandle>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new memo. The computation does not run until first read.
    pub fn new(compute: impl Fn() -> T + Send + Sync + 'static) -> Self {
        let inner = Arc::new(MemoInner {
            id: SubscriberId::new(),
            output: SourceId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            stale: AtomicBool::new(true),
            sources: Mutex::new(SourceList::new()),
            watchers: WatcherList::new(),
            registration: Mutex::new(None),
        });
        let handle = runtime::register(inner.clone());
        *inner.registration.lock() = Some(handle);
        Self { inner }
    }

    /// The source ID of this memo's output.
    pub fn id(&self) -> SourceId {
        self.inner.output
    }

    /// Get the current value, recomputing first if a dependency changed.
    ///
    /// Registers the memo as a dependency of the current computation.
    pub fn get(&self) -> T {
        runtime::track_read(self.inner.output);
        self.inner.fresh_value()
    }

    /// Get the current value without registering a dependency.
    ///
    /// Still recomputes if stale: untracked reads observe up-to-date
    /// values, they just do not create edges.
    pub fn get_untracked(&self) -> T {
        self.inner.fresh_value()
    }

    /// Whether a dependency changed since the last computation.
    pub fn is_stale(&self) -> bool {
        self.inner.stale.load(Ordering::SeqCst)
    }

    /// Register a manual watcher invoked with the freshly computed value
    /// whenever a dependency change reaches this memo.
    ///
    /// A watched memo gives up some laziness: it recomputes at notification
    /// time instead of at the next read, so the watcher has a value to see.
    /// Subscribing runs the computation if it never has, so a never-read
    /// memo is still reachable from its sources.
    pub fn subscribe(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.inner.fresh_value();
        self.inner.watchers.subscribe(f)
    }
}

impl<T> MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fresh_value(&self) -> T {
        if self.stale.load(Ordering::SeqCst) {
            return self.recompute();
        }
        match self.value.read().clone() {
            Some(value) => value,
            // Lost the race with an invalidation between the check and the
            // read; recompute.
            None => self.recompute(),
        }
    }

    fn recompute(&self) -> T {
        let previous = std::mem::take(&mut *self.sources.lock());
        runtime::remove_edges(self.id, &previous);

        let scope = TrackingScope::enter(self.id);
        // A panic here unwinds through the scope guard; the memo stays
        // stale and retries on the next read.
        let value = (self.compute)();
        let sources = scope.finish();

        *self.sources.lock() = sources;
        *self.value.write() = Some(value.clone());
        self.stale.store(false, Ordering::SeqCst);
        value
    }
}

impl<T> Subscriber for MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn output(&self) -> Option<SourceId> {
        Some(self.output)
    }

    fn mark_stale(&self) -> Notification {
        if self.stale.swap(true, Ordering::SeqCst) {
            // Already stale: downstream was informed when this memo first
            // went stale.
            return Notification::SWALLOW;
        }
        Notification {
            propagate: true,
            schedule: !self.watchers.is_empty(),
        }
    }

    fn run(&self) {
        // Scheduled only while watchers exist.
        let value = self.fresh_value();
        self.watchers.notify(&value);
    }
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        // Retire both halves of this node: the edges it holds on its
        // sources and the subscriber list on its own output.
        let sources = std::mem::take(&mut *self.sources.lock());
        runtime::remove_edges(self.id, &sources);
        runtime::retire_source(self.output);
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.output)
            .field("stale", &self.is_stale())
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

/// Create a new memo.
pub fn create_memo<T: Clone + Send + Sync + 'static>(
    compute: impl Fn() -> T + Send + Sync + 'static,
) -> Memo<T> {
    Memo::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
