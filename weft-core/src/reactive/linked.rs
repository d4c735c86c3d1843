//! Linked Signal Implementation
//!
//! A linked signal is a writable memo: computed by default, overridable by
//! an explicit `set`, and (optionally) reset back to the computed value
//! when a dependency changes.
//!
//! # Behavior
//!
//! - Until `set` is called, a linked signal behaves exactly like a memo.
//! - `set` stores the value directly, flips the override flag, and skips
//!   recomputation on subsequent reads.
//! - A dependency change clears the override and marks the value stale,
//!   unless `reset_on_change` is false and the value is currently
//!   overridden — then the change is swallowed entirely: the manual value
//!   stays, and subscribers are not re-triggered.
//! - `reset` drops the override and recomputes immediately, notifying
//!   subscribers once.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::context::{SourceList, TrackingScope};
use super::equality::ReactiveEq;
use super::runtime::{self, RegistryHandle};
use super::subscriber::{Notification, SourceId, Subscriber, SubscriberId};
use super::watchers::{Subscription, WatcherList};

/// Options for [`LinkedSignal`].
#[derive(Debug, Clone, Copy)]
pub struct LinkedOptions {
    /// When true (the default), a dependency change clears a manual
    /// override and the value falls back to the computation.
    pub reset_on_change: bool,
}

impl Default for LinkedOptions {
    fn default() -> Self {
        Self {
            reset_on_change: true,
        }
    }
}

/// A computed value that can be manually overridden and later reset.
///
/// # Example
///
/// ```rust,ignore
/// let selected = LinkedSignal::new(move || options.get().first().cloned());
///
/// selected.set(Some(user_choice));      // manual override
/// // options changes -> override cleared, recomputed on next read
/// ```
pub struct LinkedSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<LinkedInner<T>>,
}

struct LinkedInner<T> {
    id: SubscriberId,
    output: SourceId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
    stale: AtomicBool,
    overridden: AtomicBool,
    reset_on_change: bool,
    sources: Mutex<SourceList>,
    watchers: WatcherList<T>,
    registration: Mutex<Option<RegistryHandle>>,
}

impl<T> LinkedSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a linked signal with default options.
    pub fn new(compute: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::with_options(compute, LinkedOptions::default())
    }

    /// Create a linked signal with explicit options.
    pub fn with_options(
        compute: impl Fn() -> T + Send + Sync + 'static,
        options: LinkedOptions,
    ) -> Self {
        let inner = Arc::new(LinkedInner {
            id: SubscriberId::new(),
            output: SourceId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            stale: AtomicBool::new(true),
            overridden: AtomicBool::new(false),
            reset_on_change: options.reset_on_change,
            sources: Mutex::new(SourceList::new()),
            watchers: WatcherList::new(),
            registration: Mutex::new(None),
        });
        let handle = runtime::register(inner.clone());
        *inner.registration.lock() = Some(handle);
        Self { inner }
    }

    /// The source ID of this linked signal's output.
    pub fn id(&self) -> SourceId {
        self.inner.output
    }

    /// Get the current value: the manual override if one is active,
    /// otherwise the (possibly recomputed) derived value. Tracked.
    pub fn get(&self) -> T {
        runtime::track_read(self.inner.output);
        self.inner.current_value()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.current_value()
    }

    /// Whether the value is currently a manual override.
    pub fn is_overridden(&self) -> bool {
        self.inner.overridden.load(Ordering::SeqCst)
    }

    /// Override the computed value.
    ///
    /// Equality-gated like a signal write: overriding with a value
    /// identical to the current one flips the override flag but notifies
    /// nobody.
    pub fn set(&self, value: T)
    where
        T: ReactiveEq,
    {
        let current = self.inner.current_value();
        self.inner.overridden.store(true, Ordering::SeqCst);
        self.inner.stale.store(false, Ordering::SeqCst);
        if current.reactive_eq(&value) {
            *self.inner.value.write() = Some(value);
            return;
        }
        *self.inner.value.write() = Some(value.clone());
        self.inner.watchers.notify(&value);
        runtime::notify(self.inner.output);
    }

    /// Override using a function of the current value (computed or
    /// previously overridden).
    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: ReactiveEq,
    {
        let current = self.inner.current_value();
        self.set(f(&current));
    }

    /// Drop any override and recompute immediately, notifying subscribers
    /// once. Unlike a dependency-driven invalidation, the recomputation is
    /// not deferred to the next read.
    pub fn reset(&self) {
        self.inner.overridden.store(false, Ordering::SeqCst);
        self.inner.stale.store(true, Ordering::SeqCst);
        let value = self.inner.recompute();
        self.inner.watchers.notify(&value);
        runtime::notify(self.inner.output);
    }

    /// Register a manual watcher for committed value changes.
    ///
    /// Subscribing runs the computation if it never has, so a never-read
    /// linked signal is still reachable from its sources.
    pub fn subscribe(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.inner.current_value();
        self.inner.watchers.subscribe(f)
    }
}

impl<T> LinkedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn current_value(&self) -> T {
        if self.overridden.load(Ordering::SeqCst) {
            if let Some(value) = self.value.read().clone() {
                return value;
            }
        }
        if self.stale.load(Ordering::SeqCst) {
            return self.recompute();
        }
        match self.value.read().clone() {
            Some(value) => value,
            None => self.recompute(),
        }
    }

    fn recompute(&self) -> T {
        let previous = std::mem::take(&mut *self.sources.lock());
        runtime::remove_edges(self.id, &previous);

        let scope = TrackingScope::enter(self.id);
        let value = (self.compute)();
        let sources = scope.finish();

        *self.sources.lock() = sources;
        *self.value.write() = Some(value.clone());
        self.stale.store(false, Ordering::SeqCst);
        value
    }
}

impl<T> Subscriber for LinkedInner<T>
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
        if self.overridden.load(Ordering::SeqCst) && !self.reset_on_change {
            // Pinned: the manual value wins and downstream must not be
            // re-triggered.
            return Notification::SWALLOW;
        }
        self.overridden.store(false, Ordering::SeqCst);
        if self.stale.swap(true, Ordering::SeqCst) {
            return Notification::SWALLOW;
        }
        Notification {
            propagate: true,
            schedule: !self.watchers.is_empty(),
        }
    }

    fn run(&self) {
        let value = self.current_value();
        self.watchers.notify(&value);
    }
}

impl<T> Drop for LinkedInner<T> {
    fn drop(&mut self) {
        let sources = std::mem::take(&mut *self.sources.lock());
        runtime::remove_edges(self.id, &sources);
        runtime::retire_source(self.output);
    }
}

impl<T> Clone for LinkedSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for LinkedSignal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkedSignal")
            .field("id", &self.inner.output)
            .field("overridden", &self.is_overridden())
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

/// Create a linked signal with default options.
pub fn create_linked_signal<T: Clone + Send + Sync + 'static>(
    compute: impl Fn() -> T + Send + Sync + 'static,
) -> LinkedSignal<T> {
    LinkedSignal::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::signal::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn behaves_as_memo_until_set() {
        let source = Signal::new(1);
        let source_clone = source.clone();
        let linked = LinkedSignal::new(move || source_clone.get() * 10);

        assert_eq!(linked.get(), 10);
        assert!(!linked.is_overridden());

        source.set(2);
        assert_eq!(linked.get(), 20);
    }

    #[test]
    fn override_and_dependency_reset_round_trip() {
        let source = Signal::new(1);
        let source_clone = source.clone();
        let linked = LinkedSignal::new(move || source_clone.get() * 10);

        linked.set(99);
        assert_eq!(linked.get(), 99);
        assert!(linked.is_overridden());

        // Dependency change clears the override.
        source.set(3);
        assert_eq!(linked.get(), 30);
        assert!(!linked.is_overridden());
    }

    #[test]
    fn pinned_override_swallows_dependency_changes() {
        let source = Signal::new(1);
        let source_clone = source.clone();
        let linked = LinkedSignal::with_options(
            move || source_clone.get() * 10,
            LinkedOptions {
                reset_on_change: false,
            },
        );

        linked.set(99);

        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let _sub = linked.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        source.set(5);
        assert_eq!(linked.get(), 99);
        assert!(linked.is_overridden());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn watcher_on_unread_linked_signal_fires() {
        let source = Signal::new(1);
        let source_clone = source.clone();
        let linked = LinkedSignal::new(move || source_clone.get() * 10);

        // Subscribe before any read.
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = linked.subscribe(move |v: &i32| seen_clone.lock().push(*v));

        source.set(2);
        assert_eq!(*seen.lock(), vec![20]);
    }

    #[test]
    fn reset_recomputes_immediately() {
        let source = Signal::new(4);
        let calls = Arc::new(AtomicI32::new(0));

        let source_clone = source.clone();
        let calls_clone = calls.clone();
        let linked = LinkedSignal::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            source_clone.get() * 10
        });

        linked.set(99);
        let computed_before = calls.load(Ordering::SeqCst);

        linked.reset();
        // Recomputation happened inside reset, not deferred to the read.
        assert_eq!(calls.load(Ordering::SeqCst), computed_before + 1);
        assert_eq!(linked.get(), 40);
        assert!(!linked.is_overridden());
    }

    #[test]
    fn update_receives_current_cached_value() {
        let linked = LinkedSignal::new(|| 10);

        linked.update(|prev| prev + 1);
        assert_eq!(linked.get(), 11);
        assert!(linked.is_overridden());

        linked.update(|prev| prev + 1);
        assert_eq!(linked.get(), 12);
    }
}
