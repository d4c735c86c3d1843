//! Effect Implementation
//!
//! An Effect is an eager computation that re-runs whenever one of its
//! tracked dependencies changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately and synchronously
//!    to establish initial dependencies.
//!
//! 2. When a dependency changes, the effect re-executes: its previous run
//!    is torn down first (nested effects disposed children-first, then the
//!    cleanup closure the body returned, then `on_cleanup` callbacks in
//!    registration order), its old dependency edges are removed, and only
//!    then does the body run again under fresh tracking.
//!
//! 3. `dispose` performs the same teardown and makes the effect inert
//!    permanently. It is idempotent, and safe to call from inside the
//!    effect's own body.
//!
//! # Ownership
//!
//! Every run owns a fresh [`Scope`]. Nested effects created during the run
//! register with it and are torn down on the parent's next re-run or final
//! disposal, which is what keeps dynamic effect creation leak-free. An
//! effect created inside a [`create_root`] is owned by that root.
//!
//! [`create_root`]: super::scope::create_root

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::context::{SourceList, TrackingScope};
use super::runtime::{self, RegistryHandle};
use super::scope::{current_owner, Dispose, OwnerGuard, Scope};
use super::subscriber::{Notification, SourceId, Subscriber, SubscriberId};

type Cleanup = Box<dyn FnOnce() + Send>;
type Body = Box<dyn Fn() -> Option<Cleanup> + Send + Sync>;

/// An eager, push-based computation with an owned cleanup scope.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let count_clone = count.clone();
/// let effect = Effect::new(move || {
///     println!("count is {}", count_clone.get());
/// });
///
/// count.set(5);       // re-runs, prints "count is 5"
/// effect.dispose();   // never runs again
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    id: SubscriberId,
    body: Body,
    /// Scope of the current run; replaced on every execution.
    scope: Mutex<Option<Scope>>,
    /// Sources read during the most recent run.
    sources: Mutex<SourceList>,
    disposed: AtomicBool,
    runs: AtomicUsize,
    registration: Mutex<Option<RegistryHandle>>,
}

impl Effect {
    /// Create an effect and run it immediately.
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self::from_body(Box::new(move || {
            f();
            None
        }))
    }

    /// Create an effect whose body returns a cleanup closure.
    ///
    /// The returned closure runs before the next re-execution and on final
    /// disposal, ahead of any `on_cleanup` callbacks from the same run.
    pub fn with_cleanup<C>(f: impl Fn() -> C + Send + Sync + 'static) -> Self
    where
        C: FnOnce() + Send + 'static,
    {
        Self::from_body(Box::new(move || Some(Box::new(f()) as Cleanup)))
    }

    fn from_body(body: Body) -> Self {
        let inner = Arc::new(EffectInner {
            id: SubscriberId::new(),
            body,
            scope: Mutex::new(None),
            sources: Mutex::new(SourceList::new()),
            disposed: AtomicBool::new(false),
            runs: AtomicUsize::new(0),
            registration: Mutex::new(None),
        });
        let handle = runtime::register(inner.clone());
        *inner.registration.lock() = Some(handle);

        // A nested effect is owned by the enclosing run (or root) and dies
        // with it.
        if let Some(owner) = current_owner() {
            owner.adopt(inner.clone());
        }

        inner.execute();
        Self { inner }
    }

    /// Tear down the effect permanently. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose_now();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Number of times the body has executed.
    pub fn run_count(&self) -> usize {
        self.inner.runs.load(Ordering::SeqCst)
    }
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        // Tear down the previous run before anything else: nested effects
        // first, then the returned cleanup, then on_cleanup callbacks.
        if let Some(old) = self.scope.lock().take() {
            old.dispose();
        }

        let previous = std::mem::take(&mut *self.sources.lock());
        runtime::remove_edges(self.id, &previous);

        let scope = Scope::new();
        *self.scope.lock() = Some(scope.clone());

        let _owner = OwnerGuard::enter(scope.clone());
        let tracking = TrackingScope::enter(self.id);
        let cleanup = (self.body)();
        let sources = tracking.finish();

        if let Some(cleanup) = cleanup {
            scope.prepend_cleanup(cleanup);
        }
        self.runs.fetch_add(1, Ordering::SeqCst);

        if self.disposed.load(Ordering::SeqCst) {
            // The body disposed its own effect. The scope was already torn
            // down by dispose_now; drop the edges this run just created.
            runtime::remove_edges(self.id, &sources);
            self.scope.lock().take();
        } else {
            *self.sources.lock() = sources;
        }
    }

    fn dispose_now(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(scope) = self.scope.lock().take() {
            scope.dispose();
        }
        let sources = std::mem::take(&mut *self.sources.lock());
        runtime::remove_edges(self.id, &sources);
        // Unregister from the runtime; stale notifications become no-ops.
        self.registration.lock().take();
    }
}

impl Subscriber for EffectInner {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn mark_stale(&self) -> Notification {
        Notification {
            propagate: false,
            schedule: !self.disposed.load(Ordering::SeqCst),
        }
    }

    fn run(&self) {
        self.execute();
    }
}

impl Dispose for EffectInner {
    fn dispose(&self) {
        self.dispose_now();
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        // An effect dropped without an explicit dispose must still release
        // its edges; `run` can never be called again. User cleanups do not
        // run here — teardown with side effects goes through `dispose`.
        let sources = std::mem::take(&mut *self.sources.lock());
        runtime::remove_edges(self.id, &sources);
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("runs", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an effect and run it immediately.
pub fn create_effect(f: impl Fn() + Send + Sync + 'static) -> Effect {
    Effect::new(f)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::scope::on_cleanup;
    use crate::reactive::signal::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn effect_runs_on_creation() {
        let runs = Arc::new(AtomicI32::new(0));

        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_reruns_on_dependency_change() {
        let source = Signal::new(0);
        let runs = Arc::new(AtomicI32::new(0));

        let source_clone = source.clone();
        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            let _ = source_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);

        source.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        source.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn disposed_effect_never_runs_again() {
        let source = Signal::new(0);
        let runs = Arc::new(AtomicI32::new(0));

        let source_clone = source.clone();
        let runs_clone = runs.clone();
        let effect = Effect::new(move || {
            let _ = source_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        effect.dispose();
        assert!(effect.is_disposed());

        source.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn double_dispose_runs_cleanup_once() {
        let cleanups = Arc::new(AtomicI32::new(0));

        let cleanups_clone = cleanups.clone();
        let effect = Effect::with_cleanup(move || {
            let cleanups = cleanups_clone.clone();
            move || {
                cleanups.fetch_add(1, Ordering::SeqCst);
            }
        });

        effect.dispose();
        effect.dispose();
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn returned_cleanup_runs_before_rerun() {
        let source = Signal::new(0);
        let order = Arc::new(Mutex::new(Vec::new()));

        let source_clone = source.clone();
        let order_clone = order.clone();
        let _effect = Effect::with_cleanup(move || {
            let value = source_clone.get();
            order_clone.lock().push(format!("run {value}"));
            let order = order_clone.clone();
            move || order.lock().push(format!("cleanup {value}"))
        });

        source.set(1);
        assert_eq!(*order.lock(), vec!["run 0", "cleanup 0", "run 1"]);
    }

    #[test]
    fn on_cleanup_callbacks_run_in_registration_order() {
        let source = Signal::new(0);
        let order = Arc::new(Mutex::new(Vec::new()));

        let source_clone = source.clone();
        let order_clone = order.clone();
        let _effect = Effect::new(move || {
            let _ = source_clone.get();
            let o1 = order_clone.clone();
            on_cleanup(move || o1.lock().push("first"));
            let o2 = order_clone.clone();
            on_cleanup(move || o2.lock().push("second"));
        });

        source.set(1);
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn nested_effects_are_disposed_on_parent_rerun() {
        let outer = Signal::new(0);
        let inner_signal = Signal::new(0);
        let inner_runs = Arc::new(AtomicI32::new(0));

        let outer_clone = outer.clone();
        let inner_clone = inner_signal.clone();
        let inner_runs_clone = inner_runs.clone();
        let _effect = Effect::new(move || {
            let _ = outer_clone.get();
            let inner = inner_clone.clone();
            let runs = inner_runs_clone.clone();
            // New nested effect each run; the previous one must be dead.
            let _nested = Effect::new(move || {
                let _ = inner.get();
                runs.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(inner_runs.load(Ordering::SeqCst), 1);

        inner_signal.set(1);
        assert_eq!(inner_runs.load(Ordering::SeqCst), 2);

        // Parent re-runs: old nested effect disposed, new one created.
        outer.set(1);
        assert_eq!(inner_runs.load(Ordering::SeqCst), 3);

        // Only the new nested effect reacts.
        inner_signal.set(2);
        assert_eq!(inner_runs.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn nested_disposal_precedes_parent_cleanups() {
        let source = Signal::new(0);
        let order = Arc::new(Mutex::new(Vec::new()));

        let source_clone = source.clone();
        let order_clone = order.clone();
        let _effect = Effect::new(move || {
            let _ = source_clone.get();
            let child_order = order_clone.clone();
            let _nested = Effect::new(move || {
                let o = child_order.clone();
                on_cleanup(move || o.lock().push("nested"));
            });
            let own = order_clone.clone();
            on_cleanup(move || own.lock().push("parent"));
        });

        source.set(1);
        assert_eq!(*order.lock(), vec!["nested", "parent"]);
    }

    #[test]
    fn effect_disposing_itself_is_safe() {
        let source = Signal::new(0);
        let runs = Arc::new(AtomicI32::new(0));
        let slot: Arc<Mutex<Option<Effect>>> = Arc::new(Mutex::new(None));

        let source_clone = source.clone();
        let runs_clone = runs.clone();
        let slot_clone = slot.clone();
        let effect = Effect::new(move || {
            let value = source_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
            if value >= 1 {
                if let Some(me) = slot_clone.lock().as_ref() {
                    me.dispose();
                }
            }
        });
        *slot.lock() = Some(effect);

        source.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Disposed from inside its own body; further writes are ignored.
        source.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn conditional_dependencies_are_pruned_every_run() {
        let condition = Signal::new(true);
        let a = Signal::new(0);
        let b = Signal::new(0);
        let runs = Arc::new(AtomicI32::new(0));

        let cond = condition.clone();
        let a_clone = a.clone();
        let b_clone = b.clone();
        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            if cond.get() {
                let _ = a_clone.get();
            } else {
                let _ = b_clone.get();
            }
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // b is not a dependency while the condition holds.
        b.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        condition.set(false);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Now b is tracked and a is not.
        b.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        a.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
