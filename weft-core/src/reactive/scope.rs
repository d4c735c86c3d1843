//! Ownership scopes.
//!
//! A scope is a node in the ownership tree: it holds cleanup callbacks
//! registered with [`on_cleanup`] and the disposables (nested effects,
//! nested roots) created while it was the active owner. Disposing a scope
//! tears down its children first, in creation order, then runs its own
//! cleanups in registration order.
//!
//! Scopes are rooted either at a [`create_root`] call or at the current run
//! of an effect; effects replace their scope on every re-run, which is what
//! keeps dynamically created nested effects from leaking.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type CleanupFn = Box<dyn FnOnce() + Send>;

/// An object a scope can tear down: nested effects and nested roots.
pub(crate) trait Dispose: Send + Sync {
    fn dispose(&self);
}

/// A node in the ownership tree.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

pub(crate) struct ScopeInner {
    disposed: AtomicBool,
    cleanups: Mutex<Vec<CleanupFn>>,
    children: Mutex<Vec<Arc<dyn Dispose>>>,
}

impl Scope {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                disposed: AtomicBool::new(false),
                cleanups: Mutex::new(Vec::new()),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn add_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        self.inner.cleanups.lock().push(Box::new(f));
    }

    /// Register a cleanup that runs before every other cleanup in this
    /// scope. Used for the cleanup closure an effect body returns, which
    /// must run before `on_cleanup` callbacks.
    pub(crate) fn prepend_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        self.inner.cleanups.lock().insert(0, Box::new(f));
    }

    /// Adopt a disposable child (nested effect or nested root).
    pub(crate) fn adopt(&self, child: Arc<dyn Dispose>) {
        self.inner.children.lock().push(child);
    }

    /// Tear down the scope: children first, in creation order, then the
    /// scope's own cleanups in registration order. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn as_dispose(&self) -> Arc<dyn Dispose> {
        self.inner.clone()
    }
}

impl ScopeInner {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Lists are taken out of their locks before any user code runs, so
        // cleanups that register more cleanups cannot deadlock.
        let children = std::mem::take(&mut *self.children.lock());
        for child in children {
            child.dispose();
        }

        let cleanups = std::mem::take(&mut *self.cleanups.lock());
        for cleanup in cleanups {
            cleanup();
        }
    }
}

impl Dispose for ScopeInner {
    fn dispose(&self) {
        ScopeInner::dispose(self);
    }
}

thread_local! {
    static OWNER_STACK: RefCell<Vec<Scope>> = const { RefCell::new(Vec::new()) };
}

/// Guard that makes a scope the active owner until dropped.
pub(crate) struct OwnerGuard;

impl OwnerGuard {
    pub fn enter(scope: Scope) -> Self {
        OWNER_STACK.with(|stack| stack.borrow_mut().push(scope));
        Self
    }
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        OWNER_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The innermost active owner: the currently running effect's scope, or the
/// nearest enclosing root.
pub(crate) fn current_owner() -> Option<Scope> {
    OWNER_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Outcome of an [`on_cleanup`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupRegistration {
    /// The callback was registered with the active owner.
    Registered,
    /// No owner was active; the callback was dropped. Not an error — code
    /// that runs both inside and outside effects may call `on_cleanup`
    /// unconditionally.
    Ignored,
}

/// Register a callback against the innermost active owner.
///
/// The callback runs before the owning effect re-executes and on final
/// disposal. Outside any owner this is a no-op, reported explicitly via
/// [`CleanupRegistration::Ignored`].
pub fn on_cleanup(f: impl FnOnce() + Send + 'static) -> CleanupRegistration {
    match current_owner() {
        Some(scope) => {
            scope.add_cleanup(f);
            CleanupRegistration::Registered
        }
        None => CleanupRegistration::Ignored,
    }
}

/// Handle that tears down a root scope.
///
/// Returned to the closure passed to [`create_root`]; may be stored and
/// invoked later. Disposal is idempotent.
#[derive(Clone)]
pub struct RootDisposer {
    scope: Scope,
}

impl RootDisposer {
    /// Recursively dispose every effect, nested root, and cleanup owned by
    /// the root.
    pub fn dispose(&self) {
        self.scope.dispose();
    }
}

/// Create a new ownership root and run `f` with it active.
///
/// Effects and cleanups created inside `f` (outside any nested effect) are
/// owned by the root and live until the provided disposer is invoked. A
/// root created inside another owner is adopted by it, so disposing the
/// outer owner also tears down the inner root.
pub fn create_root<R>(f: impl FnOnce(RootDisposer) -> R) -> R {
    let scope = Scope::new();
    if let Some(parent) = current_owner() {
        parent.adopt(scope.as_dispose());
    }
    let _guard = OwnerGuard::enter(scope.clone());
    f(RootDisposer { scope })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn on_cleanup_outside_owner_is_ignored() {
        assert_eq!(on_cleanup(|| {}), CleanupRegistration::Ignored);
    }

    #[test]
    fn root_runs_cleanups_on_dispose() {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();

        let disposer = create_root(|disposer| {
            assert_eq!(
                on_cleanup(move || {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                }),
                CleanupRegistration::Registered
            );
            disposer
        });

        assert_eq!(count.load(Ordering::SeqCst), 0);
        disposer.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Idempotent.
        disposer.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn children_are_disposed_before_own_cleanups() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let outer = create_root(|outer| {
            let order_child = order.clone();
            create_root(|_inner| {
                on_cleanup(move || order_child.lock().push("child"));
            });
            let order_own = order.clone();
            on_cleanup(move || order_own.lock().push("root"));
            outer
        });

        outer.dispose();
        assert_eq!(*order.lock(), vec!["child", "root"]);
    }
}
