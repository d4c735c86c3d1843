//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos,
//! linked signals, and effects. It owns the dependency graph and drives
//! change propagation when a source is written.
//!
//! # How It Works
//!
//! 1. When a computation is created, it registers with the runtime under a
//!    weak reference; dropping the last strong handle retires it.
//!
//! 2. When a computation reads a source, the runtime records an edge from
//!    the source to the computation.
//!
//! 3. When a source changes, the runtime walks the graph breadth-first:
//!    a. Every reachable subscriber is marked stale exactly once.
//!    b. Memos propagate staleness to their own subscribers without
//!       recomputing.
//!    c. Schedulable subscribers (effects, watched memos) are collected in
//!       discovery order and run after the walk finishes — immediately, or
//!       at the exit of the outermost batch.
//!
//! # Thread Safety
//!
//! The registries are concurrent maps so sources can be shared across
//! threads, but tracking and batching state is thread-local: propagation
//! for one write always runs on the thread that performed it.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use indexmap::IndexSet;
use tracing::{debug, trace};

use super::subscriber::{SourceId, Subscriber, SubscriberId};

// Global registry of computations.
// Weak references so the registry never keeps a retired computation alive.
static REGISTRY: OnceLock<DashMap<SubscriberId, Weak<dyn Subscriber>>> = OnceLock::new();
// Dependency edges: which subscribers each source notifies, in the order
// the edges were first recorded.
static SUBSCRIBERS: OnceLock<DashMap<SourceId, Vec<SubscriberId>>> = OnceLock::new();

fn registry() -> &'static DashMap<SubscriberId, Weak<dyn Subscriber>> {
    REGISTRY.get_or_init(DashMap::new)
}

fn subscribers() -> &'static DashMap<SourceId, Vec<SubscriberId>> {
    SUBSCRIBERS.get_or_init(DashMap::new)
}

/// Handle to a registered computation.
///
/// Dropping this handle unregisters the computation from the runtime.
pub(crate) struct RegistryHandle {
    subscriber_id: SubscriberId,
}

impl Drop for RegistryHandle {
    fn drop(&mut self) {
        registry().remove(&self.subscriber_id);
    }
}

/// Register a computation with the runtime.
///
/// Returns a handle that unregisters the computation when dropped.
pub(crate) fn register(subscriber: Arc<dyn Subscriber>) -> RegistryHandle {
    let id = subscriber.id();
    registry().insert(id, Arc::downgrade(&subscriber));
    RegistryHandle { subscriber_id: id }
}

/// Record a dependency edge from `source` to `subscriber`.
///
/// Idempotent: re-reading the same source within one run records one edge.
pub(crate) fn add_edge(source: SourceId, subscriber: SubscriberId) {
    let mut entry = subscribers().entry(source).or_default();
    if !entry.contains(&subscriber) {
        trace!(?source, ?subscriber, "dependency edge added");
        entry.push(subscriber);
    }
}

/// Remove the edges a subscriber recorded during its previous run.
///
/// Called before every re-run so a computation's edges always reflect
/// exactly the sources read during its most recent execution.
pub(crate) fn remove_edges(subscriber: SubscriberId, sources: &[SourceId]) {
    for source in sources {
        if let Some(mut entry) = subscribers().get_mut(source) {
            entry.retain(|s| *s != subscriber);
        }
    }
}

/// Drop a retired source's subscriber list.
///
/// Called when the value producing the source is dropped; without it,
/// workloads creating short-lived signals would grow the edge map for the
/// life of the process.
pub(crate) fn retire_source(source: SourceId) {
    subscribers().remove(&source);
}

/// Record a read of `source` in the current tracking frame, if any.
pub(crate) fn track_read(source: SourceId) {
    if let Some(subscriber) = super::context::current_subscriber() {
        super::context::record_source(source);
        add_edge(source, subscriber);
    }
}

// ---------------------------------------------------------------------------
// Batching
// ---------------------------------------------------------------------------

thread_local! {
    static BATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
    static PENDING: RefCell<IndexSet<SubscriberId>> = RefCell::new(IndexSet::new());
}

/// Guard for one batch level. Flushes the pending set when the outermost
/// level exits, including during unwinding, so a panic inside the batched
/// callback cannot suppress notifications for already-applied writes.
struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        BATCH_DEPTH.with(|d| d.set(d.get() + 1));
        Self
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let depth = BATCH_DEPTH.with(|d| {
            let depth = d.get() - 1;
            d.set(depth);
            depth
        });
        if depth == 0 {
            flush_pending();
        }
    }
}

fn in_batch() -> bool {
    BATCH_DEPTH.with(|d| d.get()) > 0
}

fn flush_pending() {
    let pending: Vec<SubscriberId> = PENDING.with(|p| p.borrow_mut().drain(..).collect());
    if pending.is_empty() {
        return;
    }
    debug!(count = pending.len(), "batch flush");
    if std::thread::panicking() {
        // This flush runs from the batch guard's Drop while an unwind is in
        // progress; a panicking run would double-panic and abort the
        // process. Shield each run and keep flushing the rest.
        for id in pending {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                run_scheduled(vec![id]);
            }));
            if outcome.is_err() {
                debug!(subscriber = ?id, "suppressed panic in unwind-time flush");
            }
        }
    } else {
        run_scheduled(pending);
    }
}

/// Run `f` as a transaction: signal writes inside it still mark the graph
/// stale immediately, but scheduled computations run only once, at the exit
/// of the outermost batch, deduplicated across all writes in the batch.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::enter();
    f()
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

/// Notify everything downstream of `source` that its value changed.
///
/// The walk itself only flips staleness flags; user code (effect bodies,
/// watched memo recomputes) runs strictly after the walk, from a stable
/// snapshot, so reentrant subscribes and disposals cannot corrupt the pass.
pub(crate) fn notify(source: SourceId) {
    // Sources with no recorded subscribers skip the walk entirely.
    if subscribers().get(&source).map_or(true, |e| e.is_empty()) {
        return;
    }

    let mut scheduled: IndexSet<SubscriberId> = IndexSet::new();
    let mut visited: HashSet<SubscriberId> = HashSet::new();
    let mut queue: VecDeque<SourceId> = VecDeque::new();
    queue.push_back(source);

    while let Some(src) = queue.pop_front() {
        // Materialize a stable snapshot before touching any subscriber.
        let snapshot: Vec<SubscriberId> = match subscribers().get(&src) {
            Some(entry) => entry.clone(),
            None => continue,
        };

        for id in snapshot {
            if !visited.insert(id) {
                continue;
            }
            let subscriber = match registry().get(&id) {
                Some(weak) => match weak.upgrade() {
                    Some(s) => s,
                    None => continue,
                },
                None => continue,
            };

            let notification = subscriber.mark_stale();
            trace!(?src, subscriber = ?id, ?notification, "marked stale");

            if notification.propagate {
                if let Some(output) = subscriber.output() {
                    queue.push_back(output);
                }
            }
            if notification.schedule {
                scheduled.insert(id);
            }
        }
    }

    if scheduled.is_empty() {
        return;
    }

    if in_batch() {
        PENDING.with(|p| p.borrow_mut().extend(scheduled));
    } else {
        run_scheduled(scheduled.into_iter().collect());
    }
}

fn run_scheduled(ids: Vec<SubscriberId>) {
    for id in ids {
        // Upgrade per subscriber: an earlier run in this pass may have
        // disposed a later one.
        let subscriber = {
            match registry().get(&id) {
                Some(weak) => weak.upgrade(),
                None => None,
            }
        };
        if let Some(subscriber) = subscriber {
            subscriber.run();
        }
    }
}
