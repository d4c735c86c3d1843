//! Tracking context.
//!
//! The tracking context records which computation is currently running.
//! This enables automatic dependency discovery: when a source is read, the
//! runtime registers the current computation as a subscriber without any
//! manual subscribe call.
//!
//! # Implementation
//!
//! A thread-local stack of frames tracks the currently executing
//! computation. Running a memo or effect pushes a tracking frame; the frame
//! also accumulates the sources read while it is on top, so the computation
//! can replace its dependency edges wholesale after each run. [`untrack`]
//! pushes a blank frame instead, hiding reads from the enclosing
//! computation.
//!
//! Frames are popped by drop guards, so the stack survives panics in user
//! code (a requirement: a throwing computation must not corrupt tracking
//! for everything that runs after it). The guard also removes the dependency
//! edges the aborted run had recorded so far, keeping the invariant that a
//! computation's edges reflect exactly its most recent completed run.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::subscriber::{SourceId, SubscriberId};

/// Source list for one computation run. Most computations read only a
/// handful of sources.
pub(crate) type SourceList = SmallVec<[SourceId; 8]>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

enum Frame {
    /// A computation is running; reads register dependencies.
    Tracking {
        subscriber: SubscriberId,
        sources: SourceList,
    },
    /// Reads are invisible to the enclosing computation.
    Untracked,
}

/// Guard for one tracked computation run.
///
/// Pops its frame when dropped, even if the computation panics. Calling
/// [`TrackingScope::finish`] instead returns the sources read during the
/// run.
pub(crate) struct TrackingScope {
    subscriber: SubscriberId,
}

impl TrackingScope {
    /// Enter a tracking frame for the given subscriber.
    pub fn enter(subscriber: SubscriberId) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(Frame::Tracking {
                subscriber,
                sources: SourceList::new(),
            });
        });
        Self { subscriber }
    }

    /// Pop the frame and return the sources read while it was active.
    pub fn finish(self) -> SourceList {
        let sources = CONTEXT_STACK.with(|stack| {
            match stack.borrow_mut().pop() {
                Some(Frame::Tracking {
                    subscriber,
                    sources,
                }) => {
                    debug_assert_eq!(
                        subscriber, self.subscriber,
                        "tracking frame mismatch: expected {:?}, got {:?}",
                        self.subscriber, subscriber
                    );
                    sources
                }
                _ => SourceList::new(),
            }
        });
        // The frame is already popped; skip the Drop impl.
        std::mem::forget(self);
        sources
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        // Reached only on unwind; `finish` forgets the guard. Edges for the
        // sources read before the panic were already recorded globally, but
        // the computation never received the source list, so its next run
        // could not remove them. Take them back out here: a partial run
        // leaves no edges behind.
        let sources = CONTEXT_STACK.with(|stack| match stack.borrow_mut().pop() {
            Some(Frame::Tracking { sources, .. }) => sources,
            _ => SourceList::new(),
        });
        if !sources.is_empty() {
            super::runtime::remove_edges(self.subscriber, &sources);
        }
    }
}

/// Guard that suspends dependency tracking until dropped.
pub(crate) struct UntrackedScope;

impl UntrackedScope {
    pub fn enter() -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(Frame::Untracked));
        Self
    }
}

impl Drop for UntrackedScope {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Get the subscriber currently being tracked, if any.
///
/// Returns `None` inside [`untrack`] even when a computation is running
/// further down the stack.
pub(crate) fn current_subscriber() -> Option<SubscriberId> {
    CONTEXT_STACK.with(|stack| match stack.borrow().last() {
        Some(Frame::Tracking { subscriber, .. }) => Some(*subscriber),
        _ => None,
    })
}

/// Check if reads are currently being tracked.
pub fn is_tracking() -> bool {
    current_subscriber().is_some()
}

/// Record a source read into the current tracking frame.
pub(crate) fn record_source(source: SourceId) {
    CONTEXT_STACK.with(|stack| {
        if let Some(Frame::Tracking { sources, .. }) = stack.borrow_mut().last_mut() {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
    });
}

/// Run `f` with dependency tracking suspended.
///
/// Reads inside `f` are invisible to the enclosing computation. The
/// previous tracking frame is restored afterwards, even if `f` panics.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _guard = UntrackedScope::enter();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_scope_records_subscriber() {
        let id = SubscriberId::new();

        assert!(!is_tracking());
        assert!(current_subscriber().is_none());

        {
            let _scope = TrackingScope::enter(id);

            assert!(is_tracking());
            assert_eq!(current_subscriber(), Some(id));
        }

        assert!(!is_tracking());
        assert!(current_subscriber().is_none());
    }

    #[test]
    fn finish_returns_recorded_sources() {
        let id = SubscriberId::new();
        let scope = TrackingScope::enter(id);

        let s1 = SourceId::new();
        let s2 = SourceId::new();
        record_source(s1);
        record_source(s2);
        record_source(s1); // duplicate reads collapse

        let sources = scope.finish();
        assert_eq!(sources.as_slice(), &[s1, s2]);
        assert!(!is_tracking());
    }

    #[test]
    fn nested_scopes_restore_outer_frame() {
        let outer = SubscriberId::new();
        let inner = SubscriberId::new();

        let _outer_scope = TrackingScope::enter(outer);
        assert_eq!(current_subscriber(), Some(outer));

        {
            let _inner_scope = TrackingScope::enter(inner);
            assert_eq!(current_subscriber(), Some(inner));
        }

        assert_eq!(current_subscriber(), Some(outer));
    }

    #[test]
    fn untrack_hides_reads() {
        let id = SubscriberId::new();
        let scope = TrackingScope::enter(id);

        let visible = SourceId::new();
        let hidden = SourceId::new();

        record_source(visible);
        untrack(|| {
            assert!(current_subscriber().is_none());
            record_source(hidden);
        });
        assert_eq!(current_subscriber(), Some(id));

        let sources = scope.finish();
        assert_eq!(sources.as_slice(), &[visible]);
    }
}
