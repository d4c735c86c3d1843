//! Subscriber types for the reactive system.
//!
//! A Subscriber is any computation that depends on reactive sources: memos,
//! linked signals, and effects. Sources are the other half of the graph —
//! signals, memo outputs, and store path signals — and are identified by
//! [`SourceId`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a dependency source.
///
/// Every signal, memo output, and store path signal gets a source ID when
/// created. The runtime's subscriber lists are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a subscriber.
///
/// Each subscriber (memo, linked signal, or effect) gets a unique ID when
/// created. This ID is used to track dependency edges and to deduplicate
/// notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a subscriber responds to a change in one of its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// Continue the walk into this subscriber's own subscribers.
    ///
    /// Memos set this: they mark themselves stale and pass the staleness on
    /// without recomputing.
    pub propagate: bool,
    /// Queue this subscriber for execution, either immediately or at the
    /// exit of the outermost batch.
    ///
    /// Effects set this; memos set it only while they have manual watchers.
    pub schedule: bool,
}

impl Notification {
    /// Absorb the change entirely: no downstream staleness, no execution.
    ///
    /// Used by already-stale memos (their subscribers were informed when
    /// they first went stale) and by pinned linked signals.
    pub const SWALLOW: Notification = Notification {
        propagate: false,
        schedule: false,
    };
}

/// A computation that participates in dependency tracking.
///
/// Implemented by the inner state of memos, linked signals, and effects.
/// The runtime holds subscribers behind `Weak` references so dropping the
/// last user handle retires the computation.
pub trait Subscriber: Send + Sync {
    /// Get the subscriber ID for this computation.
    fn id(&self) -> SubscriberId;

    /// The source this subscriber produces, if it is itself readable
    /// (memos and linked signals). Effects produce nothing.
    fn output(&self) -> Option<SourceId> {
        None
    }

    /// React to a change in one of this subscriber's sources.
    ///
    /// Must not execute user code; it only flips staleness flags and tells
    /// the runtime how to continue.
    fn mark_stale(&self) -> Notification;

    /// Execute the subscriber. Called only for scheduled subscribers, after
    /// the propagation walk has finished and no graph locks are held.
    fn run(&self);
}
