//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, linked
//! signals, effects, and the transaction controls around them. These
//! primitives form the foundation of Weft's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes, and lazily: a dependency change
//! marks it stale, and the next read recomputes.
//!
//! ## Linked signals
//!
//! A LinkedSignal is a memo that can be manually overridden with `set` and
//! falls back to its computation when a dependency changes or on `reset`.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change. Each run owns a cleanup scope; nested effects and
//! `on_cleanup` callbacks are torn down before every re-run.
//!
//! ## Transactions
//!
//! [`batch`] coalesces multiple writes into one notification pass per
//! subscriber, [`untrack`] hides reads from the tracking machinery, and
//! [`create_root`] opens an ownership scope with an explicit disposer.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to
//! automatically detect dependencies. When a signal is read, we check if
//! there is an active tracking context and, if so, register the dependency.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod context;
mod effect;
mod equality;
mod linked;
mod memo;
mod resource;
mod runtime;
mod scope;
mod signal;
mod subscriber;
mod watchers;

pub use context::{is_tracking, untrack};
pub use effect::{create_effect, Effect};
pub use equality::ReactiveEq;
pub use linked::{create_linked_signal, LinkedOptions, LinkedSignal};
pub use memo::{create_memo, Memo};
pub use resource::{create_resource, Resource, ResourceError};
pub use runtime::batch;
pub use scope::{create_root, on_cleanup, CleanupRegistration, RootDisposer};
pub use signal::{create_signal, Signal};
pub use subscriber::{Notification, SourceId, Subscriber, SubscriberId};
pub use watchers::{watch, Subscription};
