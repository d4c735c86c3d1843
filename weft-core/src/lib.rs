//! Weft Core
//!
//! This crate provides the core runtime for the Weft fine-grained reactive
//! state framework. It implements:
//!
//! - Reactive primitives (signals, memos, linked signals, effects)
//! - Transactional batching, untracked reads, and ownership roots
//! - Async resources with loading/error state
//! - A deep reactive store with per-path signals, middleware, persistence,
//!   and undo/redo history
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: core primitives and dependency tracking
//! - `store`: path-addressed deep reactivity built on top of signals
//!
//! Renderers and other collaborators consume the primitives through `get`,
//! `set`, and `subscribe`; nothing in this crate renders, parses, or talks
//! to a network.
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::{Signal, Memo, Effect};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let count_clone = count.clone();
//! let doubled = Memo::new(move || count_clone.get() * 2);
//!
//! // Create an effect
//! let doubled_clone = doubled.clone();
//! let _effect = Effect::new(move || {
//!     println!("Doubled: {}", doubled_clone.get());
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Doubled: 10"
//! ```

pub mod reactive;
pub mod store;

pub use reactive::{
    batch, create_effect, create_linked_signal, create_memo, create_resource, create_root,
    create_signal, is_tracking, on_cleanup, untrack, watch, CleanupRegistration, Effect,
    LinkedOptions, LinkedSignal, Memo, ReactiveEq, Resource, ResourceError, RootDisposer, Signal,
    Subscription,
};
pub use store::{
    create_store, create_undoable_store, MemoryBackend, Path, PersistOptions, Segment,
    StorageBackend, StorageError, Store, StoreError, StoreHandle, StoreOptions, UndoableStore,
};
