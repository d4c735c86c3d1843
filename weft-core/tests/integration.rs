//! Integration Tests for the Reactive System
//!
//! These tests verify that signals, memos, linked signals, effects, and
//! transaction controls work together correctly.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use weft_core::{batch, create_root, untrack, Effect, LinkedSignal, Memo, Signal};

/// Signal -> memo -> effect chain: the canonical end-to-end scenario.
#[test]
fn count_doubled_logged() {
    let count = Signal::new(0);
    let compute_calls = Arc::new(AtomicI32::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));

    let count_clone = count.clone();
    let compute_calls_clone = compute_calls.clone();
    let doubled = Memo::new(move || {
        compute_calls_clone.fetch_add(1, Ordering::SeqCst);
        count_clone.get() * 2
    });

    let doubled_clone = doubled.clone();
    let log_clone = log.clone();
    let _effect = Effect::new(move || {
        log_clone.lock().unwrap().push(doubled_clone.get());
    });

    assert_eq!(*log.lock().unwrap(), vec![0]);
    assert_eq!(compute_calls.load(Ordering::SeqCst), 1);

    count.set(5);
    assert_eq!(*log.lock().unwrap(), vec![0, 10]);
    // The memo recomputed exactly once for the write.
    assert_eq!(compute_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn diamond_graph_runs_each_compute_once() {
    let a = Signal::new(1);

    let b_calls = Arc::new(AtomicI32::new(0));
    let a1 = a.clone();
    let b_calls_clone = b_calls.clone();
    let b = Memo::new(move || {
        b_calls_clone.fetch_add(1, Ordering::SeqCst);
        a1.get() * 2
    });

    let c_calls = Arc::new(AtomicI32::new(0));
    let a2 = a.clone();
    let c_calls_clone = c_calls.clone();
    let c = Memo::new(move || {
        c_calls_clone.fetch_add(1, Ordering::SeqCst);
        a2.get() * 3
    });

    let d_calls = Arc::new(AtomicI32::new(0));
    let d_calls_clone = d_calls.clone();
    let b_clone = b.clone();
    let c_clone = c.clone();
    let d = Memo::new(move || {
        d_calls_clone.fetch_add(1, Ordering::SeqCst);
        b_clone.get() + c_clone.get()
    });

    assert_eq!(d.get(), 5);

    a.set(2);
    assert_eq!(d.get(), 10);

    assert_eq!(b_calls.load(Ordering::SeqCst), 2);
    assert_eq!(c_calls.load(Ordering::SeqCst), 2);
    assert_eq!(d_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn batch_coalesces_to_one_effect_run() {
    let a = Signal::new(0);
    let b = Signal::new(0);
    let runs = Arc::new(AtomicI32::new(0));

    let a_clone = a.clone();
    let b_clone = b.clone();
    let runs_clone = runs.clone();
    let _effect = Effect::new(move || {
        let _ = a_clone.get() + b_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(runs.load(Ordering::SeqCst), 1);

    batch(|| {
        a.set(1);
        b.set(2);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn panic_inside_batch_still_flushes_applied_writes() {
    let a = Signal::new(0);
    let observed = Arc::new(AtomicI32::new(-1));

    let a_clone = a.clone();
    let observed_clone = observed.clone();
    let _effect = Effect::new(move || {
        observed_clone.store(a_clone.get(), Ordering::SeqCst);
    });

    let a_clone = a.clone();
    let result = catch_unwind(AssertUnwindSafe(|| {
        batch(move || {
            a_clone.set(7);
            panic!("boom");
        })
    }));
    assert!(result.is_err());

    // The write before the panic was applied and its notification flushed.
    assert_eq!(a.get(), 7);
    assert_eq!(observed.load(Ordering::SeqCst), 7);
}

#[test]
fn panicking_effect_during_unwind_flush_is_contained() {
    let source = Signal::new(0);
    let runs = Arc::new(AtomicI32::new(0));

    // Registered first, so it flushes first.
    let source_clone = source.clone();
    let _failing = Effect::new(move || {
        if source_clone.get() > 0 {
            panic!("effect failure");
        }
    });

    let source_clone = source.clone();
    let runs_clone = runs.clone();
    let _observer = Effect::new(move || {
        let _ = source_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    let source_clone = source.clone();
    let result = catch_unwind(AssertUnwindSafe(move || {
        batch(move || {
            source_clone.set(1);
            panic!("batch failure");
        })
    }));
    assert!(result.is_err());

    // The failing effect's panic was absorbed by the unwind-time flush and
    // the remaining scheduled run still happened.
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(source.get(), 1);
}

#[test]
fn untracked_reads_create_no_edges() {
    let tracked = Signal::new(0);
    let hidden = Signal::new(0);
    let runs = Arc::new(AtomicI32::new(0));

    let tracked_clone = tracked.clone();
    let hidden_clone = hidden.clone();
    let runs_clone = runs.clone();
    let _effect = Effect::new(move || {
        let _ = tracked_clone.get();
        let _ = untrack(|| hidden_clone.get());
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    hidden.set(5);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    tracked.set(5);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn peek_does_not_track() {
    let source = Signal::new(0);
    let runs = Arc::new(AtomicI32::new(0));

    let source_clone = source.clone();
    let runs_clone = runs.clone();
    let _effect = Effect::new(move || {
        let _ = source_clone.peek();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    source.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn root_disposal_tears_down_owned_effects() {
    let source = Signal::new(0);
    let runs = Arc::new(AtomicI32::new(0));

    let source_clone = source.clone();
    let runs_clone = runs.clone();
    let disposer = create_root(move |disposer| {
        let source = source_clone.clone();
        let runs = runs_clone.clone();
        let _effect = Effect::new(move || {
            let _ = source.get();
            runs.fetch_add(1, Ordering::SeqCst);
        });
        disposer
    });

    source.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    disposer.dispose();
    source.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn linked_signal_full_round_trip() {
    let options = Signal::new(vec![10, 20, 30]);

    let options_clone = options.clone();
    let selected = LinkedSignal::new(move || options_clone.get().first().copied().unwrap_or(0));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let selected_clone = selected.clone();
    let seen_clone = seen.clone();
    let _effect = Effect::new(move || {
        seen_clone.lock().unwrap().push(selected_clone.get());
    });

    assert_eq!(*seen.lock().unwrap(), vec![10]);

    selected.set(20);
    assert!(selected.is_overridden());
    assert_eq!(*seen.lock().unwrap(), vec![10, 20]);

    // A dependency change clears the override and recomputes.
    options.set(vec![99]);
    assert!(!selected.is_overridden());
    assert_eq!(*seen.lock().unwrap(), vec![10, 20, 99]);
}

#[test]
fn memo_panic_restores_tracking_and_retries() {
    let source = Signal::new(0);

    let source_clone = source.clone();
    let memo = Memo::new(move || {
        let value = source_clone.get();
        if value == 0 {
            panic!("no value yet");
        }
        value * 2
    });

    let memo_clone = memo.clone();
    let result = catch_unwind(AssertUnwindSafe(move || memo_clone.get()));
    assert!(result.is_err());

    // The panic did not poison the tracking stack; unrelated computations
    // still work and the memo retries after a fix.
    let other = Signal::new(1);
    let other_clone = other.clone();
    let unrelated = Memo::new(move || other_clone.get() + 1);
    assert_eq!(unrelated.get(), 2);

    source.set(4);
    assert_eq!(memo.get(), 8);
}

#[test]
fn set_from_inside_effect_reexecutes_dependents() {
    let input = Signal::new(1);
    let derived = Signal::new(0);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let input_clone = input.clone();
    let derived_clone = derived.clone();
    let _mirror = Effect::new(move || {
        let value = input_clone.get();
        derived_clone.set(value * 10);
    });

    let derived_clone = derived.clone();
    let seen_clone = seen.clone();
    let _observer = Effect::new(move || {
        seen_clone.lock().unwrap().push(derived_clone.get());
    });

    input.set(2);
    assert_eq!(*seen.lock().unwrap(), vec![10, 20]);
}
