//! Write-gating equality.
//!
//! Signal writes are suppressed when the new value is "the same" as the old
//! one. Sameness here is identity-style, not `PartialEq`:
//!
//! - every NaN equals every other NaN (a signal holding NaN that is set to
//!   NaN again must not notify);
//! - `+0.0` and `-0.0` are distinct (the sign bit is an observable change);
//! - `Arc` values compare by pointer, i.e. object identity.
//!
//! For everything else the trait delegates to `PartialEq`. Types not covered
//! here implement [`ReactiveEq`] by hand, usually as a one-line delegation.

use std::sync::Arc;

/// Identity-style equality used to gate signal writes.
pub trait ReactiveEq {
    /// Returns true when a write replacing `self` with `other` should be
    /// treated as a no-op.
    fn reactive_eq(&self, other: &Self) -> bool;
}

macro_rules! delegate_to_partial_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ReactiveEq for $ty {
                fn reactive_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

delegate_to_partial_eq!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    String,
    serde_json::Value,
);

impl ReactiveEq for &str {
    fn reactive_eq(&self, other: &Self) -> bool {
        self == other
    }
}

impl ReactiveEq for f64 {
    fn reactive_eq(&self, other: &Self) -> bool {
        // NaN payloads are not observable; sign bits are.
        (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
    }
}

impl ReactiveEq for f32 {
    fn reactive_eq(&self, other: &Self) -> bool {
        (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
    }
}

/// Object identity: two `Arc`s are equal only when they are the same
/// allocation.
impl<T: ?Sized> ReactiveEq for Arc<T> {
    fn reactive_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: ReactiveEq> ReactiveEq for Option<T> {
    fn reactive_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.reactive_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: ReactiveEq> ReactiveEq for Vec<T> {
    fn reactive_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.reactive_eq(b))
    }
}

impl<T: ReactiveEq> ReactiveEq for Box<T> {
    fn reactive_eq(&self, other: &Self) -> bool {
        (**self).reactive_eq(&**other)
    }
}

impl<A: ReactiveEq, B: ReactiveEq> ReactiveEq for (A, B) {
    fn reactive_eq(&self, other: &Self) -> bool {
        self.0.reactive_eq(&other.0) && self.1.reactive_eq(&other.1)
    }
}

impl<A: ReactiveEq, B: ReactiveEq, C: ReactiveEq> ReactiveEq for (A, B, C) {
    fn reactive_eq(&self, other: &Self) -> bool {
        self.0.reactive_eq(&other.0)
            && self.1.reactive_eq(&other.1)
            && self.2.reactive_eq(&other.2)
    }
}
