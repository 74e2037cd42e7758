//! Property-based testing utilities using proptest.

use proptest::prelude::*;

/// One step of a random booking workload.
///
/// Users are addressed by index into a fixed pool so sequences stay small and
/// shrink well.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingOp {
    /// User books the session with a package credit
    Book {
        /// Index into the user pool
        user: usize,
    },
    /// User cancels their reservation, if they hold one
    Cancel {
        /// Index into the user pool
        user: usize,
    },
}

/// Strategy for a single [`BookingOp`] over `users` users.
pub fn booking_op(users: usize) -> impl Strategy<Value = BookingOp> {
    let max = users.max(1);
    prop_oneof![
        3 => (0..max).prop_map(|user| BookingOp::Book { user }),
        1 => (0..max).prop_map(|user| BookingOp::Cancel { user }),
    ]
}

/// Strategy for sequences of up to `max_len` booking operations.
pub fn booking_ops(users: usize, max_len: usize) -> impl Strategy<Value = Vec<BookingOp>> {
    prop::collection::vec(booking_op(users), 0..=max_len)
}

/// Strategy for a session capacity.
pub fn capacity() -> impl Strategy<Value = u32> {
    1u32..=6
}

/// Strategy for a package size.
pub fn credit_count() -> impl Strategy<Value = u32> {
    1u32..=5
}
