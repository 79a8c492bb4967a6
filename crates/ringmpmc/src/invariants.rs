//! Debug assertion macros for queue and engine invariants.
//!
//! Active only in debug builds, zero overhead in release. A failed assertion
//! here means the index protocol was corrupted (or a quiescence precondition
//! was violated), not a recoverable condition.

/// Assert that a capacity is zero or a power of two.
macro_rules! debug_assert_pow2 {
    ($cap:expr) => {
        debug_assert!(
            $cap == 0 || ($cap as u64).is_power_of_two(),
            "capacity {} is not a power of two",
            $cap
        )
    };
}

/// Assert that an observed size never exceeds the capacity.
macro_rules! debug_assert_bounded_size {
    ($size:expr, $capacity:expr) => {
        debug_assert!(
            $size <= $capacity,
            "size {} exceeds capacity {}",
            $size,
            $capacity
        )
    };
}

/// Assert that an index handed out by an engine addresses a real slot.
macro_rules! debug_assert_slot_index {
    ($index:expr, $capacity:expr) => {
        debug_assert!(
            ($index as usize) < $capacity,
            "engine produced slot index {} for capacity {}",
            $index,
            $capacity
        )
    };
}

/// Assert that a drain left the queue empty.
macro_rules! debug_assert_drained {
    ($size:expr) => {
        debug_assert!($size == 0, "queue still holds {} values after drain", $size)
    };
}

pub(crate) use debug_assert_bounded_size;
pub(crate) use debug_assert_drained;
pub(crate) use debug_assert_pow2;
pub(crate) use debug_assert_slot_index;
