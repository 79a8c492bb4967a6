use crate::error::OverflowError;
use crate::invariants::{debug_assert_bounded_size, debug_assert_pow2};
use crate::memory::{GlobalResource, MemoryResource, RawArray};
use crate::storage::DataStorage;
use std::sync::{Arc, Mutex, PoisonError};

/// Single-lock bounded queue with the same contract as [`LockFreeQueue`].
///
/// Reference implementation: one mutex around the head/tail counters, the
/// same slot array and overflow semantics. Useful as a differential-testing
/// oracle and as a baseline in benchmarks.
///
/// [`LockFreeQueue`]: crate::LockFreeQueue
pub struct MutexQueue<T> {
    state: Mutex<Counters>,
    slots: RawArray<DataStorage<T>>,
    resource: Arc<dyn MemoryResource>,
}

struct Counters {
    head: u64,
    tail: u64,
}

// Safety: all slot access happens under the mutex, which serializes the
// ownership hand-offs the lock-free engines do with CAS.
unsafe impl<T: Send> Send for MutexQueue<T> {}
unsafe impl<T: Send> Sync for MutexQueue<T> {}

impl<T> MutexQueue<T> {
    /// Creates a queue with at least `capacity` slots (rounded up to the next
    /// power of two) on the process-global allocator.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_resource(capacity, Arc::new(GlobalResource))
    }

    /// Creates a queue with at least `capacity` slots on a caller-provided
    /// allocator.
    #[must_use]
    pub fn with_resource(capacity: usize, resource: Arc<dyn MemoryResource>) -> Self {
        let mut queue = Self {
            state: Mutex::new(Counters { head: 0, tail: 0 }),
            slots: RawArray::new(0, resource.clone()),
            resource,
        };
        queue.set_capacity(capacity);
        queue
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        let cap = self.slots.len();
        debug_assert_pow2!(cap);
        cap
    }

    #[must_use]
    pub fn capacity_max() -> usize {
        usize::MAX >> 1
    }

    #[must_use]
    pub fn size(&self) -> usize {
        let state = self.lock();
        let size = (state.tail - state.head) as usize;
        debug_assert_bounded_size!(size, self.capacity());
        size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.size() == self.capacity()
    }

    /// Appends `value`, returning the slot index it landed in.
    ///
    /// # Errors
    ///
    /// On a full queue, returns [`OverflowError`] carrying `value` back.
    pub fn enqueue(&self, value: T) -> Result<usize, OverflowError<T>> {
        let mut state = self.lock();
        let capacity = self.slots.len() as u64;
        if state.tail - state.head >= capacity {
            return Err(OverflowError::new("queue overflow happened", value));
        }
        let index = (state.tail % capacity) as usize;
        // SAFETY: the slot at tail is empty and the lock is held.
        unsafe { self.slots.as_slice()[index].set(value) };
        state.tail += 1;
        Ok(index)
    }

    /// Removes and returns the oldest element, or `None` when empty.
    #[must_use]
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.lock();
        if state.head == state.tail {
            return None;
        }
        let index = (state.head % self.slots.len() as u64) as usize;
        // SAFETY: head < tail, so the slot at head is live; the lock is held.
        let value = unsafe { self.slots.as_slice()[index].take() };
        state.head += 1;
        Some(value)
    }

    /// Drops every stored element and resets the counters.
    pub fn clear(&mut self) {
        if self.slots.is_empty() {
            return;
        }
        while self.dequeue().is_some() {}
        let mut state = self.lock();
        state.head = 0;
        state.tail = 0;
    }

    /// Grows the queue to at least `capacity` slots (rounded up to a power of
    /// two); any smaller request only clears. All stored elements are dropped
    /// either way.
    pub fn set_capacity(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        let cap_pow2 = capacity.next_power_of_two();
        if self.capacity() < cap_pow2 && cap_pow2 <= Self::capacity_max() {
            self.clear();
            self.slots = RawArray::new(cap_pow2, self.resource.clone());
        }
        self.clear();
    }

    /// Borrows the element at `index`.
    ///
    /// # Safety
    ///
    /// The slot must hold a live element and no thread may be writing it.
    #[must_use]
    pub unsafe fn get(&self, index: usize) -> &T {
        // SAFETY: liveness and aliasing per the caller's contract.
        unsafe { self.slots.as_slice()[index].get() }
    }

    /// Mutably borrows the element at `index`.
    ///
    /// # Safety
    ///
    /// The slot must hold a live element.
    pub unsafe fn get_mut(&mut self, index: usize) -> &mut T {
        // SAFETY: liveness per the caller's contract, exclusivity via &mut.
        unsafe { self.slots.as_slice()[index].get_mut() }
    }

    /// Read-only view of the backing slot array, for diagnostics.
    #[must_use]
    pub fn data(&self) -> &[DataStorage<T>] {
        self.slots.as_slice()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for MutexQueue<T> {
    fn drop(&mut self) {
        while self.dequeue().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_protocol() {
        let queue = MutexQueue::<u64>::new(4);
        queue.enqueue(10).unwrap();
        queue.enqueue(20).unwrap();
        queue.enqueue(30).unwrap();
        assert_eq!(queue.size(), 3);
        assert_eq!(queue.dequeue(), Some(10));
        assert_eq!(queue.dequeue(), Some(20));
        assert_eq!(queue.dequeue(), Some(30));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_overflow_preserves_value() {
        let queue = MutexQueue::<String>::new(2);
        queue.enqueue("a".into()).unwrap();
        queue.enqueue("b".into()).unwrap();
        let err = queue.enqueue("c".into()).unwrap_err();
        assert_eq!(err.get(), "c");
        assert_eq!(queue.dequeue(), Some("a".into()));
        queue.enqueue(err.into_value()).unwrap();
        assert_eq!(queue.dequeue(), Some("b".into()));
        assert_eq!(queue.dequeue(), Some("c".into()));
    }

    #[test]
    fn test_capacity_rounding_and_clear() {
        let mut queue = MutexQueue::<u8>::new(6);
        assert_eq!(queue.capacity(), 8);
        for i in 0..8 {
            queue.enqueue(i).unwrap();
        }
        queue.set_capacity(20);
        assert_eq!(queue.capacity(), 32);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_wraparound_reuses_slots() {
        let queue = MutexQueue::<u64>::new(2);
        for i in 0..100 {
            queue.enqueue(i).unwrap();
            assert_eq!(queue.dequeue(), Some(i));
        }
    }
}
