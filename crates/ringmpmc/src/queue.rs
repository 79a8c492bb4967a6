use crate::error::OverflowError;
use crate::invariants::{
    debug_assert_bounded_size, debug_assert_drained, debug_assert_pow2, debug_assert_slot_index,
};
use crate::memory::{GlobalResource, MemoryResource, RawArray};
use crate::portable_ring::PortableRingBuffer;
use crate::ring_buffer::{RingBuffer, INDEX_MASK, INVALID_INDEX, OVERFLOW_INDEX};
use crate::scalable_ring::ScalableRingBuffer;
use crate::storage::DataStorage;
use std::sync::Arc;

/// Bounded MPMC queue over SCQ index engines.
pub type ScalableCircularQueue<T> = LockFreeQueue<T, ScalableRingBuffer>;

/// Bounded MPMC queue over LPRQ index engines.
pub type PortableRingQueue<T> = LockFreeQueue<T, PortableRingBuffer>;

/// Lock-free bounded MPMC queue, generic over the index engine.
///
/// Two engines circulate slot indices: `free` starts holding every index,
/// `allocated` starts empty. An enqueue moves an index free -> slot write ->
/// allocated; a dequeue moves it allocated -> slot read -> free. A slot holds
/// a live `T` exactly while its index sits on the allocated side, and the
/// engines' acq-rel index hand-offs order every slot access.
///
/// `enqueue`/`dequeue` are callable from any number of threads concurrently
/// (up to the capacity, see the crate docs); `clear` and `set_capacity`
/// require quiescence, which their `&mut self` receivers enforce.
pub struct LockFreeQueue<T, B: RingBuffer> {
    free: B,
    allocated: B,
    slots: RawArray<DataStorage<T>>,
    resource: Arc<dyn MemoryResource>,
}

// Safety: the queue owns its slots; the engine protocol hands each slot to
// exactly one thread at a time, so sharing the queue only moves T values
// between threads.
unsafe impl<T: Send, B: RingBuffer + Send> Send for LockFreeQueue<T, B> {}
unsafe impl<T: Send, B: RingBuffer + Sync> Sync for LockFreeQueue<T, B> {}

impl<T, B: RingBuffer> LockFreeQueue<T, B> {
    /// Creates a queue with at least `capacity` slots (rounded up to the next
    /// power of two) on the process-global allocator.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_resource(capacity, Arc::new(GlobalResource))
    }

    /// Creates a queue with at least `capacity` slots on a caller-provided
    /// allocator. All backing storage (slots and both engines) goes through
    /// `resource`.
    #[must_use]
    pub fn with_resource(capacity: usize, resource: Arc<dyn MemoryResource>) -> Self {
        let mut queue = Self {
            free: B::new(resource.clone()),
            allocated: B::new(resource.clone()),
            slots: RawArray::new(0, resource.clone()),
            resource,
        };
        queue.set_capacity(capacity);
        queue
    }

    /// Fixed capacity: always a power of two in `[1, capacity_max()]`.
    #[must_use]
    pub fn capacity(&self) -> usize {
        let cap = self.slots.len();
        debug_assert_pow2!(cap);
        cap
    }

    /// Largest supported capacity for this engine.
    #[must_use]
    pub fn capacity_max() -> usize {
        (INDEX_MASK as usize) >> (B::CELLS_PER_SLOT - 1)
    }

    /// Point-in-time number of stored elements: exact at quiescence, an
    /// estimate (but never above `capacity`) under concurrency.
    #[must_use]
    pub fn size(&self) -> usize {
        let size = self.allocated.distance().min(self.capacity());
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
    /// On a full queue, returns [`OverflowError`] carrying `value` back. The
    /// queue is unchanged.
    pub fn enqueue(&self, value: T) -> Result<usize, OverflowError<T>> {
        let index = loop {
            let index = self.free.dequeue(true);
            if index == OVERFLOW_INDEX {
                return Err(OverflowError::new("queue overflow happened", value));
            }
            if index != INVALID_INDEX {
                break index;
            }
            // Cautiously aborted round inside the engine; take another.
        };
        debug_assert_slot_index!(index, self.capacity());
        // SAFETY: the free ring hands out each index to exactly one caller,
        // and an index on the free side means the slot is empty.
        unsafe { self.slots.as_slice()[index as usize].set(value) };
        // Dimensioned to always succeed: every in-flight index was first
        // obtained from the free ring of the same size.
        self.allocated.enqueue(index, false);
        Ok(index as usize)
    }

    /// Removes and returns the oldest element, or `None` when empty.
    #[must_use]
    pub fn dequeue(&self) -> Option<T> {
        let index = self.allocated.dequeue(false);
        if index == INVALID_INDEX {
            return None;
        }
        debug_assert_slot_index!(index, self.capacity());
        // SAFETY: the allocated ring hands out each index to exactly one
        // caller, and an index on the allocated side means the slot is live.
        let value = unsafe { self.slots.as_slice()[index as usize].take() };
        self.free.enqueue(index, true);
        Some(value)
    }

    /// Drops every stored element and resets both engines to the initial
    /// state. Requires quiescence (enforced by `&mut self`).
    pub fn clear(&mut self) {
        if self.slots.is_empty() {
            return;
        }
        let size = self.size();
        for _ in 0..size {
            let _value = self.dequeue();
        }
        debug_assert_drained!(self.size());
        self.allocated.clear();
        self.free.full();
    }

    /// Grows the queue to at least `capacity` slots (rounded up to a power of
    /// two, capped at [`capacity_max`]); any smaller request only clears.
    /// All stored elements are dropped either way. Requires quiescence.
    ///
    /// [`capacity_max`]: LockFreeQueue::capacity_max
    pub fn set_capacity(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        let cap_pow2 = capacity.next_power_of_two();
        if self.capacity() < cap_pow2 && cap_pow2 <= Self::capacity_max() {
            self.clear();
            self.slots = RawArray::new(cap_pow2, self.resource.clone());
            self.allocated.set_size(cap_pow2 * B::CELLS_PER_SLOT);
            self.free.set_size(cap_pow2 * B::CELLS_PER_SLOT);
        }
        self.clear();
    }

    /// Borrows the element at `index`.
    ///
    /// # Safety
    ///
    /// The slot must hold a live element (its index is on the allocated side)
    /// and no thread may be writing it. Intended for iteration over the
    /// backing array by callers that track liveness themselves.
    #[must_use]
    pub unsafe fn get(&self, index: usize) -> &T {
        // SAFETY: liveness and aliasing per the caller's contract.
        unsafe { self.slots.as_slice()[index].get() }
    }

    /// Mutably borrows the element at `index`.
    ///
    /// # Safety
    ///
    /// The slot must hold a live element. Exclusivity of the whole queue is
    /// given by `&mut self`.
    pub unsafe fn get_mut(&mut self, index: usize) -> &mut T {
        // SAFETY: liveness per the caller's contract, exclusivity via &mut.
        unsafe { self.slots.as_slice()[index].get_mut() }
    }

    /// Read-only view of the backing slot array, for diagnostics. Slot
    /// liveness is not visible here; reading a cell requires the same care
    /// as [`get`](LockFreeQueue::get).
    #[must_use]
    pub fn data(&self) -> &[DataStorage<T>] {
        self.slots.as_slice()
    }

    /// The allocator this queue was built on.
    #[must_use]
    pub fn resource(&self) -> &Arc<dyn MemoryResource> {
        &self.resource
    }
}

impl<T, B: RingBuffer> Drop for LockFreeQueue<T, B> {
    fn drop(&mut self) {
        // Destruction requires quiescence; drain so remaining elements drop.
        while self.dequeue().is_some() {}
    }
}
